use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Level, Output, OutputOpenDrain, Pull, Speed};
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use modem_core::at::AtCommandSession;
use modem_core::lifecycle::{Modem, ModemConfig};
use modem_core::modules::{FamilyDriver, sim7000};
use static_cell::StaticCell;

use crate::hw::{BoardLines, UartAtPort, WIRING};
use crate::instant::FirmwareInstant;

mod logger_task;

/// The modem family fitted to this board.
const FAMILY: modem_core::modules::Family = sim7000::FAMILY;
const MODEM_UART_BAUD: u32 = 115_200;
const MODEM_UART_BUFFER_SIZE: usize = 256;

pub(crate) type BoardModem = Modem<
    FamilyDriver<AtCommandSession<UartAtPort<'static>>>,
    BoardLines<'static>,
    FirmwareInstant,
>;

static UART_TX_BUFFER: StaticCell<[u8; MODEM_UART_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; MODEM_UART_BUFFER_SIZE]> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let hal::Peripherals {
        PA4,
        PA5,
        PA6,
        PB0,
        PB1,
        USART5,
        ..
    } = hal::init(hal::Config::default());

    // PWRKEY idles released so the module sees it high when power arrives.
    let lines = BoardLines::new(
        Output::new(PA4, Level::Low, Speed::Low),
        Input::new(PA5, Pull::Down),
        OutputOpenDrain::new(PA6, Level::High, Speed::Low),
    );

    let mut config = UartConfig::default();
    config.baudrate = MODEM_UART_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = match BufferedUart::new(
        USART5,
        PB1,
        PB0,
        UART_TX_BUFFER.init([0; MODEM_UART_BUFFER_SIZE]),
        UART_RX_BUFFER.init([0; MODEM_UART_BUFFER_SIZE]),
        UartIrqs,
        config,
    ) {
        Ok(uart) => uart,
        Err(error) => {
            defmt::error!(
                "runtime: modem UART init failed: {}",
                defmt::Debug2Format(&error)
            );
            return;
        }
    };

    let session = AtCommandSession::new(UartAtPort::new(uart), FAMILY.dialect);
    let driver = FamilyDriver::new(FAMILY.profile, session);
    let modem = match Modem::new(driver, WIRING, lines, ModemConfig::DEFAULT) {
        Ok(modem) => modem,
        Err(error) => {
            defmt::error!(
                "runtime: {} profile rejected: {}",
                FAMILY.profile.name,
                defmt::Display2Format(&error)
            );
            return;
        }
    };

    defmt::info!("runtime: {} modem on USART5", FAMILY.profile.name);
    if let Err(error) = spawner.spawn(logger_task::run(modem)) {
        defmt::error!(
            "runtime: logger task spawn failed: {}",
            defmt::Debug2Format(&error)
        );
    }
}
