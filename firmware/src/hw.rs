//! Board bindings: modem control pins and the AT UART.

use core::fmt::Write as _;
use core::time::Duration;

use embassy_stm32::gpio::{Input, Level, Output, OutputOpenDrain};
use embassy_stm32::usart::BufferedUart;
use embassy_time::Instant;
use embedded_io::{Read, ReadReady, Write};
use modem_core::at::response::is_final_result;
use modem_core::at::{AtPort, PortError, Response};
use modem_core::lines::{LineDriver, LineId, LineLevel, LinePolarity, LineWiring};

use crate::instant::to_embassy;

/// Logical wiring of the pins [`BoardLines`] owns. Pin numbers are the
/// connector positions, for telemetry only.
pub const WIRING: LineWiring = LineWiring::from_pins(
    (4, LinePolarity::ActiveHigh),
    (5, LinePolarity::ActiveHigh),
    (-1, LinePolarity::ActiveLow),
    (6, LinePolarity::ActiveLow),
);

/// GPIO for the modem's power switch, status pin and PWRKEY.
pub struct BoardLines<'d> {
    power: Output<'d>,
    status: Input<'d>,
    wake_request: OutputOpenDrain<'d>,
}

impl<'d> BoardLines<'d> {
    pub fn new(power: Output<'d>, status: Input<'d>, wake_request: OutputOpenDrain<'d>) -> Self {
        Self {
            power,
            status,
            wake_request,
        }
    }
}

const fn to_hal(level: LineLevel) -> Level {
    match level {
        LineLevel::Low => Level::Low,
        LineLevel::High => Level::High,
    }
}

const fn from_hal(level: Level) -> LineLevel {
    match level {
        Level::Low => LineLevel::Low,
        Level::High => LineLevel::High,
    }
}

impl LineDriver for BoardLines<'_> {
    fn drive(&mut self, line: LineId, level: LineLevel) {
        match line {
            LineId::Power => self.power.set_level(to_hal(level)),
            LineId::WakeRequest => self.wake_request.set_level(to_hal(level)),
            LineId::Status | LineId::Reset => {
                defmt::warn!("hw: refusing to drive {}", line.label());
            }
        }
    }

    fn sample(&mut self, line: LineId) -> LineLevel {
        match line {
            LineId::Status => from_hal(self.status.get_level()),
            LineId::Power => from_hal(self.power.get_output_level()),
            LineId::WakeRequest => from_hal(self.wake_request.get_level()),
            LineId::Reset => LineLevel::High,
        }
    }
}

/// Blocking AT transport over the modem UART.
///
/// Each transaction busy-polls the RX buffer until a final result line
/// arrives or the deadline passes, so the caller's timeout bounds the block.
pub struct UartAtPort<'d> {
    uart: BufferedUart<'d>,
}

impl<'d> UartAtPort<'d> {
    pub fn new(uart: BufferedUart<'d>) -> Self {
        Self { uart }
    }

    fn send(&mut self, command: &str) -> Result<(), PortError> {
        self.uart
            .write_all(command.as_bytes())
            .and_then(|()| self.uart.write_all(b"\r"))
            .and_then(|()| self.uart.flush())
            .map_err(|_| PortError::Io)
    }

    fn discard_pending(&mut self) {
        let mut scratch = [0u8; 16];
        while matches!(self.uart.read_ready(), Ok(true)) {
            if self.uart.read(&mut scratch).is_err() {
                break;
            }
        }
    }
}

impl AtPort for UartAtPort<'_> {
    fn transact(
        &mut self,
        command: &str,
        timeout: Duration,
        response: &mut Response,
    ) -> Result<(), PortError> {
        response.clear();
        self.discard_pending();
        self.send(command)?;

        let deadline = Instant::now() + to_embassy(timeout);
        let mut line_start = 0;
        let mut byte = [0u8; 1];
        while Instant::now() < deadline {
            if !self.uart.read_ready().map_err(|_| PortError::Io)? {
                continue;
            }
            if self.uart.read(&mut byte).map_err(|_| PortError::Io)? == 0 {
                continue;
            }
            response
                .write_char(char::from(byte[0]))
                .map_err(|_| PortError::Overflow)?;
            if byte[0] == b'\n' {
                if is_final_result(response[line_start..].trim()) {
                    return Ok(());
                }
                line_start = response.len();
            }
        }
        Err(PortError::Timeout)
    }
}
