use core::time::Duration;

use embassy_time::Timer;
use modem_core::error::Severity;

use super::BoardModem;
use crate::cycle::{CycleStep, CycleSummary, LoggerCycle};
use crate::instant::{FirmwareInstant, to_embassy};
use crate::telemetry::TelemetryDrain;

const APN: &str = "hologram";
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Gap between the end of one logger cycle and the start of the next.
const CYCLE_INTERVAL: embassy_time::Duration = embassy_time::Duration::from_secs(15 * 60);

#[embassy_executor::task]
pub async fn run(mut modem: BoardModem) -> ! {
    let mut drain = TelemetryDrain::new();
    loop {
        let mut cycle = LoggerCycle::new(APN, POLL_INTERVAL);
        let summary = loop {
            let step = cycle.step(&mut modem, FirmwareInstant::now());
            drain.drain(modem.telemetry());
            match step {
                CycleStep::Wait(delay) => Timer::after(to_embassy(delay)).await,
                CycleStep::Done(summary) => break summary,
            }
        };
        log_summary(&summary);
        Timer::after(CYCLE_INTERVAL).await;
    }
}

fn log_summary(summary: &CycleSummary) {
    let status = summary.flags.to_bits();
    match summary.error {
        None => defmt::info!("cycle: complete status=0b{=u8:08b}", status),
        Some(error) if error.severity() == Severity::Warning => defmt::warn!(
            "cycle: complete status=0b{=u8:08b} warning: {}",
            status,
            defmt::Display2Format(&error)
        ),
        Some(error) => defmt::error!(
            "cycle: failed status=0b{=u8:08b} error: {} retry={}",
            status,
            defmt::Display2Format(&error),
            error.is_retryable()
        ),
    }

    match summary.time {
        Some(Ok(time)) => defmt::info!("cycle: network time unix={=u32}", time.unix_seconds),
        Some(Err(error)) => defmt::warn!("cycle: network time {}", defmt::Display2Format(&error)),
        None => {}
    }
    if let Some(rssi) = summary.metadata.and_then(|metadata| metadata.rssi_dbm()) {
        defmt::info!("cycle: rssi={=i16}dBm", rssi);
    }
}
