//! Mirrors the modem's telemetry ring to defmt (or stdout on the host).
//!
//! The ring inside `modem-core` only keeps the most recent records, so the
//! logger task drains it after every step. Records that were overwritten
//! before a drain are reported as a gap instead of silently skipped.

use modem_core::telemetry::{EventId, TelemetryRecord, TelemetryRecorder};

use crate::instant::FirmwareInstant;

/// Tracks which records have already been emitted.
#[derive(Debug, Default)]
pub struct TelemetryDrain {
    next_id: EventId,
}

impl TelemetryDrain {
    pub const fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Emits every record newer than the last drain. Returns how many were
    /// emitted.
    pub fn drain(&mut self, recorder: &TelemetryRecorder<FirmwareInstant>) -> usize {
        let mut emitted = 0;
        for record in recorder.oldest_first() {
            if !self.is_pending(record.id) {
                continue;
            }
            let skipped = record.id.wrapping_sub(self.next_id);
            if skipped > 0 {
                log_gap(skipped);
            }
            log_record(record);
            self.next_id = record.id.wrapping_add(1);
            emitted += 1;
        }
        emitted
    }

    fn is_pending(&self, id: EventId) -> bool {
        id.wrapping_sub(self.next_id) < EventId::MAX / 2
    }
}

#[cfg(target_os = "none")]
fn log_record(record: &TelemetryRecord<FirmwareInstant>) {
    defmt::info!(
        "telemetry:{=u32} {} {} t={}ms",
        record.id,
        defmt::Display2Format(&record.event),
        defmt::Display2Format(&record.details),
        record.timestamp.as_millis()
    );
}

#[cfg(not(target_os = "none"))]
fn log_record(record: &TelemetryRecord<FirmwareInstant>) {
    println!(
        "telemetry:{} {} {} t={}ms",
        record.id,
        record.event,
        record.details,
        record.timestamp.as_millis()
    );
}

#[cfg(target_os = "none")]
fn log_gap(skipped: EventId) {
    defmt::warn!("telemetry: {=u32} records overwritten before drain", skipped);
}

#[cfg(not(target_os = "none"))]
fn log_gap(skipped: EventId) {
    println!("telemetry: {skipped} records overwritten before drain");
}

#[cfg(test)]
mod tests {
    use super::*;
    use modem_core::lines::{LineAction, LineId};
    use modem_core::telemetry::{TELEMETRY_RING_CAPACITY, TelemetryEventKind};

    fn at(ms: u64) -> FirmwareInstant {
        FirmwareInstant::from_micros(ms * 1_000)
    }

    #[test]
    fn drain_emits_each_record_once() {
        let mut recorder = TelemetryRecorder::new();
        let mut drain = TelemetryDrain::new();

        recorder.record_line_transition(LineId::Power, LineAction::Assert, at(0));
        recorder.record_event(TelemetryEventKind::AttemptFailed, at(10));
        assert_eq!(drain.drain(&recorder), 2);
        assert_eq!(drain.drain(&recorder), 0);

        recorder.record_line_transition(LineId::Power, LineAction::Release, at(20));
        assert_eq!(drain.drain(&recorder), 1);
    }

    #[test]
    fn overwritten_records_are_skipped() {
        let mut recorder = TelemetryRecorder::new();
        let mut drain = TelemetryDrain::new();

        let total = TELEMETRY_RING_CAPACITY + 5;
        for ms in (0u64..).take(total) {
            recorder.record_event(TelemetryEventKind::AttemptFailed, at(ms));
        }

        assert_eq!(drain.drain(&recorder), TELEMETRY_RING_CAPACITY);
        assert_eq!(drain.next_id, recorder.next_id());
    }
}
