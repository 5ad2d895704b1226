//! Telemetry ring shared by firmware and host targets.
//!
//! The core never logs. Every observable transition is written here instead
//! and the binaries drain the ring into whatever sink they have (`defmt`,
//! stdout, a transcript file). Nothing in the core reads the ring back, so an
//! undrained ring changes no behavior.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::connectivity::ConnectivityState;
use crate::error::{ConfigIssue, ModemError};
use crate::lifecycle::LifecycleState;
use crate::lines::{LineAction, LineId};
use crate::power::PowerState;
use crate::timing::ModemInstant;

/// Monotonic identifier assigned to each record.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    LineAsserted(LineId),
    LineReleased(LineId),
    Power(PowerState),
    Lifecycle(LifecycleState),
    AtProbe { responded: bool },
    AttemptFailed,
    Connectivity(ConnectivityState),
    PowerDownRefused(ConfigIssue),
    NetworkTime,
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::LineAsserted(line) => write!(f, "line-asserted {line}"),
            TelemetryEventKind::LineReleased(line) => write!(f, "line-released {line}"),
            TelemetryEventKind::Power(state) => write!(f, "power {state}"),
            TelemetryEventKind::Lifecycle(state) => write!(f, "lifecycle {state}"),
            TelemetryEventKind::AtProbe { responded: true } => f.write_str("at-probe ok"),
            TelemetryEventKind::AtProbe { responded: false } => f.write_str("at-probe silent"),
            TelemetryEventKind::AttemptFailed => f.write_str("attempt-failed"),
            TelemetryEventKind::Connectivity(state) => write!(f, "connectivity {state}"),
            TelemetryEventKind::PowerDownRefused(issue) => write!(f, "power-down-refused {issue}"),
            TelemetryEventKind::NetworkTime => f.write_str("network-time"),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    None,
    /// Line transition with the gap since the previous line transition.
    Line {
        action: LineAction,
        elapsed_since_previous: Option<Duration>,
    },
    /// Bring-up attempt that ended in `error`.
    Attempt { attempt: u8, error: ModemError },
    /// Time since wake at which an AT probe was issued.
    SinceWake(Duration),
    /// Unix seconds returned by a network time query.
    UnixSeconds(u32),
}

impl fmt::Display for TelemetryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryPayload::None => Ok(()),
            TelemetryPayload::Line {
                elapsed_since_previous: Some(elapsed),
                ..
            } => write!(f, "(+{} ms)", elapsed.as_millis()),
            TelemetryPayload::Line { .. } => Ok(()),
            TelemetryPayload::Attempt { attempt, error } => {
                write!(f, "attempt {attempt}: {error}")
            }
            TelemetryPayload::SinceWake(elapsed) => {
                write!(f, "{} ms after wake", elapsed.as_millis())
            }
            TelemetryPayload::UnixSeconds(seconds) => write!(f, "unix {seconds}"),
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_transition_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: ModemInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_transition_at: None,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Id the next record will receive. Drains use it to resume after the
    /// last record they emitted.
    pub const fn next_id(&self) -> EventId {
        self.next_event_id
    }

    /// Records a line transition and captures elapsed time since the previous transition.
    pub fn record_line_transition(
        &mut self,
        line: LineId,
        action: LineAction,
        timestamp: TInstant,
    ) -> EventId {
        let elapsed = self
            .last_transition_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_transition_at = Some(timestamp);

        let payload = TelemetryPayload::Line {
            action,
            elapsed_since_previous: elapsed,
        };
        self.record(
            match action {
                LineAction::Assert => TelemetryEventKind::LineAsserted(line),
                LineAction::Release => TelemetryEventKind::LineReleased(line),
            },
            payload,
            timestamp,
        )
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }

    pub fn record_event(&mut self, event: TelemetryEventKind, timestamp: TInstant) -> EventId {
        self.record(event, TelemetryPayload::None, timestamp)
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: ModemInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ops::Add;

    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
    struct MicrosInstant(u64);

    impl Add<Duration> for MicrosInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
            Self(self.0.saturating_add(micros))
        }
    }

    impl ModemInstant for MicrosInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_micros(self.0.saturating_sub(earlier.0))
        }
    }

    #[test]
    fn records_elapsed_between_line_events() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();

        let id1 = recorder.record_line_transition(
            LineId::WakeRequest,
            LineAction::Assert,
            MicrosInstant(100),
        );
        assert_eq!(id1, 0);

        let first = recorder.latest().copied().expect("record stored");
        assert_eq!(
            first.event,
            TelemetryEventKind::LineAsserted(LineId::WakeRequest)
        );
        match first.details {
            TelemetryPayload::Line {
                elapsed_since_previous,
                ..
            } => assert_eq!(elapsed_since_previous, None),
            _ => panic!("expected line payload"),
        }

        let id2 = recorder.record_line_transition(
            LineId::WakeRequest,
            LineAction::Release,
            MicrosInstant(1_100_100),
        );
        assert_eq!(id2, 1);

        let second = recorder.latest().copied().expect("record stored");
        match second.details {
            TelemetryPayload::Line {
                elapsed_since_previous,
                ..
            } => {
                let elapsed = elapsed_since_previous.expect("missing elapsed");
                assert_eq!(elapsed.as_millis(), 1_100);
            }
            _ => panic!("expected line payload"),
        }
    }

    #[test]
    fn ring_keeps_most_recent_records() {
        let mut recorder = TelemetryRecorder::<MicrosInstant, 4>::new();
        for tick in 0..6 {
            recorder.record_event(TelemetryEventKind::AtProbe { responded: false }, MicrosInstant(tick));
        }

        assert_eq!(recorder.len(), 4);
        assert_eq!(recorder.next_id(), 6);
        let ids: heapless::Vec<EventId, 4> = recorder.oldest_first().map(|r| r.id).collect();
        assert_eq!(ids.as_slice(), &[2, 3, 4, 5]);
    }
}
