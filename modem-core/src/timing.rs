//! Per-family timing constants and the monotonic clock abstraction.
//!
//! Every wait the lifecycle performs is expressed as a deadline computed from
//! an instant sampled at a transition plus one of the durations below. The
//! instant type is generic so firmware can use Embassy's clock while host
//! tests use a plain counter.

use core::fmt;
use core::ops::Add;
use core::time::Duration;

/// Monotonic instant wrapper used for deadlines and telemetry timestamps.
pub trait ModemInstant: Copy + Ord + Add<Duration, Output = Self> {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;

    /// Returns `true` once `self` has reached `deadline`.
    fn reached(&self, deadline: Self) -> bool {
        *self >= deadline
    }
}

/// Immutable timing constants for one module family.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimingProfile {
    /// Settle time after power-on before the module may be woken.
    pub status_time: Duration,
    /// Time the module needs after a data-session teardown or power-down
    /// command before any further command is safe.
    pub disconnect_time: Duration,
    /// Time after power-on before the serial port is expected to answer.
    pub warm_up_time: Duration,
    /// Bound on how long the AT handshake (and status-pin wait) may take.
    pub at_response_timeout: Duration,
    /// Time after wake before a signal-quality reading is meaningful.
    pub signal_quality_time: Duration,
    /// Width of the active portion of a wake pulse. Zero for families that
    /// are not woken by a pulse.
    pub wake_pulse: Duration,
}

impl TimingProfile {
    pub const fn new(
        status_time: Duration,
        disconnect_time: Duration,
        warm_up_time: Duration,
        at_response_timeout: Duration,
        signal_quality_time: Duration,
        wake_pulse: Duration,
    ) -> Self {
        Self {
            status_time,
            disconnect_time,
            warm_up_time,
            at_response_timeout,
            signal_quality_time,
            wake_pulse,
        }
    }

    /// Validates the invariants every profile must satisfy.
    ///
    /// `warm_up_time` may exceed `at_response_timeout`; such modules simply
    /// need more than one bring-up attempt.
    pub const fn validate(&self) -> Result<(), ProfileError> {
        if self.at_response_timeout.is_zero() {
            return Err(ProfileError::ZeroAtResponseTimeout);
        }
        Ok(())
    }

    /// Longest time a single bring-up attempt can take before the AT
    /// handshake gives up: settle, pulse, status confirmation, then handshake.
    pub fn attempt_budget(&self) -> Duration {
        self.status_time
            .saturating_add(self.wake_pulse)
            .saturating_add(self.at_response_timeout)
            .saturating_add(self.at_response_timeout)
    }
}

/// Invalid timing profile.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProfileError {
    ZeroAtResponseTimeout,
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileError::ZeroAtResponseTimeout => f.write_str("AT response timeout must be non-zero"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn profile(at_response_ms: u64) -> TimingProfile {
        TimingProfile::new(
            Duration::from_millis(0),
            Duration::from_millis(7_000),
            Duration::from_millis(8_000),
            Duration::from_millis(at_response_ms),
            Duration::from_millis(15_000),
            Duration::from_millis(1_100),
        )
    }

    #[test]
    fn zero_at_response_timeout_is_rejected() {
        assert_eq!(
            profile(0).validate(),
            Err(ProfileError::ZeroAtResponseTimeout)
        );
    }

    #[test]
    fn warm_up_longer_than_at_timeout_is_allowed() {
        assert_eq!(profile(5_000).validate(), Ok(()));
    }

    #[test]
    fn attempt_budget_covers_every_wait() {
        let budget = profile(5_000).attempt_budget();
        assert_eq!(budget, Duration::from_millis(1_100 + 5_000 + 5_000));
    }
}
