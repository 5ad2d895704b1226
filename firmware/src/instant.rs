//! Embassy's monotonic clock behind the core's instant trait.

use core::ops::Add;
use core::time::Duration;

use embassy_time::Instant;
use modem_core::timing::ModemInstant;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub const fn from_micros(micros: u64) -> Self {
        Self(Instant::from_micros(micros))
    }

    pub const fn into_embassy(self) -> Instant {
        self.0
    }

    pub fn as_millis(self) -> u64 {
        self.0.as_millis()
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(instant: Instant) -> Self {
        Self(instant)
    }
}

impl Add<Duration> for FirmwareInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + to_embassy(rhs))
    }
}

impl ModemInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_duration_since(earlier.0).as_micros())
    }
}

/// Converts a core duration into Embassy ticks, saturating on overflow.
pub fn to_embassy(duration: Duration) -> embassy_time::Duration {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    embassy_time::Duration::from_micros(micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlines_add_core_durations() {
        let start = FirmwareInstant::from_micros(1_000);
        let deadline = start + Duration::from_millis(5);
        assert_eq!(deadline, FirmwareInstant::from_micros(6_000));
        assert!(deadline.reached(deadline));
        assert!(!start.reached(deadline));
    }

    #[test]
    fn elapsed_time_saturates_at_zero() {
        let earlier = FirmwareInstant::from_micros(2_000);
        let later = FirmwareInstant::from_micros(9_000);
        assert_eq!(
            later.saturating_duration_since(earlier),
            Duration::from_millis(7)
        );
        assert_eq!(earlier.saturating_duration_since(later), Duration::ZERO);
    }
}
