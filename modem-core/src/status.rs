//! Per-cycle status flags read by the scheduler.

/// Accumulated outcome of one logger cycle.
///
/// Flags only ever go from `false` to `true` during a cycle; [`reset`] clears
/// them at the start of the next one.
///
/// [`reset`]: LifecycleStatusFlags::reset
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LifecycleStatusFlags {
    pub setup_succeeded: bool,
    pub setup_failed: bool,
    pub power_attempted: bool,
    pub power_succeeded: bool,
    pub wake_attempted: bool,
    pub wake_succeeded: bool,
    pub connect_attempted: bool,
    pub connect_succeeded: bool,
    pub connect_failed: bool,
    pub measurement_completed: bool,
    pub failure: bool,
}

impl LifecycleStatusFlags {
    pub const fn new() -> Self {
        Self {
            setup_succeeded: false,
            setup_failed: false,
            power_attempted: false,
            power_succeeded: false,
            wake_attempted: false,
            wake_succeeded: false,
            connect_attempted: false,
            connect_succeeded: false,
            connect_failed: false,
            measurement_completed: false,
            failure: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// ORs `other` into `self`.
    pub fn merge(&mut self, other: Self) {
        self.setup_succeeded |= other.setup_succeeded;
        self.setup_failed |= other.setup_failed;
        self.power_attempted |= other.power_attempted;
        self.power_succeeded |= other.power_succeeded;
        self.wake_attempted |= other.wake_attempted;
        self.wake_succeeded |= other.wake_succeeded;
        self.connect_attempted |= other.connect_attempted;
        self.connect_succeeded |= other.connect_succeeded;
        self.connect_failed |= other.connect_failed;
        self.measurement_completed |= other.measurement_completed;
        self.failure |= other.failure;
    }

    /// Packs the flags into the logger's one-byte status word.
    ///
    /// bit0 setup ok, bit1 power attempted, bit2 power ok, bit3 wake
    /// attempted, bit4 wake ok, bit5 connect attempted, bit6 connect ok,
    /// bit7 any failure (setup, connect or lifecycle).
    #[must_use]
    pub const fn to_bits(&self) -> u8 {
        let mut bits = 0u8;
        if self.setup_succeeded {
            bits |= 1 << 0;
        }
        if self.power_attempted {
            bits |= 1 << 1;
        }
        if self.power_succeeded {
            bits |= 1 << 2;
        }
        if self.wake_attempted {
            bits |= 1 << 3;
        }
        if self.wake_succeeded {
            bits |= 1 << 4;
        }
        if self.connect_attempted {
            bits |= 1 << 5;
        }
        if self.connect_succeeded {
            bits |= 1 << 6;
        }
        if self.failure || self.setup_failed || self.connect_failed {
            bits |= 1 << 7;
        }
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates_without_clearing() {
        let mut flags = LifecycleStatusFlags::new();
        flags.power_attempted = true;
        flags.power_succeeded = true;

        let mut later = LifecycleStatusFlags::new();
        later.wake_attempted = true;
        flags.merge(later);

        assert!(flags.power_succeeded);
        assert!(flags.wake_attempted);
        assert_eq!(flags.to_bits(), 0b0000_1110);
    }

    #[test]
    fn reset_clears_every_flag() {
        let mut flags = LifecycleStatusFlags::new();
        flags.setup_failed = true;
        flags.measurement_completed = true;
        assert_eq!(flags.to_bits(), 0b1000_0000);

        flags.reset();
        assert_eq!(flags, LifecycleStatusFlags::default());
        assert_eq!(flags.to_bits(), 0);
    }
}
