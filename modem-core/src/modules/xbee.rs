//! Digi XBee3 cellular.
//!
//! Runs whenever it has power. Sleep is done by removing power, and only
//! when the board also wires the module's sleep-request line.

use core::time::Duration;

use super::Family;
use crate::at::AtDialect;
use crate::capability::{ModuleProfile, SleepMethod, WakeMethod};
use crate::timing::TimingProfile;

pub const TIMING: TimingProfile = TimingProfile::new(
    Duration::from_millis(0),
    Duration::from_millis(5_000),
    Duration::from_millis(1_000),
    Duration::from_millis(5_000),
    Duration::from_millis(5_000),
    Duration::ZERO,
);

pub const PROFILE: ModuleProfile = ModuleProfile {
    name: "xbee",
    timing: TIMING,
    wake: WakeMethod::AlwaysOn,
    sleep: SleepMethod::CutPower,
    prime_wake_line: false,
    has_battery: false,
    has_temperature: false,
};

pub const FAMILY: Family = Family {
    profile: PROFILE,
    dialect: AtDialect::GENERIC,
};
