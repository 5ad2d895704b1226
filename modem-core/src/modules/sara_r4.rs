//! u-blox SARA R410M / R412M.
//!
//! PWR_ON is pulsed low, then the V_INT status line confirms boot. The R4
//! boots slowly, so warm-up exceeds the AT response window and bring-up
//! normally needs a second attempt.

use core::time::Duration;

use super::Family;
use crate::at::AtDialect;
use crate::capability::{ModuleProfile, SleepMethod, WakeMethod};
use crate::timing::TimingProfile;

pub const TIMING: TimingProfile = TimingProfile::new(
    Duration::from_millis(0),
    Duration::from_millis(15_000),
    Duration::from_millis(4_500),
    Duration::from_millis(4_000),
    Duration::from_millis(10_000),
    Duration::from_millis(200),
);

pub const PROFILE: ModuleProfile = ModuleProfile {
    name: "sara-r4",
    timing: TIMING,
    wake: WakeMethod::PulseThenStatus,
    sleep: SleepMethod::AtPowerDown,
    prime_wake_line: true,
    has_battery: false,
    has_temperature: false,
};

pub const DIALECT: AtDialect = AtDialect {
    power_off: "AT+CPWROFF",
    registration_query: "AT+CEREG?",
    registration_prefix: "+CEREG:",
    command_timeout: Duration::from_secs(2),
    activation_timeout: Duration::from_secs(150),
};

pub const FAMILY: Family = Family {
    profile: PROFILE,
    dialect: DIALECT,
};
