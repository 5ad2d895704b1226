//! SIMCom SIM7000 (LTE-M / NB-IoT).
//!
//! Woken by a low pulse of at least one second on PWRKEY. PWRKEY must be high
//! when power is applied, so the wake line is primed before power. The status
//! pin goes high once the module has booted.

use core::time::Duration;

use super::Family;
use crate::at::AtDialect;
use crate::capability::{ModuleProfile, SleepMethod, WakeMethod};
use crate::timing::TimingProfile;

pub const STATUS_TIME: Duration = Duration::from_millis(5_000);
pub const DISCONNECT_TIME: Duration = Duration::from_millis(7_000);
pub const WARM_UP_TIME: Duration = Duration::from_millis(1_000);
pub const AT_RESPONSE_TIME: Duration = Duration::from_millis(10_000);
pub const SIGNAL_QUALITY_TIME: Duration = Duration::from_millis(15_000);
/// PWRKEY low time; the datasheet asks for more than one second.
pub const WAKE_PULSE: Duration = Duration::from_millis(1_100);

pub const TIMING: TimingProfile = TimingProfile::new(
    STATUS_TIME,
    DISCONNECT_TIME,
    WARM_UP_TIME,
    AT_RESPONSE_TIME,
    SIGNAL_QUALITY_TIME,
    WAKE_PULSE,
);

pub const PROFILE: ModuleProfile = ModuleProfile {
    name: "sim7000",
    timing: TIMING,
    wake: WakeMethod::Pulse,
    sleep: SleepMethod::AtPowerDown,
    prime_wake_line: true,
    has_battery: true,
    has_temperature: false,
};

pub const DIALECT: AtDialect = AtDialect {
    power_off: "AT+CPOWD=1",
    registration_query: "AT+CEREG?",
    registration_prefix: "+CEREG:",
    ..AtDialect::GENERIC
};

pub const FAMILY: Family = Family {
    profile: PROFILE,
    dialect: DIALECT,
};
