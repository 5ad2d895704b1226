//! Capability probe contract implemented by every module family.
//!
//! The lifecycle never talks to a modem directly. It calls the operations of
//! [`ModuleDriver`] and interprets the tri-state [`Capability`] outcome, so a
//! family that cannot report battery or temperature simply answers
//! [`Capability::Unavailable`] instead of failing.

use core::fmt;
use core::time::Duration;

use heapless::String;

use crate::timing::TimingProfile;

/// Maximum length of a resolved module name.
pub const MODEM_NAME_CAPACITY: usize = 32;

/// Outcome of a capability probe.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Capability<T> {
    /// The module answered with a value.
    Supported(T),
    /// This module family does not offer the capability at all.
    Unavailable,
    /// The capability exists but the probe did not succeed this time.
    Failed(FailureReason),
}

impl<T> Capability<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Capability<U> {
        match self {
            Capability::Supported(value) => Capability::Supported(f(value)),
            Capability::Unavailable => Capability::Unavailable,
            Capability::Failed(reason) => Capability::Failed(reason),
        }
    }

    pub fn supported(self) -> Option<T> {
        match self {
            Capability::Supported(value) => Some(value),
            _ => None,
        }
    }

    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Capability::Unavailable)
    }
}

/// Why a capability probe failed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FailureReason {
    NoResponse,
    Rejected,
    Timeout,
    Malformed,
    NotDetectable,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::NoResponse => "no response",
            FailureReason::Rejected => "rejected",
            FailureReason::Timeout => "timeout",
            FailureReason::Malformed => "malformed response",
            FailureReason::NotDetectable => "not detectable",
        };
        f.write_str(text)
    }
}

const RSSI_FLOOR_DBM: i16 = -113;
const RSSI_CEILING_DBM: i16 = -51;
const CSQ_UNKNOWN: u8 = 99;

/// Received signal strength reading.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SignalQuality {
    pub rssi_dbm: i16,
    pub percent: u8,
}

impl SignalQuality {
    /// Converts a raw `+CSQ` value. Returns `None` for 99 ("not known or not
    /// detectable") and for values outside 0..=31.
    pub fn from_csq(csq: u8) -> Option<Self> {
        if csq == CSQ_UNKNOWN || csq > 31 {
            return None;
        }
        Some(Self::from_rssi(RSSI_FLOOR_DBM + 2 * i16::from(csq)))
    }

    /// Builds a reading from RSSI, scaling -113..-51 dBm linearly onto 0..100 %.
    pub fn from_rssi(rssi_dbm: i16) -> Self {
        let clamped = rssi_dbm.clamp(RSSI_FLOOR_DBM, RSSI_CEILING_DBM);
        let span = i32::from(RSSI_CEILING_DBM - RSSI_FLOOR_DBM);
        let offset = i32::from(clamped - RSSI_FLOOR_DBM);
        let percent = u8::try_from(offset * 100 / span).unwrap_or(100);
        Self { rssi_dbm, percent }
    }
}

/// Battery reading reported by modules with a supply monitor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BatteryState {
    /// 0 = not charging, 1 = charging, 2 = charge finished.
    pub charge_state: u8,
    pub percent: u8,
    pub millivolts: u16,
}

/// Module die temperature in tenths of a degree Celsius.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Temperature {
    pub deci_celsius: i16,
}

/// Network registration as reported by `+CREG`/`+CEREG`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegistrationStatus {
    NotSearching,
    Registered { roaming: bool },
    Searching,
    Denied,
    Unknown,
}

impl RegistrationStatus {
    pub const fn from_stat(stat: u8) -> Option<Self> {
        match stat {
            0 => Some(RegistrationStatus::NotSearching),
            1 => Some(RegistrationStatus::Registered { roaming: false }),
            2 => Some(RegistrationStatus::Searching),
            3 => Some(RegistrationStatus::Denied),
            4 => Some(RegistrationStatus::Unknown),
            5 => Some(RegistrationStatus::Registered { roaming: true }),
            _ => None,
        }
    }

    pub const fn is_registered(self) -> bool {
        matches!(self, RegistrationStatus::Registered { .. })
    }
}

/// Resolved module name, set once during extra setup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModemIdentity {
    name: String<MODEM_NAME_CAPACITY>,
}

impl ModemIdentity {
    /// Creates an identity, truncating names longer than [`MODEM_NAME_CAPACITY`].
    pub fn new(name: &str) -> Self {
        let mut buffer = String::new();
        for ch in name.trim().chars() {
            if buffer.push(ch).is_err() {
                break;
            }
        }
        Self { name: buffer }
    }

    pub fn as_str(&self) -> &str {
        self.name.as_str()
    }
}

impl fmt::Display for ModemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a module family is brought from powered to awake.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WakeMethod {
    /// Pulse the wake-request line for `TimingProfile::wake_pulse`.
    Pulse,
    /// Wait for the status pin to assert.
    StatusPin,
    /// Pulse, then confirm via the status pin when one is wired.
    PulseThenStatus,
    /// Awake as soon as power is applied.
    AlwaysOn,
}

/// How a module family is put back to sleep.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SleepMethod {
    /// Orderly AT power-down; needs a wake-request line to come back.
    AtPowerDown,
    /// Remove main power; applying power wakes the module again.
    CutPower,
    /// The module cannot be put to sleep by this controller.
    None,
}

/// Immutable per-family description consumed by the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModuleProfile {
    pub name: &'static str,
    pub timing: TimingProfile,
    pub wake: WakeMethod,
    pub sleep: SleepMethod,
    /// Drive the wake-request line to idle before energizing power.
    pub prime_wake_line: bool,
    pub has_battery: bool,
    pub has_temperature: bool,
}

/// Operations a module family provides to the lifecycle.
///
/// Implementations perform exactly one hardware or AT action per call and do
/// not retry; retry policy lives in the lifecycle.
pub trait ModuleDriver {
    fn profile(&self) -> &ModuleProfile;

    /// Cheap handshake probe: did the module answer `AT`?
    fn did_at_respond(&mut self) -> bool;

    /// One-time module initialization. Resolves the module identity.
    fn extra_setup(&mut self) -> Result<ModemIdentity, FailureReason>;

    /// Issues the orderly power-down command. Returns `true` when acknowledged.
    fn power_off(&mut self) -> bool;

    fn signal_quality(&mut self) -> Capability<SignalQuality>;

    fn battery_state(&mut self) -> Capability<BatteryState>;

    fn temperature(&mut self) -> Capability<Temperature>;

    fn registration_status(&mut self) -> Capability<RegistrationStatus>;

    fn activate_data_session(&mut self, apn: &str) -> bool;

    fn deactivate_data_session(&mut self) -> bool;

    /// Bearer check used by `is_internet_available`.
    fn data_session_active(&mut self) -> bool;

    /// Queries an RFC 868 time server and returns its 4-byte payload.
    /// Must give up within `timeout`.
    fn query_time_server(&mut self, timeout: Duration) -> Capability<[u8; 4]>;
}
