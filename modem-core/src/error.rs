//! Error taxonomy shared by the controller, lifecycle and connectivity layers.

use core::fmt;
use core::time::Duration;

use crate::capability::FailureReason;

/// Configuration problems detected at the point an operation is requested.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigIssue {
    /// Power-down requested but the module would have no way to wake again.
    NoWakePath,
    /// Power removal requested but no power line is wired.
    NoPowerLine,
    /// The family's profile does not support powering down at all.
    SleepUnsupported,
    /// The timing profile failed validation.
    InvalidTiming,
    /// The access point name does not fit the connect buffer.
    ApnTooLong,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConfigIssue::NoWakePath => "no wake path after power-down",
            ConfigIssue::NoPowerLine => "power line not wired",
            ConfigIssue::SleepUnsupported => "module cannot be put to sleep",
            ConfigIssue::InvalidTiming => "invalid timing profile",
            ConfigIssue::ApnTooLong => "APN too long",
        };
        f.write_str(text)
    }
}

/// Which bounded wait expired.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimeoutKind {
    StatusPin,
    AtHandshake,
    Registration,
    TimeQuery,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TimeoutKind::StatusPin => "status pin",
            TimeoutKind::AtHandshake => "AT handshake",
            TimeoutKind::Registration => "registration",
            TimeoutKind::TimeQuery => "time query",
        };
        f.write_str(text)
    }
}

/// One-off hardware failures that a retry may clear.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransientFailure {
    PowerOffRejected,
    Probe(FailureReason),
}

impl fmt::Display for TransientFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientFailure::PowerOffRejected => f.write_str("power-off not acknowledged"),
            TransientFailure::Probe(reason) => write!(f, "probe failed: {reason}"),
        }
    }
}

/// Scheduler-facing operations, used to report which call was out of order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operation {
    PowerUp,
    Wake,
    Connect,
    Disconnect,
    NetworkTime,
    ReadMetadata,
    Sleep,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Operation::PowerUp => "power-up",
            Operation::Wake => "wake",
            Operation::Connect => "connect",
            Operation::Disconnect => "disconnect",
            Operation::NetworkTime => "network-time",
            Operation::ReadMetadata => "read-metadata",
            Operation::Sleep => "sleep",
        };
        f.write_str(text)
    }
}

/// How loudly the scheduler should treat an outcome.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Severity {
    Warning,
    Error,
}

/// Top-level lifecycle error.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModemError {
    ConfigurationMismatch(ConfigIssue),
    Timeout(TimeoutKind),
    Transient(TransientFailure),
    /// Extra setup failed; the current power cycle is abandoned.
    FatalSetup(FailureReason),
    InvalidState(Operation),
    /// A timing window has not elapsed yet.
    Settling { remaining: Duration },
    /// A data session is still up.
    SessionActive,
    Aborted,
}

impl ModemError {
    pub const fn severity(&self) -> Severity {
        match self {
            ModemError::ConfigurationMismatch(
                ConfigIssue::NoWakePath | ConfigIssue::NoPowerLine | ConfigIssue::SleepUnsupported,
            )
            | ModemError::Transient(TransientFailure::PowerOffRejected)
            | ModemError::Settling { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Whether the scheduler may expect a later attempt to succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            ModemError::Timeout(_)
            | ModemError::Transient(_)
            | ModemError::FatalSetup(_)
            | ModemError::Settling { .. }
            | ModemError::SessionActive
            | ModemError::Aborted => true,
            ModemError::ConfigurationMismatch(_) | ModemError::InvalidState(_) => false,
        }
    }
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModemError::ConfigurationMismatch(issue) => write!(f, "configuration mismatch: {issue}"),
            ModemError::Timeout(kind) => write!(f, "{kind} timed out"),
            ModemError::Transient(failure) => write!(f, "transient failure: {failure}"),
            ModemError::FatalSetup(reason) => write!(f, "extra setup failed: {reason}"),
            ModemError::InvalidState(op) => write!(f, "{op} not allowed in current state"),
            ModemError::Settling { remaining } => {
                write!(f, "settling, {} ms remaining", remaining.as_millis())
            }
            ModemError::SessionActive => f.write_str("data session still active"),
            ModemError::Aborted => f.write_str("aborted"),
        }
    }
}

/// Distinguishable connection failures.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectError {
    /// Registration denied or the module stopped searching.
    NoNetwork,
    RegistrationTimeout,
    SessionActivationFailed,
    Aborted,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectError::NoNetwork => "no network",
            ConnectError::RegistrationTimeout => "registration timed out",
            ConnectError::SessionActivationFailed => "data session activation failed",
            ConnectError::Aborted => "connect aborted",
        };
        f.write_str(text)
    }
}

/// Network time query failures.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NetworkTimeError {
    NotConnected,
    Unavailable,
    Timeout,
    /// The server answered with a timestamp that cannot be current.
    Implausible,
}

impl fmt::Display for NetworkTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NetworkTimeError::NotConnected => "not connected",
            NetworkTimeError::Unavailable => "network time unavailable",
            NetworkTimeError::Timeout => "network time query timed out",
            NetworkTimeError::Implausible => "implausible network time",
        };
        f.write_str(text)
    }
}
