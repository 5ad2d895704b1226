//! AT command session over a line-oriented byte port.
//!
//! [`AtSession`] is the logical boundary the module families use. The
//! transport underneath ([`AtPort`]) only moves bytes; [`AtCommandSession`]
//! turns logical operations into generic 3GPP TS 27.007 commands and parses
//! the replies with the helpers in [`response`].

pub mod response;

use core::fmt::{self, Write as _};
use core::time::Duration;

use heapless::String;

use crate::capability::{
    BatteryState, Capability, FailureReason, ModemIdentity, RegistrationStatus, SignalQuality,
    Temperature,
};

/// Bytes retained from one AT transaction.
pub const RESPONSE_CAPACITY: usize = 256;

/// Longest command line the session builds.
pub const COMMAND_CAPACITY: usize = 96;

pub type Response = String<RESPONSE_CAPACITY>;

/// Transport failures reported by an [`AtPort`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PortError {
    /// No final result code arrived before the deadline.
    Timeout,
    /// The response did not fit in the buffer.
    Overflow,
    /// The underlying UART reported an error.
    Io,
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortError::Timeout => f.write_str("timeout"),
            PortError::Overflow => f.write_str("response overflow"),
            PortError::Io => f.write_str("io error"),
        }
    }
}

/// Byte-stream command channel to the physical module.
pub trait AtPort {
    /// Writes `command` followed by `\r` and collects everything received up
    /// to and including a final result line (see
    /// [`response::is_final_result`]). Gives up after `timeout`.
    fn transact(
        &mut self,
        command: &str,
        timeout: Duration,
        response: &mut Response,
    ) -> Result<(), PortError>;
}

/// Logical AT operations a module family relies on.
pub trait AtSession {
    /// Sends a bare `AT` and reports whether `OK` came back.
    fn test(&mut self) -> bool;

    /// Echo off, verbose errors on.
    fn init(&mut self) -> bool;

    fn model_name(&mut self) -> Option<ModemIdentity>;

    fn power_off(&mut self) -> bool;

    fn signal_quality(&mut self) -> Capability<SignalQuality>;

    fn battery(&mut self) -> Capability<BatteryState>;

    fn temperature(&mut self) -> Capability<Temperature>;

    fn registration(&mut self) -> Capability<RegistrationStatus>;

    fn activate_data_session(&mut self, apn: &str) -> bool;

    fn deactivate_data_session(&mut self) -> bool;

    fn data_session_active(&mut self) -> bool;

    fn query_time_server(&mut self, timeout: Duration) -> Capability<[u8; 4]>;
}

/// Per-family command strings and timeouts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AtDialect {
    pub power_off: &'static str,
    /// `AT+CREG?` or `AT+CEREG?`.
    pub registration_query: &'static str,
    /// `+CREG:` or `+CEREG:`.
    pub registration_prefix: &'static str,
    pub command_timeout: Duration,
    /// Context activation can take far longer than an ordinary command.
    pub activation_timeout: Duration,
}

impl AtDialect {
    pub const GENERIC: Self = Self {
        power_off: "AT+CFUN=0",
        registration_query: "AT+CREG?",
        registration_prefix: "+CREG:",
        command_timeout: Duration::from_secs(1),
        activation_timeout: Duration::from_secs(30),
    };
}

/// [`AtSession`] over any [`AtPort`].
pub struct AtCommandSession<P> {
    port: P,
    dialect: AtDialect,
    response: Response,
}

impl<P> AtCommandSession<P>
where
    P: AtPort,
{
    pub const fn new(port: P, dialect: AtDialect) -> Self {
        Self {
            port,
            dialect,
            response: String::new(),
        }
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }

    /// Runs one transaction and returns the raw response on transport success.
    fn exchange(&mut self, command: &str, timeout: Duration) -> Result<&str, FailureReason> {
        self.response.clear();
        self.port
            .transact(command, timeout, &mut self.response)
            .map_err(|error| match error {
                PortError::Timeout => FailureReason::Timeout,
                PortError::Overflow => FailureReason::Malformed,
                PortError::Io => FailureReason::NoResponse,
            })?;
        Ok(self.response.as_str())
    }

    fn command_ok(&mut self, command: &str, timeout: Duration) -> bool {
        self.exchange(command, timeout)
            .is_ok_and(response::is_ok)
    }

    fn query<O>(
        &mut self,
        command: &str,
        prefix: &str,
        parser: impl FnMut(&mut &str) -> winnow::ModalResult<O>,
    ) -> Capability<O> {
        let timeout = self.dialect.command_timeout;
        match self.exchange(command, timeout) {
            Ok(text) if response::is_ok(text) => response::parse_info(text, prefix, parser)
                .map_or(Capability::Failed(FailureReason::Malformed), Capability::Supported),
            Ok(_) => Capability::Failed(FailureReason::Rejected),
            Err(reason) => Capability::Failed(reason),
        }
    }
}

impl<P> AtSession for AtCommandSession<P>
where
    P: AtPort,
{
    fn test(&mut self) -> bool {
        let timeout = self.dialect.command_timeout;
        self.command_ok("AT", timeout)
    }

    fn init(&mut self) -> bool {
        let timeout = self.dialect.command_timeout;
        self.command_ok("ATE0", timeout) && self.command_ok("AT+CMEE=2", timeout)
    }

    fn model_name(&mut self) -> Option<ModemIdentity> {
        let timeout = self.dialect.command_timeout;
        let text = self.exchange("AT+CGMM", timeout).ok()?;
        if !response::is_ok(text) {
            return None;
        }
        response::first_text_line(text, "AT+CGMM").map(ModemIdentity::new)
    }

    fn power_off(&mut self) -> bool {
        let (command, timeout) = (self.dialect.power_off, self.dialect.command_timeout);
        self.exchange(command, timeout).is_ok_and(|text| {
            response::is_ok(text) || text.lines().any(|line| line.trim() == "NORMAL POWER DOWN")
        })
    }

    fn signal_quality(&mut self) -> Capability<SignalQuality> {
        match self.query("AT+CSQ", "+CSQ:", response::csq) {
            Capability::Supported((rssi, _)) => SignalQuality::from_csq(rssi)
                .map_or(Capability::Failed(FailureReason::NotDetectable), Capability::Supported),
            Capability::Unavailable => Capability::Unavailable,
            Capability::Failed(reason) => Capability::Failed(reason),
        }
    }

    fn battery(&mut self) -> Capability<BatteryState> {
        self.query("AT+CBC", "+CBC:", response::battery)
    }

    fn temperature(&mut self) -> Capability<Temperature> {
        Capability::Unavailable
    }

    fn registration(&mut self) -> Capability<RegistrationStatus> {
        let (command, prefix) = (
            self.dialect.registration_query,
            self.dialect.registration_prefix,
        );
        match self.query(command, prefix, response::registration) {
            Capability::Supported(Some(status)) => Capability::Supported(status),
            Capability::Supported(None) => Capability::Failed(FailureReason::Malformed),
            Capability::Unavailable => Capability::Unavailable,
            Capability::Failed(reason) => Capability::Failed(reason),
        }
    }

    fn activate_data_session(&mut self, apn: &str) -> bool {
        let mut command: String<COMMAND_CAPACITY> = String::new();
        if write!(command, "AT+CGDCONT=1,\"IP\",\"{apn}\"").is_err() {
            return false;
        }
        let (timeout, activation) = (
            self.dialect.command_timeout,
            self.dialect.activation_timeout,
        );
        self.command_ok(command.as_str(), timeout) && self.command_ok("AT+CGACT=1,1", activation)
    }

    fn deactivate_data_session(&mut self) -> bool {
        let timeout = self.dialect.activation_timeout;
        self.command_ok("AT+CGACT=0,1", timeout)
    }

    fn data_session_active(&mut self) -> bool {
        let timeout = self.dialect.command_timeout;
        match self.exchange("AT+CGACT?", timeout) {
            Ok(text) if response::is_ok(text) => response::info_lines(text, "+CGACT:")
                .filter_map(|mut line| response::context_state(&mut line).ok())
                .any(|(_, active)| active),
            _ => false,
        }
    }

    fn query_time_server(&mut self, _: Duration) -> Capability<[u8; 4]> {
        Capability::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Port that replays canned responses in order and checks each command.
    struct ScriptedPort {
        script: &'static [(&'static str, Result<&'static str, PortError>)],
        cursor: usize,
    }

    impl ScriptedPort {
        const fn new(script: &'static [(&'static str, Result<&'static str, PortError>)]) -> Self {
            Self { script, cursor: 0 }
        }
    }

    impl AtPort for ScriptedPort {
        fn transact(
            &mut self,
            command: &str,
            _: Duration,
            response: &mut Response,
        ) -> Result<(), PortError> {
            let (expected, reply) = self.script[self.cursor];
            self.cursor += 1;
            assert_eq!(command, expected);
            let text = reply?;
            response.push_str(text).map_err(|_| PortError::Overflow)
        }
    }

    #[test]
    fn reads_signal_quality() {
        let mut session = AtCommandSession::new(
            ScriptedPort::new(&[("AT+CSQ", Ok("+CSQ: 20,99\r\n\r\nOK\r\n"))]),
            AtDialect::GENERIC,
        );
        assert_eq!(
            session.signal_quality(),
            Capability::Supported(SignalQuality::from_rssi(-73))
        );
    }

    #[test]
    fn unknown_signal_is_not_detectable() {
        let mut session = AtCommandSession::new(
            ScriptedPort::new(&[("AT+CSQ", Ok("+CSQ: 99,99\r\nOK\r\n"))]),
            AtDialect::GENERIC,
        );
        assert_eq!(
            session.signal_quality(),
            Capability::Failed(FailureReason::NotDetectable)
        );
    }

    #[test]
    fn activation_sets_apn_then_activates_context() {
        let mut session = AtCommandSession::new(
            ScriptedPort::new(&[
                ("AT+CGDCONT=1,\"IP\",\"hologram\"", Ok("OK\r\n")),
                ("AT+CGACT=1,1", Ok("OK\r\n")),
                ("AT+CGACT?", Ok("+CGACT: 1,1\r\nOK\r\n")),
            ]),
            AtDialect::GENERIC,
        );
        assert!(session.activate_data_session("hologram"));
        assert!(session.data_session_active());
    }

    #[test]
    fn rejected_activation_reports_false() {
        let mut session = AtCommandSession::new(
            ScriptedPort::new(&[
                ("AT+CGDCONT=1,\"IP\",\"test\"", Ok("OK\r\n")),
                ("AT+CGACT=1,1", Ok("+CME ERROR: 30\r\n")),
            ]),
            AtDialect::GENERIC,
        );
        assert!(!session.activate_data_session("test"));
    }

    #[test]
    fn port_timeout_surfaces_as_failed_probe() {
        let mut session = AtCommandSession::new(
            ScriptedPort::new(&[("AT+CREG?", Err(PortError::Timeout))]),
            AtDialect::GENERIC,
        );
        assert_eq!(
            session.registration(),
            Capability::Failed(FailureReason::Timeout)
        );
    }

    #[test]
    fn model_name_resolves_identity() {
        let mut session = AtCommandSession::new(
            ScriptedPort::new(&[("AT+CGMM", Ok("SIMCOM_SIM7000A\r\n\r\nOK\r\n"))]),
            AtDialect::GENERIC,
        );
        assert_eq!(
            session.model_name().map(|id| id.as_str().len()),
            Some("SIMCOM_SIM7000A".len())
        );
    }

    #[test]
    fn time_server_is_unavailable_without_sockets() {
        let mut session =
            AtCommandSession::new(ScriptedPort::new(&[]), AtDialect::GENERIC);
        assert_eq!(
            session.query_time_server(Duration::from_secs(1)),
            Capability::Unavailable
        );
    }
}
