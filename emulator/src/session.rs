use std::cell::RefCell;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::ops::Add;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use modem_core::at::{AtCommandSession, AtPort, PortError, Response};
use modem_core::capability::{Capability, WakeMethod};
use modem_core::console::commands::{CommandError, CommandExecutor, CommandOutcome, HelpReply};
use modem_core::console::grammar::CommandInfo;
use modem_core::error::Severity;
use modem_core::lifecycle::{Modem, ModemConfig};
use modem_core::lines::{LineDriver, LineId, LineLevel, LinePolarity, LineWiring};
use modem_core::metadata::ModemMetadata;
use modem_core::modules::{self, FAMILIES, Family, FamilyDriver};
use modem_core::telemetry::{EventId, TelemetryPayload, TelemetryRecord};
use modem_core::timing::ModemInstant;

/// Virtual-clock step used while waiting.
const POLL_STEP: Duration = Duration::from_millis(10);
/// How long a module takes to answer AT after a completed wake pulse.
const BOOT_AFTER_PULSE: Duration = Duration::from_millis(200);
/// Time after boot until the simulated network grants registration.
const REGISTRATION_DELAY: Duration = Duration::from_millis(3_000);

/// Microsecond instant on the emulator's virtual clock.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct VirtualInstant(u64);

impl VirtualInstant {
    pub fn from_duration(elapsed: Duration) -> Self {
        Self(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX))
    }

    pub fn elapsed(self) -> Duration {
        Duration::from_micros(self.0)
    }
}

impl Add<Duration> for VirtualInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(Self::from_duration(rhs).0))
    }
}

impl ModemInstant for VirtualInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Which family the emulator simulates and where its transcript goes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TranscriptProfile {
    pub family: Family,
}

impl TranscriptProfile {
    pub fn from_tag(tag: &str) -> Result<Self, String> {
        modules::find(tag)
            .map(|family| Self { family })
            .ok_or_else(|| {
                let known: Vec<_> = FAMILIES.iter().map(|family| family.profile.name).collect();
                format!("Unknown module `{tag}` (expected one of {})", known.join(", "))
            })
    }

    pub fn all() -> impl Iterator<Item = Self> {
        FAMILIES.into_iter().map(|family| Self { family })
    }

    pub fn name(self) -> &'static str {
        self.family.profile.name
    }

    pub fn log_path(self) -> String {
        format!("transcripts/emulator-{}.log", self.name())
    }

    pub fn header(self) -> String {
        format!("Modem emulator transcript ({})", self.name())
    }

    /// Board wiring used for this family. Every family gets the active-low
    /// wake-request line, since power-down is refused without one.
    pub fn wiring(self) -> LineWiring {
        LineWiring::from_pins(
            (0, LinePolarity::ActiveHigh),
            (1, LinePolarity::ActiveHigh),
            (-1, LinePolarity::ActiveLow),
            (2, LinePolarity::ActiveLow),
        )
    }
}

/// Electrical and network state of the simulated module.
struct SimulatedModule {
    family: Family,
    wiring: LineWiring,
    now: Duration,
    powered: bool,
    wake_asserted_at: Option<Duration>,
    boot_at: Option<Duration>,
    session_active: bool,
}

impl SimulatedModule {
    fn new(family: Family, wiring: LineWiring) -> Self {
        let powered = !wiring.is_wired(LineId::Power);
        let mut module = Self {
            family,
            wiring,
            now: Duration::ZERO,
            powered: false,
            wake_asserted_at: None,
            boot_at: None,
            session_active: false,
        };
        if powered {
            module.apply_power();
        }
        module
    }

    fn booted(&self) -> bool {
        self.powered && self.boot_at.is_some_and(|at| self.now >= at)
    }

    fn registered(&self) -> bool {
        self.booted()
            && self
                .boot_at
                .is_some_and(|at| self.now >= at + REGISTRATION_DELAY)
    }

    fn apply_power(&mut self) {
        self.powered = true;
        if self.family.profile.wake == WakeMethod::AlwaysOn {
            self.boot_at = Some(self.now + self.family.profile.timing.warm_up_time);
        }
    }

    fn remove_power(&mut self) {
        self.powered = false;
        self.boot_at = None;
        self.wake_asserted_at = None;
        self.session_active = false;
    }

    fn release_wake(&mut self) {
        let Some(asserted_at) = self.wake_asserted_at.take() else {
            return;
        };
        let width = self.now.saturating_sub(asserted_at);
        if self.powered && width >= self.family.profile.timing.wake_pulse {
            let warmed = self.family.profile.timing.warm_up_time;
            self.boot_at = Some((self.now + BOOT_AFTER_PULSE).max(warmed));
        }
    }

    fn respond(&mut self, command: &str, response: &mut Response) -> Result<(), PortError> {
        if !self.booted() {
            return Err(PortError::Timeout);
        }

        let dialect = self.family.dialect;
        let reply = if matches!(command, "AT" | "ATE0" | "AT+CMEE=2") {
            "OK".to_string()
        } else if command == "AT+CGMM" {
            format!("{}\r\n\r\nOK", model_name(self.family))
        } else if command == "AT+CSQ" {
            "+CSQ: 17,99\r\n\r\nOK".to_string()
        } else if command == "AT+CBC" {
            "+CBC: 0,76,3912\r\n\r\nOK".to_string()
        } else if command == dialect.registration_query {
            let stat = if self.registered() { 1 } else { 2 };
            format!("{} 0,{stat}\r\n\r\nOK", dialect.registration_prefix)
        } else if command.starts_with("AT+CGDCONT=1,") {
            "OK".to_string()
        } else if command == "AT+CGACT=1,1" {
            if self.registered() {
                self.session_active = true;
                "OK".to_string()
            } else {
                "+CME ERROR: no network service".to_string()
            }
        } else if command == "AT+CGACT=0,1" {
            self.session_active = false;
            "OK".to_string()
        } else if command == "AT+CGACT?" {
            format!("+CGACT: 1,{}\r\n\r\nOK", u8::from(self.session_active))
        } else if command == dialect.power_off {
            self.boot_at = None;
            self.session_active = false;
            "OK\r\n\r\nNORMAL POWER DOWN".to_string()
        } else {
            "ERROR".to_string()
        };

        response.clear();
        for part in ["\r\n", reply.as_str(), "\r\n"] {
            response.push_str(part).map_err(|_| PortError::Overflow)?;
        }
        Ok(())
    }
}

impl LineDriver for SimulatedModule {
    fn drive(&mut self, line: LineId, level: LineLevel) {
        let Some(config) = self.wiring.get(line) else {
            return;
        };
        let asserted = config.is_asserted(level);
        match line {
            LineId::Power if asserted && !self.powered => self.apply_power(),
            LineId::Power if !asserted && self.powered => self.remove_power(),
            LineId::WakeRequest if asserted => {
                self.wake_asserted_at.get_or_insert(self.now);
            }
            LineId::WakeRequest => self.release_wake(),
            LineId::Power | LineId::Status | LineId::Reset => {}
        }
    }

    fn sample(&mut self, _line: LineId) -> LineLevel {
        if self.booted() {
            LineLevel::High
        } else {
            LineLevel::Low
        }
    }
}

fn model_name(family: Family) -> &'static str {
    match family.profile.name {
        "sim7000" => "SIMCOM_SIM7000G",
        "sara-r4" => "SARA-R410M-02B",
        _ => "XBee3 Cellular LTE-M",
    }
}

/// AT port half of the simulated module.
pub struct SimPort(Rc<RefCell<SimulatedModule>>);

impl AtPort for SimPort {
    fn transact(
        &mut self,
        command: &str,
        _timeout: Duration,
        response: &mut Response,
    ) -> Result<(), PortError> {
        self.0.borrow_mut().respond(command, response)
    }
}

/// GPIO half of the simulated module.
pub struct SimLines(Rc<RefCell<SimulatedModule>>);

impl LineDriver for SimLines {
    fn drive(&mut self, line: LineId, level: LineLevel) {
        self.0.borrow_mut().drive(line, level);
    }

    fn sample(&mut self, line: LineId) -> LineLevel {
        self.0.borrow_mut().sample(line)
    }
}

type EmulatedModem = Modem<FamilyDriver<AtCommandSession<SimPort>>, SimLines, VirtualInstant>;

pub struct Session {
    executor: CommandExecutor<EmulatedModem>,
    module: Rc<RefCell<SimulatedModule>>,
    transcript: TranscriptLogger,
    clock: Duration,
    last_event: Option<EventId>,
}

impl Session {
    pub fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let transcript = TranscriptLogger::create(profile)?;
        Self::with_transcript(profile, transcript)
    }

    /// Session whose transcript is discarded.
    pub fn detached(profile: TranscriptProfile) -> io::Result<Self> {
        Self::with_transcript(profile, TranscriptLogger::sink())
    }

    fn with_transcript(profile: TranscriptProfile, transcript: TranscriptLogger) -> io::Result<Self> {
        let wiring = profile.wiring();
        let module = Rc::new(RefCell::new(SimulatedModule::new(profile.family, wiring)));
        let session = AtCommandSession::new(SimPort(Rc::clone(&module)), profile.family.dialect);
        let driver = FamilyDriver::new(profile.family.profile, session);
        let modem = Modem::new(
            driver,
            wiring,
            SimLines(Rc::clone(&module)),
            ModemConfig::default(),
        )
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error.to_string()))?;

        Ok(Self {
            executor: CommandExecutor::new(modem),
            module,
            transcript,
            clock: Duration::ZERO,
            last_event: None,
        })
    }

    pub fn modem(&self) -> &EmulatedModem {
        self.executor.modem()
    }

    pub fn elapsed(&self) -> Duration {
        self.clock
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.clock;
        self.transcript
            .append_line(elapsed, TranscriptRole::Host, trimmed)?;

        let mut lines = if let Some(argument) = strip_keyword(trimmed, "wait") {
            self.handle_wait(argument)
        } else {
            let now = self.now();
            match self.executor.execute(trimmed, now) {
                Ok(outcome) => describe_outcome(outcome),
                Err(error) => vec![describe_error(&error)],
            }
        };
        self.drain_telemetry(&mut lines);

        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    /// Advances the virtual clock by `duration`, polling the modem.
    pub fn advance(&mut self, duration: Duration) {
        let target = self.clock + duration;
        while self.clock < target {
            self.clock = (self.clock + POLL_STEP).min(target);
            let now = self.now();
            self.executor.modem_mut().poll(now);
        }
    }

    fn handle_wait(&mut self, argument: &str) -> Vec<String> {
        let Ok(millis) = argument.trim().parse::<u64>() else {
            return vec!["ERR syntax wait expects a duration in milliseconds".to_string()];
        };
        self.advance(Duration::from_millis(millis));
        let modem = self.executor.modem();
        vec![format!(
            "OK waited {millis}ms at=+{}ms lifecycle={} power={} net={}",
            self.clock.as_millis(),
            modem.state(),
            modem.power_state(),
            modem.connectivity_state(),
        )]
    }

    fn now(&mut self) -> VirtualInstant {
        self.module.borrow_mut().now = self.clock;
        VirtualInstant::from_duration(self.clock)
    }

    fn drain_telemetry(&mut self, lines: &mut Vec<String>) {
        let last_event = self.last_event;
        for record in self
            .executor
            .modem()
            .telemetry()
            .oldest_first()
            .filter(|record| last_event.is_none_or(|last| record.id > last))
        {
            lines.push(describe_record(record));
            self.last_event = Some(record.id);
        }
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let head = line.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &line[keyword.len()..];
    (rest.is_empty() || rest.starts_with(char::is_whitespace)).then_some(rest)
}

fn describe_outcome(outcome: CommandOutcome) -> Vec<String> {
    let line = match outcome {
        CommandOutcome::SetUp => "OK setup lines idle".to_string(),
        CommandOutcome::PowerApplied => "OK power applied".to_string(),
        CommandOutcome::WakeStarted => "OK wake started".to_string(),
        CommandOutcome::ConnectStarted => "OK connect started".to_string(),
        CommandOutcome::Disconnected => "OK disconnect".to_string(),
        CommandOutcome::Time(time) => format!("OK time unix={}", time.unix_seconds),
        CommandOutcome::Metadata(metadata) => describe_metadata(&metadata),
        CommandOutcome::Asleep => "OK sleep".to_string(),
        CommandOutcome::Status(report) => format!("OK {report}"),
        CommandOutcome::CycleStarted => "OK cycle started".to_string(),
        CommandOutcome::Help(HelpReply::One(entry)) => describe_entry(entry),
        CommandOutcome::Help(HelpReply::All(entries)) => {
            let mut lines = vec!["Available commands:".to_string()];
            lines.extend(entries.iter().map(|entry| format!("  {}", describe_entry(entry))));
            lines.push("  wait <ms> - advance the virtual clock".to_string());
            lines.push("Type `help <command>` for a specific command.".to_string());
            return lines;
        }
    };
    vec![line]
}

fn describe_entry(entry: &CommandInfo) -> String {
    format!("{:<16} - {}", entry.usage, entry.summary)
}

fn describe_error(error: &CommandError<'_>) -> String {
    match error {
        CommandError::Parse(err) => format!("ERR syntax {err}"),
        CommandError::Modem(err) if err.severity() == Severity::Warning => format!("WARN {err}"),
        CommandError::Modem(err) => format!("ERR {err}"),
        CommandError::Time(err) => format!("ERR time {err}"),
        CommandError::UnknownTopic(_) => format!("ERR {error}"),
    }
}

fn describe_metadata(metadata: &ModemMetadata) -> String {
    let signal = match metadata.signal {
        Capability::Supported(signal) => format!("{}dBm ({}%)", signal.rssi_dbm, signal.percent),
        other => describe_missing(&other),
    };
    let battery = match metadata.battery {
        Capability::Supported(battery) => {
            format!("{}% {}mV", battery.percent, battery.millivolts)
        }
        other => describe_missing(&other),
    };
    let temperature = match metadata.temperature {
        Capability::Supported(temperature) => format!(
            "{}.{}C",
            temperature.deci_celsius / 10,
            (temperature.deci_celsius % 10).abs()
        ),
        other => describe_missing(&other),
    };
    format!("OK signal={signal} battery={battery} temperature={temperature}")
}

fn describe_missing<T>(capability: &Capability<T>) -> String {
    match capability {
        Capability::Supported(_) => "ok".to_string(),
        Capability::Unavailable => "unavailable".to_string(),
        Capability::Failed(reason) => format!("failed({reason})"),
    }
}

fn describe_record(record: &TelemetryRecord<VirtualInstant>) -> String {
    let at = record.timestamp.elapsed().as_millis();
    match record.details {
        TelemetryPayload::None => format!("  [+{at:>6} ms] #{} {}", record.id, record.event),
        details => format!(
            "  [+{at:>6} ms] #{} {} {details}",
            record.id, record.event
        ),
    }
}

struct TranscriptLogger {
    writer: Box<dyn Write>,
}

impl TranscriptLogger {
    fn create(profile: TranscriptProfile) -> io::Result<Self> {
        let path_string = profile.log_path();
        let path = Path::new(&path_string);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: Box::new(BufWriter::new(file)),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn sink() -> Self {
        Self {
            writer: Box::new(io::sink()),
        }
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds on the virtual clock"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modem_core::capability::ModemIdentity;
    use modem_core::connectivity::ConnectivityState;
    use modem_core::lifecycle::LifecycleState;
    use modem_core::power::PowerState;

    fn session(tag: &str) -> Session {
        let profile = TranscriptProfile::from_tag(tag).expect("known module");
        Session::detached(profile).expect("session")
    }

    fn run(session: &mut Session, line: &str) -> Vec<String> {
        session.handle_command(line).expect("transcript write")
    }

    #[test]
    fn sim7000_cycle_reaches_ready_after_status_time_and_pulse() {
        let mut session = session("sim7000");
        let reply = run(&mut session, "cycle");
        assert_eq!(reply[0], "OK cycle started");

        run(&mut session, "wait 6200");
        assert_eq!(session.modem().state(), LifecycleState::WaitingForResponse);

        let reply = run(&mut session, "wait 100");
        assert!(reply[0].contains("lifecycle=ready"), "{reply:?}");
        assert_eq!(session.modem().attempt(), 1);
    }

    #[test]
    fn sara_r4_needs_a_second_attempt() {
        let mut session = session("sara-r4");
        run(&mut session, "cycle");
        run(&mut session, "wait 10000");

        assert_eq!(session.modem().state(), LifecycleState::Ready);
        assert_eq!(session.modem().attempt(), 2);
        assert_eq!(
            session.modem().identity().map(ModemIdentity::as_str),
            Some("SARA-R410M-02B")
        );
    }

    #[test]
    fn connect_and_sleep_round_trip() {
        let mut session = session("sim7000");
        run(&mut session, "cycle");
        run(&mut session, "wait 7000");
        run(&mut session, "connect hologram");
        run(&mut session, "wait 4000");
        assert_eq!(
            session.modem().connectivity_state(),
            ConnectivityState::Connected
        );

        let refused = run(&mut session, "sleep");
        assert!(refused[0].starts_with("ERR"), "{refused:?}");

        run(&mut session, "disconnect");
        let settling = run(&mut session, "sleep");
        assert!(settling[0].starts_with("WARN settling"), "{settling:?}");

        run(&mut session, "wait 7000");
        let slept = run(&mut session, "sleep");
        assert_eq!(slept[0], "OK sleep");
        run(&mut session, "wait 100");
        assert_eq!(session.modem().power_state(), PowerState::Off);
    }

    #[test]
    fn time_is_unavailable_over_plain_at() {
        let mut session = session("xbee");
        run(&mut session, "cycle");
        run(&mut session, "wait 1500");
        run(&mut session, "connect hologram");
        run(&mut session, "wait 4000");

        let reply = run(&mut session, "time");
        assert_eq!(reply[0], "ERR time network time unavailable");
    }

    #[test]
    fn unknown_module_is_rejected() {
        assert!(TranscriptProfile::from_tag("quectel").is_err());
    }

    #[test]
    fn wait_requires_a_number() {
        let mut session = session("xbee");
        let reply = run(&mut session, "wait soon");
        assert!(reply[0].starts_with("ERR syntax"));
        assert_eq!(session.elapsed(), Duration::ZERO);
    }
}
