#![allow(dead_code)]

use std::cell::Cell;
use std::ops::Add;
use std::rc::Rc;
use std::time::Duration;

use modem_core::capability::{
    BatteryState, Capability, FailureReason, ModemIdentity, ModuleDriver, ModuleProfile,
    RegistrationStatus, SignalQuality, SleepMethod, Temperature, WakeMethod,
};
use modem_core::lifecycle::{LifecycleState, Modem, ModemConfig};
use modem_core::lines::{LineDriver, LineId, LineLevel, LinePolarity, LineWiring};
use modem_core::timing::{ModemInstant, TimingProfile};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct MockInstant(u64);

impl MockInstant {
    pub const fn ms(value: u64) -> Self {
        Self(value * 1_000)
    }

    pub const fn as_ms(self) -> u64 {
        self.0 / 1_000
    }
}

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl ModemInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Millisecond clock shared between the test, the module and the lines.
#[derive(Clone, Default)]
pub struct Clock(Rc<Cell<u64>>);

impl Clock {
    pub fn set(&self, ms: u64) -> MockInstant {
        self.0.set(ms);
        MockInstant::ms(ms)
    }

    pub fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

/// Module whose answers depend on the shared clock.
pub struct ScriptedModule {
    pub profile: ModuleProfile,
    pub clock: Clock,
    /// First instant, in ms, at which `AT` is answered.
    pub responds_from: Option<u64>,
    /// First instant, in ms, at which the module reports registration.
    pub registered_from: Option<u64>,
    pub registration: Option<RegistrationStatus>,
    pub activation_succeeds: bool,
    pub accepts_power_off: bool,
    pub accepts_deactivate: bool,
    /// Reason every extra setup fails with, if any.
    pub setup_fails: Option<FailureReason>,
    pub time_payload: Capability<[u8; 4]>,
    pub at_probes: usize,
    pub setup_calls: usize,
    pub time_queries: usize,
    pub power_off_calls: usize,
    pub session_active: bool,
}

impl ScriptedModule {
    pub fn new(profile: ModuleProfile, clock: Clock) -> Self {
        Self {
            profile,
            clock,
            responds_from: Some(0),
            registered_from: Some(0),
            registration: None,
            activation_succeeds: true,
            accepts_power_off: true,
            accepts_deactivate: true,
            setup_fails: None,
            time_payload: Capability::Unavailable,
            at_probes: 0,
            setup_calls: 0,
            time_queries: 0,
            power_off_calls: 0,
            session_active: false,
        }
    }
}

impl ModuleDriver for ScriptedModule {
    fn profile(&self) -> &ModuleProfile {
        &self.profile
    }

    fn did_at_respond(&mut self) -> bool {
        self.at_probes += 1;
        self.responds_from
            .is_some_and(|from| self.clock.now_ms() >= from)
    }

    fn extra_setup(&mut self) -> Result<ModemIdentity, FailureReason> {
        self.setup_calls += 1;
        match self.setup_fails {
            Some(reason) => Err(reason),
            None => Ok(ModemIdentity::new("scripted")),
        }
    }

    fn power_off(&mut self) -> bool {
        self.power_off_calls += 1;
        self.accepts_power_off
    }

    fn signal_quality(&mut self) -> Capability<SignalQuality> {
        SignalQuality::from_csq(18).map_or(
            Capability::Failed(FailureReason::Malformed),
            Capability::Supported,
        )
    }

    fn battery_state(&mut self) -> Capability<BatteryState> {
        Capability::Supported(BatteryState {
            charge_state: 0,
            percent: 80,
            millivolts: 3_900,
        })
    }

    fn temperature(&mut self) -> Capability<Temperature> {
        Capability::Unavailable
    }

    fn registration_status(&mut self) -> Capability<RegistrationStatus> {
        if let Some(status) = self.registration {
            return Capability::Supported(status);
        }
        match self.registered_from {
            Some(from) if self.clock.now_ms() >= from => {
                Capability::Supported(RegistrationStatus::Registered { roaming: false })
            }
            _ => Capability::Supported(RegistrationStatus::Searching),
        }
    }

    fn activate_data_session(&mut self, _apn: &str) -> bool {
        self.session_active = self.activation_succeeds;
        self.activation_succeeds
    }

    fn deactivate_data_session(&mut self) -> bool {
        if self.accepts_deactivate {
            self.session_active = false;
        }
        self.accepts_deactivate
    }

    fn data_session_active(&mut self) -> bool {
        self.session_active
    }

    fn query_time_server(&mut self, _timeout: Duration) -> Capability<[u8; 4]> {
        self.time_queries += 1;
        self.time_payload
    }
}

/// Line driver that logs every transition against the shared clock.
pub struct RecordingLines {
    pub clock: Clock,
    pub log: Vec<(u64, LineId, LineLevel)>,
    pub status: LineLevel,
}

impl RecordingLines {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            log: Vec::new(),
            status: LineLevel::Low,
        }
    }

    pub fn transitions(&self, line: LineId) -> Vec<(u64, LineLevel)> {
        self.log
            .iter()
            .filter(|(_, id, _)| *id == line)
            .map(|(at, _, level)| (*at, *level))
            .collect()
    }
}

impl LineDriver for RecordingLines {
    fn drive(&mut self, line: LineId, level: LineLevel) {
        self.log.push((self.clock.now_ms(), line, level));
    }

    fn sample(&mut self, _line: LineId) -> LineLevel {
        self.status
    }
}

pub type TestModem = Modem<ScriptedModule, RecordingLines, MockInstant>;

pub const fn profile(timing: TimingProfile, wake: WakeMethod, sleep: SleepMethod) -> ModuleProfile {
    ModuleProfile {
        name: "scripted",
        timing,
        wake,
        sleep,
        prime_wake_line: true,
        has_battery: true,
        has_temperature: false,
    }
}

pub const fn timing_ms(
    status: u64,
    disconnect: u64,
    warm_up: u64,
    at_response: u64,
    signal_quality: u64,
    wake_pulse: u64,
) -> TimingProfile {
    TimingProfile::new(
        Duration::from_millis(status),
        Duration::from_millis(disconnect),
        Duration::from_millis(warm_up),
        Duration::from_millis(at_response),
        Duration::from_millis(signal_quality),
        Duration::from_millis(wake_pulse),
    )
}

/// Negative pins leave a line unwired. The wake line is active low.
pub fn wiring(power: i8, status: i8, wake: i8) -> LineWiring {
    LineWiring::from_pins(
        (power, LinePolarity::ActiveHigh),
        (status, LinePolarity::ActiveHigh),
        (-1, LinePolarity::ActiveLow),
        (wake, LinePolarity::ActiveLow),
    )
}

pub fn build(module: ScriptedModule, wiring: LineWiring) -> TestModem {
    build_with(module, wiring, ModemConfig::default())
}

pub fn build_with(module: ScriptedModule, wiring: LineWiring, config: ModemConfig) -> TestModem {
    let lines = RecordingLines::new(module.clock.clone());
    Modem::new(module, wiring, lines, config).expect("valid timing profile")
}

/// Polls every `step_ms` until `until_ms`, returning the final state.
pub fn run_until(
    modem: &mut TestModem,
    clock: &Clock,
    until_ms: u64,
    step_ms: u64,
) -> LifecycleState {
    let mut state = modem.state();
    let mut at = clock.now_ms();
    while at < until_ms {
        at = (at + step_ms).min(until_ms);
        state = modem.poll(clock.set(at));
    }
    state
}

/// Polls until the lifecycle reaches `target`, returning the time it did.
pub fn run_to_state(
    modem: &mut TestModem,
    clock: &Clock,
    target: LifecycleState,
    limit_ms: u64,
    step_ms: u64,
) -> Option<u64> {
    if modem.state() == target {
        return Some(clock.now_ms());
    }
    let mut at = clock.now_ms();
    while at < limit_ms {
        at += step_ms;
        if modem.poll(clock.set(at)) == target {
            return Some(at);
        }
    }
    None
}

/// Powers up and wakes at `start_ms`, then polls to `Ready`.
pub fn bring_up(modem: &mut TestModem, clock: &Clock, start_ms: u64) -> u64 {
    let now = clock.set(start_ms);
    modem.begin_cycle();
    modem.set_up(now);
    modem.power_up(now).expect("power up");
    modem.wake(now).expect("wake");
    run_to_state(modem, clock, LifecycleState::Ready, start_ms + 60_000, 10)
        .expect("modem should become ready")
}
