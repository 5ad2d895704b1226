//! One logger cycle: bring the modem up, connect, fetch time and metadata,
//! then tear the session down and put the modem back to sleep.
//!
//! [`LoggerCycle::step`] never blocks. It returns how long the caller may
//! sleep before the next step, so the runtime can park on an Embassy timer
//! while host tests just advance a counter.

use core::time::Duration;

use modem_core::connectivity::{ConnectivityState, NetworkTime};
use modem_core::console::commands::ModemControl;
use modem_core::error::{ModemError, NetworkTimeError};
use modem_core::lifecycle::LifecycleState;
use modem_core::metadata::ModemMetadata;
use modem_core::status::LifecycleStatusFlags;

/// Upper bound on phase changes taken by a single `step` call.
const MAX_TRANSITIONS_PER_STEP: usize = 8;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
    Start,
    PoweringUp,
    BringingUp,
    Connecting,
    Measuring,
    Disconnecting,
    PoweringDown,
    ShuttingDown,
    Done,
}

enum Transition {
    Goto(Phase),
    Wait(Duration),
}

/// What the scheduler learns once a cycle ends.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CycleSummary {
    pub flags: LifecycleStatusFlags,
    pub time: Option<Result<NetworkTime, NetworkTimeError>>,
    pub metadata: Option<ModemMetadata>,
    /// First error the cycle ran into, if any.
    pub error: Option<ModemError>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleStep {
    Wait(Duration),
    Done(CycleSummary),
}

pub struct LoggerCycle<'a> {
    apn: &'a str,
    poll_interval: Duration,
    phase: Phase,
    summary: CycleSummary,
}

impl<'a> LoggerCycle<'a> {
    pub const fn new(apn: &'a str, poll_interval: Duration) -> Self {
        Self {
            apn,
            poll_interval,
            phase: Phase::Start,
            summary: CycleSummary {
                flags: LifecycleStatusFlags::new(),
                time: None,
                metadata: None,
                error: None,
            },
        }
    }

    pub const fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }

    /// Advances the cycle as far as it can go at `now`.
    pub fn step<M>(&mut self, modem: &mut M, now: M::Instant) -> CycleStep
    where
        M: ModemControl,
    {
        for _ in 0..MAX_TRANSITIONS_PER_STEP {
            let transition = match self.phase {
                Phase::Start => {
                    modem.begin_cycle();
                    modem.set_up(now);
                    Transition::Goto(Phase::PoweringUp)
                }
                Phase::PoweringUp => self.power_up(modem, now),
                Phase::BringingUp => self.bring_up(modem, now),
                Phase::Connecting => self.await_connection(modem, now),
                Phase::Measuring => self.measure(modem, now),
                Phase::Disconnecting => {
                    if let Err(error) = modem.disconnect_internet(now) {
                        self.note(error);
                    }
                    Transition::Goto(Phase::PoweringDown)
                }
                Phase::PoweringDown => self.power_down(modem, now),
                Phase::ShuttingDown => match modem.status(now).lifecycle {
                    LifecycleState::Sleeping => Transition::Wait(self.poll_interval),
                    _ => Transition::Goto(Phase::Done),
                },
                Phase::Done => {
                    self.summary.flags = modem.status(now).flags;
                    return CycleStep::Done(self.summary);
                }
            };

            match transition {
                Transition::Goto(phase) => self.phase = phase,
                Transition::Wait(delay) => return CycleStep::Wait(delay),
            }
        }
        CycleStep::Wait(self.poll_interval)
    }

    fn power_up<M>(&mut self, modem: &mut M, now: M::Instant) -> Transition
    where
        M: ModemControl,
    {
        match modem.power_up(now) {
            Ok(()) => {}
            // Still inside the previous cycle's power-down window.
            Err(ModemError::Settling { remaining }) => return Transition::Wait(remaining),
            Err(error) => {
                self.note(error);
                return Transition::Goto(Phase::PoweringDown);
            }
        }
        match modem.wake(now) {
            Ok(()) => Transition::Goto(Phase::BringingUp),
            Err(error) => {
                self.note(error);
                Transition::Goto(Phase::PoweringDown)
            }
        }
    }

    fn bring_up<M>(&mut self, modem: &mut M, now: M::Instant) -> Transition
    where
        M: ModemControl,
    {
        match modem.status(now).lifecycle {
            LifecycleState::Ready => match modem.connect_internet(self.apn, now) {
                Ok(()) => Transition::Goto(Phase::Connecting),
                Err(error) => {
                    self.note(error);
                    Transition::Goto(Phase::Measuring)
                }
            },
            LifecycleState::Failed(error) => {
                self.note(error);
                Transition::Goto(Phase::PoweringDown)
            }
            LifecycleState::Off | LifecycleState::Sleeping => Transition::Goto(Phase::PoweringDown),
            LifecycleState::PoweringUp
            | LifecycleState::WaitingForResponse
            | LifecycleState::SettingUp => Transition::Wait(self.poll_interval),
        }
    }

    fn await_connection<M>(&mut self, modem: &mut M, now: M::Instant) -> Transition
    where
        M: ModemControl,
    {
        match modem.status(now).connectivity {
            ConnectivityState::Connecting => Transition::Wait(self.poll_interval),
            ConnectivityState::Connected => {
                self.summary.time = Some(modem.network_time(now));
                Transition::Goto(Phase::Measuring)
            }
            // The failure itself is already in the status flags.
            ConnectivityState::Disconnected | ConnectivityState::Disconnecting => {
                Transition::Goto(Phase::Measuring)
            }
        }
    }

    fn measure<M>(&mut self, modem: &mut M, now: M::Instant) -> Transition
    where
        M: ModemControl,
    {
        match modem.read_metadata(now) {
            Ok(metadata) => {
                self.summary.metadata = Some(metadata);
                Transition::Goto(Phase::Disconnecting)
            }
            Err(ModemError::Settling { remaining }) => Transition::Wait(remaining),
            Err(error) => {
                self.note(error);
                Transition::Goto(Phase::Disconnecting)
            }
        }
    }

    fn power_down<M>(&mut self, modem: &mut M, now: M::Instant) -> Transition
    where
        M: ModemControl,
    {
        match modem.sleep(now) {
            Ok(()) => Transition::Goto(Phase::ShuttingDown),
            Err(ModemError::Settling { remaining }) => Transition::Wait(remaining),
            Err(error) => {
                self.note(error);
                Transition::Goto(Phase::Done)
            }
        }
    }

    fn note(&mut self, error: ModemError) {
        if self.summary.error.is_none() {
            self.summary.error = Some(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instant::FirmwareInstant;
    use modem_core::capability::{
        BatteryState, Capability, FailureReason, ModemIdentity, ModuleDriver, ModuleProfile,
        RegistrationStatus, SignalQuality, Temperature, WakeMethod,
    };
    use modem_core::error::{ConfigIssue, Severity, TimeoutKind};
    use modem_core::lifecycle::{Modem, ModemConfig};
    use modem_core::lines::{LinePolarity, LineWiring, NoopLineDriver};
    use modem_core::modules::{sim7000, xbee};

    const APN: &str = "hologram";
    const POLL: Duration = Duration::from_millis(100);

    struct BenchModule {
        profile: ModuleProfile,
        answers_at: bool,
    }

    impl ModuleDriver for BenchModule {
        fn profile(&self) -> &ModuleProfile {
            &self.profile
        }

        fn did_at_respond(&mut self) -> bool {
            self.answers_at
        }

        fn extra_setup(&mut self) -> Result<ModemIdentity, FailureReason> {
            Ok(ModemIdentity::new("bench"))
        }

        fn power_off(&mut self) -> bool {
            true
        }

        fn signal_quality(&mut self) -> Capability<SignalQuality> {
            Capability::Supported(SignalQuality::from_rssi(-71))
        }

        fn battery_state(&mut self) -> Capability<BatteryState> {
            Capability::Unavailable
        }

        fn temperature(&mut self) -> Capability<Temperature> {
            Capability::Unavailable
        }

        fn registration_status(&mut self) -> Capability<RegistrationStatus> {
            Capability::Supported(RegistrationStatus::Registered { roaming: false })
        }

        fn activate_data_session(&mut self, _: &str) -> bool {
            true
        }

        fn deactivate_data_session(&mut self) -> bool {
            true
        }

        fn data_session_active(&mut self) -> bool {
            true
        }

        fn query_time_server(&mut self, _: Duration) -> Capability<[u8; 4]> {
            Capability::Supported([0xE8, 0xFE, 0x6F, 0x80])
        }
    }

    type BenchModem = Modem<BenchModule, NoopLineDriver, FirmwareInstant>;

    fn modem(profile: ModuleProfile, wiring: LineWiring, answers_at: bool) -> BenchModem {
        Modem::new(
            BenchModule {
                profile,
                answers_at,
            },
            wiring,
            NoopLineDriver::new(),
            ModemConfig::DEFAULT,
        )
        .expect("valid profile")
    }

    fn power_only() -> LineWiring {
        board_wiring(-1)
    }

    /// Power switch plus a sleep-request line, so power-down is allowed.
    fn power_and_wake() -> LineWiring {
        board_wiring(1)
    }

    fn board_wiring(wake: i8) -> LineWiring {
        LineWiring::from_pins(
            (0, LinePolarity::ActiveHigh),
            (-1, LinePolarity::ActiveHigh),
            (-1, LinePolarity::ActiveLow),
            (wake, LinePolarity::ActiveLow),
        )
    }

    /// Runs the cycle to completion and returns the summary with the
    /// virtual time it took.
    fn run(modem: &mut BenchModem) -> (CycleSummary, Duration) {
        let mut cycle = LoggerCycle::new(APN, POLL);
        let mut elapsed = Duration::ZERO;
        for _ in 0..10_000 {
            let now = FirmwareInstant::from_micros(
                u64::try_from(elapsed.as_micros()).expect("fits in u64"),
            );
            match cycle.step(modem, now) {
                CycleStep::Wait(delay) => elapsed += delay,
                CycleStep::Done(summary) => {
                    assert!(cycle.is_done());
                    return (summary, elapsed);
                }
            }
        }
        panic!("cycle did not finish");
    }

    #[test]
    fn healthy_module_completes_every_stage() {
        let mut modem = modem(xbee::PROFILE, power_and_wake(), true);
        let (summary, elapsed) = run(&mut modem);

        assert_eq!(summary.error, None);
        assert_eq!(summary.flags.to_bits(), 0b0111_1111);
        assert!(summary.flags.measurement_completed);
        assert_eq!(
            summary.time.map(|time| time.map(|time| time.unix_seconds)),
            Some(Ok(1_700_000_000))
        );
        assert_eq!(
            summary.metadata.and_then(|metadata| metadata.rssi_dbm()),
            Some(-71)
        );
        assert_eq!(modem.state(), LifecycleState::Off);
        assert_eq!(modem.connectivity_state(), ConnectivityState::Disconnected);

        // Metadata waits for the signal reading to settle, then sleep waits
        // out the disconnect window.
        let floor = xbee::TIMING.signal_quality_time + xbee::TIMING.disconnect_time;
        assert!(elapsed >= floor, "finished after {elapsed:?}");
    }

    #[test]
    fn silent_module_fails_and_is_still_powered_down() {
        let mut modem = modem(xbee::PROFILE, power_and_wake(), false);
        let (summary, _) = run(&mut modem);

        assert_eq!(
            summary.error,
            Some(ModemError::Timeout(TimeoutKind::AtHandshake))
        );
        assert!(summary.flags.failure);
        assert!(summary.flags.power_attempted);
        assert!(!summary.flags.connect_attempted);
        assert_eq!(summary.time, None);
        assert_eq!(summary.metadata, None);
        assert_eq!(modem.state(), LifecycleState::Off);
    }

    #[test]
    fn refused_sleep_keeps_the_measurement() {
        // AT power-down with no wake-request line could not be undone, so
        // the modem refuses to sleep and stays powered.
        let profile = ModuleProfile {
            wake: WakeMethod::AlwaysOn,
            ..sim7000::PROFILE
        };
        let mut modem = modem(profile, power_only(), true);
        let (summary, _) = run(&mut modem);

        let error = summary.error.expect("sleep was refused");
        assert_eq!(
            error,
            ModemError::ConfigurationMismatch(ConfigIssue::NoWakePath)
        );
        assert_eq!(error.severity(), Severity::Warning);
        assert!(!summary.flags.failure);
        assert!(summary.metadata.is_some());
        assert_eq!(modem.state(), LifecycleState::Ready);
    }
}
