//! Lifecycle state machine for one modem.
//!
//! [`Modem`] sequences power-up, wake, the AT handshake and extra setup, then
//! hands a `Ready` module to the connectivity manager. All waiting happens in
//! [`Modem::poll`] against deadlines derived from the module's timing profile
//! and [`ModemConfig`], so one bring-up attempt and the whole retry budget are
//! both bounded.

use core::fmt;
use core::time::Duration;

use crate::capability::{Capability, ModemIdentity, ModuleDriver, ModuleProfile};
use crate::connectivity::{
    ConnectProgress, ConnectivityConfig, ConnectivityManager, ConnectivityState, NetworkTime,
};
use crate::error::{ConfigIssue, ConnectError, ModemError, NetworkTimeError, Operation, TimeoutKind};
use crate::lines::{LineDriver, LineWiring};
use crate::metadata::ModemMetadata;
use crate::power::{PowerController, PowerState, WakeProgress};
use crate::status::LifecycleStatusFlags;
use crate::telemetry::{TelemetryEventKind, TelemetryPayload, TelemetryRecorder};
use crate::timing::ModemInstant;

/// Upper bound on transitions taken by a single `poll` call.
const MAX_STEPS_PER_POLL: usize = 8;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    Off,
    PoweringUp,
    WaitingForResponse,
    SettingUp,
    Ready,
    Sleeping,
    Failed(ModemError),
}

impl LifecycleState {
    /// States in which a bring-up attempt is in flight.
    pub const fn is_bringing_up(self) -> bool {
        matches!(
            self,
            LifecycleState::PoweringUp
                | LifecycleState::WaitingForResponse
                | LifecycleState::SettingUp
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Off => f.write_str("off"),
            LifecycleState::PoweringUp => f.write_str("powering-up"),
            LifecycleState::WaitingForResponse => f.write_str("waiting-for-response"),
            LifecycleState::SettingUp => f.write_str("setting-up"),
            LifecycleState::Ready => f.write_str("ready"),
            LifecycleState::Sleeping => f.write_str("sleeping"),
            LifecycleState::Failed(error) => write!(f, "failed ({error})"),
        }
    }
}

/// Retry and polling policy for the lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModemConfig {
    /// Bring-up attempts per power cycle, including the first.
    pub max_attempts: u8,
    pub at_probe_interval: Duration,
    pub connectivity: ConnectivityConfig,
}

impl ModemConfig {
    pub const DEFAULT: Self = Self {
        max_attempts: 3,
        at_probe_interval: Duration::from_millis(100),
        connectivity: ConnectivityConfig::DEFAULT,
    };
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Copy, Clone, Debug)]
struct ProbeWindow<I> {
    next_at: I,
    deadline: I,
}

/// One modem, its control lines and its per-cycle bookkeeping.
pub struct Modem<D, L, I>
where
    I: ModemInstant,
{
    driver: D,
    profile: ModuleProfile,
    power: PowerController<L, I>,
    connectivity: ConnectivityManager<I>,
    config: ModemConfig,
    state: LifecycleState,
    attempt: u8,
    probe: Option<ProbeWindow<I>>,
    identity: Option<ModemIdentity>,
    last_connect: Option<Result<(), ConnectError>>,
    flags: LifecycleStatusFlags,
    telemetry: TelemetryRecorder<I>,
}

impl<D, L, I> Modem<D, L, I>
where
    D: ModuleDriver,
    L: LineDriver,
    I: ModemInstant,
{
    /// Builds a modem around `driver`, rejecting invalid timing profiles.
    pub fn new(
        driver: D,
        wiring: LineWiring,
        lines: L,
        config: ModemConfig,
    ) -> Result<Self, ModemError> {
        let profile = *driver.profile();
        profile
            .timing
            .validate()
            .map_err(|_| ModemError::ConfigurationMismatch(ConfigIssue::InvalidTiming))?;

        Ok(Self {
            driver,
            profile,
            power: PowerController::new(profile, wiring, lines),
            connectivity: ConnectivityManager::new(
                config.connectivity,
                profile.timing.disconnect_time,
            ),
            config,
            state: LifecycleState::Off,
            attempt: 0,
            probe: None,
            identity: None,
            last_connect: None,
            flags: LifecycleStatusFlags::new(),
            telemetry: TelemetryRecorder::new(),
        })
    }

    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    pub const fn power_state(&self) -> PowerState {
        self.power.state()
    }

    pub const fn connectivity_state(&self) -> ConnectivityState {
        self.connectivity.state()
    }

    pub const fn profile(&self) -> &ModuleProfile {
        &self.profile
    }

    /// Module name resolved by the first successful extra setup.
    pub const fn identity(&self) -> Option<&ModemIdentity> {
        self.identity.as_ref()
    }

    pub const fn status_flags(&self) -> LifecycleStatusFlags {
        self.flags
    }

    /// Attempt number of the current or last bring-up, starting at 1.
    pub const fn attempt(&self) -> u8 {
        self.attempt
    }

    /// Outcome of the last `connect_internet`, once it has finished.
    pub const fn last_connect(&self) -> Option<Result<(), ConnectError>> {
        self.last_connect
    }

    pub const fn telemetry(&self) -> &TelemetryRecorder<I> {
        &self.telemetry
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn lines_mut(&mut self) -> &mut L {
        self.power.lines_mut()
    }

    pub const fn powered_at(&self) -> Option<I> {
        self.power.powered_at()
    }

    pub const fn woke_at(&self) -> Option<I> {
        self.power.woke_at()
    }

    /// Clears the status flags at the start of a logger cycle.
    pub fn begin_cycle(&mut self) {
        self.flags.reset();
        self.last_connect = None;
    }

    /// Drives every wired control line to its idle level.
    pub fn set_up(&mut self, now: I) {
        self.power.set_up(now, &mut self.telemetry);
    }

    /// Applies power and starts a fresh bring-up. A no-op while a bring-up
    /// is in flight or the modem is ready.
    pub fn power_up(&mut self, now: I) -> Result<(), ModemError> {
        match self.state {
            LifecycleState::Off | LifecycleState::Failed(_) => {}
            LifecycleState::Sleeping => {
                return Err(self.shutdown_settling(now));
            }
            _ => return Ok(()),
        }

        self.flags.power_attempted = true;
        self.power.power_up(now, &mut self.telemetry);
        self.flags.power_succeeded = true;
        self.connectivity.reset(now, &mut self.telemetry);
        self.attempt = 1;
        self.probe = None;
        self.set_state(LifecycleState::PoweringUp, now);
        Ok(())
    }

    /// Arms the wake sequence; [`poll`](Self::poll) carries it out.
    pub fn wake(&mut self, now: I) -> Result<(), ModemError> {
        match self.state {
            LifecycleState::PoweringUp => {
                self.flags.wake_attempted = true;
                self.power.begin_wake()?;
                self.poll(now);
                Ok(())
            }
            LifecycleState::WaitingForResponse | LifecycleState::SettingUp | LifecycleState::Ready => {
                Ok(())
            }
            LifecycleState::Off | LifecycleState::Sleeping | LifecycleState::Failed(_) => {
                Err(ModemError::InvalidState(Operation::Wake))
            }
        }
    }

    /// Advances every timed sequence and returns the resulting state.
    pub fn poll(&mut self, now: I) -> LifecycleState {
        for _ in 0..MAX_STEPS_PER_POLL {
            if !self.step(now) {
                break;
            }
        }
        self.state
    }

    /// Starts registration and data-session activation. Progress and the
    /// outcome arrive through [`poll`](Self::poll) and
    /// [`last_connect`](Self::last_connect).
    pub fn connect_internet(&mut self, apn: &str, now: I) -> Result<(), ModemError> {
        if self.state != LifecycleState::Ready {
            return Err(ModemError::InvalidState(Operation::Connect));
        }
        let before = self.connectivity.state();
        self.connectivity.begin_connect(apn, now, &mut self.telemetry)?;
        self.flags.connect_attempted = true;
        match before {
            ConnectivityState::Connected => self.last_connect = Some(Ok(())),
            // The running attempt will still report its outcome.
            ConnectivityState::Connecting => {}
            ConnectivityState::Disconnected | ConnectivityState::Disconnecting => {
                self.last_connect = None;
            }
        }
        self.poll(now);
        Ok(())
    }

    pub fn is_internet_available(&mut self) -> bool {
        self.state == LifecycleState::Ready
            && self.connectivity.is_internet_available(&mut self.driver)
    }

    pub fn disconnect_internet(&mut self, now: I) -> Result<(), ModemError> {
        if self.state != LifecycleState::Ready {
            return match self.connectivity.state() {
                ConnectivityState::Disconnected => Ok(()),
                _ => Err(ModemError::InvalidState(Operation::Disconnect)),
            };
        }
        self.connectivity
            .disconnect(&mut self.driver, now, &mut self.telemetry)
    }

    pub fn network_time(&mut self, now: I) -> Result<NetworkTime, NetworkTimeError> {
        if self.state != LifecycleState::Ready {
            return Err(NetworkTimeError::NotConnected);
        }
        self.connectivity
            .network_time(&mut self.driver, now, &mut self.telemetry)
    }

    /// Reads signal, battery and temperature once the signal reading has had
    /// `signal_quality_time` to settle since wake.
    pub fn read_metadata(&mut self, now: I) -> Result<ModemMetadata, ModemError> {
        if self.state != LifecycleState::Ready {
            return Err(ModemError::InvalidState(Operation::ReadMetadata));
        }
        self.connectivity.guard(now, &mut self.telemetry)?;
        let woke_at = self
            .power
            .woke_at()
            .ok_or(ModemError::InvalidState(Operation::ReadMetadata))?;
        let ready_at = woke_at + self.profile.timing.signal_quality_time;
        if !now.reached(ready_at) {
            return Err(ModemError::Settling {
                remaining: ready_at.saturating_duration_since(now),
            });
        }

        let signal = self.driver.signal_quality();
        let battery = if self.profile.has_battery {
            self.driver.battery_state()
        } else {
            Capability::Unavailable
        };
        let temperature = if self.profile.has_temperature {
            self.driver.temperature()
        } else {
            Capability::Unavailable
        };

        self.flags.measurement_completed = true;
        Ok(ModemMetadata {
            signal,
            battery,
            temperature,
        })
    }

    /// Powers the module down.
    ///
    /// Refused with `SessionActive` while a data session is up and with
    /// `Settling` inside the disconnect window. A refused power-down leaves
    /// the modem powered in its current state and returns a warning-class
    /// error. Calling this while `Off` succeeds without doing anything.
    pub fn sleep(&mut self, now: I) -> Result<(), ModemError> {
        match self.state {
            LifecycleState::Off | LifecycleState::Sleeping => return Ok(()),
            LifecycleState::Ready => match self.connectivity.state() {
                ConnectivityState::Connected | ConnectivityState::Connecting => {
                    return Err(ModemError::SessionActive);
                }
                ConnectivityState::Disconnecting | ConnectivityState::Disconnected => {
                    self.connectivity.guard(now, &mut self.telemetry)?;
                }
            },
            _ => {
                self.power.abort(now, &mut self.telemetry);
            }
        }

        let session_alive = self.state == LifecycleState::Ready;
        match self
            .power
            .power_down(now, session_alive, &mut self.driver, &mut self.telemetry)
        {
            Ok(()) => {
                self.connectivity.reset(now, &mut self.telemetry);
                if self.power.state() == PowerState::Off {
                    self.set_state(LifecycleState::Off, now);
                } else {
                    self.set_state(LifecycleState::Sleeping, now);
                }
                Ok(())
            }
            Err(error) => {
                if let ModemError::ConfigurationMismatch(issue) = error {
                    self.telemetry
                        .record_event(TelemetryEventKind::PowerDownRefused(issue), now);
                }
                Err(error)
            }
        }
    }

    /// Cancels whatever is in flight, leaving the lines at levels from which
    /// power can still be removed later.
    pub fn abort(&mut self, now: I) {
        self.power.abort(now, &mut self.telemetry);
        if self.connectivity.abort(now, &mut self.telemetry) {
            self.last_connect = Some(Err(ConnectError::Aborted));
            self.flags.connect_failed = true;
        }
        if self.state.is_bringing_up() {
            self.probe = None;
            self.flags.failure = true;
            self.set_state(LifecycleState::Failed(ModemError::Aborted), now);
        }
    }

    fn step(&mut self, now: I) -> bool {
        match self.state {
            LifecycleState::PoweringUp => match self.power.poll(now, &mut self.telemetry) {
                WakeProgress::Awake => {
                    self.flags.wake_succeeded = true;
                    self.open_probe_window();
                    self.set_state(LifecycleState::WaitingForResponse, now);
                    true
                }
                WakeProgress::Failed(error) => {
                    self.attempt_failed(error, now);
                    true
                }
                WakeProgress::Pending | WakeProgress::Idle => false,
            },
            LifecycleState::WaitingForResponse => self.probe_at(now),
            LifecycleState::SettingUp => {
                match self.driver.extra_setup() {
                    Ok(identity) => {
                        if self.identity.is_none() {
                            self.identity = Some(identity);
                        }
                        self.flags.setup_succeeded = true;
                        self.set_state(LifecycleState::Ready, now);
                    }
                    Err(reason) => {
                        self.flags.setup_failed = true;
                        self.flags.failure = true;
                        self.set_state(LifecycleState::Failed(ModemError::FatalSetup(reason)), now);
                    }
                }
                true
            }
            LifecycleState::Ready => {
                match self
                    .connectivity
                    .poll(&mut self.driver, now, &mut self.telemetry)
                {
                    ConnectProgress::Connected => {
                        self.flags.connect_succeeded = true;
                        self.last_connect = Some(Ok(()));
                    }
                    ConnectProgress::Failed(error) => {
                        self.flags.connect_failed = true;
                        self.last_connect = Some(Err(error));
                    }
                    ConnectProgress::Pending | ConnectProgress::Idle => {}
                }
                false
            }
            LifecycleState::Sleeping => {
                self.power.poll(now, &mut self.telemetry);
                if self.power.state() == PowerState::Off {
                    self.set_state(LifecycleState::Off, now);
                    return true;
                }
                false
            }
            LifecycleState::Off | LifecycleState::Failed(_) => false,
        }
    }

    fn open_probe_window(&mut self) {
        let (Some(woke_at), Some(powered_at)) = (self.power.woke_at(), self.power.powered_at())
        else {
            return;
        };
        let deadline = woke_at + self.profile.timing.at_response_timeout;
        let warmed_up = powered_at + self.profile.timing.warm_up_time;
        self.probe = Some(ProbeWindow {
            next_at: woke_at.max(warmed_up).min(deadline),
            deadline,
        });
    }

    fn probe_at(&mut self, now: I) -> bool {
        let Some(window) = self.probe else {
            self.attempt_failed(ModemError::Timeout(TimeoutKind::AtHandshake), now);
            return true;
        };
        if !now.reached(window.next_at) {
            return false;
        }

        let responded = self.driver.did_at_respond();
        let since_wake = self
            .power
            .woke_at()
            .map_or(Duration::ZERO, |woke_at| now.saturating_duration_since(woke_at));
        self.telemetry.record(
            TelemetryEventKind::AtProbe { responded },
            TelemetryPayload::SinceWake(since_wake),
            now,
        );

        if responded {
            self.probe = None;
            self.set_state(LifecycleState::SettingUp, now);
            return true;
        }
        if now.reached(window.deadline) {
            self.attempt_failed(ModemError::Timeout(TimeoutKind::AtHandshake), now);
            return true;
        }
        self.probe = Some(ProbeWindow {
            next_at: now + self.config.at_probe_interval,
            deadline: window.deadline,
        });
        false
    }

    fn attempt_failed(&mut self, error: ModemError, now: I) {
        self.probe = None;
        self.telemetry.record(
            TelemetryEventKind::AttemptFailed,
            TelemetryPayload::Attempt {
                attempt: self.attempt,
                error,
            },
            now,
        );

        if self.attempt >= self.config.max_attempts {
            self.flags.failure = true;
            self.set_state(LifecycleState::Failed(error), now);
            return;
        }

        self.attempt += 1;
        self.power.retry_wake(now, &mut self.telemetry);
        self.set_state(LifecycleState::PoweringUp, now);
    }

    fn shutdown_settling(&self, now: I) -> ModemError {
        ModemError::Settling {
            remaining: self.power.shutdown_remaining(now).unwrap_or(Duration::ZERO),
        }
    }

    fn set_state(&mut self, state: LifecycleState, now: I) {
        if self.state != state {
            self.state = state;
            self.telemetry
                .record_event(TelemetryEventKind::Lifecycle(state), now);
        }
    }
}
