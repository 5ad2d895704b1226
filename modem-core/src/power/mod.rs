//! Power and wake sequencing for one modem.
//!
//! `PowerController` owns the control lines and is the only code that mutates
//! [`PowerState`]. Every wait is a deadline checked in [`PowerController::poll`];
//! nothing here blocks.

use core::fmt;
use core::time::Duration;

use crate::capability::{ModuleDriver, ModuleProfile, SleepMethod, WakeMethod};
use crate::error::{ConfigIssue, ModemError, Operation, TimeoutKind, TransientFailure};
use crate::lines::{LineAction, LineDriver, LineId, LineWiring};
use crate::telemetry::{TelemetryEventKind, TelemetryRecorder};
use crate::timing::ModemInstant;

/// Electrical state of the module as far as the controller knows.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerState {
    Off,
    PoweringUp,
    Awake,
    Asleep,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PowerState::Off => "off",
            PowerState::PoweringUp => "powering-up",
            PowerState::Awake => "awake",
            PowerState::Asleep => "asleep",
        };
        f.write_str(text)
    }
}

/// Progress reported by [`PowerController::poll`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WakeProgress {
    /// No wake or shutdown in flight.
    Idle,
    Pending,
    /// The wake sequence finished during this poll.
    Awake,
    Failed(ModemError),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase<I> {
    Idle,
    /// Waiting for `status_time` to pass after power-on.
    Settling { ready_at: I },
    /// Wake pulse asserted until `release_at`.
    Pulsing { release_at: I },
    AwaitingStatus { deadline: I },
    /// Orderly power-down acknowledged; power is cut at `off_at` or when the
    /// status pin drops, whichever comes first.
    ShuttingDown { off_at: I },
}

/// Drives the power, wake-request and reset lines for one module.
pub struct PowerController<L, I> {
    profile: ModuleProfile,
    wiring: LineWiring,
    lines: L,
    state: PowerState,
    phase: Phase<I>,
    powered_at: Option<I>,
    woke_at: Option<I>,
}

impl<L, I> PowerController<L, I>
where
    L: LineDriver,
    I: ModemInstant,
{
    pub const fn new(profile: ModuleProfile, wiring: LineWiring, lines: L) -> Self {
        Self {
            profile,
            wiring,
            lines,
            state: PowerState::Off,
            phase: Phase::Idle,
            powered_at: None,
            woke_at: None,
        }
    }

    pub const fn state(&self) -> PowerState {
        self.state
    }

    pub const fn wiring(&self) -> &LineWiring {
        &self.wiring
    }

    pub const fn powered_at(&self) -> Option<I> {
        self.powered_at
    }

    pub const fn woke_at(&self) -> Option<I> {
        self.woke_at
    }

    pub fn lines_mut(&mut self) -> &mut L {
        &mut self.lines
    }

    /// Returns `true` while a wake sequence is between settle and completion.
    pub const fn is_waking(&self) -> bool {
        matches!(
            self.phase,
            Phase::Settling { .. } | Phase::Pulsing { .. } | Phase::AwaitingStatus { .. }
        )
    }

    /// Time left before an acknowledged power-down may be followed by any
    /// other command. `None` when no shutdown is in flight.
    pub fn shutdown_remaining(&self, now: I) -> Option<Duration> {
        match self.phase {
            Phase::ShuttingDown { off_at } => Some(off_at.saturating_duration_since(now)),
            _ => None,
        }
    }

    /// Drives every wired line to its idle level. Power stays on if the
    /// module is already powered.
    pub fn set_up(&mut self, now: I, telemetry: &mut TelemetryRecorder<I>) {
        self.drive(LineId::WakeRequest, LineAction::Release, now, telemetry);
        self.drive(LineId::Reset, LineAction::Release, now, telemetry);
        if self.state == PowerState::Off {
            self.drive(LineId::Power, LineAction::Release, now, telemetry);
        }
    }

    /// Energizes the module.
    ///
    /// Families that latch the wake-request line at boot get it released to
    /// idle before power is applied. A module still powered from an earlier
    /// bring-up keeps its supply and only has its wake sequence re-armed.
    /// Returns `true` when the power line was actually asserted by this call.
    pub fn power_up(&mut self, now: I, telemetry: &mut TelemetryRecorder<I>) -> bool {
        if matches!(self.state, PowerState::PoweringUp | PowerState::Awake) {
            self.abort(now, telemetry);
            self.woke_at = None;
            self.set_state(PowerState::PoweringUp, now, telemetry);
            return false;
        }

        if self.profile.prime_wake_line {
            self.drive(LineId::WakeRequest, LineAction::Release, now, telemetry);
        }

        let asserted = self.drive(LineId::Power, LineAction::Assert, now, telemetry);
        if asserted || self.powered_at.is_none() {
            self.powered_at = Some(now);
        }
        self.woke_at = None;
        self.phase = Phase::Idle;
        self.set_state(PowerState::PoweringUp, now, telemetry);
        asserted
    }

    /// Re-arms the wake sequence for another attempt with power held on.
    /// The settle time after power-on has already been served.
    pub fn retry_wake(&mut self, now: I, telemetry: &mut TelemetryRecorder<I>) {
        self.abort(now, telemetry);
        self.woke_at = None;
        self.set_state(PowerState::PoweringUp, now, telemetry);
        self.phase = Phase::Settling { ready_at: now };
    }

    /// Arms the wake sequence. It starts once `status_time` has elapsed
    /// since power-on and progresses through [`poll`](Self::poll).
    pub fn begin_wake(&mut self) -> Result<(), ModemError> {
        match self.state {
            PowerState::Awake => Ok(()),
            PowerState::PoweringUp => {
                if self.is_waking() {
                    return Ok(());
                }
                let powered_at = self
                    .powered_at
                    .ok_or(ModemError::InvalidState(Operation::Wake))?;
                self.phase = Phase::Settling {
                    ready_at: powered_at + self.profile.timing.status_time,
                };
                Ok(())
            }
            PowerState::Off | PowerState::Asleep => {
                Err(ModemError::InvalidState(Operation::Wake))
            }
        }
    }

    /// Advances whichever timed sequence is in flight.
    pub fn poll(&mut self, now: I, telemetry: &mut TelemetryRecorder<I>) -> WakeProgress {
        loop {
            match self.phase {
                Phase::Idle => return WakeProgress::Idle,
                Phase::Settling { ready_at } => {
                    if !now.reached(ready_at) {
                        return WakeProgress::Pending;
                    }
                    self.start_wake(now, telemetry);
                }
                Phase::Pulsing { release_at } => {
                    if !now.reached(release_at) {
                        return WakeProgress::Pending;
                    }
                    self.drive(LineId::WakeRequest, LineAction::Release, now, telemetry);
                    if self.profile.wake == WakeMethod::PulseThenStatus {
                        self.await_status(now, telemetry);
                    } else {
                        self.complete_wake(now, telemetry);
                    }
                }
                Phase::AwaitingStatus { deadline } => {
                    if self.status_asserted() == Some(true) {
                        self.complete_wake(now, telemetry);
                    } else if now.reached(deadline) {
                        self.phase = Phase::Idle;
                        return WakeProgress::Failed(ModemError::Timeout(TimeoutKind::StatusPin));
                    } else {
                        return WakeProgress::Pending;
                    }
                }
                Phase::ShuttingDown { off_at } => {
                    if self.status_asserted() == Some(false) || now.reached(off_at) {
                        self.cut_power(now, telemetry);
                    }
                    return WakeProgress::Idle;
                }
            }

            if self.state == PowerState::Awake && self.phase == Phase::Idle {
                return WakeProgress::Awake;
            }
        }
    }

    /// Puts the module to sleep using the family's sleep method.
    ///
    /// Refuses, leaving [`PowerState`] unchanged, whenever removing power
    /// would leave the module with no way to be woken again. Calling this
    /// while already off is a no-op.
    pub fn power_down<D>(
        &mut self,
        now: I,
        session_alive: bool,
        driver: &mut D,
        telemetry: &mut TelemetryRecorder<I>,
    ) -> Result<(), ModemError>
    where
        D: ModuleDriver + ?Sized,
    {
        if self.state == PowerState::Off || matches!(self.phase, Phase::ShuttingDown { .. }) {
            return Ok(());
        }

        let wake_wired = self.wiring.is_wired(LineId::WakeRequest);
        let power_wired = self.wiring.is_wired(LineId::Power);

        match self.profile.sleep {
            SleepMethod::AtPowerDown | SleepMethod::CutPower if !wake_wired => Err(
                ModemError::ConfigurationMismatch(ConfigIssue::NoWakePath),
            ),
            SleepMethod::AtPowerDown if session_alive => {
                self.abort(now, telemetry);
                if !driver.power_off() {
                    return Err(ModemError::Transient(TransientFailure::PowerOffRejected));
                }
                self.phase = Phase::ShuttingDown {
                    off_at: now + self.profile.timing.disconnect_time,
                };
                self.set_state(PowerState::Asleep, now, telemetry);
                Ok(())
            }
            SleepMethod::AtPowerDown | SleepMethod::CutPower if power_wired => {
                self.abort(now, telemetry);
                self.cut_power(now, telemetry);
                Ok(())
            }
            SleepMethod::AtPowerDown | SleepMethod::CutPower => Err(
                ModemError::ConfigurationMismatch(ConfigIssue::NoPowerLine),
            ),
            SleepMethod::None => Err(ModemError::ConfigurationMismatch(
                ConfigIssue::SleepUnsupported,
            )),
        }
    }

    /// Cancels an in-flight wake, releasing the wake-request line if a pulse
    /// was active. Returns `true` when something was cancelled.
    pub fn abort(&mut self, now: I, telemetry: &mut TelemetryRecorder<I>) -> bool {
        match self.phase {
            Phase::Pulsing { .. } => {
                self.drive(LineId::WakeRequest, LineAction::Release, now, telemetry);
                self.phase = Phase::Idle;
                true
            }
            Phase::Settling { .. } | Phase::AwaitingStatus { .. } => {
                self.phase = Phase::Idle;
                true
            }
            Phase::Idle | Phase::ShuttingDown { .. } => false,
        }
    }

    fn start_wake(&mut self, now: I, telemetry: &mut TelemetryRecorder<I>) {
        match self.profile.wake {
            WakeMethod::Pulse | WakeMethod::PulseThenStatus => {
                if self.drive(LineId::WakeRequest, LineAction::Assert, now, telemetry) {
                    self.phase = Phase::Pulsing {
                        release_at: now + self.profile.timing.wake_pulse,
                    };
                } else if self.profile.wake == WakeMethod::PulseThenStatus {
                    self.await_status(now, telemetry);
                } else {
                    self.complete_wake(now, telemetry);
                }
            }
            WakeMethod::StatusPin | WakeMethod::AlwaysOn => self.await_status(now, telemetry),
        }
    }

    fn await_status(&mut self, now: I, telemetry: &mut TelemetryRecorder<I>) {
        if self.wiring.is_wired(LineId::Status) {
            self.phase = Phase::AwaitingStatus {
                deadline: now + self.profile.timing.at_response_timeout,
            };
        } else {
            self.complete_wake(now, telemetry);
        }
    }

    fn complete_wake(&mut self, now: I, telemetry: &mut TelemetryRecorder<I>) {
        self.phase = Phase::Idle;
        self.woke_at = Some(now);
        self.set_state(PowerState::Awake, now, telemetry);
    }

    fn cut_power(&mut self, now: I, telemetry: &mut TelemetryRecorder<I>) {
        self.phase = Phase::Idle;
        self.drive(LineId::Power, LineAction::Release, now, telemetry);
        if self.wiring.is_wired(LineId::Power) {
            self.powered_at = None;
        }
        self.woke_at = None;
        self.set_state(PowerState::Off, now, telemetry);
    }

    fn status_asserted(&mut self) -> Option<bool> {
        let config = self.wiring.get(LineId::Status)?;
        Some(config.is_asserted(self.lines.sample(LineId::Status)))
    }

    fn set_state(&mut self, state: PowerState, now: I, telemetry: &mut TelemetryRecorder<I>) {
        if self.state != state {
            self.state = state;
            telemetry.record_event(TelemetryEventKind::Power(state), now);
        }
    }

    /// Drives `line` if it is wired. Returns `false` for unwired lines.
    fn drive(
        &mut self,
        line: LineId,
        action: LineAction,
        now: I,
        telemetry: &mut TelemetryRecorder<I>,
    ) -> bool {
        let Some(config) = self.wiring.get(line) else {
            return false;
        };
        self.lines.drive(line, config.level_for(action));
        telemetry.record_line_transition(line, action, now);
        true
    }
}
