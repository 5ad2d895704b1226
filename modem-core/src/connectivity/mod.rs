//! Network registration, data session and network time for a ready modem.
//!
//! The lifecycle only hands control here while it is `Ready`. Registration
//! and activation advance through [`ConnectivityManager::poll`]; teardown opens
//! a disconnect window during which every other operation is refused.

use core::fmt;
use core::time::Duration;

use heapless::String;

use crate::capability::{Capability, FailureReason, ModuleDriver, RegistrationStatus};
use crate::error::{ConfigIssue, ConnectError, ModemError, NetworkTimeError, TransientFailure};
use crate::telemetry::{TelemetryEventKind, TelemetryPayload, TelemetryRecorder};
use crate::timing::ModemInstant;

/// Longest access point name accepted by `connect`.
pub const APN_CAPACITY: usize = 64;

/// Seconds between the RFC 868 epoch (1900-01-01) and the Unix epoch.
pub const RFC868_UNIX_OFFSET: u32 = 2_208_988_800;

/// 2020-01-01T00:00:00Z. Anything earlier cannot be a current network time.
pub const EARLIEST_PLAUSIBLE_UNIX: u32 = 1_577_836_800;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectivityState::Disconnected => "disconnected",
            ConnectivityState::Connecting => "connecting",
            ConnectivityState::Connected => "connected",
            ConnectivityState::Disconnecting => "disconnecting",
        };
        f.write_str(text)
    }
}

/// Carrier-dependent bounds. These are policy, not hardware timing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ConnectivityConfig {
    pub registration_timeout: Duration,
    pub registration_probe_interval: Duration,
    /// Total budget for one `network_time` call across all attempts.
    pub time_query_timeout: Duration,
    pub time_query_attempts: u8,
}

impl ConnectivityConfig {
    pub const DEFAULT: Self = Self {
        registration_timeout: Duration::from_secs(50),
        registration_probe_interval: Duration::from_millis(500),
        time_query_timeout: Duration::from_secs(5),
        time_query_attempts: 4,
    };

    /// Per-attempt timeout handed to the driver.
    pub fn time_query_attempt_timeout(&self) -> Duration {
        self.time_query_timeout / u32::from(self.time_query_attempts.max(1))
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Result of an RFC 868 time query.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NetworkTime {
    pub unix_seconds: u32,
}

impl NetworkTime {
    /// Decodes the 4-byte big-endian RFC 868 payload.
    pub fn from_rfc868(payload: [u8; 4]) -> Result<Self, NetworkTimeError> {
        let since_1900 = u32::from_be_bytes(payload);
        let unix_seconds = since_1900
            .checked_sub(RFC868_UNIX_OFFSET)
            .ok_or(NetworkTimeError::Implausible)?;
        if unix_seconds < EARLIEST_PLAUSIBLE_UNIX {
            return Err(NetworkTimeError::Implausible);
        }
        Ok(Self { unix_seconds })
    }
}

/// Progress reported by [`ConnectivityManager::poll`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectProgress {
    Idle,
    Pending,
    Connected,
    Failed(ConnectError),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase<I> {
    Idle,
    Registering { deadline: I, next_probe: I },
    Activating,
    Disconnecting { idle_at: I },
}

pub struct ConnectivityManager<I> {
    config: ConnectivityConfig,
    disconnect_time: Duration,
    state: ConnectivityState,
    phase: Phase<I>,
    apn: String<APN_CAPACITY>,
}

impl<I> ConnectivityManager<I>
where
    I: ModemInstant,
{
    pub const fn new(config: ConnectivityConfig, disconnect_time: Duration) -> Self {
        Self {
            config,
            disconnect_time,
            state: ConnectivityState::Disconnected,
            phase: Phase::Idle,
            apn: String::new(),
        }
    }

    pub const fn state(&self) -> ConnectivityState {
        self.state
    }

    pub const fn config(&self) -> &ConnectivityConfig {
        &self.config
    }

    pub fn apn(&self) -> &str {
        self.apn.as_str()
    }

    /// Refuses with `Settling` while the post-disconnect window is open.
    /// Closes the window once it has elapsed.
    pub fn guard(&mut self, now: I, telemetry: &mut TelemetryRecorder<I>) -> Result<(), ModemError> {
        if let Phase::Disconnecting { idle_at } = self.phase {
            if !now.reached(idle_at) {
                return Err(ModemError::Settling {
                    remaining: idle_at.saturating_duration_since(now),
                });
            }
            self.phase = Phase::Idle;
            self.set_state(ConnectivityState::Disconnected, now, telemetry);
        }
        Ok(())
    }

    /// Starts registration and session activation for `apn`.
    pub fn begin_connect(
        &mut self,
        apn: &str,
        now: I,
        telemetry: &mut TelemetryRecorder<I>,
    ) -> Result<(), ModemError> {
        self.guard(now, telemetry)?;
        match self.state {
            ConnectivityState::Connected | ConnectivityState::Connecting => return Ok(()),
            ConnectivityState::Disconnected | ConnectivityState::Disconnecting => {}
        }

        self.apn = String::try_from(apn)
            .map_err(|_| ModemError::ConfigurationMismatch(ConfigIssue::ApnTooLong))?;
        self.phase = Phase::Registering {
            deadline: now + self.config.registration_timeout,
            next_probe: now,
        };
        self.set_state(ConnectivityState::Connecting, now, telemetry);
        Ok(())
    }

    /// Advances registration, activation or the disconnect window.
    pub fn poll<D>(
        &mut self,
        driver: &mut D,
        now: I,
        telemetry: &mut TelemetryRecorder<I>,
    ) -> ConnectProgress
    where
        D: ModuleDriver + ?Sized,
    {
        loop {
            match self.phase {
                Phase::Idle => return ConnectProgress::Idle,
                Phase::Disconnecting { .. } => {
                    let _ = self.guard(now, telemetry);
                    return ConnectProgress::Idle;
                }
                Phase::Registering {
                    deadline,
                    next_probe,
                } => {
                    if !now.reached(next_probe) {
                        return ConnectProgress::Pending;
                    }
                    match driver.registration_status() {
                        Capability::Supported(status) if status.is_registered() => {
                            self.phase = Phase::Activating;
                        }
                        // Modules that cannot report registration go straight to activation.
                        Capability::Unavailable => self.phase = Phase::Activating,
                        Capability::Supported(
                            RegistrationStatus::Denied | RegistrationStatus::NotSearching,
                        ) => return self.fail(ConnectError::NoNetwork, now, telemetry),
                        Capability::Supported(_) | Capability::Failed(_) => {
                            if now.reached(deadline) {
                                return self.fail(ConnectError::RegistrationTimeout, now, telemetry);
                            }
                            self.phase = Phase::Registering {
                                deadline,
                                next_probe: (now + self.config.registration_probe_interval)
                                    .min(deadline),
                            };
                            return ConnectProgress::Pending;
                        }
                    }
                }
                Phase::Activating => {
                    if driver.activate_data_session(self.apn.as_str()) {
                        self.phase = Phase::Idle;
                        self.set_state(ConnectivityState::Connected, now, telemetry);
                        return ConnectProgress::Connected;
                    }
                    return self.fail(ConnectError::SessionActivationFailed, now, telemetry);
                }
            }
        }
    }

    /// Point-in-time check combining our state with the module's bearer.
    pub fn is_internet_available<D>(&mut self, driver: &mut D) -> bool
    where
        D: ModuleDriver + ?Sized,
    {
        self.state == ConnectivityState::Connected && driver.data_session_active()
    }

    /// Tears down the data session and opens the disconnect window.
    pub fn disconnect<D>(
        &mut self,
        driver: &mut D,
        now: I,
        telemetry: &mut TelemetryRecorder<I>,
    ) -> Result<(), ModemError>
    where
        D: ModuleDriver + ?Sized,
    {
        self.guard(now, telemetry)?;
        match self.state {
            ConnectivityState::Disconnected | ConnectivityState::Disconnecting => return Ok(()),
            ConnectivityState::Connecting => {
                self.phase = Phase::Idle;
                self.set_state(ConnectivityState::Disconnected, now, telemetry);
                return Ok(());
            }
            ConnectivityState::Connected => {}
        }

        let acknowledged = driver.deactivate_data_session();
        self.phase = Phase::Disconnecting {
            idle_at: now + self.disconnect_time,
        };
        self.set_state(ConnectivityState::Disconnecting, now, telemetry);
        if acknowledged {
            Ok(())
        } else {
            Err(ModemError::Transient(TransientFailure::Probe(
                FailureReason::Rejected,
            )))
        }
    }

    /// Queries network time. Never touches the driver unless connected.
    pub fn network_time<D>(
        &mut self,
        driver: &mut D,
        now: I,
        telemetry: &mut TelemetryRecorder<I>,
    ) -> Result<NetworkTime, NetworkTimeError>
    where
        D: ModuleDriver + ?Sized,
    {
        if self.state != ConnectivityState::Connected {
            return Err(NetworkTimeError::NotConnected);
        }

        let timeout = self.config.time_query_attempt_timeout();
        for _ in 0..self.config.time_query_attempts.max(1) {
            match driver.query_time_server(timeout) {
                Capability::Supported(payload) => {
                    let time = NetworkTime::from_rfc868(payload)?;
                    telemetry.record(
                        TelemetryEventKind::NetworkTime,
                        TelemetryPayload::UnixSeconds(time.unix_seconds),
                        now,
                    );
                    return Ok(time);
                }
                Capability::Unavailable => return Err(NetworkTimeError::Unavailable),
                Capability::Failed(_) => {}
            }
        }
        Err(NetworkTimeError::Timeout)
    }

    /// Cancels an in-flight connect. Returns `true` when one was pending.
    pub fn abort(&mut self, now: I, telemetry: &mut TelemetryRecorder<I>) -> bool {
        if self.state != ConnectivityState::Connecting {
            return false;
        }
        self.phase = Phase::Idle;
        self.set_state(ConnectivityState::Disconnected, now, telemetry);
        true
    }

    /// Forgets the session after the module lost power.
    pub fn reset(&mut self, now: I, telemetry: &mut TelemetryRecorder<I>) {
        self.phase = Phase::Idle;
        self.set_state(ConnectivityState::Disconnected, now, telemetry);
    }

    fn fail(
        &mut self,
        error: ConnectError,
        now: I,
        telemetry: &mut TelemetryRecorder<I>,
    ) -> ConnectProgress {
        self.phase = Phase::Idle;
        self.set_state(ConnectivityState::Disconnected, now, telemetry);
        ConnectProgress::Failed(error)
    }

    fn set_state(
        &mut self,
        state: ConnectivityState,
        now: I,
        telemetry: &mut TelemetryRecorder<I>,
    ) {
        if self.state != state {
            self.state = state;
            telemetry.record_event(TelemetryEventKind::Connectivity(state), now);
        }
    }
}
