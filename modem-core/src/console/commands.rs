//! Console command dispatcher.
//!
//! Turns parsed console commands into calls on the scheduler boundary of a
//! modem. Shared by the firmware and the emulator.

use core::fmt;

use crate::capability::ModemIdentity;
use crate::capability::ModuleDriver;
use crate::connectivity::{ConnectivityState, NetworkTime};
use crate::error::{ModemError, NetworkTimeError};
use crate::lifecycle::{LifecycleState, Modem};
use crate::lines::LineDriver;
use crate::metadata::ModemMetadata;
use crate::power::PowerState;
use crate::status::LifecycleStatusFlags;
use crate::timing::ModemInstant;

use super::grammar::{self, Command, CommandInfo};

/// Snapshot printed by `status`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub lifecycle: LifecycleState,
    pub power: PowerState,
    pub connectivity: ConnectivityState,
    pub flags: LifecycleStatusFlags,
    pub attempt: u8,
    pub identity: Option<ModemIdentity>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lifecycle={} power={} net={} attempt={} flags=0b{:08b}",
            self.lifecycle,
            self.power,
            self.connectivity,
            self.attempt,
            self.flags.to_bits()
        )?;
        if let Some(identity) = &self.identity {
            write!(f, " module={identity}")?;
        }
        Ok(())
    }
}

/// The operations a console can invoke on a modem.
pub trait ModemControl {
    type Instant: ModemInstant;

    fn begin_cycle(&mut self);
    fn set_up(&mut self, now: Self::Instant);
    fn power_up(&mut self, now: Self::Instant) -> Result<(), ModemError>;
    fn wake(&mut self, now: Self::Instant) -> Result<(), ModemError>;
    fn connect_internet(&mut self, apn: &str, now: Self::Instant) -> Result<(), ModemError>;
    fn disconnect_internet(&mut self, now: Self::Instant) -> Result<(), ModemError>;
    fn network_time(&mut self, now: Self::Instant) -> Result<NetworkTime, NetworkTimeError>;
    fn read_metadata(&mut self, now: Self::Instant) -> Result<ModemMetadata, ModemError>;
    fn sleep(&mut self, now: Self::Instant) -> Result<(), ModemError>;
    fn status(&mut self, now: Self::Instant) -> StatusReport;
}

impl<D, L, I> ModemControl for Modem<D, L, I>
where
    D: ModuleDriver,
    L: LineDriver,
    I: ModemInstant,
{
    type Instant = I;

    fn begin_cycle(&mut self) {
        Modem::begin_cycle(self);
    }

    fn set_up(&mut self, now: I) {
        Modem::set_up(self, now);
    }

    fn power_up(&mut self, now: I) -> Result<(), ModemError> {
        Modem::power_up(self, now)
    }

    fn wake(&mut self, now: I) -> Result<(), ModemError> {
        Modem::wake(self, now)
    }

    fn connect_internet(&mut self, apn: &str, now: I) -> Result<(), ModemError> {
        Modem::connect_internet(self, apn, now)
    }

    fn disconnect_internet(&mut self, now: I) -> Result<(), ModemError> {
        Modem::disconnect_internet(self, now)
    }

    fn network_time(&mut self, now: I) -> Result<NetworkTime, NetworkTimeError> {
        Modem::network_time(self, now)
    }

    fn read_metadata(&mut self, now: I) -> Result<ModemMetadata, ModemError> {
        Modem::read_metadata(self, now)
    }

    fn sleep(&mut self, now: I) -> Result<(), ModemError> {
        Modem::sleep(self, now)
    }

    fn status(&mut self, now: I) -> StatusReport {
        let lifecycle = self.poll(now);
        StatusReport {
            lifecycle,
            power: self.power_state(),
            connectivity: self.connectivity_state(),
            flags: self.status_flags(),
            attempt: self.attempt(),
            identity: self.identity().cloned(),
        }
    }
}

/// Command execution successes.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    SetUp,
    PowerApplied,
    WakeStarted,
    ConnectStarted,
    Disconnected,
    Time(NetworkTime),
    Metadata(ModemMetadata),
    Asleep,
    Status(StatusReport),
    CycleStarted,
    Help(HelpReply),
}

/// Reply to `help`: the whole catalog or one entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HelpReply {
    All(&'static [CommandInfo]),
    One(&'static CommandInfo),
}

/// Errors surfaced while executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandError<'a> {
    Parse(grammar::ParseError<'a>),
    Modem(ModemError),
    Time(NetworkTimeError),
    UnknownTopic(&'a str),
}

impl<'a> From<grammar::ParseError<'a>> for CommandError<'a> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl From<ModemError> for CommandError<'_> {
    fn from(error: ModemError) -> Self {
        Self::Modem(error)
    }
}

impl From<NetworkTimeError> for CommandError<'_> {
    fn from(error: NetworkTimeError) -> Self {
        Self::Time(error)
    }
}

impl fmt::Display for CommandError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(error) => error.fmt(f),
            CommandError::Modem(error) => error.fmt(f),
            CommandError::Time(error) => error.fmt(f),
            CommandError::UnknownTopic(topic) => write!(f, "no help for `{topic}`"),
        }
    }
}

/// Dispatches console commands onto a modem.
pub struct CommandExecutor<M> {
    modem: M,
}

impl<M> CommandExecutor<M> {
    pub const fn new(modem: M) -> Self {
        Self { modem }
    }

    pub fn modem(&self) -> &M {
        &self.modem
    }

    pub fn modem_mut(&mut self) -> &mut M {
        &mut self.modem
    }

    pub fn into_inner(self) -> M {
        self.modem
    }
}

impl<M> CommandExecutor<M>
where
    M: ModemControl,
{
    /// Parses and executes a console command.
    pub fn execute<'a>(
        &mut self,
        line: &'a str,
        now: M::Instant,
    ) -> Result<CommandOutcome, CommandError<'a>> {
        let command = grammar::parse(line)?;
        self.dispatch(command, now)
    }

    fn dispatch<'a>(
        &mut self,
        command: Command<'a>,
        now: M::Instant,
    ) -> Result<CommandOutcome, CommandError<'a>> {
        let outcome = match command {
            Command::Setup => {
                self.modem.set_up(now);
                CommandOutcome::SetUp
            }
            Command::Power => {
                self.modem.power_up(now)?;
                CommandOutcome::PowerApplied
            }
            Command::Wake => {
                self.modem.wake(now)?;
                CommandOutcome::WakeStarted
            }
            Command::Connect { apn } => {
                self.modem.connect_internet(apn, now)?;
                CommandOutcome::ConnectStarted
            }
            Command::Disconnect => {
                self.modem.disconnect_internet(now)?;
                CommandOutcome::Disconnected
            }
            Command::Time => CommandOutcome::Time(self.modem.network_time(now)?),
            Command::Signal => CommandOutcome::Metadata(self.modem.read_metadata(now)?),
            Command::Sleep => {
                self.modem.sleep(now)?;
                CommandOutcome::Asleep
            }
            Command::Status => CommandOutcome::Status(self.modem.status(now)),
            Command::Cycle => {
                self.modem.begin_cycle();
                self.modem.set_up(now);
                self.modem.power_up(now)?;
                self.modem.wake(now)?;
                CommandOutcome::CycleStarted
            }
            Command::Help { topic: None } => CommandOutcome::Help(HelpReply::All(&grammar::CATALOG)),
            Command::Help { topic: Some(topic) } => grammar::find(topic)
                .map(|entry| CommandOutcome::Help(HelpReply::One(entry)))
                .ok_or(CommandError::UnknownTopic(topic))?,
        };
        Ok(outcome)
    }
}
