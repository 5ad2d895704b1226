//! Logical control lines between the logger and the modem.
//!
//! Boards differ in which lines are routed at all. A line that is not wired is
//! represented as `None` in [`LineWiring`] and every transition degrades
//! around it instead of faulting.

use core::fmt;

/// Identifier for the logical control lines a modem may expose.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineId {
    Power,
    Status,
    Reset,
    WakeRequest,
}

impl LineId {
    /// Deterministic index for per-line lookups.
    pub const fn as_index(self) -> usize {
        match self {
            LineId::Power => 0,
            LineId::Status => 1,
            LineId::Reset => 2,
            LineId::WakeRequest => 3,
        }
    }

    /// Attempts to construct a [`LineId`] from a raw index.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(LineId::Power),
            1 => Some(LineId::Status),
            2 => Some(LineId::Reset),
            3 => Some(LineId::WakeRequest),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            LineId::Power => "power",
            LineId::Status => "status",
            LineId::Reset => "reset",
            LineId::WakeRequest => "wake-rq",
        }
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Electrical level on a pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineLevel {
    Low,
    High,
}

impl LineLevel {
    #[must_use]
    pub const fn inverted(self) -> Self {
        match self {
            LineLevel::Low => LineLevel::High,
            LineLevel::High => LineLevel::Low,
        }
    }
}

/// Which electrical level means "asserted" for a line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinePolarity {
    ActiveHigh,
    ActiveLow,
}

/// Logical action applied to a line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineAction {
    Assert,
    Release,
}

/// Routing metadata for one wired line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LineConfig {
    pub pin: u8,
    pub polarity: LinePolarity,
}

impl LineConfig {
    pub const fn new(pin: u8, polarity: LinePolarity) -> Self {
        Self { pin, polarity }
    }

    /// Electrical level that corresponds to `action` on this line.
    pub const fn level_for(&self, action: LineAction) -> LineLevel {
        let asserted = match self.polarity {
            LinePolarity::ActiveHigh => LineLevel::High,
            LinePolarity::ActiveLow => LineLevel::Low,
        };
        match action {
            LineAction::Assert => asserted,
            LineAction::Release => asserted.inverted(),
        }
    }

    /// Returns `true` when `level` is this line's asserted level.
    pub const fn is_asserted(&self, level: LineLevel) -> bool {
        matches!(
            (self.polarity, level),
            (LinePolarity::ActiveHigh, LineLevel::High) | (LinePolarity::ActiveLow, LineLevel::Low)
        )
    }
}

/// Which control lines a board routes to the modem.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LineWiring {
    pub power: Option<LineConfig>,
    pub status: Option<LineConfig>,
    pub reset: Option<LineConfig>,
    pub wake_request: Option<LineConfig>,
}

impl LineWiring {
    /// Wiring with no controllable lines at all.
    pub const fn unwired() -> Self {
        Self {
            power: None,
            status: None,
            reset: None,
            wake_request: None,
        }
    }

    /// Builds wiring from signed pin numbers where a negative pin means the
    /// line is not connected.
    pub const fn from_pins(
        power: (i8, LinePolarity),
        status: (i8, LinePolarity),
        reset: (i8, LinePolarity),
        wake_request: (i8, LinePolarity),
    ) -> Self {
        Self {
            power: wired(power.0, power.1),
            status: wired(status.0, status.1),
            reset: wired(reset.0, reset.1),
            wake_request: wired(wake_request.0, wake_request.1),
        }
    }

    /// Looks up the routing for `line`.
    pub const fn get(&self, line: LineId) -> Option<LineConfig> {
        match line {
            LineId::Power => self.power,
            LineId::Status => self.status,
            LineId::Reset => self.reset,
            LineId::WakeRequest => self.wake_request,
        }
    }

    pub const fn is_wired(&self, line: LineId) -> bool {
        self.get(line).is_some()
    }
}

impl Default for LineWiring {
    fn default() -> Self {
        Self::unwired()
    }
}

const fn wired(pin: i8, polarity: LinePolarity) -> Option<LineConfig> {
    if pin < 0 {
        None
    } else {
        Some(LineConfig::new(pin.unsigned_abs(), polarity))
    }
}

/// Abstraction over the GPIO pins routed to the modem.
///
/// Implementations only move electrical levels; polarity and wiring decisions
/// stay in the core. Calls are never made for lines that [`LineWiring`]
/// reports as unwired.
pub trait LineDriver {
    /// Drives `line` to `level`.
    fn drive(&mut self, line: LineId, level: LineLevel);

    /// Samples the current level of `line`.
    fn sample(&mut self, line: LineId) -> LineLevel;
}

/// Line driver that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopLineDriver;

impl NoopLineDriver {
    pub const fn new() -> Self {
        Self
    }
}

impl LineDriver for NoopLineDriver {
    fn drive(&mut self, _: LineId, _: LineLevel) {}

    fn sample(&mut self, _: LineId) -> LineLevel {
        LineLevel::Low
    }
}
