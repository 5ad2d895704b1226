//! Operator console shared between firmware and emulator targets.
//!
//! [`grammar`] turns a line into a [`grammar::Command`]; [`commands`]
//! dispatches it onto a modem.

pub mod commands;
pub mod grammar;
