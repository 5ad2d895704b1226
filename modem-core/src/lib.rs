#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

// Modem power, wake and connectivity lifecycle for battery-powered loggers.
//
// Portable across MCU firmware and host tooling: no standard library, and all
// timing is driven by caller-supplied instants.

pub mod at;
pub mod capability;
pub mod connectivity;
pub mod console;
pub mod error;
pub mod lifecycle;
pub mod lines;
pub mod metadata;
pub mod modules;
pub mod power;
pub mod status;
pub mod telemetry;
pub mod timing;
