//! Diagnostic readings taken from a ready modem.

use crate::capability::{BatteryState, Capability, SignalQuality, Temperature};

/// One snapshot of the module's own measurements.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModemMetadata {
    pub signal: Capability<SignalQuality>,
    pub battery: Capability<BatteryState>,
    pub temperature: Capability<Temperature>,
}

impl ModemMetadata {
    /// RSSI in dBm, or `None` when no reading was obtained.
    pub fn rssi_dbm(&self) -> Option<i16> {
        self.signal.supported().map(|signal| signal.rssi_dbm)
    }

    pub fn signal_percent(&self) -> Option<u8> {
        self.signal.supported().map(|signal| signal.percent)
    }
}
