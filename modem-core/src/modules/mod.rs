//! Reference module families.
//!
//! A family is data: a [`ModuleProfile`] plus the AT dialect it speaks.
//! [`FamilyDriver`] turns any [`AtSession`] into a [`ModuleDriver`] for that
//! family, answering `Unavailable` for capabilities the family lacks without
//! touching the session.

pub mod sara_r4;
pub mod sim7000;
pub mod xbee;

use core::time::Duration;

use crate::at::{AtDialect, AtSession};
use crate::capability::{
    BatteryState, Capability, FailureReason, ModemIdentity, ModuleDriver, ModuleProfile,
    RegistrationStatus, SignalQuality, Temperature,
};

/// One supported module family.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Family {
    pub profile: ModuleProfile,
    pub dialect: AtDialect,
}

/// Every family shipped with the crate.
pub const FAMILIES: [Family; 3] = [sim7000::FAMILY, sara_r4::FAMILY, xbee::FAMILY];

/// Looks up a family by its short name (`sim7000`, `sara-r4`, `xbee`).
pub fn find(name: &str) -> Option<Family> {
    FAMILIES
        .iter()
        .copied()
        .find(|family| family.profile.name.eq_ignore_ascii_case(name))
}

/// [`ModuleDriver`] for one family over an AT session.
pub struct FamilyDriver<S> {
    profile: ModuleProfile,
    session: S,
}

impl<S> FamilyDriver<S>
where
    S: AtSession,
{
    pub const fn new(profile: ModuleProfile, session: S) -> Self {
        Self { profile, session }
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S> ModuleDriver for FamilyDriver<S>
where
    S: AtSession,
{
    fn profile(&self) -> &ModuleProfile {
        &self.profile
    }

    fn did_at_respond(&mut self) -> bool {
        self.session.test()
    }

    fn extra_setup(&mut self) -> Result<ModemIdentity, FailureReason> {
        if !self.session.init() {
            return Err(FailureReason::Rejected);
        }
        Ok(self
            .session
            .model_name()
            .unwrap_or_else(|| ModemIdentity::new(self.profile.name)))
    }

    fn power_off(&mut self) -> bool {
        self.session.power_off()
    }

    fn signal_quality(&mut self) -> Capability<SignalQuality> {
        self.session.signal_quality()
    }

    fn battery_state(&mut self) -> Capability<BatteryState> {
        if self.profile.has_battery {
            self.session.battery()
        } else {
            Capability::Unavailable
        }
    }

    fn temperature(&mut self) -> Capability<Temperature> {
        if self.profile.has_temperature {
            self.session.temperature()
        } else {
            Capability::Unavailable
        }
    }

    fn registration_status(&mut self) -> Capability<RegistrationStatus> {
        self.session.registration()
    }

    fn activate_data_session(&mut self, apn: &str) -> bool {
        self.session.activate_data_session(apn)
    }

    fn deactivate_data_session(&mut self) -> bool {
        self.session.deactivate_data_session()
    }

    fn data_session_active(&mut self) -> bool {
        self.session.data_session_active()
    }

    fn query_time_server(&mut self, timeout: Duration) -> Capability<[u8; 4]> {
        self.session.query_time_server(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_family_has_a_valid_timing_profile() {
        for family in FAMILIES {
            assert_eq!(family.profile.timing.validate(), Ok(()), "{}", family.profile.name);
        }
    }

    #[test]
    fn families_are_found_case_insensitively() {
        assert_eq!(find("SIM7000"), Some(sim7000::FAMILY));
        assert_eq!(find("sara-r4"), Some(sara_r4::FAMILY));
        assert_eq!(find("unknown"), None);
    }
}
