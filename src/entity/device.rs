//! The [`Device`] node: identity, promotable role, and the controller it
//! currently answers to.

use crate::address::{DeviceId, DeviceRole};
use crate::catalogue;
use crate::packet::Verb;

/// One device seen on the network. `role` starts at the type-table default
/// (or [`DeviceRole::Dev`] for an unmapped prefix) and is promoted in
/// place as fingerprinting evidence arrives (§4.G); promotion never
/// demotes a role once set.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub role: DeviceRole,
    pub controller: Option<DeviceId>,
    pub battery_low: Option<bool>,
    pub last_seen: Option<chrono::DateTime<chrono::Local>>,
    /// Installed by [`crate::gateway::Gateway::create_fake_bdr`] (and its
    /// `_ext`/`_thm` siblings) rather than discovered on the wire.
    pub faked: bool,
}

impl Device {
    pub fn new(id: DeviceId) -> Self {
        Device {
            role: id.default_role().unwrap_or(DeviceRole::Dev),
            id,
            controller: None,
            battery_low: None,
            last_seen: None,
            faked: false,
        }
    }

    /// A fresh faked device of `role`, as installed by `create_fake_*`
    /// (§3 Lifecycle: "evicts and recreates a faked device of the same
    /// type").
    pub fn new_faked(id: DeviceId, role: DeviceRole) -> Self {
        Device {
            role,
            faked: true,
            ..Device::new(id)
        }
    }

    /// Apply the §4.G promotion fingerprint for a `(verb, code)` pair seen
    /// from this device. Returns `true` if the role actually changed.
    ///
    /// Only [`DeviceRole::is_promotable`] roles are ever upgraded; the
    /// upgrade target is inferred from the catalogue's controller-promotion
    /// code set and a handful of HVAC-specific codes the original system
    /// treats as live fingerprints of a more specific role.
    pub fn promote(&mut self, verb: Verb, code: u16) -> bool {
        if !self.role.is_promotable() {
            return false;
        }
        let target = match (self.role, code) {
            (_, c) if catalogue::CONTROLLER_PROMOTION_CODES.contains(&c) => {
                Some(DeviceRole::Ctl)
            }
            (DeviceRole::Hvc | DeviceRole::Rfg, 0x31D9 | 0x31DA) if verb == Verb::I => {
                Some(DeviceRole::Fan)
            }
            (DeviceRole::Hvc, 0x1298) => Some(DeviceRole::Co2),
            (DeviceRole::Hvc, 0x12A0) => Some(DeviceRole::Hum),
            (DeviceRole::Hvc, 0x22F1 | 0x22F3) => Some(DeviceRole::Swi),
            (DeviceRole::Thermostat, 0x2E04) if verb == Verb::I || verb == Verb::W => {
                Some(DeviceRole::Ctl)
            }
            _ => None,
        };
        match target {
            Some(new_role) if new_role != self.role => {
                self.role = new_role;
                true
            }
            _ => false,
        }
    }

    /// Bind this device to a controller. Refuses (leaves state unchanged)
    /// if it is already bound to a *different* controller — devices never
    /// silently switch parents (§4.G invariant).
    pub fn bind_controller(&mut self, controller: DeviceId) -> crate::error::Result<()> {
        match self.controller {
            Some(existing) if existing != controller => {
                Err(crate::error::Error::CorruptState(format!(
                    "{} already bound to {existing}, refusing rebind to {controller}",
                    self.id
                )))
            }
            _ => {
                self.controller = Some(controller);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_device_promotes_to_controller_on_fingerprint_code() {
        let mut d = Device::new(DeviceId::new(34, 1));
        assert_eq!(d.role, DeviceRole::Thermostat);
        assert!(d.promote(Verb::I, 0x1F09));
        assert_eq!(d.role, DeviceRole::Ctl);
    }

    #[test]
    fn non_promotable_role_is_unaffected() {
        let mut d = Device::new(DeviceId::new(4, 1));
        assert_eq!(d.role, DeviceRole::Trv);
        assert!(!d.promote(Verb::I, 0x1F09));
        assert_eq!(d.role, DeviceRole::Trv);
    }

    #[test]
    fn new_faked_marks_device_faked_with_given_role() {
        let d = Device::new_faked(DeviceId::new(13, 1), DeviceRole::Bdr);
        assert!(d.faked);
        assert_eq!(d.role, DeviceRole::Bdr);
    }

    #[test]
    fn rebind_to_different_controller_is_refused() {
        let mut d = Device::new(DeviceId::new(4, 1));
        d.bind_controller(DeviceId::new(1, 1)).unwrap();
        assert!(d.bind_controller(DeviceId::new(1, 2)).is_err());
        assert_eq!(d.controller, Some(DeviceId::new(1, 1)));
    }
}
