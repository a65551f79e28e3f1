//! The entity graph (component E): devices, temperature-control systems,
//! and the zones/DHW/UFH circuits they own.
//!
//! Rather than the teacher's `Rc<RefCell<Node>>` ownership graph, entities
//! here are held in flat, `DeviceId`-keyed maps on [`EntityGraph`] and
//! referred to by id — closer to an arena than an object graph, per this
//! system's own design note that parent/controller links are handles, not
//! owning references.

pub mod device;
pub mod store;
pub mod system;

use std::collections::HashMap;

use crate::address::DeviceId;
use crate::error::{Error, Result};
use crate::packet::Verb;

pub use device::Device;
pub use store::MessageStore;
pub use system::TemperatureControlSystem;

#[derive(Default)]
pub struct EntityGraph {
    pub devices: HashMap<DeviceId, Device>,
    pub systems: HashMap<DeviceId, TemperatureControlSystem>,
    pub stores: HashMap<DeviceId, MessageStore>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create a [`Device`] node for `id`.
    pub fn device_mut(&mut self, id: DeviceId) -> &mut Device {
        self.devices.entry(id).or_insert_with(|| Device::new(id))
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    /// Apply the §4.G promotion fingerprint for a message from `src`,
    /// creating the device node if this is the first time it's been seen.
    pub fn observe(&mut self, src: DeviceId, verb: Verb, code: u16) -> bool {
        self.device_mut(src).promote(verb, code)
    }

    /// Get-or-create the [`TemperatureControlSystem`] rooted at
    /// `controller`. Refuses if `controller` is a known device with a role
    /// that can't head a system.
    pub fn system_mut(&mut self, controller: DeviceId) -> Result<&mut TemperatureControlSystem> {
        if let Some(dev) = self.devices.get(&controller) {
            if !dev.role.is_controller_capable() {
                return Err(Error::CorruptState(format!(
                    "{controller} has role {:?}, which cannot head a system",
                    dev.role
                )));
            }
        }
        Ok(self
            .systems
            .entry(controller)
            .or_insert_with(|| TemperatureControlSystem::new(controller)))
    }

    pub fn store_mut(&mut self, id: DeviceId) -> &mut MessageStore {
        self.stores.entry(id).or_insert_with(MessageStore::new)
    }
}
