//! The heat side of the entity graph: a controller's zones, DHW, and UFH
//! circuits.

use crate::address::DeviceId;
use crate::error::{Error, Result};

/// The wire format caps a controller at 12 zone indices (`00`..`0B`); `0C`
/// is reserved for UFH, `FA`-`FF` are domain bytes.
pub const MAX_ZONES: usize = 12;

#[derive(Debug, Clone)]
pub struct Zone {
    pub idx: String,
    pub name: Option<String>,
    pub sensor: Option<DeviceId>,
    pub actuators: Vec<DeviceId>,
}

impl Zone {
    pub fn new(idx: impl Into<String>) -> Self {
        Zone {
            idx: idx.into(),
            name: None,
            sensor: None,
            actuators: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dhw {
    pub sensor: Option<DeviceId>,
    pub relay: Option<DeviceId>,
    pub setpoint: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct UfhCircuit {
    pub ufh_idx: String,
    pub zone_idx: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TemperatureControlSystem {
    pub controller: DeviceId,
    pub zones: Vec<Zone>,
    pub dhw: Option<Dhw>,
    pub ufh_circuits: Vec<UfhCircuit>,
    pub heat_demand: Option<f64>,
}

impl TemperatureControlSystem {
    pub fn new(controller: DeviceId) -> Self {
        TemperatureControlSystem {
            controller,
            zones: Vec::new(),
            dhw: None,
            ufh_circuits: Vec::new(),
            heat_demand: None,
        }
    }

    pub fn zone(&self, idx: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.idx == idx)
    }

    /// Get-or-create a zone by index; refuses to grow past [`MAX_ZONES`]
    /// distinct zones.
    pub fn zone_mut(&mut self, idx: &str) -> Result<&mut Zone> {
        if let Some(pos) = self.zones.iter().position(|z| z.idx == idx) {
            return Ok(&mut self.zones[pos]);
        }
        if self.zones.len() >= MAX_ZONES {
            return Err(Error::CorruptState(format!(
                "system {} already has {MAX_ZONES} zones, refusing to add {idx}",
                self.controller
            )));
        }
        self.zones.push(Zone::new(idx));
        Ok(self.zones.last_mut().unwrap())
    }

    /// Add or update a UFH circuit's zone mapping. Per §9's resolution of
    /// the UfhController discovery open question: monotonic add-only, with
    /// removal only on an explicit zero-bit `0005` report for that
    /// `ufh_idx` (handled by the caller, not here).
    pub fn upsert_ufh_circuit(&mut self, ufh_idx: &str, zone_idx: Option<String>) {
        if let Some(c) = self.ufh_circuits.iter_mut().find(|c| c.ufh_idx == ufh_idx) {
            c.zone_idx = zone_idx;
        } else {
            self.ufh_circuits.push(UfhCircuit {
                ufh_idx: ufh_idx.to_string(),
                zone_idx,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_mut_creates_then_reuses() {
        let mut tcs = TemperatureControlSystem::new(DeviceId::new(1, 1));
        tcs.zone_mut("00").unwrap().name = Some("Lounge".into());
        assert_eq!(tcs.zone("00").unwrap().name.as_deref(), Some("Lounge"));
        assert_eq!(tcs.zones.len(), 1);
    }

    #[test]
    fn zone_mut_refuses_past_max_zones() {
        let mut tcs = TemperatureControlSystem::new(DeviceId::new(1, 1));
        for i in 0..MAX_ZONES {
            tcs.zone_mut(&format!("{i:02X}")).unwrap();
        }
        assert!(tcs.zone_mut("0C").is_err());
    }

    #[test]
    fn ufh_circuit_upsert_is_add_only_from_here() {
        let mut tcs = TemperatureControlSystem::new(DeviceId::new(2, 1));
        tcs.upsert_ufh_circuit("00", Some("03".into()));
        tcs.upsert_ufh_circuit("00", Some("04".into()));
        assert_eq!(tcs.ufh_circuits.len(), 1);
        assert_eq!(tcs.ufh_circuits[0].zone_idx.as_deref(), Some("04"));
    }
}
