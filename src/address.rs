//! Device-id parsing and the device-type → role slug table (component A).

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The null/no-device sentinel `--:------`.
pub const NUL_DEVICE_ID: DeviceId = DeviceId {
    dev_type: 0,
    serial: 0,
    is_null: true,
};

/// The broadcast sentinel `63:262142`.
pub const BROADCAST_DEVICE_ID: DeviceId = DeviceId {
    dev_type: 63,
    serial: 262_142,
    is_null: false,
};

/// A RAMSES-II device identifier, `TT:NNNNNN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
#[serde(try_from = "String")]
pub struct DeviceId {
    dev_type: u8,
    serial: u32,
    is_null: bool,
}

impl TryFrom<String> for DeviceId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl DeviceId {
    pub fn new(dev_type: u8, serial: u32) -> Self {
        DeviceId {
            dev_type,
            serial,
            is_null: false,
        }
    }

    pub const fn is_null(&self) -> bool {
        self.is_null
    }

    pub fn is_broadcast(&self) -> bool {
        *self == BROADCAST_DEVICE_ID
    }

    pub fn dev_type(&self) -> u8 {
        self.dev_type
    }

    /// Decode a device id from its 3-byte binary form, used inside array
    /// payloads (`000C`, `1FC9`, ...): `dev_type << 18 | serial`. All-`0xFF`
    /// is the binary "no device" sentinel and maps to [`NUL_DEVICE_ID`].
    pub fn from_bytes3(bytes: [u8; 3]) -> DeviceId {
        if bytes == [0xFF, 0xFF, 0xFF] {
            return NUL_DEVICE_ID;
        }
        let value = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
        DeviceId {
            dev_type: (value >> 18) as u8,
            serial: value & 0x3_FFFF,
            is_null: false,
        }
    }

    /// Inverse of [`DeviceId::from_bytes3`].
    pub fn to_bytes3(&self) -> [u8; 3] {
        if self.is_null {
            return [0xFF, 0xFF, 0xFF];
        }
        let value = ((self.dev_type as u32) << 18) | (self.serial & 0x3_FFFF);
        let b = value.to_be_bytes();
        [b[1], b[2], b[3]]
    }

    /// The device's default role slug from the type table, or `None` if the
    /// type prefix has no mapping (caller should fall back to `DEV`).
    pub fn default_role(&self) -> Option<DeviceRole> {
        if self.is_null {
            return None;
        }
        DEVICE_TYPE_TABLE.get(&self.dev_type).copied()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null {
            write!(f, "--:------")
        } else {
            write!(f, "{:02}:{:06}", self.dev_type, self.serial)
        }
    }
}

impl FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "--:------" {
            return Ok(NUL_DEVICE_ID);
        }
        let (tt, nnnnnn) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidAddrSet(format!("malformed device id: {s}")))?;
        if tt.len() != 2 || nnnnnn.len() != 6 {
            return Err(Error::InvalidAddrSet(format!(
                "device id has wrong field widths: {s}"
            )));
        }
        let dev_type: u8 = tt
            .parse()
            .map_err(|_| Error::InvalidAddrSet(format!("non-numeric device type: {s}")))?;
        let serial: u32 = nnnnnn
            .parse()
            .map_err(|_| Error::InvalidAddrSet(format!("non-numeric serial: {s}")))?;
        if serial > 999_999 {
            return Err(Error::InvalidAddrSet(format!(
                "serial out of range: {s}"
            )));
        }
        Ok(DeviceId {
            dev_type,
            serial,
            is_null: false,
        })
    }
}

/// Device roles. `Dev` is the generic fallback for an unmapped type prefix.
/// Promotable roles (see §4.G) start generic and may be upgraded in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    /// 01/12/22/23 - evohome/Hometronics/programmer controller.
    Ctl,
    /// 02 - underfloor heating controller (HCE80/HCC80).
    Ufc,
    /// 03 - generic sensor (thermostat-ish, promotable).
    Thm,
    /// 04 - thermostatic radiator valve.
    Trv,
    /// 07 - DHW sensor.
    Dhw,
    /// 10 - OpenTherm bridge.
    Otb,
    /// 13 - wireless relay (BDR91).
    Bdr,
    /// 17 - external (outdoor) sensor.
    Ext,
    /// 18 - this gateway's own HGI80/evofw3 identity.
    Hgi,
    /// 23 - zone programmer (shares the controller role family).
    Prg,
    /// 30 - RFG100 Internet gateway, or (post-promotion) a HVAC fan.
    Rfg,
    /// 32/37 - HVAC ventilation unit (promotable to Fan/Co2/Hum/Swi).
    Hvc,
    /// 34 - roundish thermostat (promotable to controller).
    Thermostat,
    /// CO2 sensor (HVAC, promoted from Dev/Hvc).
    Co2,
    /// Humidity sensor (HVAC, promoted from Dev/Hvc).
    Hum,
    /// Fan-speed switch (HVAC, promoted from Dev/Hvc).
    Swi,
    /// Ventilation fan unit (HVAC, promoted from Dev/Hvc/Rfg).
    Fan,
    /// Generic device with no more specific role yet known.
    Dev,
}

impl DeviceRole {
    /// Roles whose promotion is driven by verb/code fingerprints (§4.G).
    pub fn is_promotable(&self) -> bool {
        matches!(
            self,
            DeviceRole::Dev | DeviceRole::Rfg | DeviceRole::Hvc | DeviceRole::Thermostat
        )
    }

    /// Types that can become controllers of a TemperatureControlSystem.
    pub fn is_controller_capable(&self) -> bool {
        matches!(
            self,
            DeviceRole::Ctl | DeviceRole::Prg | DeviceRole::Thermostat
        )
    }

    pub fn is_fakeable(&self) -> bool {
        matches!(
            self,
            DeviceRole::Bdr | DeviceRole::Ext | DeviceRole::Dhw | DeviceRole::Thm
        )
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self,
            DeviceRole::Trv | DeviceRole::Thm | DeviceRole::Dhw | DeviceRole::Ext
        )
    }
}

static DEVICE_TYPE_TABLE: Lazy<HashMap<u8, DeviceRole>> = Lazy::new(|| {
    use DeviceRole::*;
    HashMap::from([
        (1, Ctl),
        (2, Ufc),
        (3, Thm),
        (4, Trv),
        (7, Dhw),
        (10, Otb),
        (12, Ctl),
        (13, Bdr),
        (17, Ext),
        (18, Hgi),
        (22, Ctl),
        (23, Prg),
        (30, Rfg),
        (32, Hvc),
        (34, Thermostat),
        (37, Hvc),
    ])
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_ids() {
        assert_eq!(
            "01:145038".parse::<DeviceId>().unwrap(),
            DeviceId::new(1, 145_038)
        );
        assert_eq!("--:------".parse::<DeviceId>().unwrap(), NUL_DEVICE_ID);
        assert!(NUL_DEVICE_ID.is_null());
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!("1:145038".parse::<DeviceId>().is_err());
        assert!("01:14503".parse::<DeviceId>().is_err());
        assert!("AB:145038".parse::<DeviceId>().is_err());
    }

    #[test]
    fn default_roles_match_table() {
        assert_eq!(
            DeviceId::new(1, 1).default_role(),
            Some(DeviceRole::Ctl)
        );
        assert_eq!(DeviceId::new(34, 1).default_role(), Some(DeviceRole::Thermostat));
        assert_eq!(DeviceId::new(99, 1).default_role(), None);
    }

    #[test]
    fn display_roundtrips() {
        let id: DeviceId = "13:163733".parse().unwrap();
        assert_eq!(id.to_string(), "13:163733");
    }

    #[test]
    fn bytes3_decodes_broadcast_id() {
        assert_eq!(DeviceId::from_bytes3([0xFF, 0xFF, 0xFE]), BROADCAST_DEVICE_ID);
        assert_eq!(BROADCAST_DEVICE_ID.to_bytes3(), [0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn bytes3_all_ff_is_null() {
        assert!(DeviceId::from_bytes3([0xFF, 0xFF, 0xFF]).is_null());
        assert_eq!(NUL_DEVICE_ID.to_bytes3(), [0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn bytes3_roundtrips_ordinary_id() {
        let id = DeviceId::new(1, 145_038);
        assert_eq!(DeviceId::from_bytes3(id.to_bytes3()), id);
    }
}
