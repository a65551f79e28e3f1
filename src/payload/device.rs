//! Device-facing codes: identity, battery, RF health, DHW, binding.

use crate::address::DeviceId;
use crate::packet::{Packet, Verb};

use super::common::{split_records, temp_be, zone_idx};
use super::{invalid, BindEntry, IndexedTemp, PayloadValue};

#[derive(Debug, Clone, PartialEq)]
pub struct Battery {
    pub level: Option<f64>,
    pub low: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DhwParams {
    pub dhw_idx: String,
    pub setpoint: Option<f64>,
    pub overrun_minutes: Option<u8>,
    pub differential: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DhwMode {
    pub dhw_idx: String,
    pub active: Option<bool>,
    pub mode: u8,
    pub until: Option<[u8; 6]>,
}

pub(super) fn parse_rf_check(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.verb == Verb::Rq {
        return Ok(PayloadValue::RfCheck {
            signal_strength: None,
        });
    }
    if pkt.payload.len() < 2 {
        return Err(invalid(pkt, "0016 RP payload too short"));
    }
    Ok(PayloadValue::RfCheck {
        signal_strength: Some(pkt.payload[1]),
    })
}

pub(super) fn parse_language(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 3 {
        return Ok(PayloadValue::Language { code: String::new() });
    }
    let code = String::from_utf8_lossy(&pkt.payload[1..3]).into_owned();
    Ok(PayloadValue::Language { code })
}

pub(super) fn parse_dhw_params(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 2 {
        return Err(invalid(pkt, "10A0 payload too short"));
    }
    let overrun_minutes = pkt.payload.get(1).copied();
    let setpoint = if pkt.payload.len() >= 4 {
        temp_be(&pkt.payload[2..4])
    } else {
        None
    };
    let differential = if pkt.payload.len() >= 5 {
        Some(pkt.payload[4] as f64 / 10.0)
    } else {
        None
    };
    Ok(PayloadValue::DhwParams(DhwParams {
        dhw_idx: zone_idx(pkt.payload[0]),
        setpoint,
        overrun_minutes,
        differential,
    }))
}

pub(super) fn parse_device_info(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    Ok(PayloadValue::DeviceInfo(DeviceInfo {
        raw: pkt.payload.clone(),
    }))
}

pub(super) fn parse_battery(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 3 {
        return Err(invalid(pkt, "1060 payload too short"));
    }
    let level = if pkt.payload[1] == 0xFF {
        None
    } else {
        Some(pkt.payload[1] as f64 / 200.0)
    };
    Ok(PayloadValue::Battery(Battery {
        level,
        low: pkt.payload[2] == 0x00,
    }))
}

pub(super) fn parse_dhw_temp(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.verb == Verb::Rq {
        let idx = pkt.payload.first().copied().unwrap_or(0);
        return Ok(PayloadValue::Temperature(vec![IndexedTemp {
            zone_idx: zone_idx(idx),
            celsius: None,
        }]));
    }
    if pkt.payload.len() < 3 {
        return Err(invalid(pkt, "1260 payload too short"));
    }
    Ok(PayloadValue::Temperature(vec![IndexedTemp {
        zone_idx: zone_idx(pkt.payload[0]),
        celsius: temp_be(&pkt.payload[1..3]),
    }]))
}

pub(super) fn parse_dhw_mode(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.verb == Verb::Rq {
        let idx = pkt.payload.first().copied().unwrap_or(0);
        return Ok(PayloadValue::DhwMode(DhwMode {
            dhw_idx: zone_idx(idx),
            active: None,
            mode: 0,
            until: None,
        }));
    }
    if pkt.payload.len() < 6 {
        return Err(invalid(pkt, "1F41 payload too short"));
    }
    let active = match pkt.payload[1] {
        0x00 => Some(false),
        0x01 => Some(true),
        _ => None,
    };
    let until = if pkt.payload.len() >= 12 {
        let mut buf = [0u8; 6];
        buf.copy_from_slice(&pkt.payload[6..12]);
        Some(buf)
    } else {
        None
    };
    Ok(PayloadValue::DhwMode(DhwMode {
        dhw_idx: zone_idx(pkt.payload[0]),
        active,
        mode: pkt.payload[2],
        until,
    }))
}

/// `1FC9` offer/accept/confirm: records of `(domain_id, code_hi, code_lo,
/// dev0, dev1, dev2)`.
pub(super) fn parse_bind(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload == [0x00] {
        return Ok(PayloadValue::Bind(Vec::new()));
    }
    let records = split_records(&pkt.payload, 6, pkt.code, pkt.verb)?;
    let mut out = Vec::new();
    for rec in records {
        out.push(BindEntry {
            idx: zone_idx(rec[0]),
            code: u16::from_be_bytes([rec[1], rec[2]]),
            device: DeviceId::from_bytes3([rec[3], rec[4], rec[5]]),
        });
    }
    Ok(PayloadValue::Bind(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn now() -> chrono::DateTime<Local> {
        Local.timestamp_opt(0, 0).unwrap()
    }

    #[test]
    fn battery_decodes_level_and_low_flag() {
        let pkt = Packet::parse(
            "045  I --- 04:000001 --:------ 04:000001 1060 003 00C800",
            now(),
        )
        .unwrap();
        let PayloadValue::Battery(b) = parse_battery(&pkt).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(b.level, Some(1.0));
        assert!(!b.low);
    }

    #[test]
    fn dhw_temp_decodes_three_byte_payload() {
        let pkt = Packet::parse(
            "045  I --- 07:000001 --:------ 01:000001 1260 003 0002EE",
            now(),
        )
        .unwrap();
        let PayloadValue::Temperature(v) = parse_dhw_temp(&pkt).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(v[0].zone_idx, "00");
        assert_eq!(v[0].celsius, Some(7.5));
    }

    #[test]
    fn bind_offer_decodes_device_and_code() {
        let pkt = Packet::parse(
            "045  I --- 04:000001 --:------ 04:000001 1FC9 006 0030C904E0D0",
            now(),
        )
        .unwrap();
        let PayloadValue::Bind(entries) = parse_bind(&pkt).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].code, 0x30C9);
    }
}
