//! Zone-facing codes: naming, parameters, membership, setpoints, modes.

use crate::address::DeviceId;
use crate::packet::{Packet, Verb};

use super::common::{split_records, temp_be, zone_idx, zone_name};
use super::{invalid, IndexedTemp, PayloadValue};

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneRole {
    pub zone_type: u8,
    pub zone_idxs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneParams {
    pub zone_idx: String,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub local_override: bool,
    pub multi_room_mode: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneDevices {
    pub zone_idx: String,
    pub domain_id: u8,
    pub device: DeviceId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneMode {
    pub zone_idx: String,
    pub setpoint: Option<f64>,
    pub mode: u8,
    pub until: Option<[u8; 6]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixValveParams {
    pub zone_idx: String,
}

pub(super) fn parse_outdoor_sensor(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.is_empty() {
        return Err(invalid(pkt, "empty 0002 payload"));
    }
    Ok(PayloadValue::OutdoorSensor {
        zone_idx: zone_idx(pkt.payload[0]),
    })
}

pub(super) fn parse_zone_name(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 2 {
        return Err(invalid(pkt, "0004 payload too short"));
    }
    Ok(PayloadValue::ZoneName {
        zone_idx: zone_idx(pkt.payload[0]),
        name: zone_name(&pkt.payload[2..]),
    })
}

pub(super) fn parse_system_zones(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    let records = split_records(&pkt.payload, 4, pkt.code, pkt.verb)?;
    let mut roles = Vec::new();
    for rec in records {
        let mask = u16::from_be_bytes([rec[2], rec[3]]);
        let zone_idxs = (0..16u8)
            .filter(|i| mask & (1 << i) != 0)
            .map(zone_idx)
            .collect();
        roles.push(ZoneRole {
            zone_type: rec[1],
            zone_idxs,
        });
    }
    Ok(PayloadValue::SystemZones(roles))
}

pub(super) fn parse_zone_params(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    // A bare `RQ` asking about a zone (no params attached) carries just the
    // zone_idx byte; everything else is one or more 6-byte records.
    if pkt.verb == Verb::Rq && pkt.payload.len() <= 2 {
        let idx = pkt
            .payload
            .first()
            .ok_or_else(|| invalid(pkt, "000A RQ payload is empty"))?;
        return Ok(PayloadValue::ZoneParams(vec![ZoneParams {
            zone_idx: zone_idx(*idx),
            min_temp: None,
            max_temp: None,
            local_override: false,
            multi_room_mode: false,
        }]));
    }
    let records = split_records(&pkt.payload, 6, pkt.code, pkt.verb)?;
    let mut out = Vec::new();
    for rec in records {
        out.push(parse_zone_params_record(rec)?);
    }
    Ok(PayloadValue::ZoneParams(out))
}

fn parse_zone_params_record(rec: &[u8]) -> crate::error::Result<ZoneParams> {
    Ok(ZoneParams {
        zone_idx: zone_idx(rec[0]),
        local_override: rec[1] & 0x01 != 0,
        multi_room_mode: rec[1] & 0x02 != 0,
        min_temp: temp_be(&rec[2..4]),
        max_temp: temp_be(&rec[4..6]),
    })
}

pub(super) fn parse_zone_devices(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    let records = split_records(&pkt.payload, 6, pkt.code, pkt.verb)?;
    let rec = records
        .first()
        .ok_or_else(|| invalid(pkt, "000C has no records"))?;
    Ok(PayloadValue::ZoneDevices(ZoneDevices {
        zone_idx: zone_idx(rec[0]),
        domain_id: rec[2],
        device: DeviceId::from_bytes3([rec[3], rec[4], rec[5]]),
    }))
}

pub(super) fn parse_mixvalve_params(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.is_empty() {
        return Err(invalid(pkt, "empty 1030 payload"));
    }
    Ok(PayloadValue::MixValveParams(MixValveParams {
        zone_idx: zone_idx(pkt.payload[0]),
    }))
}

pub(super) fn parse_window_state(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 3 {
        return Err(invalid(pkt, "12B0 payload too short"));
    }
    let open = match u16::from_be_bytes([pkt.payload[1], pkt.payload[2]]) {
        0x0000 => Some(false),
        0xC800 => Some(true),
        _ => None,
    };
    Ok(PayloadValue::WindowState {
        zone_idx: zone_idx(pkt.payload[0]),
        open,
    })
}

pub(super) fn parse_setpoint(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.verb == Verb::Rq && pkt.payload.len() < 3 {
        let idx = pkt
            .payload
            .first()
            .ok_or_else(|| invalid(pkt, "2309 RQ payload is empty"))?;
        return Ok(PayloadValue::Setpoint(vec![IndexedTemp {
            zone_idx: zone_idx(*idx),
            celsius: None,
        }]));
    }
    let records = split_records(&pkt.payload, 3, pkt.code, pkt.verb)?;
    let mut out = Vec::new();
    for rec in records {
        out.push(IndexedTemp {
            zone_idx: zone_idx(rec[0]),
            celsius: temp_be(&rec[1..3]),
        });
    }
    Ok(PayloadValue::Setpoint(out))
}

pub(super) fn parse_zone_mode(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 7 {
        return Err(invalid(pkt, "2349 payload too short"));
    }
    let until = if pkt.payload.len() >= 13 {
        let mut buf = [0u8; 6];
        buf.copy_from_slice(&pkt.payload[7..13]);
        Some(buf)
    } else {
        None
    };
    Ok(PayloadValue::ZoneMode(ZoneMode {
        zone_idx: zone_idx(pkt.payload[0]),
        setpoint: temp_be(&pkt.payload[1..3]),
        mode: pkt.payload[3],
        until,
    }))
}

pub(super) fn parse_temperature(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.verb == Verb::Rp {
        if pkt.payload.len() < 3 {
            return Err(invalid(pkt, "30C9 RP payload too short"));
        }
        return Ok(PayloadValue::Temperature(vec![IndexedTemp {
            zone_idx: zone_idx(pkt.payload[0]),
            celsius: temp_be(&pkt.payload[1..3]),
        }]));
    }
    if pkt.verb == Verb::Rq && pkt.payload.len() < 3 {
        let idx = pkt
            .payload
            .first()
            .ok_or_else(|| invalid(pkt, "30C9 RQ payload is empty"))?;
        return Ok(PayloadValue::Temperature(vec![IndexedTemp {
            zone_idx: zone_idx(*idx),
            celsius: None,
        }]));
    }
    let records = split_records(&pkt.payload, 3, pkt.code, pkt.verb)?;
    let mut out = Vec::new();
    for rec in records {
        out.push(IndexedTemp {
            zone_idx: zone_idx(rec[0]),
            celsius: temp_be(&rec[1..3]),
        });
    }
    Ok(PayloadValue::Temperature(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn now() -> chrono::DateTime<Local> {
        Local.timestamp_opt(0, 0).unwrap()
    }

    #[test]
    fn s2_temperature_array_in_order() {
        let line = "045  I --- 01:145038 --:------ 01:145038 30C9 009 000847010849 0208C4";
        let pkt = Packet::parse(line, now()).unwrap();
        let PayloadValue::Temperature(v) = parse_temperature(&pkt).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(v[0].zone_idx, "00");
        assert_eq!(v[0].celsius, Some(21.19));
        assert_eq!(v[2].zone_idx, "02");
        assert_eq!(v[2].celsius, Some(22.44));
    }

    #[test]
    fn window_state_decodes_closed() {
        let pkt = Packet::parse(
            "045  I --- 04:000001 --:------ 01:000001 12B0 003 000000",
            now(),
        )
        .unwrap();
        assert_eq!(
            parse_window_state(&pkt).unwrap(),
            PayloadValue::WindowState {
                zone_idx: "00".into(),
                open: Some(false)
            }
        );
    }

    #[test]
    fn window_state_decodes_open() {
        let pkt = Packet::parse(
            "045  I --- 04:000001 --:------ 01:000001 12B0 003 00C800",
            now(),
        )
        .unwrap();
        assert_eq!(
            parse_window_state(&pkt).unwrap(),
            PayloadValue::WindowState {
                zone_idx: "00".into(),
                open: Some(true)
            }
        );
    }
}
