//! HVAC-facing codes: air quality, fan control, UFH circuit setpoints.

use crate::packet::Packet;

use super::common::{split_records, temp_be, zone_idx};
use super::{invalid, IndexedTemp, PayloadValue};

#[derive(Debug, Clone, PartialEq)]
pub struct FanMode {
    pub domain_id: String,
    pub speed: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FanBoost {
    pub domain_id: String,
    pub remaining_minutes: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FanState {
    pub domain_id: String,
    pub exhaust_fan_speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HvacState {
    pub domain_id: String,
    pub co2_level: Option<u16>,
    pub indoor_humidity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UfhSetpoint {
    pub ufh_idx: String,
    pub zone_idx: Option<String>,
    pub setpoint: Option<f64>,
}

pub(super) fn parse_co2(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 3 {
        return Err(invalid(pkt, "1298 payload too short"));
    }
    let raw = u16::from_be_bytes([pkt.payload[1], pkt.payload[2]]);
    Ok(PayloadValue::Co2Level(if raw == 0x7FFF { None } else { Some(raw) }))
}

pub(super) fn parse_humidity(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 2 {
        return Err(invalid(pkt, "12A0 payload too short"));
    }
    Ok(PayloadValue::Humidity(if pkt.payload[1] == 0xFF {
        None
    } else {
        Some(pkt.payload[1] as f64 / 100.0)
    }))
}

pub(super) fn parse_fan_mode(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 2 {
        return Err(invalid(pkt, "22F1 payload too short"));
    }
    Ok(PayloadValue::FanMode(FanMode {
        domain_id: zone_idx(pkt.payload[0]),
        speed: pkt.payload[1],
    }))
}

pub(super) fn parse_fan_boost(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 3 {
        return Err(invalid(pkt, "22F3 payload too short"));
    }
    Ok(PayloadValue::FanBoost(FanBoost {
        domain_id: zone_idx(pkt.payload[0]),
        remaining_minutes: Some(u16::from_be_bytes([pkt.payload[1], pkt.payload[2]])),
    }))
}

pub(super) fn parse_fan_state(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 3 {
        return Err(invalid(pkt, "31D9 payload too short"));
    }
    Ok(PayloadValue::FanState(FanState {
        domain_id: zone_idx(pkt.payload[0]),
        exhaust_fan_speed: if pkt.payload[2] == 0xFF {
            None
        } else {
            Some(pkt.payload[2] as f64 / 200.0)
        },
    }))
}

pub(super) fn parse_hvac_state(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 5 {
        return Err(invalid(pkt, "31DA payload too short"));
    }
    let co2 = u16::from_be_bytes([pkt.payload[1], pkt.payload[2]]);
    Ok(PayloadValue::HvacState(HvacState {
        domain_id: zone_idx(pkt.payload[0]),
        co2_level: if co2 == 0x7FFF { None } else { Some(co2) },
        indoor_humidity: if pkt.payload[3] == 0xFF {
            None
        } else {
            Some(pkt.payload[3] as f64 / 100.0)
        },
    }))
}

pub(super) fn parse_ufh_setpoint(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    // Trailing `0203` trailer (present on some `I` messages) is not a
    // record; strip it before splitting into 6-byte records.
    let mut payload = &pkt.payload[..];
    if payload.len() % 6 == 2 && payload.ends_with(&[0x02, 0x03]) {
        payload = &payload[..payload.len() - 2];
    }
    let records = split_records(payload, 6, pkt.code, pkt.verb)?;
    let mut out = Vec::new();
    for rec in records {
        let zone = rec[1];
        out.push(UfhSetpoint {
            ufh_idx: zone_idx(rec[0]),
            zone_idx: if zone == 0xFF { None } else { Some(zone_idx(zone)) },
            setpoint: temp_be(&rec[2..4]),
        });
    }
    Ok(PayloadValue::UfhSetpoint(out))
}

pub(super) fn parse_setpoint_now(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    let records = split_records(&pkt.payload, 7, pkt.code, pkt.verb)?;
    let mut out = Vec::new();
    for rec in records {
        out.push(IndexedTemp {
            zone_idx: zone_idx(rec[0]),
            celsius: temp_be(&rec[2..4]),
        });
    }
    Ok(PayloadValue::SetpointNow(out))
}

pub(super) fn parse_hvac_system_switch(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    Ok(PayloadValue::HvacSystemSwitch {
        raw: pkt.payload.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn now() -> chrono::DateTime<Local> {
        Local.timestamp_opt(0, 0).unwrap()
    }

    #[test]
    fn co2_decodes_ppm() {
        let pkt = Packet::parse(
            "045  I --- 37:000001 --:------ 37:000001 1298 003 000326",
            now(),
        )
        .unwrap();
        assert_eq!(
            parse_co2(&pkt).unwrap(),
            PayloadValue::Co2Level(Some(0x0326))
        );
    }

    #[test]
    fn co2_null_sentinel() {
        let pkt = Packet::parse(
            "045  I --- 37:000001 --:------ 37:000001 1298 003 007FFF",
            now(),
        )
        .unwrap();
        assert_eq!(parse_co2(&pkt).unwrap(), PayloadValue::Co2Level(None));
    }
}
