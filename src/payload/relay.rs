//! Relay/actuator-facing codes: demand, failsafe, TPI params, heat demand.

use crate::packet::{Packet, Verb};

use super::common::{fraction_200, fraction_256, split_records, zone_idx};
use super::{invalid, IndexedFraction, PayloadValue};

#[derive(Debug, Clone, PartialEq)]
pub struct RelayFailsafeEntry {
    pub domain_id: String,
    pub failsafe_enabled: bool,
    pub failsafe_on: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TpiParams {
    pub domain_id: String,
    pub cycle_rate_per_hour: u8,
    pub min_on_off_minutes: f64,
    pub proportional_band: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorState {
    pub modulation_level: Option<f64>,
    pub flags: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorCycle {
    pub percent_on: Option<f64>,
    pub raw: Vec<u8>,
}

pub(super) fn parse_relay_demand(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 2 {
        return Err(invalid(pkt, "0008 payload too short"));
    }
    Ok(PayloadValue::RelayDemand(IndexedFraction {
        zone_idx: zone_idx(pkt.payload[0]),
        fraction: fraction_200(pkt.payload[1]),
    }))
}

pub(super) fn parse_relay_failsafe(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    let records = split_records(&pkt.payload, 3, pkt.code, pkt.verb)?;
    let mut out = Vec::new();
    for rec in records {
        out.push(RelayFailsafeEntry {
            domain_id: zone_idx(rec[0]),
            failsafe_enabled: rec[1] == 0x01,
            failsafe_on: rec[2] == 0xFF,
        });
    }
    Ok(PayloadValue::RelayFailsafe(out))
}

pub(super) fn parse_tpi_params(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.verb == Verb::Rq && pkt.payload.len() <= 1 {
        let idx = pkt.payload.first().copied().unwrap_or(0xFC);
        return Ok(PayloadValue::TpiParams(TpiParams {
            domain_id: zone_idx(idx),
            cycle_rate_per_hour: 0,
            min_on_off_minutes: 0.0,
            proportional_band: false,
        }));
    }
    if pkt.payload.len() < 5 {
        return Err(invalid(pkt, "1100 payload too short"));
    }
    Ok(PayloadValue::TpiParams(TpiParams {
        domain_id: zone_idx(pkt.payload[0]),
        cycle_rate_per_hour: pkt.payload[1],
        min_on_off_minutes: pkt.payload[2] as f64 / 4.0,
        proportional_band: pkt.payload[4] == 0xFF,
    }))
}

pub(super) fn parse_actuator_sync(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.is_empty() {
        return Err(invalid(pkt, "3B00 payload is empty"));
    }
    Ok(PayloadValue::ActuatorSync {
        domain_or_zone: zone_idx(pkt.payload[0]),
    })
}

pub(super) fn parse_actuator_state(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 2 {
        return Err(invalid(pkt, "3EF0 payload too short"));
    }
    Ok(PayloadValue::ActuatorState(ActuatorState {
        modulation_level: fraction_200(pkt.payload[1]),
        flags: pkt.payload[2..].to_vec(),
    }))
}

pub(super) fn parse_actuator_cycle(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    let percent_on = pkt.payload.get(6).copied().and_then(fraction_200);
    Ok(PayloadValue::ActuatorCycle(ActuatorCycle {
        percent_on,
        raw: pkt.payload.clone(),
    }))
}

pub(super) fn parse_heat_demand(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    let records = split_records(&pkt.payload, 2, pkt.code, pkt.verb)?;
    let mut out = Vec::new();
    for rec in records {
        out.push(IndexedFraction {
            zone_idx: zone_idx(rec[0]),
            fraction: Some(fraction_256(rec[1])),
        });
    }
    Ok(PayloadValue::HeatDemand(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn now() -> chrono::DateTime<Local> {
        Local.timestamp_opt(0, 0).unwrap()
    }

    #[test]
    fn s1_heat_demand_matches_scenario() {
        let pkt = Packet::parse(
            "045  I --- 02:000921 --:------ 01:191718 3150 002 0360",
            now(),
        )
        .unwrap();
        let PayloadValue::HeatDemand(v) = parse_heat_demand(&pkt).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(v[0].zone_idx, "03");
        assert_eq!(v[0].fraction, Some(0.375));
    }

    #[test]
    fn relay_demand_decodes_fraction() {
        let pkt = Packet::parse(
            "045  I --- 13:000001 --:------ 13:000001 0008 002 00C8",
            now(),
        )
        .unwrap();
        let PayloadValue::RelayDemand(f) = parse_relay_demand(&pkt).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(f.fraction, Some(1.0));
    }
}
