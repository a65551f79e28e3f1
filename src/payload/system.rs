//! System-facing codes: mode, sync, datetime, fault log, schedules.

use crate::packet::{Packet, Verb};

use super::common::{temp_be, zone_idx};
use super::{invalid, PayloadValue};

#[derive(Debug, Clone, PartialEq)]
pub struct SystemMode {
    pub mode: u8,
    pub until: Option<[u8; 6]>,
    pub permanent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemDateTime {
    pub second: u8,
    pub minute: u8,
    pub hour: u8,
    pub day: u8,
    pub month: u8,
    pub year: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaultLogEntry {
    pub log_idx: u8,
    pub fault_state: u8,
    pub fault_type: u8,
    pub raw: Vec<u8>,
}

/// A 0404 fragment's wire-format fields only (§"Non-goals": fragment
/// assembly into a full schedule is out of scope here).
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleFragment {
    pub zone_idx: String,
    pub frag_number: u8,
    pub total_frags: u8,
    pub data: Vec<u8>,
}

pub(super) fn parse_schedule_version(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.verb == Verb::Rq {
        return Ok(PayloadValue::ScheduleVersion { version: 0 });
    }
    if pkt.payload.len() < 4 {
        return Err(invalid(pkt, "0006 RP payload too short"));
    }
    Ok(PayloadValue::ScheduleVersion {
        version: u32::from_be_bytes([0, 0, pkt.payload[2], pkt.payload[3]]),
    })
}

pub(super) fn parse_schedule_fragment(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 7 {
        return Err(invalid(pkt, "0404 payload too short"));
    }
    Ok(PayloadValue::ScheduleFragment(ScheduleFragment {
        zone_idx: zone_idx(pkt.payload[0]),
        frag_number: pkt.payload[3],
        total_frags: pkt.payload[4],
        data: pkt.payload[7..].to_vec(),
    }))
}

pub(super) fn parse_system_fault(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.verb == Verb::Rq {
        return Ok(PayloadValue::SystemFault(FaultLogEntry {
            log_idx: pkt.payload.get(2).copied().unwrap_or(0),
            fault_state: 0,
            fault_type: 0,
            raw: Vec::new(),
        }));
    }
    if pkt.payload.len() < 4 {
        return Err(invalid(pkt, "0418 I payload too short"));
    }
    Ok(PayloadValue::SystemFault(FaultLogEntry {
        log_idx: pkt.payload[2],
        fault_state: pkt.payload[1],
        fault_type: pkt.payload[3],
        raw: pkt.payload.clone(),
    }))
}

pub(super) fn parse_outdoor_temp(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 3 {
        return Err(invalid(pkt, "1290 payload too short"));
    }
    Ok(PayloadValue::OutdoorTemp(temp_be(&pkt.payload[1..3])))
}

pub(super) fn parse_system_sync(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 3 {
        return Ok(PayloadValue::SystemSync {
            remaining_seconds: None,
        });
    }
    Ok(PayloadValue::SystemSync {
        remaining_seconds: Some(u16::from_be_bytes([pkt.payload[1], pkt.payload[2]])),
    })
}

pub(super) fn parse_system_mode(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 8 {
        return Err(invalid(pkt, "2E04 payload too short"));
    }
    let mut until = [0u8; 6];
    until.copy_from_slice(&pkt.payload[1..7]);
    Ok(PayloadValue::SystemMode(SystemMode {
        mode: pkt.payload[0],
        until: Some(until),
        permanent: pkt.payload[7] == 0x01,
    }))
}

pub(super) fn parse_datetime(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.payload.len() < 9 {
        return Err(invalid(pkt, "313F payload too short"));
    }
    Ok(PayloadValue::DateTime(SystemDateTime {
        second: pkt.payload[1],
        minute: pkt.payload[2],
        hour: pkt.payload[3] & 0x7F,
        day: pkt.payload[5],
        month: pkt.payload[6],
        year: u16::from_be_bytes([pkt.payload[7], pkt.payload[8]]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn now() -> chrono::DateTime<Local> {
        Local.timestamp_opt(0, 0).unwrap()
    }

    #[test]
    fn outdoor_temp_decodes() {
        let pkt = Packet::parse(
            "045  I --- 17:000001 --:------ 01:000001 1290 003 000076",
            now(),
        )
        .unwrap();
        let PayloadValue::OutdoorTemp(t) = parse_outdoor_temp(&pkt).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(t, Some(1.18));
    }
}
