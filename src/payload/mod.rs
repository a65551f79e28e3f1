//! Payload parsers (component C): typed frame → decoded [`Message`].

pub mod common;
pub mod device;
pub mod hvac;
pub mod opentherm;
pub mod relay;
pub mod system;
pub mod zone;

use crate::address::DeviceId;
use crate::catalogue;
use crate::error::{Error, Result};
use crate::packet::{Packet, Verb};

/// A decoded message: the packet it came from, plus its typed payload.
/// The decoder is pure over its inputs and never produces a partial
/// [`Message`] on failure (§3): a parse failure is always a typed
/// [`Error`], not a half-populated value.
#[derive(Debug, Clone)]
pub struct Message {
    pub dtm: chrono::DateTime<chrono::Local>,
    pub verb: Verb,
    pub src: DeviceId,
    pub dst: DeviceId,
    pub code: u16,
    pub value: PayloadValue,
    /// Set once this message absorbed one or more later array fragments
    /// (§4.J step 4); a merged message's `value` holds every seen index.
    pub merged_fragments: bool,
}

/// One entry of a `1FC9` bind offer/accept/confirm payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BindEntry {
    pub idx: String,
    pub code: u16,
    pub device: DeviceId,
}

/// A per-index value lifted from an array code (`zone_idx` or domain byte,
/// plus the code-specific payload for that index).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedTemp {
    pub zone_idx: String,
    pub celsius: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedFraction {
    pub zone_idx: String,
    pub fraction: Option<f64>,
}

/// The decoded value of a [`Message`]. Grouped loosely by theme; see
/// `payload/{zone,device,relay,system,hvac,opentherm}.rs` for the parsers.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    ZoneName { zone_idx: String, name: String },
    SystemZones(Vec<zone::ZoneRole>),
    ZoneParams(Vec<zone::ZoneParams>),
    ZoneDevices(zone::ZoneDevices),
    Setpoint(Vec<IndexedTemp>),
    ZoneMode(zone::ZoneMode),
    Temperature(Vec<IndexedTemp>),
    WindowState { zone_idx: String, open: Option<bool> },
    MixValveParams(zone::MixValveParams),

    Battery(device::Battery),
    DeviceInfo(device::DeviceInfo),
    Bind(Vec<BindEntry>),
    DhwParams(device::DhwParams),
    DhwMode(device::DhwMode),
    RfCheck { signal_strength: Option<u8> },
    Language { code: String },

    RelayDemand(IndexedFraction),
    RelayFailsafe(Vec<relay::RelayFailsafeEntry>),
    TpiParams(relay::TpiParams),
    ActuatorState(relay::ActuatorState),
    ActuatorCycle(relay::ActuatorCycle),
    ActuatorSync { domain_or_zone: String },
    HeatDemand(Vec<IndexedFraction>),

    SystemMode(system::SystemMode),
    SystemSync { remaining_seconds: Option<u16> },
    DateTime(system::SystemDateTime),
    SystemFault(system::FaultLogEntry),
    ScheduleVersion { version: u32 },
    ScheduleFragment(system::ScheduleFragment),
    OutdoorSensor { zone_idx: String },
    OutdoorTemp(Option<f64>),

    Co2Level(Option<u16>),
    Humidity(Option<f64>),
    FanMode(hvac::FanMode),
    FanBoost(hvac::FanBoost),
    FanState(hvac::FanState),
    HvacState(hvac::HvacState),
    UfhSetpoint(Vec<hvac::UfhSetpoint>),
    SetpointNow(Vec<IndexedTemp>),
    HvacSystemSwitch { raw: Vec<u8> },

    OpenTherm(opentherm::OpenThermMessage),

    /// A code outside the closed catalogue, or one whose payload matched no
    /// verb-specific regex: stored verbatim, never taken down the
    /// dispatcher (§7).
    Opaque(Vec<u8>),
}

/// Decode one [`Packet`] into a [`Message`].
///
/// Unknown codes, and codes whose payload fails their catalogue regex for
/// the packet's verb, decode to [`PayloadValue::Opaque`] rather than
/// failing outright — per §7, "unknown codes are parsed only up to framing
/// and stored as opaque; they never take down the dispatcher". A payload
/// whose *length* contract was already violated was rejected earlier, in
/// [`Packet::parse`].
pub fn decode(pkt: &Packet) -> Result<Message> {
    let value = decode_value(pkt)?;
    Ok(Message {
        dtm: pkt.dtm,
        verb: pkt.verb,
        src: pkt.src,
        dst: pkt.dst,
        code: pkt.code,
        value,
        merged_fragments: false,
    })
}

fn decode_value(pkt: &Packet) -> Result<PayloadValue> {
    let Some(def) = catalogue::lookup(pkt.code) else {
        return Ok(PayloadValue::Opaque(pkt.payload.clone()));
    };
    let Some(re) = def.regex_for(pkt.verb) else {
        return Ok(PayloadValue::Opaque(pkt.payload.clone()));
    };
    if !re.is_match(&pkt.payload_hex()) {
        return Ok(PayloadValue::Opaque(pkt.payload.clone()));
    }

    match pkt.code {
        0x0002 => zone::parse_outdoor_sensor(pkt),
        0x0004 => zone::parse_zone_name(pkt),
        0x0005 => zone::parse_system_zones(pkt),
        0x0006 => system::parse_schedule_version(pkt),
        0x0008 => relay::parse_relay_demand(pkt),
        0x0009 => relay::parse_relay_failsafe(pkt),
        0x000A => zone::parse_zone_params(pkt),
        0x000C => zone::parse_zone_devices(pkt),
        0x0016 => device::parse_rf_check(pkt),
        0x0100 => device::parse_language(pkt),
        0x0404 => system::parse_schedule_fragment(pkt),
        0x0418 => system::parse_system_fault(pkt),
        0x10A0 => device::parse_dhw_params(pkt),
        0x10E0 => device::parse_device_info(pkt),
        0x1030 => zone::parse_mixvalve_params(pkt),
        0x1060 => device::parse_battery(pkt),
        0x1100 => relay::parse_tpi_params(pkt),
        0x1260 => device::parse_dhw_temp(pkt),
        0x1290 => system::parse_outdoor_temp(pkt),
        0x1298 => hvac::parse_co2(pkt),
        0x12A0 => hvac::parse_humidity(pkt),
        0x12B0 => zone::parse_window_state(pkt),
        0x1F09 => system::parse_system_sync(pkt),
        0x1F41 => device::parse_dhw_mode(pkt),
        0x1FC9 => device::parse_bind(pkt),
        0x2249 => hvac::parse_setpoint_now(pkt),
        0x22C9 => hvac::parse_ufh_setpoint(pkt),
        0x22D0 => hvac::parse_hvac_system_switch(pkt),
        0x22F1 => hvac::parse_fan_mode(pkt),
        0x22F3 => hvac::parse_fan_boost(pkt),
        0x2309 => zone::parse_setpoint(pkt),
        0x2349 => zone::parse_zone_mode(pkt),
        0x2E04 => system::parse_system_mode(pkt),
        0x30C9 => zone::parse_temperature(pkt),
        0x313F => system::parse_datetime(pkt),
        0x3150 => relay::parse_heat_demand(pkt),
        0x31D9 => hvac::parse_fan_state(pkt),
        0x31DA => hvac::parse_hvac_state(pkt),
        0x3220 => opentherm::parse(pkt),
        0x3B00 => relay::parse_actuator_sync(pkt),
        0x3EF0 => relay::parse_actuator_state(pkt),
        0x3EF1 => relay::parse_actuator_cycle(pkt),
        _ => Ok(PayloadValue::Opaque(pkt.payload.clone())),
    }
}

/// Attempt to merge a later array fragment into an earlier one (§4.J step
/// 4). Only `I` messages of identical `(code, src)` within the dispatcher's
/// 3-second window are offered to this function; it returns `false` (no
/// merge) for non-array codes or a code/verb mismatch.
pub fn try_merge(into: &mut Message, other: &Message) -> bool {
    if into.code != other.code || into.verb != other.verb || into.src != other.src {
        return false;
    }
    if !catalogue::is_array_code(into.code) {
        return false;
    }
    let merged = match (&mut into.value, &other.value) {
        (PayloadValue::Temperature(a), PayloadValue::Temperature(b)) => {
            merge_indexed(a, b);
            true
        }
        (PayloadValue::Setpoint(a), PayloadValue::Setpoint(b)) => {
            merge_indexed(a, b);
            true
        }
        (PayloadValue::SetpointNow(a), PayloadValue::SetpointNow(b)) => {
            merge_indexed(a, b);
            true
        }
        (PayloadValue::HeatDemand(a), PayloadValue::HeatDemand(b)) => {
            merge_fraction(a, b);
            true
        }
        (PayloadValue::ZoneParams(a), PayloadValue::ZoneParams(b)) => {
            for item in b {
                if !a.iter().any(|e| e.zone_idx == item.zone_idx) {
                    a.push(item.clone());
                }
            }
            true
        }
        _ => false,
    };
    if merged {
        into.merged_fragments = true;
    }
    merged
}

fn merge_indexed(a: &mut Vec<IndexedTemp>, b: &[IndexedTemp]) {
    for item in b {
        if !a.iter().any(|e| e.zone_idx == item.zone_idx) {
            a.push(item.clone());
        }
    }
}

fn merge_fraction(a: &mut Vec<IndexedFraction>, b: &[IndexedFraction]) {
    for item in b {
        if !a.iter().any(|e| e.zone_idx == item.zone_idx) {
            a.push(item.clone());
        }
    }
}

pub(crate) fn invalid(pkt: &Packet, reason: impl Into<String>) -> Error {
    Error::InvalidPayload {
        code: pkt.code,
        verb: pkt.verb,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> chrono::DateTime<chrono::Local> {
        chrono::Local.timestamp_opt(0, 0).unwrap()
    }

    #[test]
    fn s1_heat_demand_decodes_to_expected_fraction() {
        let pkt = Packet::parse(
            "045  I --- 02:000921 --:------ 01:191718 3150 002 0360",
            now(),
        )
        .unwrap();
        let msg = decode(&pkt).unwrap();
        match msg.value {
            PayloadValue::HeatDemand(v) => {
                assert_eq!(v.len(), 1);
                assert_eq!(v[0].zone_idx, "03");
                assert_eq!(v[0].fraction, Some(0.375));
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn s2_temperature_array_decodes_three_zones_in_order() {
        let line = "045  I --- 01:145038 --:------ 01:145038 30C9 009 000847010849 0208C4";
        let pkt = Packet::parse(line, now()).unwrap();
        let msg = decode(&pkt).unwrap();
        match msg.value {
            PayloadValue::Temperature(v) => {
                assert_eq!(
                    v,
                    vec![
                        IndexedTemp { zone_idx: "00".into(), celsius: Some(21.19) },
                        IndexedTemp { zone_idx: "01".into(), celsius: Some(21.21) },
                        IndexedTemp { zone_idx: "02".into(), celsius: Some(22.44) },
                    ]
                );
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn unknown_code_decodes_opaque() {
        let pkt = Packet::parse(
            "045  I --- 02:000921 --:------ 01:191718 7FFF 002 0360",
            now(),
        )
        .unwrap();
        let msg = decode(&pkt).unwrap();
        assert!(matches!(msg.value, PayloadValue::Opaque(_)));
    }
}
