//! The `3220` OpenTherm sub-protocol: boiler-bridge request/reply frames.

use crate::packet::{Packet, Verb};

use super::{invalid, PayloadValue};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpenThermMsgType {
    ReadAck,
    WriteAck,
    DataInvalid,
    UnknownDataId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenThermMessage {
    pub data_id: u8,
    pub raw_value: u16,
    /// The OpenTherm `f8.8` fixed-point reading of `raw_value`, the
    /// encoding used by most temperature- and ratio-valued data-ids.
    pub f8_8: f64,
    pub msg_type: Option<OpenThermMsgType>,
}

pub(super) fn parse(pkt: &Packet) -> crate::error::Result<PayloadValue> {
    if pkt.verb == Verb::Rq {
        if pkt.payload.len() < 2 {
            return Err(invalid(pkt, "3220 RQ payload too short"));
        }
        return Ok(PayloadValue::OpenTherm(OpenThermMessage {
            data_id: pkt.payload[1],
            raw_value: 0,
            f8_8: 0.0,
            msg_type: None,
        }));
    }
    if pkt.payload.len() < 5 {
        return Err(invalid(pkt, "3220 RP payload too short"));
    }
    let raw_value = u16::from_be_bytes([pkt.payload[2], pkt.payload[3]]);
    let msg_type = match pkt.payload[4] {
        0x00 => Some(OpenThermMsgType::ReadAck),
        0x10 => Some(OpenThermMsgType::WriteAck),
        0x20 => Some(OpenThermMsgType::DataInvalid),
        0x30 => Some(OpenThermMsgType::UnknownDataId),
        _ => None,
    };
    Ok(PayloadValue::OpenTherm(OpenThermMessage {
        data_id: pkt.payload[1],
        raw_value,
        f8_8: raw_value as i16 as f64 / 256.0,
        msg_type,
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
    fn reply_decodes_data_id_and_f8_8_value() {
        let pkt = Packet::parse(
            "045 RP --- 10:000001 18:000730 10:000001 3220 005 0019190000",
            now(),
        )
        .unwrap();
        let PayloadValue::OpenTherm(m) = parse(&pkt).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(m.data_id, 0x19);
        assert_eq!(m.raw_value, 0x1900);
        assert_eq!(m.msg_type, Some(OpenThermMsgType::ReadAck));
    }
}
