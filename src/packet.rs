//! The packet codec (component B): ASCII line ↔ typed [`Packet`].

use chrono::{DateTime, Local};
use std::fmt;
use std::str::FromStr;

use crate::address::{DeviceId, NUL_DEVICE_ID};
use crate::error::{Error, Result};

/// One of the four RAMSES-II verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum Verb {
    /// `RQ` - request.
    Rq = 0,
    /// ` I` - information broadcast.
    I = 1,
    /// `RP` - reply.
    Rp = 2,
    /// ` W` - write.
    W = 3,
}

impl Verb {
    /// The verb of a matching reply, per the reply-header contract of §4.E
    /// (`RQ` expects `RP`; `W` expects `I`; everything else has no reply).
    pub fn expected_reply(&self) -> Option<Verb> {
        match self {
            Verb::Rq => Some(Verb::Rp),
            Verb::W => Some(Verb::I),
            Verb::I | Verb::Rp => None,
        }
    }

    fn as_wire(&self) -> &'static str {
        match self {
            Verb::Rq => "RQ",
            Verb::I => " I",
            Verb::Rp => "RP",
            Verb::W => " W",
        }
    }
}

impl FromStr for Verb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "RQ" => Ok(Verb::Rq),
            "I" => Ok(Verb::I),
            "RP" => Ok(Verb::Rp),
            "W" => Ok(Verb::W),
            other => Err(Error::InvalidPacket(format!("unknown verb {other:?}"))),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// A decoded wire line, prior to payload interpretation.
#[derive(Debug, Clone)]
pub struct Packet {
    pub dtm: DateTime<Local>,
    pub rssi: u16,
    pub verb: Verb,
    pub seq: Option<u16>,
    pub src: DeviceId,
    pub dst: DeviceId,
    pub code: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Parse one ASCII wire line (without its trailing `\r\n`).
    ///
    /// Lines beginning `!` are evofw3 control flags, not packets; callers
    /// must filter those out before reaching here (see `transport`).
    pub fn parse(line: &str, dtm: DateTime<Local>) -> Result<Packet> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            return Err(Error::InvalidPacket(format!(
                "expected at least 8 whitespace-separated fields, found {}: {line:?}",
                fields.len()
            )));
        }
        let [rssi, verb, seq, addr0, addr1, addr2, code, len] = [
            fields[0], fields[1], fields[2], fields[3], fields[4], fields[5], fields[6],
            fields[7],
        ];
        let rssi: u16 = rssi
            .parse()
            .map_err(|_| Error::InvalidPacket(format!("bad rssi field: {rssi:?}")))?;
        let verb: Verb = verb.parse()?;
        let seq = if seq == "---" {
            None
        } else {
            Some(
                seq.parse()
                    .map_err(|_| Error::InvalidPacket(format!("bad seq field: {seq:?}")))?,
            )
        };
        let a0: DeviceId = addr0.parse()?;
        let a1: DeviceId = addr1.parse()?;
        let a2: DeviceId = addr2.parse()?;
        let (src, dst) = derive_src_dst(a0, a1, a2)?;

        let code = u16::from_str_radix(code, 16)
            .map_err(|_| Error::InvalidPacket(format!("bad code field: {code:?}")))?;

        let declared_len: usize = len
            .parse()
            .map_err(|_| Error::InvalidPacket(format!("bad length field: {len:?}")))?;
        // The payload occupies everything after the length field (index 7),
        // rejoined without the whitespace `split_whitespace` removed.
        let hex = fields[8..].join("");
        if hex.len() != declared_len * 2 {
            return Err(Error::InvalidPayload {
                code,
                verb,
                reason: format!(
                    "length byte {declared_len} implies {} hex chars, found {}",
                    declared_len * 2,
                    hex.len()
                ),
            });
        }
        let payload = hex::decode(&hex)
            .map_err(|e| Error::InvalidPayload {
                code,
                verb,
                reason: format!("non-hex payload: {e}"),
            })?;

        Ok(Packet {
            dtm,
            rssi,
            verb,
            seq,
            src,
            dst,
            code,
            payload,
        })
    }

    pub fn payload_hex(&self) -> String {
        hex::encode_upper(&self.payload)
    }

    /// Serialise back to the ASCII wire line (without `\r\n`).
    ///
    /// The wire supports six legal `(addr0, addr1, addr2)` shapes that all
    /// collapse to the same `(src, dst)` pair once parsed; this always
    /// re-emits the canonical two-address shape (`src, NUL, dst`, or
    /// `src, NUL, src` when `src == dst`). Re-parsing and re-serialising
    /// that canonical form is therefore idempotent, even when the original
    /// line used one of the other five shapes.
    pub fn serialise(&self) -> String {
        let addr2 = if self.src == self.dst { self.src } else { self.dst };
        format!(
            "{:03} {} {} {} {} {} {:04X} {:03} {}",
            self.rssi,
            self.verb,
            self.seq
                .map(|s| format!("{s:03}"))
                .unwrap_or_else(|| "---".into()),
            self.src,
            NUL_DEVICE_ID,
            addr2,
            self.code,
            self.payload.len(),
            self.payload_hex()
        )
    }
}

/// The six legal `(addr0, addr1, addr2) → (src, dst)` rows of §4.B.
fn derive_src_dst(a0: DeviceId, a1: DeviceId, a2: DeviceId) -> Result<(DeviceId, DeviceId)> {
    match (a0.is_null(), a1.is_null(), a2.is_null()) {
        (false, false, true) => Ok((a0, a1)),
        (false, true, false) => Ok((a0, a2)),
        (true, false, false) => Ok((a1, a2)),
        (false, true, true) => Ok((a0, a0)),
        (true, true, false) => Ok((a2, a2)),
        // (addr0, addr1, addr2) all present: addr2 is a courtesy copy of the
        // destination (src impersonation decoding), src=addr0, dst=addr1.
        (false, false, false) => Ok((a0, a1)),
        (true, true, true) => Err(Error::InvalidAddrSet(
            "address set has no real device id".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.timestamp_opt(0, 0).unwrap()
    }

    #[test]
    fn s1_decodes_heat_demand_broadcast() {
        let line = "045  I --- 02:000921 --:------ 01:191718 3150 002 0360";
        let pkt = Packet::parse(line, now()).unwrap();
        assert_eq!(pkt.verb, Verb::I);
        assert_eq!(pkt.src, "02:000921".parse().unwrap());
        assert_eq!(pkt.dst, "01:191718".parse().unwrap());
        assert_eq!(pkt.code, 0x3150);
        assert_eq!(pkt.payload, vec![0x03, 0x60]);
    }

    #[test]
    fn rejects_mismatched_length() {
        let line = "045  I --- 02:000921 --:------ 01:191718 3150 003 0360";
        assert!(Packet::parse(line, now()).is_err());
    }

    #[test]
    fn rejects_invalid_addr_set() {
        let line = "045  I --- --:------ --:------ --:------ 3150 002 0360";
        assert!(Packet::parse(line, now()).is_err());
    }

    #[test]
    fn addr_set_two_real_plus_null_at_pos1() {
        let line = "045  I --- 01:145038 --:------ 01:145038 30C9 003 000847";
        let pkt = Packet::parse(line, now()).unwrap();
        assert_eq!(pkt.src, pkt.dst);
    }

    #[test]
    fn seq_dash_is_none() {
        let line = "045  I --- 02:000921 --:------ 01:191718 3150 002 0360";
        let pkt = Packet::parse(line, now()).unwrap();
        assert_eq!(pkt.seq, None);
    }

    #[test]
    fn serialise_parse_is_idempotent_from_canonical_form() {
        let line = "045  I --- 02:000921 --:------ 01:191718 3150 002 0360";
        let once = Packet::parse(line, now()).unwrap().serialise();
        let twice = Packet::parse(&once, now()).unwrap().serialise();
        assert_eq!(once, twice);
    }

    #[test]
    fn self_addressed_packet_serialises_with_repeated_addr() {
        let line = "045  I --- 01:145038 --:------ 01:145038 30C9 003 000847";
        let pkt = Packet::parse(line, now()).unwrap();
        assert_eq!(pkt.serialise(), line);
    }
}
