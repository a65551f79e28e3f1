//! Shared decode helpers used by the per-code payload parsers.

use crate::error::{Error, Result};
use crate::packet::Verb;

/// `zone_idx`/domain byte rendered the way the wire and logs show it:
/// two uppercase hex digits (`00`..`0F` for heat zones, or a domain byte
/// like `FC`/`FA`/`F9`/`FF`).
pub fn zone_idx(byte: u8) -> String {
    format!("{byte:02X}")
}

/// Decode a big-endian signed centi-celsius pair; `0x7FFF` is the "no
/// sensor"/null-report sentinel used throughout the heat codes.
pub fn temp_be(bytes: &[u8]) -> Option<f64> {
    if bytes.len() < 2 {
        return None;
    }
    let raw = i16::from_be_bytes([bytes[0], bytes[1]]);
    if raw == 0x7FFF_u16 as i16 {
        None
    } else {
        Some(raw as f64 / 100.0)
    }
}

/// A single byte scaled `0..=0xC8` (200) to a `0.0..=1.0` fraction, the
/// scale used by window/actuator/relay-style percentage fields. `0xFF` is
/// "unknown".
pub fn fraction_200(byte: u8) -> Option<f64> {
    if byte == 0xFF {
        None
    } else {
        Some(byte as f64 / 200.0)
    }
}

/// A single byte scaled `0..=0xFF` (256) to a `0.0..=1.0` fraction; used by
/// `3150` heat-demand, whose reported value (e.g. `0x60` → `0.375`) is the
/// raw byte over 256, not over 200 like the actuator/window percentages.
pub fn fraction_256(byte: u8) -> f64 {
    byte as f64 / 256.0
}

/// Decode a 20-byte UTF-16BE, `0x7F`-terminated zone name (code `0004`).
pub fn zone_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0x007F && u != 0x0000)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Split an array-code payload into fixed-size, index-prefixed records.
/// Fails with [`Error::InvalidPayload`] if the payload length is not a
/// whole multiple of `record_len`.
pub fn split_records<'a>(
    payload: &'a [u8],
    record_len: usize,
    code: u16,
    verb: Verb,
) -> Result<Vec<&'a [u8]>> {
    if record_len == 0 || payload.len() % record_len != 0 {
        return Err(Error::InvalidPayload {
            code,
            verb,
            reason: format!(
                "payload length {} is not a multiple of record length {record_len}",
                payload.len()
            ),
        });
    }
    Ok(payload.chunks_exact(record_len).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_matches_s2_scenario() {
        assert_eq!(temp_be(&[0x08, 0x47]), Some(21.19));
        assert_eq!(temp_be(&[0x08, 0x49]), Some(21.21));
        assert_eq!(temp_be(&[0x08, 0xC4]), Some(22.44));
    }

    #[test]
    fn temp_null_sentinel() {
        assert_eq!(temp_be(&[0x7F, 0xFF]), None);
    }

    #[test]
    fn heat_demand_matches_s1_scenario() {
        assert_eq!(fraction_256(0x60), 0.375);
    }

    #[test]
    fn zone_idx_formats_two_hex_digits() {
        assert_eq!(zone_idx(0x03), "03");
        assert_eq!(zone_idx(0xFC), "FC");
    }
}
