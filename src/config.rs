//! Gateway configuration (out of scope: loading/parsing from a file or
//! CLI args — only the struct external code is expected to deserialize
//! into and hand to [`crate::gateway::Gateway::start`]).

use serde::Deserialize;

use crate::address::DeviceId;

fn default_max_zones() -> usize {
    crate::entity::system::MAX_ZONES
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Never actually write to the transport; useful for passive
    /// monitoring or replay-driven tests.
    pub disable_sending: bool,
    /// Don't run the discovery scheduler at all.
    pub disable_discovery: bool,
    /// Allow creating device/system entities purely from traffic observed
    /// on the wire, without ever having sent them a command ourselves.
    pub enable_eavesdrop: bool,
    /// Reject traffic from devices not present in `include_list`.
    pub enforce_known_list: bool,
    pub max_zones: usize,
    /// Trade completeness for throughput: skip array-fragment joining and
    /// some non-essential catalogue codes under heavy traffic.
    pub reduce_processing: bool,
    pub include_list: Vec<DeviceId>,
    pub exclude_list: Vec<DeviceId>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            disable_sending: false,
            disable_discovery: false,
            enable_eavesdrop: true,
            enforce_known_list: false,
            max_zones: default_max_zones(),
            reduce_processing: false,
            include_list: Vec::new(),
            exclude_list: Vec::new(),
        }
    }
}

impl Config {
    /// Whether traffic naming `id` should be admitted into the entity
    /// graph at all (§6 filter semantics: exclude wins over include when
    /// both are non-empty and both name the same id).
    pub fn admits(&self, id: DeviceId) -> bool {
        if self.exclude_list.contains(&id) {
            return false;
        }
        if self.enforce_known_list || !self.include_list.is_empty() {
            return self.include_list.contains(&id);
        }
        true
    }
}
