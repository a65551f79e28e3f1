//! The discovery scheduler (component H): periodic `RQ` polling of each
//! known device's schema, params, and status codes, tiered by how often
//! they change and jittered so a large system doesn't thunder-herd.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::address::DeviceId;
use crate::entity::MessageStore;
use crate::payload::opentherm::OpenThermMsgType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Rarely-changing identity facts: `0004`, `000A`, `000C`, `10E0`.
    Schema,
    /// Occasionally-changing configuration: `1100`, `10A0`, `2309` bounds.
    Params,
    /// Frequently-changing live readings: `30C9`, `3150`, `12A0`.
    Status,
}

impl Tier {
    pub fn base_interval(&self) -> Duration {
        match self {
            Tier::Schema => Duration::from_secs(60 * 60 * 24),
            Tier::Params => Duration::from_secs(60 * 60),
            Tier::Status => Duration::from_secs(60 * 3),
        }
    }

    pub fn codes(&self) -> &'static [u16] {
        match self {
            Tier::Schema => &[0x0004, 0x000A, 0x000C, 0x10E0],
            Tier::Params => &[0x1100, 0x10A0, 0x2309],
            Tier::Status => &[0x30C9, 0x3150, 0x12A0],
        }
    }
}

struct Scheduled {
    next_due: Instant,
}

/// Consecutive `Data-Invalid`/`Unknown-DataId` replies for a DataID before
/// it's declared unsupported and dropped from polling (§8 S5).
const OT_INVALID_THRESHOLD: u8 = 2;

/// Per-device inferred support for OpenTherm (`3220`) DataIDs, built up
/// from observed replies rather than a fixed table — not every OTB
/// implements every DataID.
#[derive(Default)]
pub struct OtbSchema {
    observed: HashSet<u8>,
    invalid_streak: HashMap<u8, u8>,
    unsupported: HashSet<u8>,
}

impl OtbSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one `3220` reply's message type for `data_id`. At most one
    /// "newly unsupported" event is ever reported per DataID (§8's
    /// quantified invariant: "recorded as unsupported at most once").
    pub fn record_reply(&mut self, data_id: u8, msg_type: Option<OpenThermMsgType>) {
        self.observed.insert(data_id);
        if self.unsupported.contains(&data_id) {
            return;
        }
        match msg_type {
            Some(OpenThermMsgType::DataInvalid) | Some(OpenThermMsgType::UnknownDataId) => {
                let streak = self.invalid_streak.entry(data_id).or_insert(0);
                *streak = streak.saturating_add(1);
                if *streak >= OT_INVALID_THRESHOLD {
                    self.unsupported.insert(data_id);
                }
            }
            _ => {
                self.invalid_streak.remove(&data_id);
            }
        }
    }

    pub fn is_supported(&self, data_id: u8) -> bool {
        !self.unsupported.contains(&data_id)
    }

    /// Every DataID seen so far that hasn't been inferred unsupported —
    /// what the discovery scheduler still polls, and what an application
    /// would expose as `opentherm_schema`.
    pub fn opentherm_schema(&self) -> Vec<u8> {
        let mut schema: Vec<u8> = self
            .observed
            .iter()
            .copied()
            .filter(|id| !self.unsupported.contains(id))
            .collect();
        schema.sort_unstable();
        schema
    }
}

/// One device's poll schedule across all three tiers.
pub struct DeviceSchedule {
    entries: HashMap<(Tier, u16), Scheduled>,
}

impl DeviceSchedule {
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        let now = Instant::now();
        for tier in [Tier::Schema, Tier::Params, Tier::Status] {
            for &code in tier.codes() {
                entries.insert(
                    (tier, code),
                    Scheduled {
                        next_due: now + jittered(tier.base_interval()),
                    },
                );
            }
        }
        DeviceSchedule { entries }
    }

    /// Codes due to poll right now for `device`, given its current store —
    /// a code already fresh in the store (within its catalogue TTL) is
    /// suppressed rather than polled again, mirroring the original
    /// discovery loop's "already_fresh" short-circuit.
    pub fn due_now(&mut self, store: &MessageStore) -> Vec<u16> {
        let now = Instant::now();
        let mut due = Vec::new();
        for ((tier, code), sched) in self.entries.iter_mut() {
            if sched.next_due > now {
                continue;
            }
            sched.next_due = now + jittered(tier.base_interval());
            if store.latest(*code).is_some() {
                continue; // already fresh, skip this round
            }
            due.push(*code);
        }
        due
    }
}

impl Default for DeviceSchedule {
    fn default() -> Self {
        Self::new()
    }
}

/// OpenTherm status DataIDs this system polls an OTB for until inferred
/// unsupported (§4.I "OT status DataIDs"): flame status, boiler/DHW
/// setpoints and temperatures, modulation level, and relative humidity.
pub const OT_STATUS_DATA_IDS: &[u8] = &[0x00, 0x01, 0x11, 0x12, 0x19, 0x1A, 0x1C];

/// A full system's discovery schedules, one per known device.
#[derive(Default)]
pub struct Discovery {
    schedules: HashMap<DeviceId, DeviceSchedule>,
    otb_schemas: HashMap<DeviceId, OtbSchema>,
}

impl Discovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_for(&mut self, id: DeviceId) -> &mut DeviceSchedule {
        self.schedules.entry(id).or_insert_with(DeviceSchedule::new)
    }

    pub fn forget(&mut self, id: DeviceId) {
        self.schedules.remove(&id);
        self.otb_schemas.remove(&id);
    }

    pub fn otb_schema_mut(&mut self, id: DeviceId) -> &mut OtbSchema {
        self.otb_schemas.entry(id).or_insert_with(OtbSchema::new)
    }

    pub fn otb_schema(&self, id: DeviceId) -> Option<&OtbSchema> {
        self.otb_schemas.get(&id)
    }

    /// OT status DataIDs still worth polling for `id`: every candidate in
    /// [`OT_STATUS_DATA_IDS`] not yet inferred unsupported.
    pub fn due_otb_data_ids(&mut self, id: DeviceId) -> Vec<u8> {
        let schema = self.otb_schema_mut(id);
        OT_STATUS_DATA_IDS
            .iter()
            .copied()
            .filter(|data_id| schema.is_supported(*data_id))
            .collect()
    }
}

/// +/-10% jitter so devices with identical tiers don't all poll together.
fn jittered(base: Duration) -> Duration {
    let jitter_pct = rand::thread_rng().gen_range(-10i64..=10);
    let millis = base.as_millis() as i64;
    let delta = millis * jitter_pct / 100;
    Duration::from_millis((millis + delta).max(0) as u64)
}
