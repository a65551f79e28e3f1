//! Per-device message history: the latest value seen for each code, and a
//! reply-correlation index keyed by `(code, verb)`. Expiry is lazy — an
//! entry past its catalogue [`catalogue::Ttl`] is treated as absent by
//! readers but only actually dropped the next time this code is touched.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::catalogue::{self, Ttl};
use crate::packet::Verb;
use crate::payload::Message;

#[derive(Debug)]
struct Entry {
    message: Message,
    recorded_at: Instant,
}

#[derive(Debug, Default)]
pub struct MessageStore {
    latest_by_code: HashMap<u16, Entry>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message as the latest-seen value for its code.
    pub fn record(&mut self, message: Message) {
        let code = message.code;
        self.latest_by_code.insert(
            code,
            Entry {
                message,
                recorded_at: Instant::now(),
            },
        );
    }

    /// The latest message for `code`, or `None` if absent or expired.
    pub fn latest(&self, code: u16) -> Option<&Message> {
        let entry = self.latest_by_code.get(&code)?;
        if is_expired(code, entry.recorded_at) {
            None
        } else {
            Some(&entry.message)
        }
    }

    /// The latest message for `code` only if it was also sent with `verb`
    /// — used by the send engine to correlate a reply against the command
    /// that solicited it.
    pub fn latest_matching(&self, code: u16, verb: Verb) -> Option<&Message> {
        self.latest(code).filter(|m| m.verb == verb)
    }

    /// Drop every entry whose catalogue TTL has elapsed. Call this
    /// periodically; reads are already TTL-aware without it.
    pub fn evict_expired(&mut self) {
        self.latest_by_code
            .retain(|code, entry| !is_expired(*code, entry.recorded_at));
    }
}

/// Fallback TTL for a catalogued code that declares no explicit one
/// (`Ttl::After(None)`), and for any code outside the catalogue entirely.
const FALLBACK_TTL: Duration = Duration::from_secs(60 * 5);

fn is_expired(code: u16, recorded_at: Instant) -> bool {
    let ttl = catalogue::lookup(code).map(|d| d.ttl);
    match ttl {
        None | Some(Ttl::After(None)) => recorded_at.elapsed() > FALLBACK_TTL,
        Some(Ttl::Never) => false,
        Some(Ttl::After(Some(d))) => recorded_at.elapsed() > d,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::DeviceId;
    use crate::payload::PayloadValue;
    use chrono::{Local, TimeZone};

    fn msg(code: u16) -> Message {
        Message {
            dtm: Local.timestamp_opt(0, 0).unwrap(),
            verb: Verb::I,
            src: DeviceId::new(1, 1),
            dst: DeviceId::new(1, 1),
            code,
            value: PayloadValue::Opaque(vec![]),
            merged_fragments: false,
        }
    }

    #[test]
    fn records_and_reads_back_latest() {
        let mut store = MessageStore::new();
        store.record(msg(0x30C9));
        assert!(store.latest(0x30C9).is_some());
        assert!(store.latest(0x0000).is_none());
    }

    #[test]
    fn never_expiring_code_stays_readable() {
        let mut store = MessageStore::new();
        store.record(msg(0x000C)); // zone_devices: Ttl::Never
        assert!(store.latest(0x000C).is_some());
    }
}
