//! The `1FC9` bind handshake (component G): offer → accept → confirm.
//!
//! A binding device announces the codes it wants to exchange; the
//! controller (or another device) accepts a subset of them; the
//! originator confirms. Each leg has its own 3-second reply window under
//! a 300-second umbrella covering the whole handshake.

use std::time::Duration;

use crate::address::DeviceId;
use crate::payload::BindEntry;

/// The fixed set of codes this system will bind on behalf of a requesting
/// device; anything else in an offer is accepted at the wire level but
/// never actually subscribed to.
pub const SUPPORTED_REQUEST_CODES: &[u16] = &[0x0002, 0x1260, 0x1290, 0x30C9];

pub const REPLY_WINDOW: Duration = Duration::from_secs(3);
pub const UMBRELLA_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    Unbound,
    Listening,
    Offering,
    Accepting,
    Confirming,
    Bound,
    Expired,
}

/// One in-progress or completed handshake, tracked from whichever side
/// this gateway is playing.
#[derive(Debug, Clone)]
pub struct Binder {
    pub peer: Option<DeviceId>,
    pub state: BindState,
    pub offered: Vec<BindEntry>,
    pub accepted: Vec<BindEntry>,
    started_at: Option<std::time::Instant>,
}

impl Default for Binder {
    fn default() -> Self {
        Binder {
            peer: None,
            state: BindState::Unbound,
            offered: Vec::new(),
            accepted: Vec::new(),
            started_at: None,
        }
    }
}

impl Binder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin offering (`I`, this device is the originator of the bind
    /// request) with the given codes.
    pub fn start_offering(&mut self, offered: Vec<BindEntry>) {
        self.state = BindState::Offering;
        self.offered = offered;
        self.accepted.clear();
        self.peer = None;
        self.started_at = Some(std::time::Instant::now());
    }

    /// Begin listening (`RQ`/passive side, waiting for someone else's
    /// offer) for a bind request.
    pub fn start_listening(&mut self) {
        self.state = BindState::Listening;
        self.started_at = Some(std::time::Instant::now());
    }

    /// Process an inbound offer while listening. Accepts only the
    /// intersection of `offer` with [`SUPPORTED_REQUEST_CODES`].
    pub fn on_offer(&mut self, from: DeviceId, offer: Vec<BindEntry>) -> Vec<BindEntry> {
        if self.state != BindState::Listening {
            return Vec::new();
        }
        let accepted: Vec<BindEntry> = offer
            .into_iter()
            .filter(|e| SUPPORTED_REQUEST_CODES.contains(&e.code))
            .collect();
        self.peer = Some(from);
        self.accepted = accepted.clone();
        self.state = BindState::Accepting;
        accepted
    }

    /// Process an inbound accept (as the originator, after `start_offering`).
    pub fn on_accept(&mut self, from: DeviceId, accepted: Vec<BindEntry>) {
        if self.state != BindState::Offering {
            return;
        }
        self.peer = Some(from);
        self.accepted = accepted;
        self.state = BindState::Confirming;
    }

    /// Process an inbound confirm (as the acceptor, after `on_offer`), or
    /// send one (as the originator, after `on_accept`) via the same call:
    /// either way the handshake is complete once both sides have reached
    /// here.
    pub fn on_confirm(&mut self, from: DeviceId) -> bool {
        if self.peer != Some(from) {
            return false;
        }
        if matches!(self.state, BindState::Accepting | BindState::Confirming) {
            self.state = BindState::Bound;
            true
        } else {
            false
        }
    }

    /// True once [`UMBRELLA_TIMEOUT`] has elapsed since the handshake
    /// began without reaching [`BindState::Bound`].
    pub fn check_umbrella_timeout(&mut self) -> bool {
        if self.state == BindState::Bound || self.state == BindState::Unbound {
            return false;
        }
        let Some(started) = self.started_at else {
            return false;
        };
        if started.elapsed() > UMBRELLA_TIMEOUT {
            self.state = BindState::Expired;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: u16, device: DeviceId) -> BindEntry {
        BindEntry {
            idx: "00".into(),
            code,
            device,
        }
    }

    #[test]
    fn offer_is_filtered_to_supported_codes() {
        let mut binder = Binder::new();
        binder.start_listening();
        let offerer = DeviceId::new(4, 1);
        let accepted = binder.on_offer(
            offerer,
            vec![entry(0x30C9, offerer), entry(0x12B0, offerer)],
        );
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].code, 0x30C9);
        assert_eq!(binder.state, BindState::Accepting);
    }

    #[test]
    fn full_handshake_reaches_bound() {
        let mut originator = Binder::new();
        let acceptor_id = DeviceId::new(1, 1);
        let originator_id = DeviceId::new(4, 1);
        originator.start_offering(vec![entry(0x30C9, originator_id)]);
        originator.on_accept(acceptor_id, vec![entry(0x30C9, originator_id)]);
        assert_eq!(originator.state, BindState::Confirming);
        assert!(originator.on_confirm(acceptor_id));
        assert_eq!(originator.state, BindState::Bound);
    }

    #[test]
    fn confirm_from_unexpected_peer_is_ignored() {
        let mut originator = Binder::new();
        let acceptor_id = DeviceId::new(1, 1);
        let stranger = DeviceId::new(1, 2);
        originator.start_offering(vec![]);
        originator.on_accept(acceptor_id, vec![]);
        assert!(!originator.on_confirm(stranger));
        assert_eq!(originator.state, BindState::Confirming);
    }
}
