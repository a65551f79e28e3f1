//! The message dispatcher (component I): wire line → validated, routed
//! [`Message`], with array-fragment joining and src/dst role checking.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{trace, warn};

use crate::catalogue;
use crate::config::Config;
use crate::entity::EntityGraph;
use crate::error::Result;
use crate::packet::{Packet, Verb};
use crate::payload::{self, Message};
use crate::transport::RawLine;

/// Array-code `I` fragments from the same `(code, src)` within this
/// window are joined into a single message (§4.J).
pub(crate) const FRAGMENT_JOIN_WINDOW: Duration = Duration::from_secs(3);

struct PendingFragment {
    message: Message,
    received_at: Instant,
}

pub struct Dispatcher {
    pub graph: EntityGraph,
    config: Config,
    pending: Option<PendingFragment>,
}

impl Dispatcher {
    pub fn new(config: Config) -> Self {
        Dispatcher {
            graph: EntityGraph::new(),
            config,
            pending: None,
        }
    }

    /// Process one inbound wire line. Returns every message that became
    /// ready to route downstream as a result — usually zero or one, but
    /// two when this line's arrival bumps a previously-pending array
    /// fragment out of the join window. Malformed lines and locally-
    /// handled errors are logged and swallowed, per §7 — they never
    /// propagate out of the dispatcher.
    pub fn handle_line(&mut self, raw: RawLine) -> Vec<Message> {
        let pkt = match Packet::parse(&raw.line, raw.dtm) {
            Ok(pkt) => pkt,
            Err(e) => {
                warn!(error = %e, line = %raw.line, "dropping unparseable line");
                return Vec::new();
            }
        };
        if !self.config.admits(pkt.src) || !self.config.admits(pkt.dst) {
            trace!(src = %pkt.src, dst = %pkt.dst, "line rejected by include/exclude filter");
            return Vec::new();
        }
        self.graph.observe(pkt.src, pkt.verb, pkt.code);
        self.check_role(&pkt);
        if !pkt.dst.is_null() && !pkt.dst.is_broadcast() {
            self.graph.device_mut(pkt.dst);
        }
        // A controller-promotion fingerprint (§4.G) doesn't just promote
        // the device's role — it's the moment this system learns `src`
        // heads a TemperatureControlSystem, so the TCS is rooted here too.
        if pkt.verb == Verb::I && catalogue::CONTROLLER_PROMOTION_CODES.contains(&pkt.code) {
            let _ = self.graph.system_mut(pkt.src);
        }

        let message = match payload::decode(&pkt) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, code = %format!("{:04X}", pkt.code), "dropping undecodable payload");
                return Vec::new();
            }
        };

        self.join_or_flush(message)
    }

    /// §4.G: a device emitting a `(verb, code)` the catalogue says it
    /// shouldn't is not rejected, only flagged — it's diagnostic evidence
    /// of a corrupt address set or a promotable device mid-fingerprint.
    fn check_role(&self, pkt: &Packet) {
        if let Some(def) = catalogue::lookup(pkt.code) {
            if def.controller_only {
                if let Some(dev) = self.graph.device(pkt.src) {
                    if !dev.role.is_controller_capable() {
                        warn!(
                            src = %pkt.src, code = %format!("{:04X}", pkt.code),
                            "controller-only code emitted by a non-controller-capable device"
                        );
                    }
                }
            }
        }
    }

    fn join_or_flush(&mut self, message: Message) -> Vec<Message> {
        if !catalogue::is_array_code(message.code) || message.verb != Verb::I {
            let mut out: Vec<Message> = self.pending.take().map(|p| p.message).into_iter().collect();
            out.push(message);
            return out;
        }

        match &mut self.pending {
            Some(pending)
                if pending.message.code == message.code
                    && pending.message.src == message.src
                    && pending.received_at.elapsed() < FRAGMENT_JOIN_WINDOW =>
            {
                payload::try_merge(&mut pending.message, &message);
                pending.received_at = Instant::now();
                Vec::new()
            }
            _ => {
                let flushed = self.pending.take().map(|p| p.message);
                self.pending = Some(PendingFragment {
                    message,
                    received_at: Instant::now(),
                });
                flushed.into_iter().collect()
            }
        }
    }

    /// Force out whatever array fragment is mid-assembly, e.g. on a timer
    /// tick once [`FRAGMENT_JOIN_WINDOW`] has elapsed with nothing new.
    pub fn flush_stale(&mut self) -> Option<Message> {
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.received_at.elapsed() >= FRAGMENT_JOIN_WINDOW)
        {
            self.pending.take().map(|p| p.message)
        } else {
            None
        }
    }
}

/// Drive a [`Dispatcher`] from a transport's inbound channel, forwarding
/// every resolved message to `out` (fanned out to the QoS engine's reply
/// correlator and to whatever persists/observes the entity graph).
pub async fn run(
    mut dispatcher: Dispatcher,
    mut inbound: mpsc::Receiver<RawLine>,
    out: mpsc::Sender<Message>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(FRAGMENT_JOIN_WINDOW);
    loop {
        tokio::select! {
            raw = inbound.recv() => {
                let Some(raw) = raw else { return Ok(()) };
                for msg in dispatcher.handle_line(raw) {
                    if out.send(msg).await.is_err() {
                        return Ok(());
                    }
                }
            }
            _ = ticker.tick() => {
                if let Some(msg) = dispatcher.flush_stale() {
                    if out.send(msg).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn line(s: &str) -> RawLine {
        RawLine {
            line: s.to_string(),
            dtm: Local::now(),
            sent: false,
        }
    }

    #[test]
    fn non_array_message_passes_through_immediately() {
        let mut d = Dispatcher::new(Config::default());
        let msgs = d.handle_line(line(
            "045  I --- 02:000921 --:------ 01:191718 3150 002 0360",
        ));
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn array_fragments_from_same_src_join_before_flush() {
        let mut d = Dispatcher::new(Config::default());
        let first = d.handle_line(line(
            "045  I --- 01:145038 --:------ 01:145038 30C9 003 000847",
        ));
        assert!(first.is_empty(), "first fragment stays pending");
        let second = d.handle_line(line(
            "045  I --- 01:145038 --:------ 01:145038 30C9 003 010849",
        ));
        assert!(second.is_empty(), "still pending, joined into first");
    }

    #[test]
    fn s6_controller_sync_fingerprint_roots_a_system() {
        let mut d = Dispatcher::new(Config::default());
        let msgs = d.handle_line(line(
            "045  I --- 01:123456 --:------ 01:123456 1F09 003 00012C",
        ));
        assert_eq!(msgs.len(), 1);
        let controller: crate::address::DeviceId = "01:123456".parse().unwrap();
        assert!(d.graph.systems.contains_key(&controller));
    }

    #[test]
    fn excluded_device_traffic_is_dropped() {
        let cfg = Config {
            enforce_known_list: true,
            include_list: vec![],
            ..Default::default()
        };
        let mut d = Dispatcher::new(cfg);
        let msgs = d.handle_line(line(
            "045  I --- 02:000921 --:------ 01:191718 3150 002 0360",
        ));
        assert!(msgs.is_empty());
    }
}
