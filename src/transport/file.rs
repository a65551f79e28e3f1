//! A one-way replay transport: feeds a fixed list of wire lines in order,
//! ignoring anything written to it. Used by integration tests in place of
//! a live serial link.

use tokio::sync::mpsc;

use crate::error::Result;

use super::{RawLine, Transport};

const CHANNEL_CAPACITY: usize = 256;

/// Replay `lines` as inbound traffic, one per task yield. Writes made to
/// the returned [`Transport`] are accepted and silently dropped.
pub fn open(lines: Vec<String>) -> Transport {
    let (in_tx, in_rx) = mpsc::channel::<RawLine>(CHANNEL_CAPACITY.max(lines.len() + 1));
    let (out_tx, mut out_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

    let join = tokio::spawn(async move {
        for line in lines {
            let raw = RawLine {
                line,
                dtm: chrono::Local::now(),
                sent: false,
            };
            if in_tx.send(raw).await.is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }
        // Drain (and discard) whatever the rest of the stack tries to send.
        while out_rx.recv().await.is_some() {}
        Ok(())
    });

    Transport {
        inbound: in_rx,
        outbound: out_tx,
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_lines_in_order() {
        let lines = vec!["a".to_string(), "b".to_string()];
        let mut t = open(lines);
        assert_eq!(t.inbound.recv().await.unwrap().line, "a");
        assert_eq!(t.inbound.recv().await.unwrap().line, "b");
        drop(t.outbound);
        let _ = t.join.await.unwrap();
    }
}
