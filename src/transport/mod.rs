//! The transport contract (component D, scoped): turning a byte stream
//! into ASCII wire lines and back, and logging every line that crosses it.
//!
//! The serial driver's raw byte plumbing (RTS/DTR toggling, firmware
//! versioning, reconnection backoff) is out of scope here; only its
//! contract — a bidirectional stream of framed lines — is modelled.

pub mod file;
pub mod port;

use tokio::sync::mpsc;

use crate::error::Result;

/// One line crossing the wire, tagged with direction for the packet log.
#[derive(Debug, Clone)]
pub struct RawLine {
    pub line: String,
    pub dtm: chrono::DateTime<chrono::Local>,
    pub sent: bool,
}

/// A running transport: a channel of inbound lines, and a sink for
/// outbound ones. Both [`port::SerialTransport`] (the live evofw3/HGI80
/// link) and [`file::FileTransport`] (one-way packet-log replay, for
/// tests) implement this shape.
pub struct Transport {
    pub inbound: mpsc::Receiver<RawLine>,
    pub outbound: mpsc::Sender<String>,
    /// Completes when the underlying I/O task exits (link drop, EOF, or a
    /// terminal [`crate::error::Error::Transport`]).
    pub join: tokio::task::JoinHandle<Result<()>>,
}

/// Lines starting with `!` are evofw3 control/diagnostic flags, not
/// packets (§4.A).
pub fn is_control_line(line: &str) -> bool {
    line.starts_with('!')
}

/// An evofw3 "fake gateway" rewrites its own `18:xxxxxx` identity onto
/// `addr0` of every line it emits so the rest of the stack can treat the
/// gateway like any other device; firmware that doesn't do this needs the
/// rewrite applied on ingress (§4.A design note).
pub fn rewrite_fake_gateway_addr0(line: &str, gateway_id: &str) -> String {
    let mut fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() > 3 && fields[3] == "18:000730" {
        fields[3] = gateway_id;
        fields.join(" ")
    } else {
        line.to_string()
    }
}
