//! Crate-wide error type.
//!
//! Mirrors the error kinds of §7: most of them are caught and logged at the
//! dispatcher/send-engine boundary and never escape the [`crate::gateway::Gateway`];
//! only [`Error::ExpiredCallback`] and [`Error::Transport`] are meant to reach an
//! application-level caller.

pub type Result<T> = std::result::Result<T, Error>;

/// Categories of errors that can occur while decoding, routing, or
/// transmitting RAMSES-II traffic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The three addresses on a line do not match any of the six legal
    /// `(addr0, addr1, addr2)` combinations.
    #[error("invalid address set: {0}")]
    InvalidAddrSet(String),

    /// The payload failed its declared length check or its per-(verb, code)
    /// regex in the catalogue.
    #[error("invalid payload for {code:04X} {verb:?}: {reason}")]
    InvalidPayload {
        code: u16,
        verb: crate::packet::Verb,
        reason: String,
    },

    /// `src`/`dst` is not allowed to emit/receive this `(verb, code)` per the
    /// catalogue's role table.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// A mutation would violate a model invariant (e.g. a device switching
    /// controllers). The mutation is refused; the engine continues.
    #[error("corrupt state: {0}")]
    CorruptState(String),

    /// A command's reply window elapsed after all retries.
    #[error("callback expired after {retries} attempt(s)")]
    ExpiredCallback { retries: u32 },

    /// Terminal I/O failure on the serial link; causes Gateway teardown.
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

impl Error {
    /// True for the kinds §7 says are caught locally and logged, never
    /// propagated above the Gateway boundary.
    pub fn is_locally_handled(&self) -> bool {
        matches!(
            self,
            Error::InvalidAddrSet(_)
                | Error::InvalidPayload { .. }
                | Error::InvalidPacket(_)
                | Error::CorruptState(_)
                | Error::ExpiredCallback { .. }
        )
    }
}
