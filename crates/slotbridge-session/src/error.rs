//! Session error taxonomy.
//!
//! Transport failures drive the reconnect cycle and surface as
//! [`SessionError::ConnectionLost`] on any call outstanding at the moment of
//! disconnection; protocol irregularities are logged and dropped by the
//! engine and never reach callers. Nothing here aborts the process.

/// Errors reported by the upstream session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A serialized-call session already has a call outstanding.
    #[error("session busy: a call is already outstanding")]
    Busy,

    /// No connection is currently established.
    #[error("not connected to upstream")]
    NotConnected,

    /// The connection dropped before a response to this call arrived.
    #[error("connection lost while awaiting response")]
    ConnectionLost,

    /// The session task has shut down for good.
    #[error("session closed")]
    Closed,

    /// Malformed or unclassifiable inbound message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The upstream service answered a call with an error object.
    #[error("upstream error {code}: {message}")]
    Upstream { code: i64, message: String },

    /// Transport-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
