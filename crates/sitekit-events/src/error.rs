//! Error types for the event bus

use thiserror::Error;

use crate::kind::EventKind;

/// Event bus errors
#[derive(Debug, Error)]
pub enum EventError {
    /// The kind is not in the relay allowlist; this is a programmer error
    /// caught at the call site, not a runtime fault.
    #[error("event kind `{0}` is not in the relay allowlist")]
    NotRelayable(EventKind),

    /// A relayed line carried a kind outside the closed registry
    #[error("unknown event kind `{0}` on the wire")]
    UnknownKind(String),

    /// A relayed line was not valid event JSON
    #[error("malformed event line: {0}")]
    Wire(#[from] serde_json::Error),
}

/// Result type for event bus operations
pub type Result<T> = std::result::Result<T, EventError>;
