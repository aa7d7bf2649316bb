//! Error types for the Pipelink bridge

use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Pipelink error taxonomy
///
/// Transport and framing failures are contained at the connection level:
/// they end the current peer session, never the process. Outbound-call
/// failures propagate to the caller as typed errors.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Malformed or truncated frame; the stream position is unrecoverable
    /// and the connection must be dropped
    #[error("framing error: {0}")]
    ProtocolFraming(String),

    /// Orderly peer close; ends the connection, the service keeps accepting
    #[error("peer disconnected")]
    PeerDisconnected,

    /// No channel name configured; the RPC service is disabled, not broken
    #[error("configuration missing: {0}")]
    ConfigMissing(String),

    /// Outbound call attempted with no peer attached
    #[error("no active peer connection")]
    NoActivePeer,

    /// Write failed or the connection died while awaiting a response
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The peer answered an outbound call with a JSON-RPC error
    #[error("remote call failed: {message} (code {code})")]
    RemoteFailure { code: i32, message: String },

    /// JSON encode/decode failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Service lifecycle misuse (second instance, listener bind failure)
    #[error("service error: {0}")]
    Service(String),
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::Serialization(err.to_string())
    }
}

/// JSON-RPC 2.0 error codes used by the bridge
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}
