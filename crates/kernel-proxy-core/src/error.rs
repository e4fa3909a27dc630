//! Error taxonomy for the proxy core.
//!
//! `TransportError` is recoverable and handled by the recovery
//! supervisor; callers only observe it indirectly, as a failed
//! execution. `SessionError` is a contract violation surfaced
//! synchronously to the caller and never retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport-layer fault for one kernel channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network, DNS, or connection-refused failure.
    #[error("remote server unreachable: {0}")]
    Unreachable(String),
    /// The remote rejected the credential.
    #[error("credential rejected by remote server")]
    Unauthorized,
    /// The handshake or a response was malformed.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),
    /// An operation requiring a live connection was attempted without one.
    #[error("not connected")]
    NotConnected,
    /// A write on a live connection failed.
    #[error("send failed: {0}")]
    SendFailed(String),
    /// The connection dropped while in use.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

/// Session-level error surfaced immediately to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The session already has a non-terminal execution outstanding.
    #[error("session busy: an execution is already outstanding")]
    Busy,
    /// The session's connection has permanently failed or it was shut down.
    #[error("session unavailable")]
    Unavailable,
    /// The session was already shut down.
    #[error("session shut down")]
    Shutdown,
    /// No session with this identifier exists.
    #[error("session not found: {0}")]
    NotFound(String),
}

/// Connection state of one session's transport client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Retry budget exhausted; the session will not reconnect.
    Failed,
}

impl ConnectionState {
    /// Whether submissions against this session can still be serviced.
    #[must_use]
    pub fn is_usable(self) -> bool {
        !matches!(self, Self::Failed)
    }
}
