//! Execution records: the long-running-operation data model.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::message::WireMessage;

/// Execution identifier, unique process-wide.
pub type ExecutionId = Uuid;

/// Execution state machine.
///
/// `Pending → Running → Completed | Failed`; no transition leaves a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created, not yet sent to the remote kernel.
    Pending,
    /// Sent, awaiting the completion signal.
    Running,
    /// The remote kernel finished processing the request.
    Completed,
    /// Terminal failure; `Execution::error` is populated.
    Failed,
}

impl ExecutionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Why an execution ended in the failed terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    /// The session's connection dropped while the execution was in flight.
    #[error("connection to the kernel was lost")]
    ConnectionLost,
    /// The session was shut down while the execution was in flight.
    #[error("session was shut down")]
    SessionShutdown,
    /// The remote kernel reported an error while running the code.
    #[error("kernel error: {message}")]
    Remote { message: String },
}

/// One run-code request and its tracked lifecycle.
///
/// Owned by the execution tracker for its entire lifetime so it stays
/// queryable after its session is torn down. `buffered_output` is
/// append-only, in the order messages were observed on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub session_id: String,
    pub code: String,
    pub status: ExecutionStatus,
    /// Unix epoch seconds; set once when the send is acknowledged.
    pub started_at: Option<i64>,
    /// Unix epoch seconds; set once on the terminal transition.
    pub completed_at: Option<i64>,
    pub buffered_output: Vec<WireMessage>,
    /// Populated only in the `Failed` state.
    pub error: Option<ExecutionError>,
    /// Unix epoch seconds of submission.
    pub created_at: i64,
}

impl Execution {
    /// Create a fresh record in the `Pending` state.
    #[must_use]
    pub fn new(session_id: String, code: String, created_at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            code,
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            buffered_output: Vec::new(),
            error: None,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_execution_is_pending() {
        let exec = Execution::new("s1".to_string(), "x = 1".to_string(), 100);
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert!(exec.started_at.is_none());
        assert!(exec.completed_at.is_none());
        assert!(exec.buffered_output.is_empty());
        assert!(exec.error.is_none());
    }

    #[test]
    fn terminal_states() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
    }

    #[test]
    fn error_serialization_is_tagged() {
        let err = ExecutionError::Remote {
            message: "NameError: x".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"kind\":\"remote\""));

        let json = serde_json::to_string(&ExecutionError::ConnectionLost).unwrap();
        assert!(json.contains("connection_lost"));
    }
}
