//! Process-wide execution store with an explicit state machine.
//!
//! Every mutation takes the single inner lock once, which makes each
//! operation an atomic step: receive loops of many sessions can call
//! `append_output` / `complete` / `fail` concurrently without
//! corrupting each other's records. `status` returns a clone, so a
//! caller never observes a record mutating mid-read.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{SystemTime, UNIX_EPOCH},
};

use thiserror::Error;

use kernel_proxy_core::{
    Execution, ExecutionError, ExecutionId, ExecutionStatus, SessionError, WireMessage,
};

/// Contract violation on a tracker call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("execution not found: {0}")]
    NotFound(ExecutionId),
    #[error("execution {0} is already terminal")]
    AlreadyTerminal(ExecutionId),
}

struct Inner {
    executions: HashMap<ExecutionId, Execution>,
    /// session_id -> its single non-terminal execution, if any.
    outstanding: HashMap<String, ExecutionId>,
}

/// Long-running-operation store for executions.
///
/// Records are retained after their session is torn down, so results
/// stay queryable long after the original request context has ended.
pub struct ExecutionTracker {
    inner: RwLock<Inner>,
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                executions: HashMap::new(),
                outstanding: HashMap::new(),
            }),
        }
    }

    /// Create a new execution in `Pending` and return its identifier
    /// immediately, without any network I/O.
    ///
    /// # Errors
    /// Returns `SessionError::Busy` if the session already has a
    /// non-terminal execution outstanding; no record is created.
    ///
    /// # Panics
    /// Panics if the inner lock is poisoned.
    pub fn submit(&self, session_id: &str, code: &str) -> Result<ExecutionId, SessionError> {
        let mut inner = self.inner.write().unwrap();
        if inner.outstanding.contains_key(session_id) {
            return Err(SessionError::Busy);
        }

        let execution = Execution::new(session_id.to_string(), code.to_string(), unix_now());
        let id = execution.id;
        inner.outstanding.insert(session_id.to_string(), id);
        inner.executions.insert(id, execution);

        tracing::debug!(execution_id = %id, session_id = %session_id, "execution submitted");
        Ok(id)
    }

    /// Transition `Pending -> Running` once the send is acknowledged.
    ///
    /// # Errors
    /// Returns an error for unknown ids or already-terminal executions.
    ///
    /// # Panics
    /// Panics if the inner lock is poisoned.
    pub fn mark_running(&self, id: ExecutionId, started_at: i64) -> Result<(), TrackerError> {
        let mut inner = self.inner.write().unwrap();
        let execution = inner
            .executions
            .get_mut(&id)
            .ok_or(TrackerError::NotFound(id))?;
        if execution.status.is_terminal() {
            return Err(TrackerError::AlreadyTerminal(id));
        }
        if execution.status == ExecutionStatus::Pending {
            execution.status = ExecutionStatus::Running;
            execution.started_at = Some(started_at);
        }
        Ok(())
    }

    /// Append one buffered message, preserving wire arrival order.
    ///
    /// Late messages for terminal executions are dropped silently
    /// (logged): recovery can terminate an execution while output is
    /// still in flight, and that must not crash the pipeline.
    ///
    /// # Panics
    /// Panics if the inner lock is poisoned.
    pub fn append_output(&self, id: ExecutionId, message: WireMessage) {
        let mut inner = self.inner.write().unwrap();
        match inner.executions.get_mut(&id) {
            Some(execution) if !execution.status.is_terminal() => {
                execution.buffered_output.push(message);
            }
            Some(_) => {
                tracing::debug!(execution_id = %id, "dropping output for terminal execution");
            }
            None => {
                tracing::debug!(execution_id = %id, "dropping output for unknown execution");
            }
        }
    }

    /// Terminal transition to `Completed`. Idempotent: a second call on
    /// an already-terminal execution is a no-op, never an error.
    ///
    /// # Panics
    /// Panics if the inner lock is poisoned.
    pub fn complete(&self, id: ExecutionId, completed_at: i64) {
        self.transition_terminal(id, ExecutionStatus::Completed, completed_at, None);
    }

    /// Terminal transition to `Failed`. Idempotent, same as `complete`;
    /// recovery logic may race with normal completion.
    ///
    /// # Panics
    /// Panics if the inner lock is poisoned.
    pub fn fail(&self, id: ExecutionId, completed_at: i64, error: ExecutionError) {
        self.transition_terminal(id, ExecutionStatus::Failed, completed_at, Some(error));
    }

    fn transition_terminal(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        completed_at: i64,
        error: Option<ExecutionError>,
    ) {
        let mut inner = self.inner.write().unwrap();
        let Some(execution) = inner.executions.get_mut(&id) else {
            tracing::debug!(execution_id = %id, "terminal transition for unknown execution");
            return;
        };
        if execution.status.is_terminal() {
            return;
        }

        execution.status = status;
        execution.completed_at = Some(completed_at);
        execution.error = error;
        let session_id = execution.session_id.clone();

        if inner.outstanding.get(&session_id) == Some(&id) {
            inner.outstanding.remove(&session_id);
        }
        tracing::debug!(execution_id = %id, status = ?status, "execution reached terminal state");
    }

    /// Snapshot of one execution, or `None` if unknown.
    ///
    /// # Panics
    /// Panics if the inner lock is poisoned.
    #[must_use]
    pub fn status(&self, id: ExecutionId) -> Option<Execution> {
        self.inner.read().unwrap().executions.get(&id).cloned()
    }

    /// The session's current non-terminal execution, if any.
    ///
    /// # Panics
    /// Panics if the inner lock is poisoned.
    #[must_use]
    pub fn outstanding_on(&self, session_id: &str) -> Option<ExecutionId> {
        self.inner
            .read()
            .unwrap()
            .outstanding
            .get(session_id)
            .copied()
    }

    /// Terminal executions completed at or before `cutoff`, for
    /// TTL-based reaping by the surrounding system.
    ///
    /// # Panics
    /// Panics if the inner lock is poisoned.
    #[must_use]
    pub fn terminal_older_than(&self, cutoff: i64) -> Vec<ExecutionId> {
        self.inner
            .read()
            .unwrap()
            .executions
            .values()
            .filter(|e| e.status.is_terminal() && e.completed_at.is_some_and(|t| t <= cutoff))
            .map(|e| e.id)
            .collect()
    }

    /// Remove a terminal execution. Returns false for unknown ids and
    /// for executions that are still in flight.
    ///
    /// # Panics
    /// Panics if the inner lock is poisoned.
    pub fn reap(&self, id: ExecutionId) -> bool {
        let mut inner = self.inner.write().unwrap();
        let terminal = inner
            .executions
            .get(&id)
            .is_some_and(|e| e.status.is_terminal());
        if terminal {
            inner.executions.remove(&id);
        }
        terminal
    }
}
