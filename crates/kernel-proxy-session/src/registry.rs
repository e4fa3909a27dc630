//! Session registry: live kernel sessions and their receive tasks.
//!
//! One spawned task per session owns the channel halves and a local
//! correlator. `submit` only does in-memory bookkeeping and hands the
//! code to the session task over a channel, so it never blocks on
//! network I/O and one session's stalled socket cannot block another.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{RwLock, mpsc, watch};

use kernel_proxy_client::{Correlated, Correlator};
use kernel_proxy_core::{
    ConnectionState, ExecutionError, ExecutionId, SessionError, TransportError, WireMessage,
    traits::{ChannelConnector, ChannelReader, ChannelWriter, KernelLifecycle},
};

use crate::supervisor::{RetryPolicy, Supervisor};
use crate::tracker::{ExecutionTracker, unix_now};

/// Snapshot of one session's registry record.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: i64,
    pub connection_state: ConnectionState,
}

enum SessionCommand {
    RunCode {
        execution_id: ExecutionId,
        code: String,
    },
    Shutdown,
}

struct SessionEntry {
    created_at: i64,
    state_rx: watch::Receiver<ConnectionState>,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    shut_down: bool,
}

impl SessionEntry {
    fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }
}

/// Registry of live kernel sessions.
///
/// Owns session creation and teardown against the remote server's
/// kernel-management surface; at most one active channel per session.
pub struct SessionRegistry<L, C> {
    api: L,
    connector: Arc<C>,
    tracker: Arc<ExecutionTracker>,
    policy: RetryPolicy,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl<L, C> SessionRegistry<L, C>
where
    L: KernelLifecycle,
    C: ChannelConnector + 'static,
{
    #[must_use]
    pub fn new(api: L, connector: C, tracker: Arc<ExecutionTracker>, policy: RetryPolicy) -> Self {
        Self {
            api,
            connector: Arc::new(connector),
            tracker,
            policy,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<ExecutionTracker> {
        &self.tracker
    }

    /// Create a kernel on the remote server and open its channel.
    ///
    /// # Errors
    /// Returns the transport error if kernel creation or the initial
    /// connect fails; a kernel created without a usable channel is
    /// deleted best-effort.
    pub async fn create_session(&self) -> Result<String, TransportError> {
        let kernel_id = self.api.create_kernel().await?;

        let (supervisor, state_rx) = Supervisor::new(
            Arc::clone(&self.connector),
            kernel_id.clone(),
            self.policy.clone(),
        );

        let (writer, reader) = match supervisor.connect().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(kernel_id = %kernel_id, error = %e, "initial channel connect failed");
                if let Err(del) = self.api.delete_kernel(&kernel_id).await {
                    tracing::warn!(kernel_id = %kernel_id, error = %del, "cleanup of unconnected kernel failed");
                }
                return Err(e);
            }
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        self.sessions.write().await.insert(
            kernel_id.clone(),
            SessionEntry {
                created_at: unix_now(),
                state_rx,
                command_tx,
                shut_down: false,
            },
        );

        let task = SessionTask {
            session_id: kernel_id.clone(),
            tracker: Arc::clone(&self.tracker),
            supervisor,
            correlator: Correlator::new(),
        };
        tokio::spawn(task.run(writer, reader, command_rx));

        tracing::info!(session_id = %kernel_id, "session created");
        Ok(kernel_id)
    }

    /// Submit code for execution, returning the execution id
    /// immediately. The send happens on the session's task.
    ///
    /// # Errors
    /// `NotFound` for unknown sessions, `Unavailable` for failed or
    /// shut-down sessions, `Busy` while an execution is outstanding.
    pub async fn submit(&self, session_id: &str, code: &str) -> Result<ExecutionId, SessionError> {
        let sessions = self.sessions.read().await;
        let entry = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        if entry.shut_down || !entry.connection_state().is_usable() {
            return Err(SessionError::Unavailable);
        }

        let execution_id = self.tracker.submit(session_id, code)?;
        let command = SessionCommand::RunCode {
            execution_id,
            code: code.to_string(),
        };
        if entry.command_tx.send(command).is_err() {
            // The task exited between the state check and the send.
            self.tracker
                .fail(execution_id, unix_now(), ExecutionError::SessionShutdown);
            return Err(SessionError::Unavailable);
        }
        Ok(execution_id)
    }

    /// Tear down a session: its running execution fails with
    /// `SessionShutdown`, the channel is closed, and the remote kernel
    /// is deleted. Terminal executions stay queryable in the tracker.
    ///
    /// # Errors
    /// `NotFound` for unknown sessions, `Shutdown` if already torn down.
    pub async fn destroy_session(&self, session_id: &str) -> Result<(), SessionError> {
        {
            let mut sessions = self.sessions.write().await;
            let entry = sessions
                .get_mut(session_id)
                .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
            if entry.shut_down {
                return Err(SessionError::Shutdown);
            }
            entry.shut_down = true;
            let _ = entry.command_tx.send(SessionCommand::Shutdown);
        }

        // The session is torn down locally regardless of whether the
        // remote delete succeeds.
        if let Err(e) = self.api.delete_kernel(session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "remote kernel delete failed");
        }

        tracing::info!(session_id = %session_id, "session destroyed");
        Ok(())
    }

    /// Snapshot of one session's registry record.
    pub async fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).map(|entry| SessionInfo {
            session_id: session_id.to_string(),
            created_at: entry.created_at,
            connection_state: entry.connection_state(),
        })
    }

    /// Identifiers of all registered sessions, including shut-down ones.
    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

/// Per-session receive loop.
struct SessionTask<C> {
    session_id: String,
    tracker: Arc<ExecutionTracker>,
    supervisor: Supervisor<C>,
    correlator: Correlator,
}

type InboundRx = mpsc::UnboundedReceiver<Result<WireMessage, TransportError>>;

/// Pump the reader into a channel so the session loop can select over
/// commands and inbound messages without holding two mutable borrows.
/// Channel closure signals EOF.
fn spawn_reader(mut reader: Box<dyn ChannelReader>) -> InboundRx {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(item) = reader.recv().await {
            let faulted = item.is_err();
            if tx.send(item).is_err() || faulted {
                break;
            }
        }
    });
    rx
}

impl<C: ChannelConnector + 'static> SessionTask<C> {
    async fn run(
        mut self,
        mut writer: Box<dyn ChannelWriter>,
        reader: Box<dyn ChannelReader>,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    ) {
        let mut inbound_rx = spawn_reader(reader);

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(SessionCommand::RunCode { execution_id, code }) => {
                        if !self.dispatch(&mut writer, execution_id, &code).await
                            && self.recover(&mut writer, &mut inbound_rx).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(SessionCommand::Shutdown) | None => {
                        self.shut_down(&mut command_rx);
                        return;
                    }
                },
                inbound = inbound_rx.recv() => match inbound {
                    Some(Ok(message)) => self.apply(message),
                    Some(Err(e)) => {
                        tracing::warn!(session_id = %self.session_id, error = %e, "channel fault");
                        if self.recover(&mut writer, &mut inbound_rx).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        tracing::warn!(session_id = %self.session_id, "channel closed by remote");
                        if self.recover(&mut writer, &mut inbound_rx).await.is_err() {
                            break;
                        }
                    }
                },
            }
        }

        // Permanent failure: reject anything still queued.
        self.drain_commands(&mut command_rx, &ExecutionError::ConnectionLost);
    }

    /// Send one execute request. Returns false on transport failure,
    /// after failing the execution.
    async fn dispatch(
        &mut self,
        writer: &mut Box<dyn ChannelWriter>,
        execution_id: ExecutionId,
        code: &str,
    ) -> bool {
        let message = WireMessage::execute_request(code);
        let msg_id = message.header.msg_id.clone();
        self.correlator.register(msg_id.clone(), execution_id);

        match writer.send(&message).await {
            Ok(()) => {
                if let Err(e) = self.tracker.mark_running(execution_id, unix_now()) {
                    tracing::debug!(execution_id = %execution_id, error = %e, "running ack ignored");
                }
                tracing::debug!(
                    session_id = %self.session_id,
                    execution_id = %execution_id,
                    msg_id = %msg_id,
                    "execute request sent"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    execution_id = %execution_id,
                    error = %e,
                    "execute request send failed"
                );
                self.correlator.forget(&msg_id);
                self.tracker
                    .fail(execution_id, unix_now(), ExecutionError::ConnectionLost);
                false
            }
        }
    }

    /// Route one inbound message into the tracker.
    fn apply(&mut self, message: WireMessage) {
        match self.correlator.route(&message) {
            Correlated::Buffer { execution_id } => {
                self.tracker.append_output(execution_id, message);
            }
            Correlated::Finished {
                execution_id,
                error: None,
            } => {
                self.tracker.complete(execution_id, unix_now());
            }
            Correlated::Finished {
                execution_id,
                error: Some(message),
            } => {
                self.tracker
                    .fail(execution_id, unix_now(), ExecutionError::Remote { message });
            }
            Correlated::Unmatched => {
                tracing::trace!(session_id = %self.session_id, "dropping unmatched message");
            }
        }
    }

    /// Handle a disconnect: in-flight executions fail deterministically
    /// (the wire protocol has no replay-safe resubmission), then the
    /// supervisor attempts reconnection under its policy.
    async fn recover(
        &mut self,
        writer: &mut Box<dyn ChannelWriter>,
        inbound_rx: &mut InboundRx,
    ) -> Result<(), ()> {
        for execution_id in self.correlator.drain() {
            self.tracker
                .fail(execution_id, unix_now(), ExecutionError::ConnectionLost);
        }

        match self.supervisor.reconnect().await {
            Ok((new_writer, new_reader)) => {
                *writer = new_writer;
                *inbound_rx = spawn_reader(new_reader);
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    session_id = %self.session_id,
                    error = %e,
                    "session permanently failed"
                );
                Err(())
            }
        }
    }

    fn shut_down(&mut self, command_rx: &mut mpsc::UnboundedReceiver<SessionCommand>) {
        for execution_id in self.correlator.drain() {
            self.tracker
                .fail(execution_id, unix_now(), ExecutionError::SessionShutdown);
        }
        self.drain_commands(command_rx, &ExecutionError::SessionShutdown);
        self.supervisor.set_state(ConnectionState::Disconnected);
        tracing::debug!(session_id = %self.session_id, "session task stopped");
    }

    fn drain_commands(
        &self,
        command_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
        error: &ExecutionError,
    ) {
        while let Ok(command) = command_rx.try_recv() {
            if let SessionCommand::RunCode { execution_id, .. } = command {
                self.tracker
                    .fail(execution_id, unix_now(), error.clone());
            }
        }
        command_rx.close();
    }
}
