//! Recovery supervisor: reconnect policy for one session's channel.

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use kernel_proxy_core::{
    ConnectionState, ProxySettings, TransportError,
    traits::{ChannelConnector, ChannelReader, ChannelWriter},
};

/// Reconnection policy, configured by the surrounding system.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Fixed sleep before each reconnection attempt.
    pub sleep: Duration,
    /// Attempt budget; `None` retries until session shutdown.
    pub budget: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            sleep: Duration::from_secs(30),
            budget: None,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_settings(settings: &ProxySettings) -> Self {
        Self {
            sleep: settings.retry_sleep(),
            budget: settings.retry_budget,
        }
    }
}

type ChannelPair = (Box<dyn ChannelWriter>, Box<dyn ChannelReader>);

/// Wraps the channel connector for one session, publishing the
/// connection state and enforcing the retry policy.
pub struct Supervisor<C> {
    connector: Arc<C>,
    kernel_id: String,
    policy: RetryPolicy,
    state_tx: watch::Sender<ConnectionState>,
}

impl<C: ChannelConnector> Supervisor<C> {
    pub fn new(
        connector: Arc<C>,
        kernel_id: String,
        policy: RetryPolicy,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        (
            Self {
                connector,
                kernel_id,
                policy,
                state_tx,
            },
            state_rx,
        )
    }

    /// Publish a connection state observed outside the supervisor
    /// (e.g. on session shutdown).
    pub fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Initial connection attempt; no retries. A session that cannot
    /// connect at creation time is reported to the caller, not retried.
    ///
    /// # Errors
    /// Returns the connect error; the state is left `Failed`.
    pub async fn connect(&self) -> Result<ChannelPair, TransportError> {
        self.state_tx.send_replace(ConnectionState::Connecting);
        match self.connector.connect(&self.kernel_id).await {
            Ok(pair) => {
                self.state_tx.send_replace(ConnectionState::Connected);
                Ok(pair)
            }
            Err(e) => {
                self.state_tx.send_replace(ConnectionState::Failed);
                Err(e)
            }
        }
    }

    /// Reconnect after a transport failure, sleeping the configured
    /// duration before each attempt.
    ///
    /// # Errors
    /// Returns the last connect error once the budget is exhausted; the
    /// state becomes `Failed` permanently.
    pub async fn reconnect(&self) -> Result<ChannelPair, TransportError> {
        self.state_tx.send_replace(ConnectionState::Disconnected);
        let mut last: Option<TransportError> = None;
        let mut attempt: u32 = 0;

        loop {
            if self.policy.budget.is_some_and(|budget| attempt >= budget) {
                tracing::warn!(
                    kernel_id = %self.kernel_id,
                    attempts = attempt,
                    "reconnect budget exhausted, session failed"
                );
                self.state_tx.send_replace(ConnectionState::Failed);
                return Err(last.unwrap_or(TransportError::NotConnected));
            }
            attempt += 1;

            tokio::time::sleep(self.policy.sleep).await;
            self.state_tx.send_replace(ConnectionState::Connecting);

            match self.connector.connect(&self.kernel_id).await {
                Ok(pair) => {
                    tracing::info!(kernel_id = %self.kernel_id, attempt, "channel reconnected");
                    self.state_tx.send_replace(ConnectionState::Connected);
                    return Ok(pair);
                }
                Err(e) => {
                    tracing::warn!(
                        kernel_id = %self.kernel_id,
                        attempt,
                        error = %e,
                        "reconnect attempt failed"
                    );
                    last = Some(e);
                    self.state_tx.send_replace(ConnectionState::Disconnected);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kernel_proxy_core::WireMessage;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NoopWriter;
    #[async_trait]
    impl ChannelWriter for NoopWriter {
        async fn send(&mut self, _message: &WireMessage) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct NoopReader;
    #[async_trait]
    impl ChannelReader for NoopReader {
        async fn recv(&mut self) -> Option<Result<WireMessage, TransportError>> {
            None
        }
    }

    /// Fails the first `failures` connect calls, then succeeds.
    struct FlakyConnector {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ChannelConnector for FlakyConnector {
        async fn connect(
            &self,
            _kernel_id: &str,
        ) -> Result<(Box<dyn ChannelWriter>, Box<dyn ChannelReader>), TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(TransportError::Unreachable("refused".to_string()))
            } else {
                Ok((Box::new(NoopWriter), Box::new(NoopReader)))
            }
        }
    }

    fn supervisor(
        failures: u32,
        budget: Option<u32>,
    ) -> (Supervisor<FlakyConnector>, watch::Receiver<ConnectionState>) {
        let connector = Arc::new(FlakyConnector {
            failures,
            calls: AtomicU32::new(0),
        });
        Supervisor::new(
            connector,
            "k-1".to_string(),
            RetryPolicy {
                sleep: Duration::from_millis(1),
                budget,
            },
        )
    }

    #[tokio::test]
    async fn connect_publishes_connected_state() {
        let (supervisor, state_rx) = supervisor(0, None);
        assert!(supervisor.connect().await.is_ok());
        assert_eq!(*state_rx.borrow(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn initial_connect_failure_is_not_retried() {
        let (supervisor, state_rx) = supervisor(1, None);
        assert!(supervisor.connect().await.is_err());
        assert_eq!(*state_rx.borrow(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn reconnect_retries_until_success() {
        let (supervisor, state_rx) = supervisor(3, None);
        assert!(supervisor.reconnect().await.is_ok());
        assert_eq!(*state_rx.borrow(), ConnectionState::Connected);
        assert_eq!(supervisor.connector.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn reconnect_respects_attempt_budget() {
        let (supervisor, state_rx) = supervisor(u32::MAX, Some(2));
        let Err(err) = supervisor.reconnect().await else {
            panic!("reconnect should fail once the budget is exhausted");
        };
        assert!(matches!(err, TransportError::Unreachable(_)));
        assert_eq!(*state_rx.borrow(), ConnectionState::Failed);
        assert_eq!(supervisor.connector.calls.load(Ordering::SeqCst), 2);
    }
}
