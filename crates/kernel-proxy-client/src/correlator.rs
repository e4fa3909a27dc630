//! Message correlation for one kernel channel.
//!
//! The remote multiplexes many unrelated messages on one channel. The
//! correlator keys inbound messages by `parent_header.msg_id` against
//! the set of outstanding requests, buffers everything observed before
//! the idle signal, and decides when an execution is finished.

use std::collections::HashMap;

use kernel_proxy_core::{ExecutionId, MessageKind, WireMessage};

struct Outstanding {
    execution_id: ExecutionId,
    /// Set when an error message is observed; the execution still stays
    /// open until the idle signal, since the kernel may emit partial
    /// output around the error.
    error: Option<String>,
}

/// What to do with one inbound message.
#[derive(Debug, PartialEq, Eq)]
pub enum Correlated {
    /// Buffer the message on this execution's output.
    Buffer { execution_id: ExecutionId },
    /// The idle signal arrived; the execution is finished. The idle
    /// message itself is not buffered.
    Finished {
        execution_id: ExecutionId,
        error: Option<String>,
    },
    /// No outstanding request matches; drop the message. Expected for
    /// broadcast/global status traffic.
    Unmatched,
}

/// Maps outstanding request identifiers to executions.
#[derive(Default)]
pub struct Correlator {
    outstanding: HashMap<String, Outstanding>,
}

impl Correlator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outstanding request before it is sent.
    pub fn register(&mut self, msg_id: String, execution_id: ExecutionId) {
        self.outstanding.insert(
            msg_id,
            Outstanding {
                execution_id,
                error: None,
            },
        );
    }

    /// Remove one outstanding request, e.g. when its send failed.
    pub fn forget(&mut self, msg_id: &str) -> Option<ExecutionId> {
        self.outstanding.remove(msg_id).map(|o| o.execution_id)
    }

    /// Remove and return every outstanding execution. Used on
    /// disconnect, when no completion signal can ever arrive for them.
    pub fn drain(&mut self) -> Vec<ExecutionId> {
        self.outstanding
            .drain()
            .map(|(_, o)| o.execution_id)
            .collect()
    }

    /// Route one inbound message.
    pub fn route(&mut self, message: &WireMessage) -> Correlated {
        let Some(parent_id) = message.parent_msg_id() else {
            return Correlated::Unmatched;
        };

        if message.is_idle() {
            return match self.outstanding.remove(parent_id) {
                Some(entry) => Correlated::Finished {
                    execution_id: entry.execution_id,
                    error: entry.error,
                },
                None => Correlated::Unmatched,
            };
        }

        let Some(entry) = self.outstanding.get_mut(parent_id) else {
            return Correlated::Unmatched;
        };
        if message.kind() == MessageKind::Error {
            entry.error = message.error_text();
        }
        Correlated::Buffer {
            execution_id: entry.execution_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn inbound(msg_type: &str, parent: &str, content: serde_json::Value) -> WireMessage {
        let mut msg = WireMessage::execute_request("");
        msg.header.msg_type = msg_type.to_string();
        msg.parent_header.msg_id = Some(parent.to_string());
        msg.content = content;
        msg
    }

    fn idle(parent: &str) -> WireMessage {
        inbound("status", parent, json!({"execution_state": "idle"}))
    }

    #[test]
    fn buffers_matched_messages_until_idle() {
        let mut correlator = Correlator::new();
        let exec = Uuid::new_v4();
        correlator.register("m1".to_string(), exec);

        let stream = inbound("stream", "m1", json!({"text": "hi"}));
        assert_eq!(
            correlator.route(&stream),
            Correlated::Buffer { execution_id: exec }
        );

        assert_eq!(
            correlator.route(&idle("m1")),
            Correlated::Finished {
                execution_id: exec,
                error: None
            }
        );
        // The entry is gone; later traffic for it no longer matches.
        assert_eq!(correlator.route(&idle("m1")), Correlated::Unmatched);
    }

    #[test]
    fn unmatched_messages_are_dropped() {
        let mut correlator = Correlator::new();
        correlator.register("m1".to_string(), Uuid::new_v4());

        let other_parent = inbound("stream", "m2", json!({}));
        assert_eq!(correlator.route(&other_parent), Correlated::Unmatched);

        let mut no_parent = inbound("status", "m1", json!({"execution_state": "busy"}));
        no_parent.parent_header.msg_id = None;
        assert_eq!(correlator.route(&no_parent), Correlated::Unmatched);
    }

    #[test]
    fn error_is_carried_to_the_idle_signal() {
        let mut correlator = Correlator::new();
        let exec = Uuid::new_v4();
        correlator.register("m1".to_string(), exec);

        let err = inbound("error", "m1", json!({"ename": "ValueError", "evalue": "boom"}));
        // The error message is buffered, not terminal by itself.
        assert_eq!(
            correlator.route(&err),
            Correlated::Buffer { execution_id: exec }
        );

        // Output after the error is still buffered.
        let stream = inbound("stream", "m1", json!({"text": "partial"}));
        assert_eq!(
            correlator.route(&stream),
            Correlated::Buffer { execution_id: exec }
        );

        assert_eq!(
            correlator.route(&idle("m1")),
            Correlated::Finished {
                execution_id: exec,
                error: Some("ValueError: boom".to_string())
            }
        );
    }

    #[test]
    fn idle_for_finished_request_is_unmatched() {
        let mut correlator = Correlator::new();
        let exec = Uuid::new_v4();
        correlator.register("m1".to_string(), exec);
        let _ = correlator.route(&idle("m1"));

        assert_eq!(correlator.route(&idle("m1")), Correlated::Unmatched);
    }

    #[test]
    fn drain_returns_all_outstanding() {
        let mut correlator = Correlator::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        correlator.register("m1".to_string(), a);
        correlator.register("m2".to_string(), b);

        let mut drained = correlator.drain();
        drained.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(drained, expected);
        assert!(correlator.drain().is_empty());
    }

    #[test]
    fn forget_removes_one_entry() {
        let mut correlator = Correlator::new();
        let exec = Uuid::new_v4();
        correlator.register("m1".to_string(), exec);

        assert_eq!(correlator.forget("m1"), Some(exec));
        assert_eq!(correlator.forget("m1"), None);
    }
}
