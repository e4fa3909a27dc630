//! Jupyter wire protocol framing.
//!
//! One WebSocket channel per kernel carries JSON messages in the Jupyter
//! v5.3 envelope: a `header` (with a unique `msg_id`), a `parent_header`
//! correlating the message to the request that triggered it, and a
//! type-specific `content` payload.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

/// Protocol version sent in outbound headers.
pub const PROTOCOL_VERSION: &str = "5.3";

/// Message envelope header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Unique message identifier.
    pub msg_id: String,
    /// Message type tag (e.g. `execute_request`, `stream`, `status`).
    pub msg_type: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub version: String,
}

/// Parent header, present on replies and side-effect messages.
///
/// The remote sends an empty object (`{}`) for messages with no parent,
/// so every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParentHeader {
    #[serde(default)]
    pub msg_id: Option<String>,
    #[serde(default)]
    pub msg_type: Option<String>,
}

/// Coarse classification of inbound message types.
///
/// Only `Status` carries completion semantics; everything else is opaque
/// payload from the proxy's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Textual stream output (`stream`).
    Stream,
    /// Structured result value (`execute_result`).
    ExecuteResult,
    /// Structured error description (`error`).
    Error,
    /// Kernel state change (`status`).
    Status,
    /// Anything else (`execute_reply`, `display_data`, ...).
    Other,
}

/// One protocol message as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub header: MessageHeader,
    #[serde(default)]
    pub parent_header: ParentHeader,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buffers: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl WireMessage {
    /// Build an `execute_request` for the given code, with a fresh
    /// message identifier.
    #[must_use]
    pub fn execute_request(code: &str) -> Self {
        Self {
            header: MessageHeader {
                msg_id: Uuid::new_v4().to_string(),
                msg_type: "execute_request".to_string(),
                username: String::new(),
                session: Uuid::new_v4().to_string(),
                version: PROTOCOL_VERSION.to_string(),
            },
            parent_header: ParentHeader::default(),
            metadata: json!({}),
            content: json!({
                "code": code,
                "silent": false,
                "store_history": true,
                "user_expressions": {},
                "allow_stdin": false,
                "stop_on_error": true,
            }),
            buffers: Vec::new(),
            channel: Some("shell".to_string()),
        }
    }

    /// Classify by the header's `msg_type` tag.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self.header.msg_type.as_str() {
            "stream" => MessageKind::Stream,
            "execute_result" => MessageKind::ExecuteResult,
            "error" => MessageKind::Error,
            "status" => MessageKind::Status,
            _ => MessageKind::Other,
        }
    }

    /// Identifier of the request this message belongs to, if any.
    #[must_use]
    pub fn parent_msg_id(&self) -> Option<&str> {
        self.parent_header.msg_id.as_deref()
    }

    /// Whether this is the idle status change that closes a request.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.kind() == MessageKind::Status
            && self.content.get("execution_state").and_then(Value::as_str) == Some("idle")
    }

    /// Human-readable description of an `error` message's content.
    ///
    /// Returns `None` for non-error messages.
    #[must_use]
    pub fn error_text(&self) -> Option<String> {
        if self.kind() != MessageKind::Error {
            return None;
        }
        let ename = self.content.get("ename").and_then(Value::as_str);
        let evalue = self.content.get("evalue").and_then(Value::as_str);
        Some(match (ename, evalue) {
            (Some(n), Some(v)) => format!("{n}: {v}"),
            (Some(n), None) => n.to_string(),
            (None, Some(v)) => v.to_string(),
            (None, None) => "unspecified kernel error".to_string(),
        })
    }
}
