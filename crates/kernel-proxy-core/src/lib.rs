//! Core abstractions for remote kernel session proxying.
//!
//! This crate provides the fundamental building blocks:
//! - `WireMessage` - Jupyter wire protocol framing and classification
//! - `Execution` - Long-running-operation record and state machine types
//! - `TransportError` / `SessionError` / `ExecutionError` - error taxonomy
//! - Transport traits (`KernelLifecycle`, `ChannelConnector`)
//! - `ProxySettings` - environment-backed configuration

pub mod error;
pub mod execution;
pub mod message;
pub mod settings;
pub mod traits;

pub use error::{ConnectionState, SessionError, TransportError};
pub use execution::{Execution, ExecutionError, ExecutionId, ExecutionStatus};
pub use message::{MessageHeader, MessageKind, WireMessage};
pub use settings::ProxySettings;
pub use traits::{ChannelConnector, ChannelReader, ChannelWriter, KernelLifecycle};
