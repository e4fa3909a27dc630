//! Session orchestration for the kernel proxy.
//!
//! - `ExecutionTracker` - process-wide long-running-operation store
//! - `SessionRegistry` - live sessions, one receive task per kernel channel
//! - `Supervisor` - reconnect policy applied when a channel drops

pub mod registry;
pub mod supervisor;
pub mod tracker;

pub use registry::{SessionInfo, SessionRegistry};
pub use supervisor::{RetryPolicy, Supervisor};
pub use tracker::{ExecutionTracker, TrackerError};
