//! Clients for the remote kernel server.
//!
//! - `KernelApiClient` - kernel lifecycle over the server's HTTP surface
//! - `WebSocketConnector` - per-kernel execution channel over WebSocket
//! - `Correlator` - matches inbound channel messages to outstanding requests

pub mod correlator;
pub mod http;
pub mod websocket;

pub use correlator::{Correlated, Correlator};
pub use http::KernelApiClient;
pub use websocket::WebSocketConnector;
