//! Traits at the remote-server boundary.
//!
//! The session registry is generic over these so the whole session and
//! recovery machinery can be exercised against in-memory fakes.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::message::WireMessage;

/// Kernel lifecycle calls on the remote server's HTTP surface.
#[async_trait]
pub trait KernelLifecycle: Send + Sync {
    /// Create a kernel on the remote server, returning its identifier.
    async fn create_kernel(&self) -> Result<String, TransportError>;

    /// Destroy a kernel on the remote server.
    async fn delete_kernel(&self, kernel_id: &str) -> Result<(), TransportError>;
}

/// Outbound half of one kernel's execution channel.
#[async_trait]
pub trait ChannelWriter: Send {
    /// Serialize and send one request message.
    async fn send(&mut self, message: &WireMessage) -> Result<(), TransportError>;
}

/// Inbound half of one kernel's execution channel.
///
/// Yields messages until EOF or close (`None`) or a transport fault.
/// After an `Err` the reader produces nothing further.
#[async_trait]
pub trait ChannelReader: Send {
    async fn recv(&mut self) -> Option<Result<WireMessage, TransportError>>;
}

/// Opens execution channels to remote kernels.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open the bidirectional channel for one kernel.
    async fn connect(
        &self,
        kernel_id: &str,
    ) -> Result<(Box<dyn ChannelWriter>, Box<dyn ChannelReader>), TransportError>;
}
