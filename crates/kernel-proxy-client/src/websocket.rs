//! WebSocket execution channel to a remote kernel.

use async_trait::async_trait;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message as WsMessage},
};

use kernel_proxy_core::{
    ProxySettings, TransportError, WireMessage,
    traits::{ChannelConnector, ChannelReader, ChannelWriter},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the per-kernel `channels` WebSocket endpoint.
pub struct WebSocketConnector {
    settings: ProxySettings,
}

impl WebSocketConnector {
    #[must_use]
    pub fn new(settings: ProxySettings) -> Self {
        Self { settings }
    }

    fn channel_url(&self, kernel_id: &str) -> String {
        let mut url = format!("{}/api/kernels/{kernel_id}/channels", self.settings.ws_base());
        if !self.settings.token.is_empty() {
            url = format!("{url}?token={}", self.settings.token);
        }
        url
    }
}

fn map_handshake_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status == tungstenite::http::StatusCode::UNAUTHORIZED
                || status == tungstenite::http::StatusCode::FORBIDDEN
            {
                TransportError::Unauthorized
            } else {
                TransportError::ProtocolMismatch(format!("handshake rejected with status {status}"))
            }
        }
        tungstenite::Error::Io(e) => TransportError::Unreachable(e.to_string()),
        tungstenite::Error::Url(e) => TransportError::Unreachable(e.to_string()),
        tungstenite::Error::Tls(e) => TransportError::Unreachable(e.to_string()),
        other => TransportError::ProtocolMismatch(other.to_string()),
    }
}

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn connect(
        &self,
        kernel_id: &str,
    ) -> Result<(Box<dyn ChannelWriter>, Box<dyn ChannelReader>), TransportError> {
        let url = self.channel_url(kernel_id);
        let (socket, _response) = connect_async(&url).await.map_err(map_handshake_error)?;
        tracing::debug!(kernel_id = %kernel_id, "kernel channel connected");

        let (sink, stream) = socket.split();
        Ok((
            Box::new(WebSocketWriter { sink }),
            Box::new(WebSocketReader { stream }),
        ))
    }
}

struct WebSocketWriter {
    sink: SplitSink<Socket, WsMessage>,
}

#[async_trait]
impl ChannelWriter for WebSocketWriter {
    async fn send(&mut self, message: &WireMessage) -> Result<(), TransportError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.sink
            .send(WsMessage::Text(payload))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

struct WebSocketReader {
    stream: SplitStream<Socket>,
}

#[async_trait]
impl ChannelReader for WebSocketReader {
    async fn recv(&mut self) -> Option<Result<WireMessage, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<WireMessage>(&text) {
                    Ok(msg) => return Some(Ok(msg)),
                    Err(e) => {
                        // Frames that are not protocol messages are dropped,
                        // same as unmatched broadcast traffic.
                        tracing::warn!(error = %e, "skipping unparseable channel frame");
                    }
                },
                Ok(WsMessage::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(TransportError::ConnectionLost(e.to_string()))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_url_carries_token() {
        let mut settings = ProxySettings::default();
        settings.token = "secret".to_string();
        let connector = WebSocketConnector::new(settings);
        assert_eq!(
            connector.channel_url("k-1"),
            "ws://127.0.0.1:8080/api/kernels/k-1/channels?token=secret"
        );
    }

    #[test]
    fn channel_url_without_token() {
        let connector = WebSocketConnector::new(ProxySettings::default());
        assert_eq!(
            connector.channel_url("k-1"),
            "ws://127.0.0.1:8080/api/kernels/k-1/channels"
        );
    }
}
