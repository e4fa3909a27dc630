//! Kernel lifecycle client for the remote server's HTTP surface.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use kernel_proxy_core::{ProxySettings, TransportError, traits::KernelLifecycle};

#[derive(Debug, Deserialize)]
struct KernelInfo {
    id: String,
}

/// HTTP client for creating and destroying kernels.
///
/// Carries the configured bearer credential and connect/total timeouts
/// on every request.
pub struct KernelApiClient {
    http: Client,
    settings: ProxySettings,
}

impl KernelApiClient {
    /// Build a client from settings.
    ///
    /// # Errors
    /// Returns `Unreachable` if the underlying HTTP client cannot be
    /// constructed (e.g. TLS backend initialization failure).
    pub fn new(settings: ProxySettings) -> Result<Self, TransportError> {
        let http = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.total_timeout())
            .build()
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        Ok(Self { http, settings })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.settings.server_url)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        if self.settings.token.is_empty() {
            request
        } else {
            request.header("Authorization", format!("token {}", self.settings.token))
        }
    }
}

fn map_request_error(err: reqwest::Error) -> TransportError {
    if err.is_connect() || err.is_timeout() {
        TransportError::Unreachable(err.to_string())
    } else if err.is_decode() {
        TransportError::ProtocolMismatch(err.to_string())
    } else {
        TransportError::SendFailed(err.to_string())
    }
}

fn check_status(status: StatusCode) -> Result<(), TransportError> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TransportError::Unauthorized),
        s if s.is_success() => Ok(()),
        s => Err(TransportError::ProtocolMismatch(format!(
            "unexpected status {s} from kernel server"
        ))),
    }
}

#[async_trait]
impl KernelLifecycle for KernelApiClient {
    async fn create_kernel(&self) -> Result<String, TransportError> {
        let response = self
            .with_auth(self.http.post(self.api_url("/api/kernels")))
            .send()
            .await
            .map_err(map_request_error)?;

        check_status(response.status())?;

        let info: KernelInfo = response
            .json()
            .await
            .map_err(|e| TransportError::ProtocolMismatch(e.to_string()))?;

        tracing::info!(kernel_id = %info.id, "kernel created");
        Ok(info.id)
    }

    async fn delete_kernel(&self, kernel_id: &str) -> Result<(), TransportError> {
        let response = self
            .with_auth(
                self.http
                    .delete(self.api_url(&format!("/api/kernels/{kernel_id}"))),
            )
            .send()
            .await
            .map_err(map_request_error)?;

        check_status(response.status())?;

        tracing::info!(kernel_id = %kernel_id, "kernel deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(check_status(StatusCode::CREATED).is_ok());
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED),
            Err(TransportError::Unauthorized)
        ));
        assert!(matches!(
            check_status(StatusCode::FORBIDDEN),
            Err(TransportError::Unauthorized)
        ));
        assert!(matches!(
            check_status(StatusCode::INTERNAL_SERVER_ERROR),
            Err(TransportError::ProtocolMismatch(_))
        ));
    }

    #[test]
    fn api_url_joins_path() {
        let client = KernelApiClient::new(ProxySettings::default()).unwrap();
        assert_eq!(
            client.api_url("/api/kernels"),
            "http://127.0.0.1:8080/api/kernels"
        );
    }
}
