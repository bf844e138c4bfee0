//! Certificate transport
//!
//! Sealed certificates travel through a shared remote store addressed by
//! message id: `POST /<messageId>` publishes, `GET /<messageId>` fetches.
//! There is no authentication beyond the secrecy of the sealed payload.
//! Transport failures are surfaced as errors and never retried here; the
//! periodic refresh task simply tries again on its next tick.

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::{RiskError, RiskResult};

/// Point-to-point delivery of sealed certificate bytes by message id.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Publish `bytes` under `message_id`, replacing any previous payload.
    async fn transmit(&self, message_id: &str, bytes: &[u8]) -> RiskResult<()>;

    /// Fetch the payload under `message_id`, or `None` if nothing has been
    /// published there yet.
    async fn retrieve(&self, message_id: &str) -> RiskResult<Option<Vec<u8>>>;
}

/// Transport against the shared HTTP store.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// `base_url` is the store root, e.g. `http://risk.example.org:26843`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, message_id: &str) -> String {
        format!("{}/{}", self.base_url, message_id)
    }
}

impl Transport for HttpTransport {
    async fn transmit(&self, message_id: &str, bytes: &[u8]) -> RiskResult<()> {
        let response = self
            .client
            .post(self.url(message_id))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| RiskError::Transport(format!("POST failed: {e}")))?;

        if !response.status().is_success() {
            return Err(RiskError::Transport(format!(
                "POST {} returned {}",
                message_id,
                response.status()
            )));
        }
        debug!(message_id, bytes = bytes.len(), "certificate transmitted");
        Ok(())
    }

    async fn retrieve(&self, message_id: &str) -> RiskResult<Option<Vec<u8>>> {
        let response = self
            .client
            .get(self.url(message_id))
            .send()
            .await
            .map_err(|e| RiskError::Transport(format!("GET failed: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| RiskError::Transport(format!("body read failed: {e}")))?;
                Ok(Some(bytes.to_vec()))
            }
            status => {
                warn!(message_id, %status, "retrieve failed");
                Err(RiskError::Transport(format!(
                    "GET {} returned {}",
                    message_id, status
                )))
            }
        }
    }
}

/// In-memory transport for tests: a shared map of message id to payload.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    store: std::sync::Arc<parking_lot::Mutex<std::collections::HashMap<String, Vec<u8>>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for MemoryTransport {
    async fn transmit(&self, message_id: &str, bytes: &[u8]) -> RiskResult<()> {
        self.store
            .lock()
            .insert(message_id.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn retrieve(&self, message_id: &str) -> RiskResult<Option<Vec<u8>>> {
        Ok(self.store.lock().get(message_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_roundtrip() {
        let transport = MemoryTransport::new();
        assert_eq!(transport.retrieve("abc").await.unwrap(), None);

        transport.transmit("abc", b"payload").await.unwrap();
        assert_eq!(
            transport.retrieve("abc").await.unwrap(),
            Some(b"payload".to_vec())
        );

        // Publishing again replaces the payload whole.
        transport.transmit("abc", b"newer").await.unwrap();
        assert_eq!(
            transport.retrieve("abc").await.unwrap(),
            Some(b"newer".to_vec())
        );
    }

    #[test]
    fn test_http_transport_url_shape() {
        let transport = HttpTransport::new("http://risk.example.org:26843/");
        assert_eq!(transport.url("deadbeef"), "http://risk.example.org:26843/deadbeef");
    }
}
