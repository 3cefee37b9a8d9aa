//! HTTP transport for hit delivery.
//!
//! Hits are plain GET requests against the collector. [`HttpTransport`] wraps
//! an async `reqwest` client in a current-thread runtime so the sender can
//! block its queue worker until the single request completes.

use std::time::Duration;

/// Timeout applied to every hit request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport error types.
#[derive(Debug)]
pub enum TransportError {
    /// Client or runtime could not be created
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Request exceeded the timeout
    Timeout,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Config(msg) => write!(f, "Transport config error: {msg}"),
            TransportError::Network(msg) => write!(f, "Transport network error: {msg}"),
            TransportError::Timeout => write!(f, "Transport timeout"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Delivers one hit URL and reports the HTTP status code.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<u16, TransportError>;
}

/// Blocking HTTP transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Config(format!("Failed to create runtime: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("hit-tracker/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, runtime })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, timeout: Duration) -> Result<u16, TransportError> {
        self.runtime.block_on(async {
            let response = self
                .client
                .get(url)
                .header("Cache-Control", "no-cache")
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        TransportError::Timeout
                    } else {
                        TransportError::Network(e.to_string())
                    }
                })?;
            Ok(response.status().as_u16())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_host_is_network_error() {
        let transport = HttpTransport::new().unwrap();
        let result = transport.get("http://127.0.0.1:9/hit.xiti?s=1", Duration::from_secs(2));
        assert!(matches!(
            result,
            Err(TransportError::Network(_)) | Err(TransportError::Timeout)
        ));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(TransportError::Timeout.to_string(), "Transport timeout");
        assert!(TransportError::Network("refused".into())
            .to_string()
            .contains("refused"));
    }
}
