//! # Ingest Transport
//!
//! The engine's only outbound dependency: "POST this JSON to that ingest
//! path". Success is any 2xx status; everything else, including a network
//! failure, is a `TransportError`. `HttpTransport` is the production
//! implementation on top of `retrieve::ky_http::ApiClient`.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::core::config::TelemetryConfig;
use crate::retrieve::ky_http::ApiClient;

/// Ingest paths, relative to the configured endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestPath {
    /// Generic events.
    Event,
    /// `screen_view` and `screen_view_end` events.
    ScreenView,
    /// Performance metrics.
    Performance,
}

impl IngestPath {
    /// Relative path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestPath::Event => "event",
            IngestPath::ScreenView => "screen-view",
            IngestPath::Performance => "performance",
        }
    }
}

impl fmt::Display for IngestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint answered with a non-2xx status.
    #[error("HTTP {status}")]
    Rejected {
        /// Status code returned.
        status: u16,
        /// Response body, if any.
        body: Option<String>,
    },

    /// The request never produced a response (DNS, connect, timeout, ...).
    #[error("Network error: {0}")]
    Network(String),

    /// The payload could not be encoded.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether sending the same payload again could succeed: network errors,
    /// 5xx, 408 and 429. Other 4xx mean the payload itself was refused.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Rejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            TransportError::Network(_) => true,
            TransportError::Encode(_) => false,
        }
    }
}

/// Sends a JSON payload to an ingest path.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers `payload` to `path`; `Ok` only on a 2xx answer.
    async fn send(&self, path: IngestPath, payload: Value) -> Result<(), TransportError>;
}

/// HTTP transport posting to `{api_endpoint}/{path}`.
pub struct HttpTransport {
    client: ApiClient,
}

impl HttpTransport {
    /// Builds the HTTP client from the engine configuration.
    pub fn new(config: &TelemetryConfig) -> anyhow::Result<Self> {
        let client = ApiClient::new(
            &config.api_endpoint,
            None,
            config.request_timeout(),
            config.http_max_retries,
        )?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, path: IngestPath, payload: Value) -> Result<(), TransportError> {
        let response = self
            .client
            .post_json(path.as_str(), &payload)
            .await
            .map_err(|e| TransportError::Network(format!("{:#}", e)))?;

        if response.success {
            Ok(())
        } else {
            Err(TransportError::Rejected {
                status: response.status,
                body: response.error_body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers one request with `status` and hands back the raw request text.
    async fn one_shot_server(status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let base = format!("http://127.0.0.1:{}/telemetry", port);

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            // Read until the JSON body has been received
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= split + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.flush().await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        (base, handle)
    }

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(&TelemetryConfig::new(base)).unwrap()
    }

    #[tokio::test]
    async fn posts_json_to_joined_path() {
        let (base, server) = one_shot_server("201 Created").await;
        let result = transport(&base)
            .send(IngestPath::ScreenView, json!({"screenName": "Home"}))
            .await;
        let request = server.await.unwrap();

        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result.err());
        assert!(request.starts_with("POST /telemetry/screen-view HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(request.ends_with("{\"screenName\":\"Home\"}"));
    }

    #[tokio::test]
    async fn non_2xx_is_a_rejection() {
        let (base, server) = one_shot_server("503 Service Unavailable").await;
        let result = transport(&base).send(IngestPath::Event, json!({})).await;
        server.await.unwrap();

        match result {
            Err(e @ TransportError::Rejected { status: 503, .. }) => assert!(e.is_retryable()),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = transport(&format!("http://127.0.0.1:{}/", port))
            .send(IngestPath::Performance, json!({}))
            .await;
        assert!(matches!(result, Err(TransportError::Network(_))));
    }

    #[test]
    fn retryable_classification() {
        let rejected = |status| TransportError::Rejected { status, body: None };
        assert!(rejected(500).is_retryable());
        assert!(rejected(429).is_retryable());
        assert!(rejected(408).is_retryable());
        assert!(!rejected(400).is_retryable());
        assert!(!rejected(404).is_retryable());
    }
}
