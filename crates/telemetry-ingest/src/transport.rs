//! HTTP transport for compressed batches.
//!
//! `send` never returns an error: every result, including timeouts and
//! refused connections, is classified into a [`FlushOutcome`] so the flush
//! pipeline can decide between dropping, keeping, and retrying.

use crate::{IngestError, IngestResult};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{ACCEPT, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{redirect, Client};
use std::fmt;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Header carrying the project's ingest key.
pub const INGEST_KEY_HEADER: &str = "X-Fox-Ingest-Key";

/// Default connect and request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Server accepted the batch (2xx).
    Delivered { status: u16 },
    /// Server refused the batch permanently.
    Rejected { status: u16 },
    /// Transient failure: 429, 5xx, timeout or connection error.
    Retryable { reason: String },
    /// Nothing was sent.
    Skipped { reason: String },
}

impl FlushOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, FlushOutcome::Delivered { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FlushOutcome::Retryable { .. })
    }

    /// Short name used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            FlushOutcome::Delivered { .. } => "delivered",
            FlushOutcome::Rejected { .. } => "rejected",
            FlushOutcome::Retryable { .. } => "retryable",
            FlushOutcome::Skipped { .. } => "skipped",
        }
    }
}

impl fmt::Display for FlushOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushOutcome::Delivered { status } => write!(f, "delivered (HTTP {status})"),
            FlushOutcome::Rejected { status } => write!(f, "rejected (HTTP {status})"),
            FlushOutcome::Retryable { reason } => write!(f, "retryable: {reason}"),
            FlushOutcome::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

/// Map an HTTP status code to an outcome.
pub fn classify_status(status: u16) -> FlushOutcome {
    match status {
        200..=299 => FlushOutcome::Delivered { status },
        429 | 500..=599 => FlushOutcome::Retryable {
            reason: format!("HTTP {status}"),
        },
        _ => FlushOutcome::Rejected { status },
    }
}

/// Gzip `bytes` with the default compression level.
pub fn gzip(bytes: &[u8]) -> IngestResult<Vec<u8>> {
    let buffer = Vec::with_capacity(bytes.len() / 2 + 32);
    let mut encoder = GzEncoder::new(buffer, Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Transport settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Permit plain `http://` endpoints.
    pub allow_insecure: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            request_timeout: DEFAULT_TIMEOUT,
            allow_insecure: false,
        }
    }
}

impl TransportConfig {
    /// Same timeout for connect and the whole request.
    pub fn with_timeout_secs(timeout_secs: u64, allow_insecure: bool) -> Self {
        let timeout = Duration::from_secs(timeout_secs.max(1));
        Self {
            connect_timeout: timeout,
            request_timeout: timeout,
            allow_insecure,
        }
    }
}

/// Anything that can deliver a compressed batch.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn send(&self, endpoint: &str, ingest_key: &str, body: Vec<u8>) -> FlushOutcome;
}

/// reqwest-backed ingest transport.
pub struct IngestTransport {
    config: TransportConfig,
    client: Client,
}

impl IngestTransport {
    /// Build the HTTP client. Redirects are not followed.
    pub fn new(config: TransportConfig) -> IngestResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Parse the endpoint and apply the scheme policy.
    pub fn check_endpoint(&self, endpoint: &str) -> IngestResult<Url> {
        let url = Url::parse(endpoint).map_err(|e| IngestError::InvalidEndpoint(e.to_string()))?;
        match url.scheme() {
            "https" => Ok(url),
            "http" if self.config.allow_insecure => Ok(url),
            "http" => Err(IngestError::InvalidEndpoint(
                "plain http is not allowed".to_string(),
            )),
            other => Err(IngestError::InvalidEndpoint(format!(
                "unsupported scheme {other}"
            ))),
        }
    }
}

#[async_trait]
impl BatchTransport for IngestTransport {
    async fn send(&self, endpoint: &str, ingest_key: &str, body: Vec<u8>) -> FlushOutcome {
        let url = match self.check_endpoint(endpoint) {
            Ok(url) => url,
            Err(e) => {
                warn!(endpoint, error = %e, "Not sending batch");
                return FlushOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };

        let body_len = body.len();
        debug!(url = %url, bytes = body_len, "Sending batch");

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .header(CONTENT_ENCODING, "gzip")
            .header(ACCEPT, "application/json")
            .header(INGEST_KEY_HEADER, ingest_key)
            .body(body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connect"
                } else {
                    "request"
                };
                warn!(kind, error = %e, "Batch send failed");
                return FlushOutcome::Retryable {
                    reason: format!("{kind} error: {e}"),
                };
            }
        };

        let status = response.status().as_u16();
        let drained = drain(response).await;
        debug!(status, drained, "Response body drained");

        let outcome = classify_status(status);
        debug!(status, outcome = outcome.label(), "Batch send finished");
        outcome
    }
}

/// Read and discard the response body chunk by chunk so the connection can
/// be reused. Returns the number of bytes discarded.
async fn drain(mut response: reqwest::Response) -> u64 {
    let mut drained = 0u64;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => drained += chunk.len() as u64,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Failed to drain response body");
                break;
            }
        }
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Captured request: lower-cased header lines and raw body.
    struct Captured {
        headers: Vec<String>,
        body: Vec<u8>,
    }

    /// One-shot HTTP endpoint answering every request with `status`.
    async fn serve(status: u16) -> (String, tokio::task::JoinHandle<Captured>) {
        serve_with_body(status, b"{}".to_vec()).await
    }

    /// Like `serve`, replying with `reply_body`.
    async fn serve_with_body(
        status: u16,
        reply_body: Vec<u8>,
    ) -> (String, tokio::task::JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            let header_end = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
            let headers: Vec<String> = head.lines().map(str::to_string).collect();
            let content_length = headers
                .iter()
                .find_map(|h| h.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);

            while buf.len() < header_end + content_length {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
            }

            let head = format!(
                "HTTP/1.1 {status} Status\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                reply_body.len()
            );
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.write_all(&reply_body).await.unwrap();
            stream.shutdown().await.ok();

            Captured {
                headers,
                body: buf[header_end..header_end + content_length].to_vec(),
            }
        });

        (format!("http://{addr}/ingest"), handle)
    }

    fn insecure() -> IngestTransport {
        IngestTransport::new(TransportConfig {
            allow_insecure: true,
            ..TransportConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200), FlushOutcome::Delivered { status: 200 });
        assert_eq!(classify_status(204), FlushOutcome::Delivered { status: 204 });
        assert!(classify_status(429).is_retryable());
        assert!(classify_status(500).is_retryable());
        assert!(classify_status(503).is_retryable());
        assert_eq!(classify_status(400), FlushOutcome::Rejected { status: 400 });
        assert_eq!(classify_status(401), FlushOutcome::Rejected { status: 401 });
        assert_eq!(classify_status(302), FlushOutcome::Rejected { status: 302 });
    }

    #[test]
    fn test_gzip_roundtrip() {
        let input = br#"{"events":[]}"#.repeat(20);
        let compressed = gzip(&input).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        let mut out = Vec::new();
        GzDecoder::new(&compressed[..]).read_to_end(&mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_check_endpoint_schemes() {
        let strict = IngestTransport::new(TransportConfig::default()).unwrap();
        assert!(strict.check_endpoint("https://ingest.example.com/v1").is_ok());
        assert!(strict.check_endpoint("http://ingest.example.com/v1").is_err());
        assert!(strict.check_endpoint("ftp://ingest.example.com").is_err());
        assert!(strict.check_endpoint("not a url").is_err());

        assert!(insecure().check_endpoint("http://localhost:9/ingest").is_ok());
    }

    #[tokio::test]
    async fn test_http_disallowed_makes_no_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        let server = tokio::spawn(async move {
            while listener.accept().await.is_ok() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let transport = IngestTransport::new(TransportConfig::default()).unwrap();
        let outcome = transport
            .send(&format!("http://{addr}/ingest"), "key", b"x".to_vec())
            .await;

        assert!(matches!(outcome, FlushOutcome::Skipped { .. }));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 0);
        server.abort();
    }

    #[tokio::test]
    async fn test_send_sets_headers_and_body() {
        let (endpoint, server) = serve(200).await;
        let body = gzip(br#"{"events":[]}"#).unwrap();

        let outcome = insecure().send(&endpoint, "secret-key", body.clone()).await;
        assert_eq!(outcome, FlushOutcome::Delivered { status: 200 });

        let captured = server.await.unwrap();
        assert!(captured.headers[0].starts_with("post /ingest"));
        let has = |h: &str| captured.headers.iter().any(|line| line == h);
        assert!(has("content-type: application/json; charset=utf-8"));
        assert!(has("content-encoding: gzip"));
        assert!(has("accept: application/json"));
        assert!(has("x-fox-ingest-key: secret-key"));
        assert_eq!(captured.body, body);
    }

    #[tokio::test]
    async fn test_large_response_body_is_drained() {
        let size = 4 * 1024 * 1024;
        let (endpoint, server) = serve_with_body(200, vec![b'x'; size]).await;
        let outcome = insecure().send(&endpoint, "key", b"x".to_vec()).await;
        assert_eq!(outcome, FlushOutcome::Delivered { status: 200 });
        server.await.unwrap();

        let (endpoint, server) = serve_with_body(200, vec![b'y'; size]).await;
        let response = Client::new().post(&endpoint).body("x").send().await.unwrap();
        assert_eq!(drain(response).await, size as u64);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_errors_are_retryable() {
        let (endpoint, server) = serve(503).await;
        let outcome = insecure().send(&endpoint, "key", b"x".to_vec()).await;
        assert!(outcome.is_retryable());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_errors_are_rejected() {
        let (endpoint, server) = serve(400).await;
        let outcome = insecure().send(&endpoint, "key", b"x".to_vec()).await;
        assert_eq!(outcome, FlushOutcome::Rejected { status: 400 });
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connection_is_retryable() {
        // Bind then drop to get a port with nothing listening.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let outcome = insecure()
            .send(&format!("http://{addr}/ingest"), "key", b"x".to_vec())
            .await;
        assert!(outcome.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and never answer.
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let transport = IngestTransport::new(TransportConfig {
            connect_timeout: Duration::from_millis(200),
            request_timeout: Duration::from_millis(300),
            allow_insecure: true,
        })
        .unwrap();
        let outcome = transport
            .send(&format!("http://{addr}/ingest"), "key", b"x".to_vec())
            .await;

        match outcome {
            FlushOutcome::Retryable { reason } => assert!(reason.starts_with("timeout")),
            other => panic!("expected retryable, got {other}"),
        }
        server.abort();
    }
}
