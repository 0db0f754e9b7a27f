//! Throwaway ingest endpoint for end-to-end tests.

#![allow(dead_code)]

use flate2::read::GzDecoder;
use parking_lot::Mutex;
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use telemetry_agent::{AgentOptions, Paths, Telemetry, TelemetryConfig};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One request as seen by the server.
#[derive(Debug, Clone)]
pub struct Received {
    pub ingest_key: Option<String>,
    pub content_encoding: Option<String>,
    /// Decompressed JSON body.
    pub body: Value,
}

impl Received {
    pub fn events(&self) -> &Vec<Value> {
        self.body["events"].as_array().expect("events array")
    }
}

/// HTTP server answering with scripted status codes (the last one repeats).
pub struct MockIngest {
    pub endpoint: String,
    pub received: Arc<Mutex<Vec<Received>>>,
    pub connections: Arc<Mutex<usize>>,
    handle: JoinHandle<()>,
}

impl MockIngest {
    pub async fn start(statuses: Vec<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));
        let statuses = Arc::new(Mutex::new(statuses));

        let handle = {
            let received = received.clone();
            let connections = connections.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    *connections.lock() += 1;
                    let status = {
                        let mut statuses = statuses.lock();
                        if statuses.len() > 1 {
                            statuses.remove(0)
                        } else {
                            statuses[0]
                        }
                    };
                    if let Some(request) = handle_connection(stream, status).await {
                        received.lock().push(request);
                    }
                }
            })
        };

        Self {
            endpoint: format!("http://{addr}/v1/events"),
            received,
            connections,
            handle,
        }
    }

    pub fn requests(&self) -> Vec<Received> {
        self.received.lock().clone()
    }

    pub fn connection_count(&self) -> usize {
        *self.connections.lock()
    }
}

impl Drop for MockIngest {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(mut stream: TcpStream, status: u16) -> Option<Received> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let header = |name: &str| {
        head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim().to_string())
        })
    };
    let content_length: usize = header("content-length")?.parse().ok()?;

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let reply = format!("HTTP/1.1 {status} Scripted\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
    stream.write_all(reply.as_bytes()).await.ok()?;
    stream.shutdown().await.ok();

    let mut json = Vec::new();
    GzDecoder::new(&buf[header_end..header_end + content_length])
        .read_to_end(&mut json)
        .ok()?;

    Some(Received {
        ingest_key: header("x-fox-ingest-key"),
        content_encoding: header("content-encoding"),
        body: serde_json::from_slice(&json).ok()?,
    })
}

pub fn test_config(endpoint: &str) -> TelemetryConfig {
    let mut config =
        TelemetryConfig::new("proj-1", "app-1", "com.example.app", endpoint, "ingest-key").unwrap();
    config.allow_http = true;
    config.environment = Some("test".to_string());
    config
}

/// Agent rooted in a fresh temporary directory.
pub async fn start_agent(config: TelemetryConfig, options: AgentOptions) -> (Arc<Telemetry>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::with_base_dir(dir.path().join("foxtelemetry"));
    let telemetry = Telemetry::init(config, &paths, options).await.unwrap();
    (telemetry, dir)
}
