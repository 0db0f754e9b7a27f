//! FoxTelemetry agent.
//!
//! Captures log lines, reported errors and panics as JSON events, persists
//! them in a bounded on-disk queue, and ships them to the ingest endpoint in
//! gzip-compressed batches.
//!
//! ```ignore
//! let config = TelemetryConfig::load(&paths)?;
//! let telemetry = Telemetry::init(config, &paths, AgentOptions::default()).await?;
//!
//! telemetry.info("Checkout", "order placed").await;
//! if let Err(e) = sync().await {
//!     telemetry.report(&e, "sync").await;
//! }
//! ```

mod agent;
pub mod crash;
mod error;
pub mod event;
pub mod install_id;
pub mod pipeline;
pub mod scheduler;

pub use agent::{AgentOptions, Telemetry};
pub use error::{AgentError, AgentResult};
pub use event::{EventBuilder, LogLevel, UNCAUGHT_PANIC};
pub use pipeline::{FlushPipeline, FlushReport, FlushStatus, FlushTarget};
pub use scheduler::{BackgroundFlusher, FlushScheduler, FlusherConfig, ManualScheduler};

pub use telemetry_config::{Paths, TelemetryConfig};
pub use telemetry_ingest::FlushOutcome;
pub use telemetry_queue::QueueStats;
