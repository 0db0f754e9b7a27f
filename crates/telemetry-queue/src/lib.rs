//! Durable event queue for the FoxTelemetry agent.
//!
//! This crate provides:
//! - `EventStore`: persistent, bounded, append-only FIFO of pending events
//! - `retention`: the pure eviction planner applied after every insert
//! - Legacy import of the line-delimited JSON queue used by older agents
//!
//! # Architecture
//!
//! All SQLite work runs on one dedicated executor thread. Requests are sent
//! over a channel and executed in FIFO order, so no two mutations ever
//! interleave and every call observes a consistent snapshot. Callers await
//! results without blocking the Tokio runtime.
//!
//! ```ignore
//! let store = EventStore::open(&path, StoreOptions::default()).await?;
//! store.enqueue(&event).await?;
//! let batch = store.peek(50).await?;
//! if let Some(last) = batch.last() {
//!     store.drop_through(last.id, batch.len()).await?;
//! }
//! ```

mod error;
mod event;
mod executor;
mod legacy;
mod migrations;
pub mod retention;
mod store;

pub use error::{StoreError, StoreResult};
pub use event::{Event, QueueRecord};
pub use executor::QueueDatabase;
pub use legacy::LegacyImport;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use retention::RetentionLimits;
pub use store::{EnqueueReceipt, EventStore, QueueStats, StoreOptions};
