//! Background flush scheduling.
//!
//! ```text
//! request_flush() ──▶ Notify ──┐
//! interval tick ───────────────┼──▶ flusher task ──▶ FlushPipeline::flush()
//! backoff deadline ────────────┘          │
//!                                         └── RetryRequested: wait 1s → 2s → … → 60s
//! ```
//!
//! Requests coalesce: any number of `request_flush()` calls while a flush is
//! running or pending result in one more pass. While a retry backoff is
//! pending, new requests keep the existing deadline.

use crate::pipeline::{FlushPipeline, FlushStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Something that can be asked to flush soon.
pub trait FlushScheduler: Send + Sync {
    fn request_flush(&self);
}

/// Scheduler that ignores requests; flushes happen only when called directly.
#[derive(Debug, Default)]
pub struct ManualScheduler;

impl FlushScheduler for ManualScheduler {
    fn request_flush(&self) {
        debug!("Flush requested with no background flusher");
    }
}

/// Background flusher configuration.
#[derive(Debug, Clone)]
pub struct FlusherConfig {
    /// Flush on this period in addition to explicit requests.
    pub interval: Option<Duration>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for FlusherConfig {
    fn default() -> Self {
        Self {
            interval: None,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(60000),
        }
    }
}

/// Single tokio task that runs the flush pipeline on demand.
pub struct BackgroundFlusher {
    notify: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundFlusher {
    /// Spawn the flusher on the current tokio runtime.
    pub fn spawn(pipeline: Arc<FlushPipeline>, config: FlusherConfig) -> Self {
        let notify = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run(pipeline, config, notify.clone(), shutdown_rx));
        info!("Background flusher started");

        Self {
            notify,
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stop the task, waiting for an in-flight flush to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background flusher task failed");
            }
            info!("Background flusher stopped");
        }
    }
}

impl FlushScheduler for BackgroundFlusher {
    fn request_flush(&self) {
        self.notify.notify_one();
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn run(
    pipeline: Arc<FlushPipeline>,
    config: FlusherConfig,
    notify: Arc<Notify>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = config.interval.map(|period| {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let mut backoff = config.initial_backoff;
    let mut retry_at: Option<Instant> = None;

    loop {
        let retry_deadline = retry_at.unwrap_or_else(Instant::now);
        let woke_for_retry = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            _ = tokio::time::sleep_until(retry_deadline), if retry_at.is_some() => true,
            _ = notify.notified() => false,
            _ = next_tick(&mut ticker) => false,
        };

        if retry_at.is_some() && !woke_for_retry {
            debug!("Flush already scheduled after backoff");
            continue;
        }
        retry_at = None;

        let report = pipeline.flush().await;
        match report.status {
            FlushStatus::RetryRequested => {
                debug!(delay_ms = backoff.as_millis() as u64, "Scheduling flush retry");
                retry_at = Some(Instant::now() + backoff);
                // Exponential backoff with cap
                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
            FlushStatus::Success => {
                backoff = config.initial_backoff;
                // A full delivered batch means more may be waiting.
                if report.dropped > 0 && report.batch_len >= pipeline.target().batch_size {
                    notify.notify_one();
                }
            }
            FlushStatus::NoOp => backoff = config.initial_backoff,
        }
    }
}
