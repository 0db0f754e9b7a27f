//! The agent context object.

use crate::crash;
use crate::event::{EventBuilder, LogLevel};
use crate::install_id::{self, FileStorage};
use crate::pipeline::{FlushPipeline, FlushReport, FlushTarget};
use crate::scheduler::{BackgroundFlusher, FlushScheduler, FlusherConfig, ManualScheduler};
use crate::AgentResult;
use std::backtrace::Backtrace;
use std::error::Error;
use std::sync::Arc;
use telemetry_config::{Paths, TelemetryConfig};
use telemetry_ingest::{BatchTransport, IngestTransport, TransportConfig};
use telemetry_queue::{Event, EventStore, QueueStats, RetentionLimits, StoreOptions};
use tracing::{debug, error, info, warn};

/// Target used when mirroring captured log events to `tracing`.
const MIRROR_TARGET: &str = "foxtel::app";

/// Runtime options that are not part of the configuration file.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Run a background flusher; otherwise flushing only happens via `flush_now`.
    pub background_flush: bool,
    pub flusher: FlusherConfig,
    /// Allow installing the panic hook when the config enables crash capture.
    pub install_panic_hook: bool,
    /// Request a flush right after startup.
    pub flush_on_start: bool,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            background_flush: true,
            flusher: FlusherConfig::default(),
            install_panic_hook: true,
            flush_on_start: true,
        }
    }
}

impl AgentOptions {
    /// No background task and no panic hook, for one-shot tools.
    pub fn foreground() -> Self {
        Self {
            background_flush: false,
            install_panic_hook: false,
            flush_on_start: false,
            ..Self::default()
        }
    }
}

/// Telemetry agent: capture API, queue, and flushing in one shared context.
///
/// Build it once with [`Telemetry::init`] and share the returned `Arc`.
/// Capture methods never fail; problems are logged and the event is dropped.
pub struct Telemetry {
    builder: EventBuilder,
    store: EventStore,
    pipeline: Arc<FlushPipeline>,
    scheduler: Arc<dyn FlushScheduler>,
    flusher: Option<Arc<BackgroundFlusher>>,
}

impl Telemetry {
    /// Open the queue under `paths`, load the install id, and start flushing.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn init(
        config: TelemetryConfig,
        paths: &Paths,
        options: AgentOptions,
    ) -> AgentResult<Arc<Self>> {
        paths.ensure_dirs()?;

        let install_id = install_id::get_or_create(&FileStorage::new(paths.install_id_file()))?;
        let store = EventStore::open(
            &paths.queue_database_file(),
            StoreOptions {
                limits: RetentionLimits::new(config.max_queue_events, config.max_queue_bytes),
                legacy_path: Some(paths.legacy_queue_file()),
            },
        )
        .await?;
        let transport = IngestTransport::new(TransportConfig::with_timeout_secs(
            config.timeout_secs,
            config.allow_http,
        ))?;

        Ok(Self::from_parts(
            config,
            install_id,
            store,
            Arc::new(transport),
            options,
        ))
    }

    /// Assemble an agent from an open store and any transport.
    ///
    /// Spawns the background flusher when enabled, so it needs a tokio runtime.
    pub fn from_parts(
        config: TelemetryConfig,
        install_id: String,
        store: EventStore,
        transport: Arc<dyn BatchTransport>,
        options: AgentOptions,
    ) -> Arc<Self> {
        let pipeline = Arc::new(FlushPipeline::new(
            store.clone(),
            transport,
            FlushTarget::from_config(&config),
        ));

        let (scheduler, flusher) = if options.background_flush {
            let flusher = Arc::new(BackgroundFlusher::spawn(
                pipeline.clone(),
                options.flusher.clone(),
            ));
            let scheduler: Arc<dyn FlushScheduler> = flusher.clone();
            (scheduler, Some(flusher))
        } else {
            let scheduler: Arc<dyn FlushScheduler> = Arc::new(ManualScheduler);
            (scheduler, None)
        };

        let telemetry = Arc::new(Self {
            builder: EventBuilder::new(&config, install_id),
            store,
            pipeline,
            scheduler,
            flusher,
        });

        if config.enable_crash_capture && options.install_panic_hook {
            crash::install_panic_hook(&telemetry);
        }
        if options.flush_on_start {
            telemetry.request_flush();
        }

        info!(
            project_id = %config.project_id,
            app_id = %config.app_id,
            background_flush = options.background_flush,
            "Telemetry initialized"
        );
        telemetry
    }

    pub fn builder(&self) -> &EventBuilder {
        &self.builder
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn install_id(&self) -> &str {
        self.builder.install_id()
    }

    /// Set or clear the user id stamped on subsequent events.
    pub fn set_user_id(&self, user_id: Option<String>) {
        self.builder.set_user_id(user_id);
    }

    pub async fn debug(&self, tag: &str, message: &str) {
        self.log(LogLevel::Debug, tag, message).await;
    }

    pub async fn info(&self, tag: &str, message: &str) {
        self.log(LogLevel::Info, tag, message).await;
    }

    pub async fn warn(&self, tag: &str, message: &str) {
        self.log(LogLevel::Warn, tag, message).await;
    }

    pub async fn error(&self, tag: &str, message: &str) {
        self.log(LogLevel::Error, tag, message).await;
    }

    /// Mirror the line to `tracing` and queue a log event.
    pub async fn log(&self, level: LogLevel, tag: &str, message: &str) {
        match level {
            LogLevel::Debug => debug!(target: MIRROR_TARGET, tag, "{message}"),
            LogLevel::Info => info!(target: MIRROR_TARGET, tag, "{message}"),
            LogLevel::Warn => warn!(target: MIRROR_TARGET, tag, "{message}"),
            LogLevel::Error => error!(target: MIRROR_TARGET, tag, "{message}"),
        }

        let event = self.builder.log(level, tag, message);
        self.enqueue(&event).await;
    }

    /// Queue an error event for `err` and request a flush.
    pub async fn report<E>(&self, err: &E, context: &str)
    where
        E: Error + 'static,
    {
        let backtrace = Backtrace::force_capture();
        let event = self
            .builder
            .error(err, Some(std::any::type_name::<E>()), context, &backtrace);
        self.enqueue(&event).await;
        self.request_flush();
    }

    /// Like [`report`](Self::report) for a type-erased error.
    pub async fn report_dyn(&self, err: &(dyn Error + 'static), context: &str) {
        let backtrace = Backtrace::force_capture();
        let event = self.builder.error(err, None, context, &backtrace);
        self.enqueue(&event).await;
        self.request_flush();
    }

    async fn enqueue(&self, event: &Event) {
        if let Err(e) = self.store.enqueue(event).await {
            warn!(error = %e, "Failed to queue telemetry event, dropping it");
        }
    }

    /// Ask the scheduler for a flush soon.
    pub fn request_flush(&self) {
        self.scheduler.request_flush();
    }

    /// Run one flush pass now.
    pub async fn flush_now(&self) -> FlushReport {
        self.pipeline.flush().await
    }

    /// Exact queue size.
    pub async fn queue_stats(&self) -> AgentResult<QueueStats> {
        Ok(self.store.stats().await?)
    }

    /// Cached queue size, without touching the database.
    pub fn queue_stats_estimate(&self) -> QueueStats {
        self.store.stats_estimate()
    }

    /// Stop background flushing and detach from the panic hook.
    ///
    /// Queued events stay on disk for the next run.
    pub async fn shutdown(self: &Arc<Self>) {
        crash::clear_panic_reporter(self);
        if let Some(flusher) = &self.flusher {
            flusher.shutdown().await;
        }
        info!("Telemetry shut down");
    }
}
