//! Panic capture.
//!
//! The hook is installed once per process and chains to whatever hook was
//! set before it. The reporting agent can be swapped afterwards; the hook
//! looks it up on every panic.

use crate::Telemetry;
use parking_lot::Mutex;
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use telemetry_queue::{Event, EventStore, StoreError};
use tracing::{debug, warn};

/// Longest the panicking thread waits for the event to be persisted.
const RECORD_TIMEOUT: Duration = Duration::from_secs(2);

static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);
static REPORTER: Mutex<Option<Arc<Telemetry>>> = parking_lot::const_mutex(None);

/// Route panics to `telemetry`. Returns true if this call installed the hook.
pub fn install_panic_hook(telemetry: &Arc<Telemetry>) -> bool {
    *REPORTER.lock() = Some(telemetry.clone());

    if HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        debug!("Panic hook already installed, reporter replaced");
        return false;
    }

    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        // The hook must never panic itself.
        let _ = panic::catch_unwind(AssertUnwindSafe(|| capture(info)));
        previous(info);
    }));
    debug!("Panic hook installed");
    true
}

/// Stop reporting panics to `telemetry` if it is the current reporter.
pub fn clear_panic_reporter(telemetry: &Arc<Telemetry>) {
    let mut reporter = REPORTER.lock();
    if reporter.as_ref().is_some_and(|r| Arc::ptr_eq(r, telemetry)) {
        *reporter = None;
    }
}

/// Text of a panic payload.
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

fn capture(info: &PanicHookInfo<'_>) {
    // A panic while the lock is held elsewhere is not worth a deadlock.
    let Some(reporter) = REPORTER.try_lock().and_then(|r| r.clone()) else {
        return;
    };

    let message = payload_message(info.payload());
    let location = info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
    let backtrace = Backtrace::force_capture();
    let event = reporter
        .builder()
        .panic(&message, location.as_deref(), &backtrace);

    match record_blocking(reporter.store().clone(), event, RECORD_TIMEOUT) {
        RecordStatus::Recorded => debug!("Panic recorded"),
        RecordStatus::Failed(e) => warn!(error = %e, "Failed to record panic"),
        RecordStatus::TimedOut => warn!("Timed out recording panic, continuing without it"),
    }
}

#[derive(Debug)]
enum RecordStatus {
    Recorded,
    Failed(String),
    TimedOut,
}

/// Persist `event` from a helper thread with its own runtime.
///
/// The panicking thread may be a runtime worker, or the store executor
/// itself, so the wait is bounded. On timeout the helper is left to finish
/// in the background.
fn record_blocking(store: EventStore, event: Event, timeout: Duration) -> RecordStatus {
    let (tx, rx) = mpsc::channel();
    let spawned = std::thread::Builder::new()
        .name("foxtel-panic".to_string())
        .spawn(move || {
            let result = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(StoreError::from)
                .and_then(|runtime| runtime.block_on(store.enqueue(&event)));
            let _ = tx.send(result.map(|_| ()));
        });
    if let Err(e) = spawned {
        return RecordStatus::Failed(format!("failed to spawn panic recorder: {e}"));
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(())) => RecordStatus::Recorded,
        Ok(Err(e)) => RecordStatus::Failed(e.to_string()),
        Err(mpsc::RecvTimeoutError::Timeout) => RecordStatus::TimedOut,
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            RecordStatus::Failed("panic recorder thread panicked".to_string())
        }
    }
}
