//! Durable, bounded FIFO event store.

use crate::retention::{self, RetentionLimits};
use crate::{Event, QueueDatabase, QueueRecord, StoreResult};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Options for opening an event store.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Count and byte ceilings enforced after every insert.
    pub limits: RetentionLimits,
    /// Legacy JSONL queue to import once on open, if present.
    pub legacy_path: Option<PathBuf>,
}

/// Aggregate size of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Number of queued events.
    pub count: u64,
    /// Sum of payload lengths in bytes.
    pub bytes: u64,
}

/// Result of a successful enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueReceipt {
    /// Sequence id assigned to the new record.
    pub id: i64,
    /// Oldest records evicted to restore the retention ceilings.
    pub evicted: usize,
}

/// Last committed aggregates, written on the executor thread only.
#[derive(Debug, Default)]
pub(crate) struct CachedStats {
    count: AtomicU64,
    bytes: AtomicU64,
}

impl CachedStats {
    pub(crate) fn set(&self, stats: QueueStats) {
        self.count.store(stats.count, Ordering::Release);
        self.bytes.store(stats.bytes, Ordering::Release);
    }
}

/// Persistent, ordered, bounded log of pending events.
///
/// Every operation runs on the database executor thread, which is the
/// store's single mutual-exclusion boundary: enqueue, peek, and drop from
/// any number of tasks never interleave. Clones share the same queue.
#[derive(Clone)]
pub struct EventStore {
    pub(crate) db: QueueDatabase,
    pub(crate) limits: RetentionLimits,
    pub(crate) cache: Arc<CachedStats>,
}

impl EventStore {
    /// Open the store at `path`, importing the legacy queue if one is present.
    pub async fn open(path: &Path, options: StoreOptions) -> StoreResult<Self> {
        let db = QueueDatabase::open(path).await?;
        Self::with_database(db, options).await
    }

    /// Open a store backed by a private in-memory database.
    pub async fn open_in_memory(options: StoreOptions) -> StoreResult<Self> {
        let db = QueueDatabase::open_in_memory().await?;
        Self::with_database(db, options).await
    }

    /// Build a store on an already-open database.
    pub async fn with_database(db: QueueDatabase, options: StoreOptions) -> StoreResult<Self> {
        let store = Self {
            db,
            limits: options.limits,
            cache: Arc::new(CachedStats::default()),
        };

        // Ceilings may have been lowered since the queue was last written.
        let evicted = store.enforce_retention().await?;
        if evicted > 0 {
            warn!(evicted, "Evicted queued events exceeding current retention ceilings");
        }

        if let Some(legacy_path) = options.legacy_path.as_deref() {
            if let Err(e) = store.import_legacy(legacy_path).await {
                warn!(
                    path = %legacy_path.display(),
                    error = %e,
                    "Legacy queue import failed, continuing without it"
                );
            }
        }

        let stats = store.stats_estimate();
        info!(count = stats.count, bytes = stats.bytes, "Event store ready");
        Ok(store)
    }

    /// Retention ceilings in force.
    pub fn limits(&self) -> RetentionLimits {
        self.limits
    }

    /// Append one event, then evict the oldest records if a ceiling is exceeded.
    ///
    /// On failure the event is not stored and is not retried.
    pub async fn enqueue(&self, event: &Event) -> StoreResult<EnqueueReceipt> {
        let payload = event.to_payload()?;
        let limits = self.limits;
        let cache = self.cache.clone();

        let receipt = self
            .db
            .call(move |conn| {
                let tx = conn.transaction()?;
                let id = insert_payload(&tx, &payload)?;
                let (evicted, stats) = apply_retention(&tx, &limits)?;
                tx.commit()?;
                cache.set(stats);
                Ok(EnqueueReceipt { id, evicted })
            })
            .await?;

        if receipt.evicted > 0 {
            warn!(
                id = receipt.id,
                evicted = receipt.evicted,
                "Queue over retention ceiling, evicted oldest events"
            );
        } else {
            debug!(id = receipt.id, "Enqueued event");
        }
        Ok(receipt)
    }

    /// Up to `max` oldest records in sequence order, without removing them.
    pub async fn peek(&self, max: usize) -> StoreResult<Vec<QueueRecord>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(max).unwrap_or(i64::MAX);

        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, payload, byte_len FROM event_queue ORDER BY id ASC LIMIT ?1",
                )?;
                let records = stmt
                    .query_map([limit], |row| {
                        Ok(QueueRecord {
                            id: row.get(0)?,
                            payload: row.get(1)?,
                            byte_len: row.get::<_, i64>(2)?.max(0) as u64,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
    }

    /// Delete the `n` oldest records. Returns how many were removed.
    ///
    /// Deleting more than are queued empties the store; `n == 0` is a no-op.
    pub async fn drop_oldest(&self, n: usize) -> StoreResult<usize> {
        if n == 0 {
            return Ok(0);
        }
        let cache = self.cache.clone();

        let removed = self
            .db
            .call(move |conn| {
                let tx = conn.transaction()?;
                let removed = delete_oldest(&tx, n)?;
                let stats = read_stats(&tx)?;
                tx.commit()?;
                cache.set(stats);
                Ok(removed)
            })
            .await?;

        debug!(requested = n, removed, "Dropped oldest events");
        Ok(removed)
    }

    /// Delete up to `n` oldest records whose id is at most `last_id`.
    ///
    /// Used to acknowledge a peeked batch: records another caller already
    /// removed are not replaced by newer ones, so a batch is never
    /// acknowledged twice.
    pub async fn drop_through(&self, last_id: i64, n: usize) -> StoreResult<usize> {
        if n == 0 {
            return Ok(0);
        }
        let cache = self.cache.clone();

        let removed = self
            .db
            .call(move |conn| {
                let tx = conn.transaction()?;
                let removed = delete_through(&tx, last_id, n)?;
                let stats = read_stats(&tx)?;
                tx.commit()?;
                cache.set(stats);
                Ok(removed)
            })
            .await?;

        debug!(last_id, requested = n, removed, "Dropped acknowledged events");
        Ok(removed)
    }

    /// Re-apply the retention ceilings. Returns the number of evicted records.
    pub async fn enforce_retention(&self) -> StoreResult<usize> {
        let limits = self.limits;
        let cache = self.cache.clone();

        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                let (evicted, stats) = apply_retention(&tx, &limits)?;
                tx.commit()?;
                cache.set(stats);
                Ok(evicted)
            })
            .await
    }

    /// Exact aggregates read from the database (also refreshes the estimates).
    pub async fn stats(&self) -> StoreResult<QueueStats> {
        let cache = self.cache.clone();
        self.db
            .call(move |conn| {
                let stats = read_stats(conn)?;
                cache.set(stats);
                Ok(stats)
            })
            .await
    }

    /// Cached aggregates from the last committed mutation.
    pub fn stats_estimate(&self) -> QueueStats {
        QueueStats {
            count: self.count_estimate(),
            bytes: self.byte_estimate(),
        }
    }

    /// Cached number of queued events.
    pub fn count_estimate(&self) -> u64 {
        self.cache.count.load(Ordering::Acquire)
    }

    /// Cached total payload bytes.
    pub fn byte_estimate(&self) -> u64 {
        self.cache.bytes.load(Ordering::Acquire)
    }

    /// Access the underlying database executor.
    pub fn database(&self) -> &QueueDatabase {
        &self.db
    }
}

pub(crate) fn insert_payload(conn: &Connection, payload: &str) -> StoreResult<i64> {
    conn.execute(
        "INSERT INTO event_queue (payload, byte_len) VALUES (?1, ?2)",
        params![payload, payload.len() as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn read_stats(conn: &Connection) -> StoreResult<QueueStats> {
    let (count, bytes): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(byte_len), 0) FROM event_queue",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(QueueStats {
        count: count.max(0) as u64,
        bytes: bytes.max(0) as u64,
    })
}

/// Evict oldest records until both ceilings hold. Returns the eviction count
/// and the aggregates afterwards.
pub(crate) fn apply_retention(
    conn: &Connection,
    limits: &RetentionLimits,
) -> StoreResult<(usize, QueueStats)> {
    let stats = read_stats(conn)?;
    if limits.admits(stats.count, stats.bytes) {
        return Ok((0, stats));
    }

    // Rows are pulled lazily; the planner stops at the first admitted state.
    let mut stmt = conn.prepare("SELECT byte_len FROM event_queue ORDER BY id ASC")?;
    let mut rows = stmt.query([])?;
    let mut read_error = None;
    let lengths = std::iter::from_fn(|| {
        let row = match rows.next() {
            Ok(row) => row?,
            Err(e) => {
                read_error = Some(e);
                return None;
            }
        };
        match row.get::<_, i64>(0) {
            Ok(len) => Some(len.max(0) as u64),
            Err(e) => {
                read_error = Some(e);
                None
            }
        }
    });
    let purge = retention::plan_purge(stats.count, stats.bytes, lengths, limits);
    drop(rows);
    drop(stmt);
    if let Some(e) = read_error {
        return Err(e.into());
    }

    delete_oldest(conn, purge)?;
    Ok((purge, read_stats(conn)?))
}

fn delete_oldest(conn: &Connection, n: usize) -> StoreResult<usize> {
    if n == 0 {
        return Ok(0);
    }
    let limit = i64::try_from(n).unwrap_or(i64::MAX);
    let removed = conn.execute(
        "DELETE FROM event_queue WHERE id IN (
            SELECT id FROM event_queue ORDER BY id ASC LIMIT ?1
        )",
        [limit],
    )?;
    Ok(removed)
}

fn delete_through(conn: &Connection, last_id: i64, n: usize) -> StoreResult<usize> {
    let limit = i64::try_from(n).unwrap_or(i64::MAX);
    let removed = conn.execute(
        "DELETE FROM event_queue WHERE id IN (
            SELECT id FROM event_queue WHERE id <= ?1 ORDER BY id ASC LIMIT ?2
        )",
        params![last_id, limit],
    )?;
    Ok(removed)
}
