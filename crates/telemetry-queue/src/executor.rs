//! Single-writer SQLite executor.
//!
//! The queue database is owned by one dedicated background thread. Every
//! operation is a closure sent through a channel and executed in FIFO order:
//!
//! 1. **Single writer**: no two store mutations ever interleave
//! 2. **No blocking in async context**: callers await results on a oneshot
//! 3. **SQL only inside `call()`**: network I/O and heavy work stay outside
//!
//! ```ignore
//! let db = QueueDatabase::open(path).await?;
//! let count = db.call(|conn| {
//!     Ok(conn.query_row("SELECT COUNT(*) FROM event_queue", [], |row| row.get::<_, i64>(0))?)
//! }).await?;
//! ```

use crate::{migrations, StoreError, StoreResult};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

const FILE_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA temp_store = MEMORY;
    PRAGMA busy_timeout = 5000;
";

/// Convert a tokio_rusqlite::Error to StoreError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => StoreError::Connection("Connection closed".to_string()),
        other => StoreError::Connection(other.to_string()),
    }
}

/// Async handle to the queue database's executor thread.
///
/// Cloning is cheap; all clones talk to the same thread.
#[derive(Clone)]
pub struct QueueDatabase {
    conn: Connection,
    path: String,
}

impl QueueDatabase {
    /// Open (or create) a queue database file and run pending migrations.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening queue database");

        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::initialize(conn, path_str, Some(FILE_PRAGMAS)).await
    }

    /// Open a private in-memory database, used by tests and ephemeral agents.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::initialize(conn, ":memory:".to_string(), None).await
    }

    async fn initialize(
        conn: Connection,
        path: String,
        pragmas: Option<&'static str>,
    ) -> StoreResult<Self> {
        let db = Self { conn, path };

        db.call(move |conn| {
            if let Some(pragmas) = pragmas {
                conn.execute_batch(pragmas)?;
            }
            migrations::run_migrations(conn)
        })
        .await?;

        debug!(path = %db.path, "Queue database initialized");
        Ok(db)
    }

    /// Execute a closure on the executor thread.
    ///
    /// Only SQL and lightweight row mapping belong inside the closure; anything
    /// slow here stalls every other producer and flush.
    pub async fn call<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let outer_result = self
            .conn
            .call(move |conn| {
                let inner_result = f(conn);
                Ok(inner_result)
            })
            .await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Get the database file path (`:memory:` for in-memory databases).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check the executor is alive by running a trivial query.
    pub async fn health_check(&self) -> StoreResult<()> {
        self.call(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(())
        })
        .await?;
        debug!("Queue database health check passed");
        Ok(())
    }

    /// Close the connection after pending operations complete.
    pub async fn close(self) -> StoreResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to close database: {:?}", e)))?;
        info!(path = %self.path, "Queue database closed");
        Ok(())
    }
}
