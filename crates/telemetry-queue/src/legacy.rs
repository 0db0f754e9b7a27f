//! One-shot import of the line-delimited JSON queue used by older agents.
//!
//! Each non-blank line of the legacy file is one event object. Valid lines
//! are appended in file order inside a single transaction, retention is
//! applied once at the end, and the import is recorded in `legacy_imports`
//! before the file is removed.

use crate::store::{apply_retention, insert_payload};
use crate::{Event, EventStore, StoreResult};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tracing::{info, warn};

/// Summary of a legacy queue import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyImport {
    /// Events appended to the store.
    pub imported: usize,
    /// Lines that were not a valid JSON object.
    pub skipped: usize,
    /// Oldest events evicted to restore the retention ceilings.
    pub evicted: usize,
    /// Whether the legacy file was deleted afterwards.
    pub source_removed: bool,
}

/// Split raw file bytes into stored payloads, counting unusable lines.
fn parse_lines(bytes: &[u8]) -> (Vec<String>, usize) {
    let mut payloads = Vec::new();
    let mut skipped = 0;

    for (index, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        let Ok(line) = std::str::from_utf8(raw) else {
            warn!(line = index + 1, "Skipping legacy event with invalid UTF-8");
            skipped += 1;
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match Event::from_json_str(line).and_then(|event| event.to_payload()) {
            Ok(payload) => payloads.push(payload),
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping malformed legacy event");
                skipped += 1;
            }
        }
    }

    (payloads, skipped)
}

impl EventStore {
    /// Import the legacy queue at `path` if it exists.
    ///
    /// Returns `None` when there is nothing to import, including when the
    /// same file was already imported and only its removal had failed.
    /// A file that cannot be read is left in place for the next start.
    pub async fn import_legacy(&self, path: &Path) -> StoreResult<Option<LegacyImport>> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }
        let source = path.to_string_lossy().to_string();

        let lookup = source.clone();
        let already_imported = self
            .db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT 1 FROM legacy_imports WHERE source = ?1",
                        [lookup],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some())
            })
            .await?;

        if already_imported {
            info!(path = %source, "Legacy queue already imported, removing leftover file");
            remove_source(path).await;
            return Ok(None);
        }

        let bytes = tokio::fs::read(path).await?;
        let (payloads, skipped) = parse_lines(&bytes);
        let limits = self.limits;
        let cache = self.cache.clone();
        let record_source = source.clone();

        let (imported, evicted) = self
            .db
            .call(move |conn| {
                let tx = conn.transaction()?;
                for payload in &payloads {
                    insert_payload(&tx, payload)?;
                }
                let (evicted, stats) = apply_retention(&tx, &limits)?;
                tx.execute(
                    "INSERT INTO legacy_imports (source, imported, skipped) VALUES (?1, ?2, ?3)",
                    params![record_source, payloads.len() as i64, skipped as i64],
                )?;
                tx.commit()?;
                cache.set(stats);
                Ok((payloads.len(), evicted))
            })
            .await?;

        let source_removed = remove_source(path).await;
        info!(
            path = %source,
            imported,
            skipped,
            evicted,
            "Imported legacy event queue"
        );

        Ok(Some(LegacyImport {
            imported,
            skipped,
            evicted,
            source_removed,
        }))
    }
}

async fn remove_source(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove legacy queue file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RetentionLimits, StoreOptions};
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn parse_lines_skips_blank_and_malformed() {
        let text = b"{\"a\":1}\n\n  \nnot json\n[1,2]\n{\"b\": 2}\n\xff\xfe\n";
        let (payloads, skipped) = parse_lines(text);
        assert_eq!(payloads, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
        assert_eq!(skipped, 3);
    }

    #[tokio::test]
    async fn test_open_imports_legacy_file_in_order() {
        let dir = tempdir().unwrap();
        let legacy = dir.path().join("foxtelemetry-queue.jsonl");
        std::fs::write(
            &legacy,
            "{\"seq\":1}\n{\"seq\":2}\ngarbage\n{\"seq\":3}\n",
        )
        .unwrap();

        let store = EventStore::open(
            &dir.path().join("queue.sqlite"),
            StoreOptions {
                limits: RetentionLimits::default(),
                legacy_path: Some(legacy.clone()),
            },
        )
        .await
        .unwrap();

        let records = store.peek(10).await.unwrap();
        let seqs: Vec<_> = records
            .iter()
            .map(|r| r.event().unwrap().get("seq").cloned().unwrap())
            .collect();
        assert_eq!(seqs, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(store.count_estimate(), 3);
        assert!(!legacy.exists());
    }

    #[tokio::test]
    async fn test_import_applies_retention() {
        let dir = tempdir().unwrap();
        let legacy = dir.path().join("legacy.jsonl");
        let lines: String = (0..10).map(|i| format!("{{\"seq\":{i}}}\n")).collect();
        std::fs::write(&legacy, lines).unwrap();

        let store = EventStore::open_in_memory(StoreOptions {
            limits: RetentionLimits::new(4, u64::MAX),
            legacy_path: None,
        })
        .await
        .unwrap();

        let report = store.import_legacy(&legacy).await.unwrap().unwrap();
        assert_eq!(report.imported, 10);
        assert_eq!(report.evicted, 6);
        assert!(report.source_removed);

        let first = store.peek(1).await.unwrap()[0].event().unwrap();
        assert_eq!(first.get("seq"), Some(&json!(6)));
    }

    #[tokio::test]
    async fn test_import_runs_once_per_source() {
        let dir = tempdir().unwrap();
        let legacy = dir.path().join("legacy.jsonl");
        std::fs::write(&legacy, "{\"seq\":1}\n").unwrap();

        let store = EventStore::open_in_memory(StoreOptions::default())
            .await
            .unwrap();
        assert!(store.import_legacy(&legacy).await.unwrap().is_some());

        // A leftover file at the same path is removed, not re-imported.
        std::fs::write(&legacy, "{\"seq\":1}\n").unwrap();
        assert!(store.import_legacy(&legacy).await.unwrap().is_none());
        assert!(!legacy.exists());
        assert_eq!(store.count_estimate(), 1);
    }

    #[tokio::test]
    async fn test_missing_legacy_file_is_noop() {
        let dir = tempdir().unwrap();
        let store = EventStore::open_in_memory(StoreOptions::default())
            .await
            .unwrap();
        let report = store
            .import_legacy(&dir.path().join("absent.jsonl"))
            .await
            .unwrap();
        assert!(report.is_none());
    }
}
