//! Batch body encoding.
//!
//! Stored payloads are embedded as raw JSON, byte for byte, so the same
//! records always produce the same body.

use crate::{IngestError, IngestResult};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use telemetry_queue::QueueRecord;

/// Identifiers sent with every batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountIds {
    pub project_id: String,
    pub app_id: String,
    pub package_name: String,
}

impl AccountIds {
    pub fn new(
        project_id: impl Into<String>,
        app_id: impl Into<String>,
        package_name: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            app_id: app_id.into(),
            package_name: package_name.into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchBody<'a> {
    project_id: &'a str,
    app_id: &'a str,
    package_name: &'a str,
    events: Vec<&'a RawValue>,
}

fn raw_event(record: &QueueRecord) -> IngestResult<&RawValue> {
    let raw: &RawValue =
        serde_json::from_str(&record.payload).map_err(|e| IngestError::Encode {
            id: record.id,
            reason: e.to_string(),
        })?;

    if !raw.get().starts_with('{') {
        return Err(IngestError::Encode {
            id: record.id,
            reason: "stored payload is not a JSON object".to_string(),
        });
    }
    Ok(raw)
}

/// Encode `{"projectId","appId","packageName","events":[...]}` as UTF-8 JSON.
///
/// Events keep the order of `records`. Any payload that is not a JSON object
/// fails the whole batch.
pub fn encode_batch(ids: &AccountIds, records: &[QueueRecord]) -> IngestResult<Vec<u8>> {
    let events = records
        .iter()
        .map(raw_event)
        .collect::<IngestResult<Vec<_>>>()?;

    let body = BatchBody {
        project_id: &ids.project_id,
        app_id: &ids.app_id,
        package_name: &ids.package_name,
        events,
    };
    Ok(serde_json::to_vec(&body)?)
}
