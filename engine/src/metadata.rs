//! Dataset metadata artifact, rewritten every cycle alongside the preview.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::persist;

pub const SCHEMA_VERSION: &str = "1.1";
pub const DATASET_FORMAT: &str = "jsonl";

/// Serialized field names of a dataset row, advertised to consumers.
pub const DATASET_FIELDS: &[&str] = &[
    "timestamp",
    "block_number",
    "tx_hash",
    "log_index",
    "market_id",
    "token_in",
    "token_in_symbol",
    "token_in_decimals",
    "token_out",
    "token_out_symbol",
    "token_out_decimals",
    "amount_in",
    "amount_out",
    "amount_in_normalized",
    "amount_out_normalized",
    "price",
    "explorer_link",
    "delta_vs_other_market",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetMetadata {
    pub schema_version: String,
    pub last_updated: String,
    pub rows: usize,
    /// Minutes since the previous metadata write; 0 on the first one.
    pub freshness_minutes: u64,
    /// Content id of the last successful storage publish. Survives cycles
    /// that do not publish.
    pub latest_cid: Option<String>,
    pub format: String,
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub storage_gateway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub storage_published_at: Option<String>,
}

impl DatasetMetadata {
    fn fresh(rows: usize, last_updated: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            last_updated: last_updated.to_string(),
            rows,
            freshness_minutes: 0,
            latest_cid: None,
            format: DATASET_FORMAT.to_string(),
            fields: DATASET_FIELDS.iter().map(|f| f.to_string()).collect(),
            storage_gateway: None,
            storage_published_at: None,
        }
    }
}

/// Rewrites the metadata artifact for the current cycle, carrying forward
/// any storage publication fields from the previous version.
pub fn update_metadata(
    path: &Path,
    rows: usize,
    now_iso: &str,
) -> Result<DatasetMetadata, EngineError> {
    let previous: Option<DatasetMetadata> = persist::load_json(path);

    let freshness_minutes = previous
        .as_ref()
        .and_then(|prev| {
            let prev_ts = common::time::parse_iso_ts(&prev.last_updated)?;
            let now_ts = common::time::parse_iso_ts(now_iso)?;
            Some(now_ts.saturating_sub(prev_ts) / 60)
        })
        .unwrap_or(0);

    let mut metadata = DatasetMetadata::fresh(rows, now_iso);
    metadata.freshness_minutes = freshness_minutes;
    if let Some(prev) = previous {
        metadata.latest_cid = prev.latest_cid;
        metadata.storage_gateway = prev.storage_gateway;
        metadata.storage_published_at = prev.storage_published_at;
    }

    persist::write_json_atomic(path, &metadata)?;
    Ok(metadata)
}

/// Merges a successful storage publish into the metadata artifact.
pub fn record_content_id(
    path: &Path,
    cid: &str,
    gateway_url: Option<String>,
    published_at_iso: &str,
) -> Result<(), EngineError> {
    let mut metadata: DatasetMetadata =
        persist::load_json(path).unwrap_or_else(|| DatasetMetadata::fresh(0, published_at_iso));

    metadata.latest_cid = Some(cid.to_string());
    metadata.storage_gateway = gateway_url;
    metadata.storage_published_at = Some(published_at_iso.to_string());

    persist::write_json_atomic(path, &metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_has_zero_freshness_and_no_cid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");

        let metadata = update_metadata(&path, 5, "2026-08-24T10:00:00Z").unwrap();

        assert_eq!(metadata.schema_version, SCHEMA_VERSION);
        assert_eq!(metadata.rows, 5);
        assert_eq!(metadata.freshness_minutes, 0);
        assert_eq!(metadata.latest_cid, None);
        assert_eq!(metadata.format, DATASET_FORMAT);
        assert!(metadata.fields.iter().any(|f| f == "tx_hash"));
    }

    #[test]
    fn freshness_measures_minutes_since_previous_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");

        update_metadata(&path, 5, "2026-08-24T10:00:00Z").unwrap();
        let second = update_metadata(&path, 7, "2026-08-24T10:31:30Z").unwrap();

        assert_eq!(second.freshness_minutes, 31);
        assert_eq!(second.rows, 7);
    }

    #[test]
    fn content_id_survives_subsequent_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");

        update_metadata(&path, 5, "2026-08-24T10:00:00Z").unwrap();
        record_content_id(
            &path,
            "bafybeievidence",
            Some("https://gateway.example.org/ipfs/bafybeievidence".to_string()),
            "2026-08-24T10:01:00Z",
        )
        .unwrap();

        let later = update_metadata(&path, 9, "2026-08-24T10:05:00Z").unwrap();
        assert_eq!(later.latest_cid.as_deref(), Some("bafybeievidence"));
        assert_eq!(
            later.storage_gateway.as_deref(),
            Some("https://gateway.example.org/ipfs/bafybeievidence")
        );
        assert_eq!(
            later.storage_published_at.as_deref(),
            Some("2026-08-24T10:01:00Z")
        );
    }

    #[test]
    fn recording_into_missing_metadata_creates_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");

        record_content_id(&path, "bafyfirst", None, "2026-08-24T10:00:00Z").unwrap();

        let metadata: DatasetMetadata = persist::load_json(&path).unwrap();
        assert_eq!(metadata.latest_cid.as_deref(), Some("bafyfirst"));
        assert_eq!(metadata.rows, 0);
    }
}
