// Copyright 2025 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.
//
// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

use crate::storage::{store_relative_path, StorageError, StorageProvider};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest not found at {0}")]
    NotFound(String),

    #[error("Malformed manifest: {0}")]
    Malformed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One table's entry in the CDA manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub table_name: String,
    /// Store-relative prefix of the table's parquet tree.
    pub data_files_path: String,
    /// ms-epoch of the export's last successful write.
    pub last_success_write_ts: i64,
    pub total_processed_records: i64,
    /// `(schema_id, first_seen_ts)` pairs, ascending by timestamp.
    pub schema_history: Vec<(String, i64)>,
}

/// The parsed manifest: well-formed entries sorted by table name, plus
/// the names that were requested but unusable.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
    /// Requested names absent from the manifest.
    pub missing: Vec<String>,
    /// `(table_name, reason)` for entries that failed to parse.
    pub malformed: Vec<(String, String)>,
}

impl Manifest {
    /// Read and parse the manifest object at `uri` on the source store.
    ///
    /// A missing or structurally invalid manifest is fatal for the run.
    /// Individual entries that fail to parse are collected in
    /// `malformed` so the caller can attach a warning to that table's
    /// result and continue.
    ///
    /// # Errors
    ///
    /// `ManifestError::NotFound` if no object exists at `uri`,
    /// `ManifestError::Malformed` if the top level is not a JSON object.
    pub async fn load(
        store: &Arc<dyn StorageProvider>,
        uri: &str,
        table_names: Option<&[String]>,
    ) -> Result<Manifest, ManifestError> {
        let path = store_relative_path(uri);
        info!("Reading manifest from location={}", path);

        let bytes = store.read_file(&path).await.map_err(|e| match e {
            StorageError::NotFound(_) => ManifestError::NotFound(path.clone()),
            other => ManifestError::Storage(other),
        })?;

        let root: Value = serde_json::from_slice(&bytes)
            .map_err(|e| ManifestError::Malformed(format!("invalid JSON: {e}")))?;
        let map = root
            .as_object()
            .ok_or_else(|| ManifestError::Malformed("top level must be an object".to_string()))?;

        let filter: Option<HashSet<&str>> =
            table_names.map(|names| names.iter().map(String::as_str).collect());

        let mut manifest = Manifest::default();
        for (name, raw) in map {
            if let Some(filter) = &filter {
                if !filter.contains(name.as_str()) {
                    continue;
                }
            }
            match parse_entry(name, raw) {
                Ok(entry) => manifest.entries.push(entry),
                Err(reason) => {
                    warn!("Skipping malformed manifest entry table={}: {}", name, reason);
                    manifest.malformed.push((name.clone(), reason));
                }
            }
        }

        if let Some(names) = table_names {
            for name in names {
                if !map.contains_key(name) {
                    warn!("Requested table={} does not exist in the manifest", name);
                    manifest.missing.push(name.clone());
                }
            }
        }

        // Deterministic processing order
        manifest.entries.sort_by(|a, b| a.table_name.cmp(&b.table_name));

        info!(
            "Loaded manifest entries count={} (malformed={}, missing={})",
            manifest.entries.len(),
            manifest.malformed.len(),
            manifest.missing.len()
        );
        Ok(manifest)
    }
}

/// Parse one manifest entry, tolerating the exporter's list wrapper
/// (older exports wrap each entry in a single-element array).
fn parse_entry(name: &str, raw: &Value) -> Result<ManifestEntry, String> {
    let obj = match raw {
        Value::Object(obj) => obj,
        Value::Array(items) => items
            .first()
            .and_then(Value::as_object)
            .ok_or("entry array is empty or not an object")?,
        _ => return Err("entry is neither an object nor an array".to_string()),
    };

    let data_files_path = obj
        .get("dataFilesPath")
        .and_then(Value::as_str)
        .ok_or("missing 'dataFilesPath'")?;

    let last_success_write_ts = obj
        .get("lastSuccessfulWriteTimestamp")
        .ok_or("missing 'lastSuccessfulWriteTimestamp'")
        .and_then(|v| parse_i64(v).ok_or("non-integer 'lastSuccessfulWriteTimestamp'"))?;

    let total_processed_records = obj
        .get("totalProcessedRecordsCount")
        .and_then(parse_i64)
        .unwrap_or(0);

    let history = obj
        .get("schemaHistory")
        .and_then(Value::as_object)
        .ok_or("missing 'schemaHistory'")?;
    if history.is_empty() {
        return Err("'schemaHistory' is empty".to_string());
    }

    let mut schema_history = Vec::with_capacity(history.len());
    for (schema_id, ts) in history {
        let ts = parse_i64(ts)
            .ok_or_else(|| format!("non-integer schemaHistory timestamp for '{schema_id}'"))?;
        schema_history.push((schema_id.clone(), ts));
    }
    schema_history.sort_by_key(|(_, ts)| *ts);
    if schema_history.windows(2).any(|w| w[0].1 >= w[1].1) {
        return Err("'schemaHistory' timestamps are not strictly ascending".to_string());
    }

    Ok(ManifestEntry {
        table_name: name.to_string(),
        data_files_path: store_relative_path(data_files_path),
        last_success_write_ts,
        total_processed_records,
        schema_history,
    })
}

/// The manifest encodes integers both as JSON numbers and as decimal
/// strings, depending on exporter version.
fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageConfig, StorageProviderFactory};
    use bytes::Bytes;
    use tempfile::TempDir;

    async fn store_with_manifest(json: &str) -> (TempDir, Arc<dyn StorageProvider>) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig::local().with_option("path", temp_dir.path().to_str().unwrap());
        let store = StorageProviderFactory::from_config(config).await.unwrap();
        store
            .write_file("manifest.json", Bytes::from(json.to_string()))
            .await
            .unwrap();
        (temp_dir, store)
    }

    const MANIFEST: &str = r#"{
        "policy_holders": {
            "dataFilesPath": "s3://cda-bucket/exports/policy_holders",
            "lastSuccessfulWriteTimestamp": "1700000000000",
            "totalProcessedRecordsCount": "420",
            "schemaHistory": {
                "111111": "1600000000000",
                "222222": "1650000000000"
            }
        },
        "claims": {
            "dataFilesPath": "exports/claims",
            "lastSuccessfulWriteTimestamp": 1700000100000,
            "totalProcessedRecordsCount": 7,
            "schemaHistory": { "333333": "1600000000000" }
        }
    }"#;

    #[tokio::test]
    async fn test_load_parses_entries_sorted_by_name() {
        let (_tmp, store) = store_with_manifest(MANIFEST).await;

        let manifest = Manifest::load(&store, "manifest.json", None).await.unwrap();

        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(manifest.entries[0].table_name, "claims");
        assert_eq!(manifest.entries[1].table_name, "policy_holders");
        assert!(manifest.malformed.is_empty());
        assert!(manifest.missing.is_empty());
    }

    #[tokio::test]
    async fn test_load_converts_string_integers_and_uris() {
        let (_tmp, store) = store_with_manifest(MANIFEST).await;

        let manifest = Manifest::load(&store, "manifest.json", None).await.unwrap();
        let entry = &manifest.entries[1];

        assert_eq!(entry.data_files_path, "exports/policy_holders");
        assert_eq!(entry.last_success_write_ts, 1_700_000_000_000);
        assert_eq!(entry.total_processed_records, 420);
        assert_eq!(
            entry.schema_history,
            vec![
                ("111111".to_string(), 1_600_000_000_000),
                ("222222".to_string(), 1_650_000_000_000),
            ]
        );
    }

    #[tokio::test]
    async fn test_load_filters_to_requested_names() {
        let (_tmp, store) = store_with_manifest(MANIFEST).await;

        let names = vec!["claims".to_string(), "no_such_table".to_string()];
        let manifest = Manifest::load(&store, "manifest.json", Some(&names))
            .await
            .unwrap();

        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.entries[0].table_name, "claims");
        assert_eq!(manifest.missing, vec!["no_such_table".to_string()]);
    }

    #[tokio::test]
    async fn test_load_missing_manifest_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig::local().with_option("path", temp_dir.path().to_str().unwrap());
        let store = StorageProviderFactory::from_config(config).await.unwrap();

        let result = Manifest::load(&store, "manifest.json", None).await;
        assert!(matches!(result, Err(ManifestError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_load_non_object_manifest_is_fatal() {
        let (_tmp, store) = store_with_manifest("[1, 2, 3]").await;
        let result = Manifest::load(&store, "manifest.json", None).await;
        assert!(matches!(result, Err(ManifestError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_malformed_entry_is_demoted_not_fatal() {
        let json = r#"{
            "good": {
                "dataFilesPath": "exports/good",
                "lastSuccessfulWriteTimestamp": "1",
                "schemaHistory": { "s": "1" }
            },
            "bad": { "lastSuccessfulWriteTimestamp": "1" }
        }"#;
        let (_tmp, store) = store_with_manifest(json).await;

        let manifest = Manifest::load(&store, "manifest.json", None).await.unwrap();

        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.entries[0].table_name, "good");
        assert_eq!(manifest.malformed.len(), 1);
        assert_eq!(manifest.malformed[0].0, "bad");
        assert!(manifest.malformed[0].1.contains("dataFilesPath"));
    }

    #[tokio::test]
    async fn test_list_wrapped_entry_is_accepted() {
        let json = r#"{
            "wrapped": [{
                "dataFilesPath": "exports/wrapped",
                "lastSuccessfulWriteTimestamp": "5",
                "schemaHistory": { "s": "1" }
            }]
        }"#;
        let (_tmp, store) = store_with_manifest(json).await;

        let manifest = Manifest::load(&store, "manifest.json", None).await.unwrap();
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.entries[0].data_files_path, "exports/wrapped");
    }

    #[tokio::test]
    async fn test_non_ascending_schema_history_is_malformed() {
        let json = r#"{
            "t": {
                "dataFilesPath": "exports/t",
                "lastSuccessfulWriteTimestamp": "1",
                "schemaHistory": { "a": "100", "b": "100" }
            }
        }"#;
        let (_tmp, store) = store_with_manifest(json).await;

        let manifest = Manifest::load(&store, "manifest.json", None).await.unwrap();
        assert!(manifest.entries.is_empty());
        assert_eq!(manifest.malformed.len(), 1);
    }

    #[test]
    fn test_parse_i64_variants() {
        assert_eq!(parse_i64(&Value::from(42)), Some(42));
        assert_eq!(parse_i64(&Value::from("42")), Some(42));
        assert_eq!(parse_i64(&Value::from(" 42 ")), Some(42));
        assert_eq!(parse_i64(&Value::from("nope")), None);
        assert_eq!(parse_i64(&Value::Null), None);
    }
}
