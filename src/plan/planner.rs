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

use arrow::datatypes::Schema;
use futures::stream::{self, StreamExt};
use parquet::arrow::parquet_to_arrow_schema;
use parquet::file::metadata::ParquetMetaDataReader;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::manifest::ManifestEntry;
use crate::storage::{FileMetadata, StorageError, StorageProvider};

/// Concurrent folder listings per entity pipeline.
const LIST_FANOUT: usize = 16;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Schema discovery failed for {0}")]
    SchemaDiscovery(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A parquet file to `add`: the absolute URI recorded in the log, the
/// store-relative key it is read by, and its size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub path: String,
    pub key: String,
    pub size: i64,
}

/// A logged file to `remove`, identified the way the log knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveFile {
    pub path: String,
    pub size: i64,
}

/// One commit unit: the files of a single timestamp folder replacing
/// whatever was live before it.
#[derive(Debug, Clone)]
pub struct Batch {
    pub schema_id: String,
    /// When this batch's schema first appeared, per the manifest.
    pub schema_ts: i64,
    /// The timestamp folder's ms-epoch name; becomes the new watermark.
    pub ts: i64,
    pub adds: Vec<FileRef>,
    pub removes: Vec<RemoveFile>,
    pub is_schema_change: bool,
    /// Present on schema-change batches; the writer derives the new
    /// `metaData` from it.
    pub schema: Option<Arc<Schema>>,
}

/// The ordered batches for one entity, plus everything worth telling
/// the operator about.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub batches: Vec<Batch>,
    pub warnings: Vec<String>,
    /// First-seen timestamps of the schema folders that contributed
    /// batches, in processing order.
    pub schema_timestamps: Vec<i64>,
}

/// Plans the commit batches for one entity by listing its CDA tree.
pub struct BatchPlanner {
    source: Arc<dyn StorageProvider>,
    fanout: usize,
}

impl BatchPlanner {
    pub fn new(source: Arc<dyn StorageProvider>) -> Self {
        Self {
            source,
            fanout: LIST_FANOUT,
        }
    }

    /// Compute the batches that advance `entry` from `high_water` to the
    /// head of its export.
    ///
    /// `live` is the writer's current snapshot; it seeds the `remove`
    /// side of the first batch, after which each batch removes its
    /// predecessor's files.
    ///
    /// # Errors
    ///
    /// `PlanError::SchemaDiscovery` if no parquet footer of a new schema
    /// folder can be read; storage failures pass through.
    pub async fn plan(
        &self,
        entry: &ManifestEntry,
        high_water: i64,
        live: Vec<RemoveFile>,
    ) -> Result<Plan, PlanError> {
        let mut plan = Plan::default();

        // A prefix with no objects behind it lists as empty on cloud
        // stores; treat an explicit NotFound the same way.
        let listed_dirs = match self.source.list_dirs(&entry.data_files_path).await {
            Ok(dirs) => dirs,
            Err(StorageError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let mut folders_by_name: HashSet<&str> = HashSet::new();
        for dir in &listed_dirs {
            folders_by_name.insert(last_segment(dir));
        }

        // Folders the manifest never mentioned are orphans; history
        // entries with no folder behind them are stale. Both are
        // demoted to warnings and skipped.
        for dir in &listed_dirs {
            let name = last_segment(dir);
            if !entry.schema_history.iter().any(|(id, _)| id == name) {
                plan.warnings.push(format!(
                    "schema folder '{name}' is not present in the manifest schema history"
                ));
            }
        }

        let mut schema_folders: Vec<(&str, i64, String)> = Vec::new();
        for (schema_id, first_seen_ts) in &entry.schema_history {
            if folders_by_name.contains(schema_id.as_str()) {
                let dir = format!("{}/{}", entry.data_files_path, schema_id);
                schema_folders.push((schema_id.as_str(), *first_seen_ts, dir));
            } else {
                plan.warnings.push(format!(
                    "schema history entry '{schema_id}' has no folder under {}",
                    entry.data_files_path
                ));
            }
        }
        // schema_history is already ascending by timestamp; keep that order.

        let mut prev_files = live;
        let mut seen_ts: HashSet<i64> = HashSet::new();

        for (schema_id, first_seen_ts, dir) in schema_folders {
            let mut timestamps = Vec::new();
            for ts_dir in self.source.list_dirs(&dir).await? {
                let name = last_segment(&ts_dir);
                match name.parse::<i64>() {
                    Ok(ts) => timestamps.push((ts, ts_dir)),
                    Err(_) => {
                        warn!("Skipping non-numeric timestamp folder: {}", ts_dir);
                        plan.warnings
                            .push(format!("non-numeric timestamp folder '{ts_dir}'"));
                    }
                }
            }

            timestamps.retain(|(ts, _)| *ts > high_water);
            timestamps.sort_by_key(|(ts, _)| *ts);
            if timestamps.is_empty() {
                debug!(
                    "No timestamp folders beyond watermark={} in {}",
                    high_water, dir
                );
                continue;
            }

            let listed = self.list_timestamp_folders(timestamps).await?;

            let is_new_schema = first_seen_ts > high_water;
            let mut folder_schema: Option<Arc<Schema>> = None;
            let mut first_in_folder = true;

            for (ts, files) in listed {
                if !seen_ts.insert(ts) {
                    plan.warnings
                        .push(format!("duplicate timestamp folder '{ts}' dropped"));
                    continue;
                }
                if files.is_empty() {
                    plan.warnings.push(format!(
                        "timestamp folder '{}/{ts}' contains no parquet files",
                        dir
                    ));
                    continue;
                }

                let is_schema_change = is_new_schema && first_in_folder;
                if is_schema_change {
                    folder_schema = Some(Arc::new(
                        self.discover_schema(&files, &mut plan.warnings)
                            .await
                            .ok_or_else(|| {
                                PlanError::SchemaDiscovery(format!(
                                    "{} {}",
                                    entry.table_name, dir
                                ))
                            })?,
                    ));
                }
                if first_in_folder {
                    plan.schema_timestamps.push(first_seen_ts);
                    first_in_folder = false;
                }

                let adds: Vec<FileRef> = files
                    .iter()
                    .map(|f| FileRef {
                        path: self.source.uri_from_path(&f.path),
                        key: f.path.clone(),
                        size: f.size as i64,
                    })
                    .collect();

                let removes = std::mem::replace(
                    &mut prev_files,
                    adds.iter()
                        .map(|a| RemoveFile {
                            path: a.path.clone(),
                            size: a.size,
                        })
                        .collect(),
                );

                plan.batches.push(Batch {
                    schema_id: schema_id.to_string(),
                    schema_ts: first_seen_ts,
                    ts,
                    adds,
                    removes,
                    is_schema_change,
                    schema: if is_schema_change {
                        folder_schema.clone()
                    } else {
                        None
                    },
                });
            }
        }

        debug!(
            "Planned batches count={} for table={} beyond watermark={}",
            plan.batches.len(),
            entry.table_name,
            high_water
        );
        Ok(plan)
    }

    /// List the parquet files of each timestamp folder with bounded
    /// concurrency, restoring timestamp order afterwards.
    async fn list_timestamp_folders(
        &self,
        timestamps: Vec<(i64, String)>,
    ) -> Result<Vec<(i64, Vec<FileMetadata>)>, StorageError> {
        let source = Arc::clone(&self.source);
        let results: Vec<Result<(i64, Vec<FileMetadata>), StorageError>> =
            stream::iter(timestamps)
                .map(|(ts, dir)| {
                    let source = Arc::clone(&source);
                    async move {
                        let files = source
                            .list_files(&dir, false)
                            .await?
                            .into_iter()
                            .filter(|f| f.path.ends_with(".parquet"))
                            .collect();
                        Ok((ts, files))
                    }
                })
                .buffer_unordered(self.fanout.max(1))
                .collect()
                .await;

        let mut listed = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        listed.sort_by_key(|(ts, _)| *ts);
        Ok(listed)
    }

    /// Read the Arrow schema from the footer of one of `files`.
    ///
    /// Candidates are tried smallest-first; individual failures demote
    /// to warnings. Parquet row groups are never touched.
    async fn discover_schema(
        &self,
        files: &[FileMetadata],
        warnings: &mut Vec<String>,
    ) -> Option<Schema> {
        let mut candidates: Vec<&FileMetadata> = files.iter().collect();
        candidates.sort_by_key(|f| f.size);
        debug!("Found {} potential schema files", candidates.len());

        for candidate in candidates {
            match self.read_footer_schema(candidate).await {
                Ok(schema) => {
                    debug!("Read schema from {}", candidate.path);
                    return Some(schema);
                }
                Err(e) => {
                    warn!("Failed to read schema from {}: {}", candidate.path, e);
                    warnings.push(format!("unreadable parquet footer '{}': {e}", candidate.path));
                }
            }
        }
        None
    }

    async fn read_footer_schema(
        &self,
        file: &FileMetadata,
    ) -> Result<Schema, Box<dyn std::error::Error + Send + Sync>> {
        if file.size < 8 {
            return Err(format!("file is {} bytes, too small for a footer", file.size).into());
        }

        let mut tail = [0u8; 8];
        tail.copy_from_slice(
            &self
                .source
                .read_range(&file.path, file.size - 8..file.size)
                .await?,
        );
        let footer = ParquetMetaDataReader::decode_footer_tail(&tail)?;

        let metadata_len = footer.metadata_length() as u64 + 8;
        if metadata_len > file.size {
            return Err("footer length exceeds file size".into());
        }
        let metadata_bytes = self
            .source
            .read_range(&file.path, file.size - metadata_len..file.size)
            .await?;
        let metadata = ParquetMetaDataReader::decode_metadata(&metadata_bytes)?;

        let schema = parquet_to_arrow_schema(
            metadata.file_metadata().schema_descr(),
            metadata.file_metadata().key_value_metadata(),
        )?;
        Ok(schema)
    }
}

fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}
