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

use bytes::Bytes;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::action::{
    from_commit_bytes, to_commit_bytes, Action, Add, CommitInfo, Format, MetaData, Protocol,
    Remove,
};
use super::checkpoint::{from_checkpoint_bytes, to_checkpoint_bytes, LastCheckpoint};
use super::schema::{schema_id_for, schema_string_for};
use crate::plan::{Batch, RemoveFile};
use crate::storage::{StorageError, StorageProvider};

#[derive(Error, Debug)]
pub enum DeltaError {
    #[error("Commit conflict at version {0}")]
    CommitConflict(i64),

    #[error("Corrupt delta log: {0}")]
    Corrupt(String),

    #[error("Unsupported arrow type in schema: {0}")]
    UnsupportedType(String),

    #[error("A schema is required for the first commit of a table")]
    MissingSchema,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Serialisation failure: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Parquet failure: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow failure: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

/// A file in the current snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveFile {
    pub size: i64,
    pub modification_time: i64,
    pub partition_values: HashMap<String, String>,
}

/// The transaction log of one mirrored table.
///
/// Holds the replayed state (version, metadata, live files, watermark)
/// and appends one commit per batch. Commits are written with a
/// create-only PUT so a concurrent writer surfaces as
/// [`DeltaError::CommitConflict`] instead of a lost update.
pub struct DeltaLog {
    store: Arc<dyn StorageProvider>,
    table_name: String,
    log_dir: String,
    checkpoint_interval: u64,
    version: i64,
    protocol: Protocol,
    metadata: Option<MetaData>,
    live_files: HashMap<Box<str>, LiveFile>,
    watermark: i64,
    schema_timestamp: i64,
}

impl DeltaLog {
    /// Open (or initialise) the log under `<table_path>/_delta_log/`.
    ///
    /// Recovery seeds from the `_last_checkpoint` referent when one is
    /// readable and replays every commit beyond it; an unreadable
    /// checkpoint demotes to a full replay with a warning. A gap in the
    /// replayed versions is corruption.
    pub async fn open(
        store: Arc<dyn StorageProvider>,
        table_name: &str,
        table_path: &str,
        checkpoint_interval: u64,
    ) -> Result<Self, DeltaError> {
        let log_dir = format!("{}/_delta_log", table_path.trim_matches('/'));
        let mut log = Self {
            store,
            table_name: table_name.to_string(),
            log_dir,
            checkpoint_interval: checkpoint_interval.max(1),
            version: -1,
            protocol: Protocol::default(),
            metadata: None,
            live_files: HashMap::new(),
            watermark: 0,
            schema_timestamp: 0,
        };
        log.recover().await?;
        Ok(log)
    }

    async fn recover(&mut self) -> Result<(), DeltaError> {
        let files = match self.store.list_files(&self.log_dir, false).await {
            Ok(files) => files,
            Err(StorageError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut commits: BTreeMap<i64, String> = BTreeMap::new();
        let mut has_last_checkpoint = false;
        for file in &files {
            let name = file.path.rsplit('/').next().unwrap_or(&file.path);
            if let Some(version) = commit_file_version(name) {
                commits.insert(version, file.path.clone());
            } else if name == "_last_checkpoint" {
                has_last_checkpoint = true;
            }
        }

        if files.is_empty() {
            debug!("No existing log for table={}", self.table_name);
            return Ok(());
        }

        let mut seed_version = -1;
        if has_last_checkpoint {
            match self.seed_from_checkpoint().await {
                Ok(version) => seed_version = version,
                Err(e) => {
                    warn!(
                        "Unreadable checkpoint for table={}, replaying the full log: {}",
                        self.table_name, e
                    );
                }
            }
        }

        let mut expected = seed_version + 1;
        let mut last_commit_info: Option<CommitInfo> = None;
        for (version, path) in commits.range(seed_version + 1..) {
            if *version != expected {
                return Err(DeltaError::Corrupt(format!(
                    "commit versions are not contiguous: expected {expected}, found {version}"
                )));
            }
            let bytes = self.store.read_file(path).await?;
            let actions = from_commit_bytes(&bytes)?;
            if let Some(info) = self.apply(&actions) {
                last_commit_info = Some(info);
            }
            self.version = *version;
            expected += 1;
        }

        if let Some(info) = last_commit_info {
            if let Some(watermark) = info.watermark() {
                self.watermark = self.watermark.max(watermark);
            }
            if let Some(schema_timestamp) = info.schema_timestamp() {
                self.schema_timestamp = schema_timestamp;
            }
        }

        info!(
            "Opened log for table={} version={} live_files={} watermark={}",
            self.table_name,
            self.version,
            self.live_files.len(),
            self.watermark
        );
        Ok(())
    }

    async fn seed_from_checkpoint(&mut self) -> Result<i64, DeltaError> {
        let bytes = self.store.read_file(&self.last_checkpoint_path()).await?;
        let last: LastCheckpoint = serde_json::from_slice(&bytes)?;

        let checkpoint_bytes = self
            .store
            .read_file(&self.checkpoint_path(last.version))
            .await?;
        let actions = from_checkpoint_bytes(checkpoint_bytes)?;
        self.apply(&actions);
        self.version = last.version;
        debug!(
            "Seeded table={} from checkpoint version={} ({} actions)",
            self.table_name,
            last.version,
            actions.len()
        );
        Ok(last.version)
    }

    /// Apply actions to the in-memory state, returning the commitInfo if
    /// one was present.
    fn apply(&mut self, actions: &[Action]) -> Option<CommitInfo> {
        let mut commit_info = None;
        for action in actions {
            match action {
                Action::Add(add) => {
                    self.watermark = self.watermark.max(add.modification_time);
                    self.live_files.insert(
                        add.path.as_str().into(),
                        LiveFile {
                            size: add.size,
                            modification_time: add.modification_time,
                            partition_values: add.partition_values.clone(),
                        },
                    );
                }
                Action::Remove(remove) => {
                    self.live_files.remove(remove.path.as_str());
                }
                Action::MetaData(meta) => self.metadata = Some(meta.clone()),
                Action::Protocol(protocol) => self.protocol = protocol.clone(),
                Action::CommitInfo(info) => commit_info = Some(info.clone()),
            }
        }
        commit_info
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn watermark(&self) -> i64 {
        self.watermark
    }

    pub fn schema_timestamp(&self) -> i64 {
        self.schema_timestamp
    }

    pub fn live_file_count(&self) -> usize {
        self.live_files.len()
    }

    pub fn metadata(&self) -> Option<&MetaData> {
        self.metadata.as_ref()
    }

    /// The current live set, sorted by path. This seeds the `remove`
    /// side of the first batch a planner produces.
    pub fn live_snapshot(&self) -> Vec<RemoveFile> {
        let mut files: Vec<RemoveFile> = self
            .live_files
            .iter()
            .map(|(path, live)| RemoveFile {
                path: path.to_string(),
                size: live.size,
            })
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Commit one batch as the next version.
    ///
    /// Returns the committed version. A concurrent writer claiming the
    /// same version surfaces as [`DeltaError::CommitConflict`]; the
    /// caller reopens the log and replans before retrying.
    pub async fn append(&mut self, batch: &Batch) -> Result<i64, DeltaError> {
        let next = self.version + 1;
        let mut actions = Vec::with_capacity(batch.adds.len() + batch.removes.len() + 3);

        if next == 0 {
            actions.push(Action::Protocol(self.protocol.clone()));
        }
        if batch.is_schema_change || next == 0 {
            let schema = batch.schema.as_ref().ok_or(DeltaError::MissingSchema)?;
            let schema_string = schema_string_for(schema)?;
            actions.push(Action::MetaData(MetaData {
                id: schema_id_for(&schema_string),
                name: Some(self.table_name.clone()),
                description: None,
                format: Format::default(),
                schema_string,
                partition_columns: Vec::new(),
                configuration: HashMap::new(),
                created_time: Some(Utc::now().timestamp_millis()),
            }));
        }

        for remove in &batch.removes {
            let live = self.live_files.get(remove.path.as_str());
            actions.push(Action::Remove(Remove {
                path: remove.path.clone(),
                deletion_timestamp: Some(batch.ts),
                data_change: true,
                extended_file_metadata: Some(true),
                partition_values: Some(
                    live.map(|f| f.partition_values.clone()).unwrap_or_default(),
                ),
                size: Some(live.map(|f| f.size).unwrap_or(remove.size)),
            }));
        }

        for add in &batch.adds {
            actions.push(Action::Add(Add {
                path: add.path.clone(),
                partition_values: HashMap::new(),
                size: add.size,
                modification_time: batch.ts,
                data_change: true,
                stats: None,
            }));
        }

        actions.push(Action::CommitInfo(CommitInfo::write(
            Utc::now().timestamp_millis(),
            batch.ts,
            batch.schema_ts,
        )));

        let bytes = to_commit_bytes(&actions)?;
        match self
            .store
            .write_if_absent(&self.commit_path(next), Bytes::from(bytes))
            .await
        {
            Ok(()) => {}
            Err(StorageError::Conflict(_)) => {
                warn!(
                    "Commit conflict for table={} at version={}",
                    self.table_name, next
                );
                return Err(DeltaError::CommitConflict(next));
            }
            Err(e) => return Err(e.into()),
        }

        self.apply(&actions);
        self.version = next;
        self.watermark = batch.ts;
        self.schema_timestamp = batch.schema_ts;

        debug!(
            "Committed table={} version={} adds={} removes={} watermark={}",
            self.table_name,
            next,
            batch.adds.len(),
            batch.removes.len(),
            batch.ts
        );
        Ok(next)
    }

    /// Write a checkpoint if the current version sits on the interval.
    ///
    /// `_last_checkpoint` is only updated after the checkpoint object
    /// itself lands, so it never points at a missing file. Returns the
    /// checkpointed version, if any.
    pub async fn maybe_checkpoint(&self) -> Result<Option<i64>, DeltaError> {
        if self.version <= 0 || self.version % self.checkpoint_interval as i64 != 0 {
            return Ok(None);
        }

        let metadata = self
            .metadata
            .clone()
            .ok_or_else(|| DeltaError::Corrupt("checkpoint requested before any metaData".into()))?;

        let mut actions = vec![
            Action::Protocol(self.protocol.clone()),
            Action::MetaData(metadata),
        ];
        let mut paths: Vec<_> = self.live_files.keys().collect();
        paths.sort();
        for path in paths {
            let live = &self.live_files[path];
            actions.push(Action::Add(Add {
                path: path.to_string(),
                partition_values: live.partition_values.clone(),
                size: live.size,
                modification_time: live.modification_time,
                data_change: false,
                stats: None,
            }));
        }

        let bytes = to_checkpoint_bytes(&actions)?;
        self.store
            .write_file(&self.checkpoint_path(self.version), Bytes::from(bytes))
            .await?;

        let last = LastCheckpoint {
            version: self.version,
            size: actions.len() as i64,
        };
        self.store
            .write_file(
                &self.last_checkpoint_path(),
                Bytes::from(serde_json::to_vec(&last)?),
            )
            .await?;

        info!(
            "Checkpointed table={} at version={} ({} actions)",
            self.table_name,
            self.version,
            actions.len()
        );
        Ok(Some(self.version))
    }

    /// Delete the log directory and reset to a fresh table.
    pub async fn remove_log(&mut self) -> Result<(), DeltaError> {
        let files = match self.store.list_files(&self.log_dir, true).await {
            Ok(files) => files,
            Err(StorageError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        for file in files {
            self.store.delete_file(&file.path).await?;
        }
        self.version = -1;
        self.metadata = None;
        self.live_files.clear();
        self.watermark = 0;
        self.schema_timestamp = 0;
        info!("Removed log for table={}", self.table_name);
        Ok(())
    }

    fn commit_path(&self, version: i64) -> String {
        format!("{}/{:020}.json", self.log_dir, version)
    }

    fn checkpoint_path(&self, version: i64) -> String {
        format!("{}/{:020}.checkpoint.parquet", self.log_dir, version)
    }

    fn last_checkpoint_path(&self) -> String {
        format!("{}/_last_checkpoint", self.log_dir)
    }
}

/// Parse `<version:020>.json` commit file names.
fn commit_file_version(name: &str) -> Option<i64> {
    let stem = name.strip_suffix(".json")?;
    if stem.len() == 20 && stem.bytes().all(|b| b.is_ascii_digit()) {
        stem.parse().ok()
    } else {
        None
    }
}
