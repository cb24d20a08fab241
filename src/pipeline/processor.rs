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

use std::error::Error;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

use super::progress::{ProgressReporter, TracingProgress};
use super::result::TableResult;
use crate::delta::{DeltaError, DeltaLog};
use crate::manifest::{Manifest, ManifestEntry};
use crate::plan::BatchPlanner;
use crate::storage::{StorageConfig, StorageProvider, StorageProviderFactory};

/// Default bound on concurrent entity pipelines.
fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Builder for a [`Processor`].
///
/// ```no_run
/// use cda_mirror::{Processor, StorageConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
/// let source = StorageConfig::aws().with_option("bucket", "cda-exports");
/// let target = StorageConfig::aws().with_option("bucket", "delta-mirror");
///
/// let processor = Processor::builder(source, target)
///     .with_manifest_uri("s3://cda-exports/manifest.json")
///     .with_table_names(vec!["policy_holders".to_string()])
///     .with_max_workers(8)
///     .build()
///     .await?;
///
/// let results = processor.run().await?;
/// for result in &results {
///     println!("{}: v{:?}", result.table, result.process_finish_version);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ProcessorBuilder {
    source: StorageConfig,
    target: StorageConfig,
    manifest_uri: String,
    table_names: Option<Vec<String>>,
    target_prefix: Option<String>,
    parallel: bool,
    max_workers: Option<usize>,
    checkpoint_interval: u64,
    commit_retries: usize,
    reset: bool,
    progress: Option<Arc<dyn ProgressReporter>>,
}

impl ProcessorBuilder {
    pub fn new(source: StorageConfig, target: StorageConfig) -> Self {
        Self {
            source,
            target,
            manifest_uri: "manifest.json".to_string(),
            table_names: None,
            target_prefix: None,
            parallel: true,
            max_workers: None,
            checkpoint_interval: 100,
            commit_retries: 5,
            reset: false,
            progress: None,
        }
    }

    /// Location of the manifest JSON on the source store. Accepts an
    /// absolute URI or a store-relative key.
    pub fn with_manifest_uri(mut self, uri: impl Into<String>) -> Self {
        self.manifest_uri = uri.into();
        self
    }

    /// Restrict the run to these tables. All manifest tables otherwise.
    pub fn with_table_names(mut self, names: Vec<String>) -> Self {
        self.table_names = Some(names);
        self
    }

    /// Place each table's log under `<prefix>/<table>` on the target.
    pub fn with_target_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.target_prefix = Some(prefix.into());
        self
    }

    /// When false, entities are processed inline and in order.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    /// Checkpoint every N versions. Default 100.
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    /// How many commit conflicts to absorb per entity before failing it.
    pub fn with_commit_retries(mut self, retries: usize) -> Self {
        self.commit_retries = retries;
        self
    }

    /// Delete each entity's existing log before processing.
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Initialise both store roles and assemble the processor.
    ///
    /// # Errors
    ///
    /// Returns an error if either store configuration is invalid.
    pub async fn build(self) -> Result<Processor, Box<dyn Error + Send + Sync>> {
        let source = StorageProviderFactory::from_config(self.source).await?;
        let target = StorageProviderFactory::from_config(self.target).await?;
        Ok(Processor {
            runner: EntityRunner {
                source,
                target,
                target_prefix: self.target_prefix,
                checkpoint_interval: self.checkpoint_interval,
                commit_retries: self.commit_retries,
                reset: self.reset,
                progress: self.progress.unwrap_or_else(|| Arc::new(TracingProgress)),
            },
            manifest_uri: self.manifest_uri,
            table_names: self.table_names,
            parallel: self.parallel,
            max_workers: self.max_workers.unwrap_or_else(default_workers).max(1),
        })
    }
}

/// Orchestrates one mirror run: manifest in, per-entity pipelines out.
pub struct Processor {
    runner: EntityRunner,
    manifest_uri: String,
    table_names: Option<Vec<String>>,
    parallel: bool,
    max_workers: usize,
}

impl Processor {
    pub fn builder(source: StorageConfig, target: StorageConfig) -> ProcessorBuilder {
        ProcessorBuilder::new(source, target)
    }

    /// Execute the run and return one result per entity.
    ///
    /// A missing or structurally broken manifest aborts before fan-out;
    /// everything after that is confined to the entity it concerns.
    ///
    /// # Errors
    ///
    /// Only run-level failures (manifest loading) surface as `Err`.
    pub async fn run(&self) -> Result<Vec<TableResult>, Box<dyn Error + Send + Sync>> {
        let manifest = Manifest::load(
            &self.runner.source,
            &self.manifest_uri,
            self.table_names.as_deref(),
        )
        .await?;

        let mut results: Vec<TableResult> = Vec::new();
        for name in &manifest.missing {
            results.push(TableResult::skipped(
                name,
                "table does not exist in the manifest".to_string(),
            ));
        }
        for (name, reason) in &manifest.malformed {
            results.push(TableResult::skipped(
                name,
                format!("malformed manifest entry: {reason}"),
            ));
        }

        self.runner.progress.start(manifest.entries.len());

        if self.parallel && manifest.entries.len() > 1 {
            let semaphore = Arc::new(Semaphore::new(self.max_workers));
            let collected: Arc<Mutex<Vec<TableResult>>> = Arc::new(Mutex::new(Vec::new()));
            let mut handles = Vec::with_capacity(manifest.entries.len());

            for entry in manifest.entries {
                let semaphore = Arc::clone(&semaphore);
                let collected = Arc::clone(&collected);
                let runner = self.runner.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };
                    let result = runner.run_entity(entry).await;
                    collected.lock().await.push(result);
                }));
            }

            for handle in handles {
                if let Err(e) = handle.await {
                    error!("Entity worker panicked: {}", e);
                }
            }
            results.extend(collected.lock().await.drain(..));
        } else {
            for entry in manifest.entries {
                results.push(self.runner.run_entity(entry).await);
            }
        }

        results.sort_by(|a, b| a.table.cmp(&b.table));
        info!(
            "Run complete tables={} failed={}",
            results.len(),
            results.iter().filter(|r| !r.is_ok()).count()
        );
        Ok(results)
    }
}

/// Everything one entity pipeline needs; cloned into each worker task.
#[derive(Clone)]
struct EntityRunner {
    source: Arc<dyn StorageProvider>,
    target: Arc<dyn StorageProvider>,
    target_prefix: Option<String>,
    checkpoint_interval: u64,
    commit_retries: usize,
    reset: bool,
    progress: Arc<dyn ProgressReporter>,
}

impl EntityRunner {
    async fn run_entity(&self, entry: ManifestEntry) -> TableResult {
        let mut result = TableResult::new(
            &entry.table_name,
            entry.total_processed_records,
            entry.last_success_write_ts,
        );
        info!("Processing table={}", entry.table_name);

        let table_path = match &self.target_prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_matches('/'), entry.table_name),
            None => entry.table_name.clone(),
        };

        let mut log = match DeltaLog::open(
            Arc::clone(&self.target),
            &entry.table_name,
            &table_path,
            self.checkpoint_interval,
        )
        .await
        {
            Ok(log) => log,
            Err(e) => {
                error!("Failed to open log for table={}: {}", entry.table_name, e);
                result.add_error(format!("failed to open delta log: {e}"));
                result.finish(-1, 0);
                self.progress.finish(&entry.table_name, false);
                return result;
            }
        };

        if self.reset {
            if let Err(e) = log.remove_log().await {
                error!("Failed to reset log for table={}: {}", entry.table_name, e);
                result.add_error(format!("failed to reset delta log: {e}"));
                result.finish(log.version(), log.watermark());
                self.progress.finish(&entry.table_name, false);
                return result;
            }
        }

        result.process_start_version = log.version();
        result.process_start_watermark = log.watermark();

        if entry.last_success_write_ts <= log.watermark() {
            let message = format!(
                "manifest watermark {} is at or behind the log watermark {}; nothing to do",
                entry.last_success_write_ts,
                log.watermark()
            );
            warn!("Skipping table={}: {}", entry.table_name, message);
            result.add_warning(message);
            result.finish(log.version(), log.watermark());
            self.progress.finish(&entry.table_name, true);
            return result;
        }

        let planner = BatchPlanner::new(Arc::clone(&self.source));
        let mut conflicts = 0;

        'replan: loop {
            let plan = match planner
                .plan(&entry, log.watermark(), log.live_snapshot())
                .await
            {
                Ok(plan) => plan,
                Err(e) => {
                    error!("Planning failed for table={}: {}", entry.table_name, e);
                    result.add_error(format!("planning failed: {e}"));
                    break;
                }
            };
            for warning in plan.warnings {
                result.add_warning(warning);
            }
            if plan.batches.is_empty() {
                break;
            }
            for schema_ts in plan.schema_timestamps {
                result.add_schema_timestamp(schema_ts);
            }

            for batch in &plan.batches {
                match log.append(batch).await {
                    Ok(version) => {
                        result.add_watermark(batch.ts);
                        result.process_finish_version = Some(version);
                        result.process_finish_watermark = Some(batch.ts);
                        self.progress.advance(&entry.table_name, 1);

                        if let Err(e) = log.maybe_checkpoint().await {
                            warn!(
                                "Checkpoint failed for table={} at version={}: {}",
                                entry.table_name, version, e
                            );
                            result.add_warning(format!(
                                "checkpoint failed at version {version}: {e}"
                            ));
                        }
                    }
                    Err(DeltaError::CommitConflict(version)) => {
                        conflicts += 1;
                        if conflicts > self.commit_retries {
                            result.add_error(format!(
                                "commit conflict at version {version} persisted after {} retries",
                                self.commit_retries
                            ));
                            break 'replan;
                        }
                        // Another writer advanced the log; pick up its
                        // state and plan the remainder from there.
                        match DeltaLog::open(
                            Arc::clone(&self.target),
                            &entry.table_name,
                            &table_path,
                            self.checkpoint_interval,
                        )
                        .await
                        {
                            Ok(reopened) => {
                                log = reopened;
                                continue 'replan;
                            }
                            Err(e) => {
                                result.add_error(format!(
                                    "failed to reopen log after conflict: {e}"
                                ));
                                break 'replan;
                            }
                        }
                    }
                    Err(e) => {
                        error!(
                            "Commit failed for table={} at ts={}: {}",
                            entry.table_name, batch.ts, e
                        );
                        result.add_error(format!("failed to commit batch at ts {}: {e}", batch.ts));
                        break 'replan;
                    }
                }
            }
            break;
        }

        result.finish(log.version(), log.watermark());
        let ok = result.is_ok();
        if ok {
            info!(
                "Finished table={} version={} watermark={}",
                entry.table_name,
                log.version(),
                log.watermark()
            );
        } else {
            error!(
                "Abandoned table={} with errors count={}",
                entry.table_name,
                result.errors.len()
            );
        }
        self.progress.finish(&entry.table_name, ok);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::action::{from_commit_bytes, Action};
    use crate::delta::checkpoint::LastCheckpoint;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use bytes::Bytes;
    use parquet::arrow::ArrowWriter;
    use std::io::Cursor;
    use tempfile::TempDir;

    struct Fixture {
        _source_dir: TempDir,
        _target_dir: TempDir,
        source_cfg: StorageConfig,
        target_cfg: StorageConfig,
        source: Arc<dyn StorageProvider>,
        target: Arc<dyn StorageProvider>,
    }

    impl Fixture {
        async fn new() -> Self {
            let source_dir = TempDir::new().unwrap();
            let target_dir = TempDir::new().unwrap();
            let source_cfg = StorageConfig::local()
                .with_option("path", source_dir.path().to_str().unwrap());
            let target_cfg = StorageConfig::local()
                .with_option("path", target_dir.path().to_str().unwrap());
            let source = StorageProviderFactory::from_config(source_cfg.clone())
                .await
                .unwrap();
            let target = StorageProviderFactory::from_config(target_cfg.clone())
                .await
                .unwrap();
            Self {
                _source_dir: source_dir,
                _target_dir: target_dir,
                source_cfg,
                target_cfg,
                source,
                target,
            }
        }

        async fn put_parquet(&self, key: &str) {
            let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
            let batch = RecordBatch::try_new(
                Arc::clone(&schema),
                vec![Arc::new(Int64Array::from(vec![1, 2]))],
            )
            .unwrap();
            let mut cursor = Cursor::new(Vec::new());
            let mut writer = ArrowWriter::try_new(&mut cursor, schema, None).unwrap();
            writer.write(&batch).unwrap();
            writer.close().unwrap();
            self.source
                .write_file(key, Bytes::from(cursor.into_inner()))
                .await
                .unwrap();
        }

        async fn put_manifest(&self, json: &str) {
            self.source
                .write_file("manifest.json", Bytes::from(json.to_string()))
                .await
                .unwrap();
        }

        fn builder(&self) -> ProcessorBuilder {
            Processor::builder(self.source_cfg.clone(), self.target_cfg.clone())
                .with_parallel(false)
        }

        async fn commit_actions(&self, table: &str, version: i64) -> Vec<Action> {
            let bytes = self
                .target
                .read_file(&format!("{table}/_delta_log/{version:020}.json"))
                .await
                .unwrap();
            from_commit_bytes(&bytes).unwrap()
        }
    }

    fn manifest_json(tables: &[(&str, i64, &[(&str, i64)])]) -> String {
        let mut root = serde_json::Map::new();
        for (table, watermark, history) in tables {
            let mut history_json = serde_json::Map::new();
            for (id, ts) in *history {
                history_json.insert(id.to_string(), serde_json::Value::String(ts.to_string()));
            }
            root.insert(
                table.to_string(),
                serde_json::json!({
                    "dataFilesPath": format!("exports/{table}"),
                    "lastSuccessfulWriteTimestamp": watermark.to_string(),
                    "totalProcessedRecordsCount": "10",
                    "schemaHistory": history_json,
                }),
            );
        }
        serde_json::Value::Object(root).to_string()
    }

    #[tokio::test]
    async fn test_empty_table_only_warns() {
        let fx = Fixture::new().await;
        fx.put_manifest(&manifest_json(&[("t1", 5000, &[("111", 500)])]))
            .await;
        // No schema folders exist on the source store.

        let processor = fx.builder().build().await.unwrap();
        let results = processor.run().await.unwrap();

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(result.is_ok());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("no folder")));
        assert_eq!(result.process_finish_version, Some(-1));
        assert!(result.watermarks.is_empty());

        // No log directory was created
        let log_files = fx
            .target
            .list_files("t1/_delta_log", true)
            .await
            .unwrap_or_default();
        assert!(log_files.is_empty());
    }

    #[tokio::test]
    async fn test_single_schema_single_batch() {
        let fx = Fixture::new().await;
        fx.put_parquet("exports/t1/111/1000/a.parquet").await;
        fx.put_parquet("exports/t1/111/1000/b.parquet").await;
        fx.put_manifest(&manifest_json(&[("t1", 1000, &[("111", 500)])]))
            .await;

        let processor = fx.builder().build().await.unwrap();
        let results = processor.run().await.unwrap();

        let result = &results[0];
        assert!(result.is_ok(), "errors: {:?}", result.errors);
        assert_eq!(result.process_finish_version, Some(0));
        assert_eq!(result.process_finish_watermark, Some(1000));
        assert_eq!(result.watermarks, vec![1000]);
        assert_eq!(result.schema_timestamps, vec![500]);

        let actions = fx.commit_actions("t1", 0).await;
        assert!(matches!(actions[0], Action::Protocol(_)));
        assert!(matches!(actions[1], Action::MetaData(_)));
        let add_count = actions
            .iter()
            .filter(|a| matches!(a, Action::Add(_)))
            .count();
        assert_eq!(add_count, 2);
    }

    #[tokio::test]
    async fn test_three_batches_three_versions() {
        let fx = Fixture::new().await;
        fx.put_parquet("exports/t1/111/1000/a.parquet").await;
        fx.put_parquet("exports/t1/111/2000/b.parquet").await;
        fx.put_parquet("exports/t1/111/3000/c.parquet").await;
        fx.put_manifest(&manifest_json(&[("t1", 3000, &[("111", 500)])]))
            .await;

        let processor = fx.builder().build().await.unwrap();
        let results = processor.run().await.unwrap();

        let result = &results[0];
        assert!(result.is_ok(), "errors: {:?}", result.errors);
        assert_eq!(result.process_finish_version, Some(2));
        assert_eq!(result.watermarks, vec![1000, 2000, 3000]);

        // Version 1 swaps a for b
        let actions = fx.commit_actions("t1", 1).await;
        let removes: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                Action::Remove(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(removes.len(), 1);
        assert!(removes[0].path.ends_with("1000/a.parquet"));
        assert_eq!(removes[0].deletion_timestamp, Some(2000));
    }

    #[tokio::test]
    async fn test_schema_change_is_one_atomic_commit() {
        let fx = Fixture::new().await;
        fx.put_parquet("exports/t1/111/1000/a.parquet").await;
        fx.put_parquet("exports/t1/222/2000/x.parquet").await;
        fx.put_parquet("exports/t1/222/2000/y.parquet").await;
        fx.put_manifest(&manifest_json(&[("t1", 2000, &[("111", 500), ("222", 1500)])]))
            .await;

        let processor = fx.builder().build().await.unwrap();
        let results = processor.run().await.unwrap();
        assert!(results[0].is_ok(), "errors: {:?}", results[0].errors);
        assert_eq!(results[0].schema_timestamps, vec![500, 1500]);

        let actions = fx.commit_actions("t1", 1).await;
        assert!(matches!(actions[0], Action::MetaData(_)));
        match &actions[1] {
            Action::Remove(remove) => {
                assert!(remove.path.ends_with("1000/a.parquet"));
                assert_eq!(remove.deletion_timestamp, Some(2000));
            }
            other => panic!("expected remove, got {other:?}"),
        }
        let add_count = actions
            .iter()
            .filter(|a| matches!(a, Action::Add(_)))
            .count();
        assert_eq!(add_count, 2);
    }

    #[tokio::test]
    async fn test_resume_commits_nothing_new() {
        let fx = Fixture::new().await;
        fx.put_parquet("exports/t1/111/1000/a.parquet").await;
        fx.put_parquet("exports/t1/111/2000/b.parquet").await;
        fx.put_parquet("exports/t1/111/3000/c.parquet").await;
        fx.put_manifest(&manifest_json(&[("t1", 3000, &[("111", 500)])]))
            .await;

        let processor = fx.builder().build().await.unwrap();
        let first = processor.run().await.unwrap();
        assert_eq!(first[0].process_finish_version, Some(2));

        let second = processor.run().await.unwrap();
        let result = &second[0];
        assert!(result.errors.is_empty());
        assert!(result.watermarks.is_empty());
        assert_eq!(result.process_finish_version, Some(2));
        assert_eq!(result.process_finish_watermark, Some(3000));

        // Still exactly three commits
        let log_files = fx.target.list_files("t1/_delta_log", false).await.unwrap();
        let commits = log_files
            .iter()
            .filter(|f| f.path.ends_with(".json"))
            .count();
        assert_eq!(commits, 3);
    }

    #[tokio::test]
    async fn test_incremental_run_picks_up_new_folders() {
        let fx = Fixture::new().await;
        fx.put_parquet("exports/t1/111/1000/a.parquet").await;
        fx.put_manifest(&manifest_json(&[("t1", 1000, &[("111", 500)])]))
            .await;

        let processor = fx.builder().build().await.unwrap();
        processor.run().await.unwrap();

        // The export moves on
        fx.put_parquet("exports/t1/111/2000/b.parquet").await;
        fx.put_manifest(&manifest_json(&[("t1", 2000, &[("111", 500)])]))
            .await;

        let results = processor.run().await.unwrap();
        let result = &results[0];
        assert!(result.is_ok(), "errors: {:?}", result.errors);
        assert_eq!(result.process_start_version, 0);
        assert_eq!(result.process_finish_version, Some(1));
        assert_eq!(result.watermarks, vec![2000]);

        // The continuation commit swaps a for b without re-emitting metaData
        let actions = fx.commit_actions("t1", 1).await;
        assert!(!actions.iter().any(|a| matches!(a, Action::MetaData(_))));
        assert!(actions.iter().any(
            |a| matches!(a, Action::Remove(r) if r.path.ends_with("1000/a.parquet"))
        ));
    }

    #[tokio::test]
    async fn test_checkpoint_rollover() {
        let fx = Fixture::new().await;
        for ts in [1000, 2000, 3000, 4000, 5000, 6000] {
            fx.put_parquet(&format!("exports/t1/111/{ts}/f.parquet")).await;
        }
        fx.put_manifest(&manifest_json(&[("t1", 6000, &[("111", 500)])]))
            .await;

        let processor = fx
            .builder()
            .with_checkpoint_interval(2)
            .build()
            .await
            .unwrap();
        let results = processor.run().await.unwrap();
        assert!(results[0].is_ok(), "errors: {:?}", results[0].errors);
        assert_eq!(results[0].process_finish_version, Some(5));

        for version in [2, 4] {
            assert!(fx
                .target
                .exists(&format!(
                    "t1/_delta_log/{version:020}.checkpoint.parquet"
                ))
                .await
                .unwrap());
        }
        let last: LastCheckpoint = serde_json::from_slice(
            &fx.target
                .read_file("t1/_delta_log/_last_checkpoint")
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(last.version, 4);
    }

    #[tokio::test]
    async fn test_parallel_run_processes_all_tables() {
        let fx = Fixture::new().await;
        fx.put_parquet("exports/t1/111/1000/a.parquet").await;
        fx.put_parquet("exports/t2/222/1000/b.parquet").await;
        fx.put_parquet("exports/t3/333/1000/c.parquet").await;
        fx.put_manifest(&manifest_json(&[
            ("t1", 1000, &[("111", 500)]),
            ("t2", 1000, &[("222", 500)]),
            ("t3", 1000, &[("333", 500)]),
        ]))
        .await;

        let processor = Processor::builder(fx.source_cfg.clone(), fx.target_cfg.clone())
            .with_parallel(true)
            .with_max_workers(2)
            .build()
            .await
            .unwrap();
        let results = processor.run().await.unwrap();

        assert_eq!(results.len(), 3);
        // Results come back sorted regardless of completion order
        let names: Vec<&str> = results.iter().map(|r| r.table.as_str()).collect();
        assert_eq!(names, vec!["t1", "t2", "t3"]);
        for result in &results {
            assert!(result.is_ok(), "errors: {:?}", result.errors);
            assert_eq!(result.process_finish_version, Some(0));
        }
    }

    #[tokio::test]
    async fn test_one_entity_failure_does_not_abort_peers() {
        let fx = Fixture::new().await;
        // t1's only parquet file is garbage, so schema discovery fails
        fx.source
            .write_file(
                "exports/t1/111/1000/broken.parquet",
                Bytes::from_static(b"junk"),
            )
            .await
            .unwrap();
        fx.put_parquet("exports/t2/222/1000/b.parquet").await;
        fx.put_manifest(&manifest_json(&[
            ("t1", 1000, &[("111", 500)]),
            ("t2", 1000, &[("222", 500)]),
        ]))
        .await;

        let processor = fx.builder().build().await.unwrap();
        let results = processor.run().await.unwrap();

        assert!(!results[0].is_ok());
        assert!(results[0].errors[0].contains("planning failed"));
        assert!(results[1].is_ok(), "errors: {:?}", results[1].errors);
    }

    #[tokio::test]
    async fn test_missing_and_malformed_entries_become_skipped_results() {
        let fx = Fixture::new().await;
        fx.put_parquet("exports/good/111/1000/a.parquet").await;
        let mut manifest: serde_json::Value =
            serde_json::from_str(&manifest_json(&[("good", 1000, &[("111", 500)])])).unwrap();
        manifest["bad"] = serde_json::json!({ "lastSuccessfulWriteTimestamp": "1" });
        fx.put_manifest(&manifest.to_string()).await;

        let processor = fx
            .builder()
            .with_table_names(vec![
                "good".to_string(),
                "bad".to_string(),
                "ghost".to_string(),
            ])
            .build()
            .await
            .unwrap();
        let results = processor.run().await.unwrap();

        assert_eq!(results.len(), 3);
        let by_name = |name: &str| results.iter().find(|r| r.table == name).unwrap();
        assert!(by_name("good").is_ok());
        assert!(by_name("bad").warnings[0].contains("malformed manifest entry"));
        assert!(by_name("ghost").warnings[0].contains("does not exist"));
    }

    #[tokio::test]
    async fn test_reset_discards_existing_log() {
        let fx = Fixture::new().await;
        fx.put_parquet("exports/t1/111/1000/a.parquet").await;
        fx.put_manifest(&manifest_json(&[("t1", 1000, &[("111", 500)])]))
            .await;

        let processor = fx.builder().build().await.unwrap();
        processor.run().await.unwrap();

        // A reset run reprocesses from scratch instead of skipping
        let reset_processor = fx.builder().with_reset(true).build().await.unwrap();
        let results = reset_processor.run().await.unwrap();

        let result = &results[0];
        assert!(result.is_ok(), "errors: {:?}", result.errors);
        assert_eq!(result.process_start_version, -1);
        assert_eq!(result.process_finish_version, Some(0));
        assert_eq!(result.watermarks, vec![1000]);
    }

    #[tokio::test]
    async fn test_missing_manifest_aborts_run() {
        let fx = Fixture::new().await;
        let processor = fx.builder().build().await.unwrap();
        assert!(processor.run().await.is_err());
    }
}
