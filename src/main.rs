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

use std::env;
use std::error::Error;
use std::sync::Arc;
use tracing::info;

use cda_mirror::storage::StorageRole;
use cda_mirror::{NoopProgress, Processor, StorageConfig, TracingProgress};

fn required_env(name: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
    env::var(name).map_err(|_| format!("{name} must be set").into())
}

fn target_config() -> Result<StorageConfig, Box<dyn Error + Send + Sync>> {
    let cloud = env::var("DELTA_TARGET_CLOUD").unwrap_or_else(|_| "aws".to_string());
    match cloud.as_str() {
        "aws" => Ok(StorageConfig::aws_from_env(StorageRole::Target)
            .with_option("bucket", required_env("DELTA_TARGET_BUCKET")?)),
        "azure" => Ok(StorageConfig::azure_from_env(StorageRole::Target)),
        "local" => Ok(StorageConfig::local().with_option("path", required_env("DELTA_TARGET_PATH")?)),
        other => Err(format!("Invalid DELTA_TARGET_CLOUD '{other}': must be 'aws', 'azure' or 'local'").into()),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting CDA Mirror");

    let manifest_uri = required_env("CDA_MANIFEST_URI")?;
    let source = StorageConfig::aws_from_env(StorageRole::Source)
        .with_option("bucket", required_env("CDA_SOURCE_BUCKET")?);
    let target = target_config()?;

    // Positional arguments select tables; no arguments means the whole
    // manifest.
    let table_names: Vec<String> = env::args().skip(1).collect();

    let mut builder = Processor::builder(source, target).with_manifest_uri(manifest_uri);
    if !table_names.is_empty() {
        builder = builder.with_table_names(table_names);
    }
    if let Some(prefix) = env::var("DELTA_TARGET_PREFIX").ok().filter(|p| !p.is_empty()) {
        builder = builder.with_target_prefix(prefix);
    }
    if let Ok(interval) = env::var("DELTA_LOG_CHECKPOINT_INTERVAL") {
        builder = builder.with_checkpoint_interval(interval.parse()?);
    }
    if let Ok(workers) = env::var("CDA_MIRROR_MAX_WORKERS") {
        builder = builder.with_max_workers(workers.parse()?);
    }
    if env::var("CDA_MIRROR_PARALLEL").as_deref() == Ok("0") {
        builder = builder.with_parallel(false);
    }
    if env::var("CDA_MIRROR_RESET").as_deref() == Ok("1") {
        builder = builder.with_reset(true);
    }
    if env::var("SHOW_TABLE_PROGRESS").as_deref() == Ok("0") {
        builder = builder.with_progress(Arc::new(NoopProgress));
    } else {
        builder = builder.with_progress(Arc::new(TracingProgress));
    }

    let processor = builder.build().await?;
    let results = processor.run().await?;

    let failed = results.iter().filter(|r| !r.is_ok()).count();
    info!(
        "Processed tables count={} failed={}",
        results.len(),
        failed
    );

    println!("{}", serde_json::to_string_pretty(&results)?);

    Ok(())
}
