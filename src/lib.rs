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

//! # CDA Mirror
//!
//! A Rust library that mirrors Guidewire Cloud Data Access (CDA) parquet
//! exports as Delta Lake tables without copying any data.
//!
//! For each entity in the CDA manifest it synthesises the Delta
//! transaction log directly on the target store: `add`/`remove` actions
//! reference the parquet files in their original location, so downstream
//! engines read the export as a native Delta table while the bytes stay
//! on the source bucket.
//!
//! ## Features
//!
//! - **Listing-only discovery**: the CDA tree is walked by delimiter
//!   listing; parquet files are opened only to read one footer per new
//!   schema
//! - **Schema evolution**: a new schema folder becomes a single commit
//!   carrying the new `metaData`, all prior-schema `remove`s and the new
//!   `add`s
//! - **Idempotent resumption**: the watermark is recovered from the log
//!   tail, so re-runs commit nothing when no new data is present
//! - **Checkpoints**: periodic parquet checkpoints plus
//!   `_last_checkpoint` keep log replay short
//! - **Multi-writer safety**: commits use create-only PUTs; a losing
//!   writer reopens, replans and retries
//! - **Bounded parallelism**: entity pipelines fan out over a tokio
//!   worker pool without shared state beyond the result list
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cda_mirror::{Processor, StorageConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let source = StorageConfig::aws()
//!     .with_option("bucket", "cda-exports")
//!     .with_option("region", "us-east-1");
//! let target = StorageConfig::aws()
//!     .with_option("bucket", "delta-mirror")
//!     .with_option("region", "us-east-1");
//!
//! let processor = Processor::builder(source, target)
//!     .with_manifest_uri("s3://cda-exports/manifest.json")
//!     .build()
//!     .await?;
//!
//! for result in processor.run().await? {
//!     println!("{}: version {:?}", result.table, result.process_finish_version);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`storage`] - Object-store gateway over the source and target roles
//! - [`manifest`] - CDA manifest reading
//! - [`plan`] - Batch planning over the per-schema timestamp folders
//! - [`delta`] - Delta transaction-log authoring and checkpoints
//! - [`pipeline`] - Per-entity pipelines and the run orchestrator

pub mod delta;
pub mod manifest;
pub mod pipeline;
pub mod plan;
pub mod storage;
pub mod util;

// Re-export commonly used types
pub use manifest::{Manifest, ManifestEntry};
pub use pipeline::{NoopProgress, Processor, ProgressReporter, TableResult, TracingProgress};
pub use storage::{StorageConfig, StorageRole};
