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

use chrono::Utc;
use serde::Serialize;

/// The outcome of one entity's pipeline run. Timestamps are ms-epoch.
#[derive(Debug, Clone, Serialize)]
pub struct TableResult {
    pub table: String,
    pub process_start_ts: i64,
    pub process_finish_ts: Option<i64>,
    pub process_start_version: i64,
    pub process_finish_version: Option<i64>,
    pub process_start_watermark: i64,
    pub process_finish_watermark: Option<i64>,
    pub manifest_records: i64,
    pub manifest_watermark: i64,
    /// Every timestamp folder committed this run, in commit order.
    pub watermarks: Vec<i64>,
    /// First-seen timestamps of the schemas touched this run.
    pub schema_timestamps: Vec<i64>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl TableResult {
    pub fn new(table: &str, manifest_records: i64, manifest_watermark: i64) -> Self {
        Self {
            table: table.to_string(),
            process_start_ts: Utc::now().timestamp_millis(),
            process_finish_ts: None,
            process_start_version: -1,
            process_finish_version: None,
            process_start_watermark: 0,
            process_finish_watermark: None,
            manifest_records,
            manifest_watermark,
            watermarks: Vec::new(),
            schema_timestamps: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// A result for an entity that never got a pipeline (missing or
    /// malformed manifest entry).
    pub fn skipped(table: &str, warning: String) -> Self {
        let mut result = Self::new(table, 0, 0);
        result.add_warning(warning);
        result.process_finish_ts = Some(result.process_start_ts);
        result
    }

    pub fn add_error(&mut self, message: String) {
        self.errors.push(message);
    }

    /// Warnings accumulate once; a conflict replan re-reports the same
    /// planner warnings and they should not multiply.
    pub fn add_warning(&mut self, message: String) {
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }

    pub fn add_watermark(&mut self, watermark: i64) {
        self.watermarks.push(watermark);
    }

    pub fn add_schema_timestamp(&mut self, schema_timestamp: i64) {
        if !self.schema_timestamps.contains(&schema_timestamp) {
            self.schema_timestamps.push(schema_timestamp);
        }
    }

    pub fn finish(&mut self, version: i64, watermark: i64) {
        self.process_finish_ts = Some(Utc::now().timestamp_millis());
        self.process_finish_version = Some(version);
        self.process_finish_watermark = Some(watermark);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}
