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

//! Delta transaction-log actions, one JSON object per commit-file line.
//! Field names follow the Delta transaction-log protocol (reader v1,
//! writer v2).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The protocol versions this writer emits.
pub const MIN_READER_VERSION: i32 = 1;
/// See [`MIN_READER_VERSION`].
pub const MIN_WRITER_VERSION: i32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub min_reader_version: i32,
    pub min_writer_version: i32,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            min_reader_version: MIN_READER_VERSION,
            min_writer_version: MIN_WRITER_VERSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Format {
    pub provider: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            provider: "parquet".to_string(),
            options: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub format: Format,
    pub schema_string: String,
    #[serde(default)]
    pub partition_columns: Vec<String>,
    #[serde(default)]
    pub configuration: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Add {
    /// Absolute URI of the parquet file on the source store.
    pub path: String,
    #[serde(default)]
    pub partition_values: HashMap<String, String>,
    pub size: i64,
    pub modification_time: i64,
    pub data_change: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remove {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<i64>,
    pub data_change: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_file_metadata: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_values: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub timestamp: i64,
    pub operation: String,
    #[serde(default)]
    pub operation_parameters: HashMap<String, String>,
    pub isolation_level: String,
}

impl CommitInfo {
    /// The commitInfo line appended to every commit. The watermark and
    /// schema timestamp ride along as operation parameters so that a
    /// re-run can recover them from the log tail alone.
    pub fn write(timestamp: i64, watermark: i64, schema_timestamp: i64) -> Self {
        let operation_parameters = [
            ("watermark".to_string(), watermark.to_string()),
            ("schemaTimestamp".to_string(), schema_timestamp.to_string()),
        ]
        .into_iter()
        .collect();
        Self {
            timestamp,
            operation: "WRITE".to_string(),
            operation_parameters,
            isolation_level: "Serializable".to_string(),
        }
    }

    pub fn watermark(&self) -> Option<i64> {
        self.operation_parameters
            .get("watermark")
            .and_then(|s| s.parse().ok())
    }

    pub fn schema_timestamp(&self) -> Option<i64> {
        self.operation_parameters
            .get("schemaTimestamp")
            .and_then(|s| s.parse().ok())
    }
}

/// One line of a commit file. The externally-tagged representation
/// matches the wire shape exactly: `{"add": {...}}`, `{"remove": {...}}`
/// and so on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "protocol")]
    Protocol(Protocol),
    #[serde(rename = "metaData")]
    MetaData(MetaData),
    #[serde(rename = "add")]
    Add(Add),
    #[serde(rename = "remove")]
    Remove(Remove),
    #[serde(rename = "commitInfo")]
    CommitInfo(CommitInfo),
}

/// Serialise a commit: one action per line, newline-terminated.
pub fn to_commit_bytes(actions: &[Action]) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    for action in actions {
        out.extend_from_slice(serde_json::to_string(action)?.as_bytes());
        out.push(b'\n');
    }
    Ok(out)
}

/// Parse a commit file back into its actions, skipping blank lines.
pub fn from_commit_bytes(bytes: &[u8]) -> Result<Vec<Action>, serde_json::Error> {
    std::str::from_utf8(bytes)
        .map_err(serde::de::Error::custom)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect()
}
