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

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::ops::Range;
use url::Url;

use super::error::StorageResult;

/// Metadata about a file in storage
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Store-relative path of the file
    pub path: String,

    /// File size in bytes
    pub size: u64,

    /// Last modified timestamp (if available)
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// Capability set of one store role (source or target).
///
/// Listing is split into files and immediate child directories because
/// the CDA layout is discovered by delimiter listing alone; the planner
/// never walks the tree recursively.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// The base URI prefix for this store (e.g. `s3://bucket`).
    fn base_path(&self) -> &str;

    /// List files at the given path, recursively or not.
    async fn list_files(&self, path: &str, recursive: bool) -> StorageResult<Vec<FileMetadata>>;

    /// List the immediate child directories of a path (delimiter listing).
    async fn list_dirs(&self, path: &str) -> StorageResult<Vec<String>>;

    /// Read an entire object.
    async fn read_file(&self, path: &str) -> StorageResult<Bytes>;

    /// Read a byte range of an object.
    async fn read_range(&self, path: &str, range: Range<u64>) -> StorageResult<Bytes>;

    /// Write an object unconditionally.
    async fn write_file(&self, path: &str, bytes: Bytes) -> StorageResult<()>;

    /// Write an object only if it does not exist yet.
    ///
    /// Fails with `StorageError::Conflict` when the key is already
    /// present; this is the primitive that serialises concurrent log
    /// writers.
    async fn write_if_absent(&self, path: &str, bytes: Bytes) -> StorageResult<()>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete_file(&self, path: &str) -> StorageResult<()>;

    /// Check whether an object exists.
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Get metadata for a specific object.
    async fn get_metadata(&self, path: &str) -> StorageResult<FileMetadata>;

    /// Get a full provider-specific URI for a store-relative path
    /// (e.g. "s3://bucket/path", "abfss://container@account.../path").
    fn uri_from_path(&self, path: &str) -> String;
}

impl Debug for dyn StorageProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "StorageProvider(base_path={})", self.base_path())
    }
}

/// Helper function to create an ObjectPath from a string
pub(crate) fn string_to_path(s: &str) -> ObjectPath {
    ObjectPath::from(s)
}

/// Reduce a manifest-supplied location to a store-relative key.
///
/// Manifest values arrive either as absolute URIs (`s3://bucket/a/b`,
/// `abfss://container@account.dfs.core.windows.net/a/b`) or as bare
/// prefixes (`a/b`). The store itself is already rooted at the bucket or
/// container, so only the path component is meaningful.
pub fn store_relative_path(location: &str) -> String {
    match Url::parse(location) {
        Ok(url) if !url.cannot_be_a_base() => url.path().trim_matches('/').to_string(),
        _ => location.trim_matches('/').to_string(),
    }
}
