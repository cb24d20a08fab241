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

use thiserror::Error;

/// Errors that can occur during storage operations.
///
/// Variants map the failure modes of the underlying stores onto the
/// categories the rest of the pipeline cares about: `NotFound` and
/// `Conflict` are normal control flow, `Transient` is retried with
/// backoff, `AccessDenied` and `Config` are fatal.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Object already exists: {0}")]
    Conflict(String),

    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl StorageError {
    /// Whether the operation that produced this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

impl From<object_store::Error> for StorageError {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            object_store::Error::AlreadyExists { path, .. } => StorageError::Conflict(path),
            object_store::Error::Precondition { path, .. } => StorageError::Conflict(path),
            object_store::Error::PermissionDenied { path, .. } => StorageError::AccessDenied(path),
            object_store::Error::Unauthenticated { path, .. } => StorageError::AccessDenied(path),
            object_store::Error::UnknownConfigurationKey { key, .. } => {
                StorageError::Config(format!("unknown configuration key: {key}"))
            }
            other => StorageError::Transient(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
