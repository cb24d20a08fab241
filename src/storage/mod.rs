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

//! Object-store gateway
//!
//! A unified interface over the source store (read-only, holds the CDA
//! parquet tree and the manifest) and the target store (read/write, holds
//! the synthesised Delta logs). Both roles resolve credentials from the
//! process environment with a role-prefixed fallback chain, and both are
//! served by the `object_store` crate underneath.

pub mod config;
pub mod error;
pub mod factory;
pub mod object_store;
pub mod provider;

// Public exports
pub use config::{StorageConfig, StorageRole};
pub use error::{StorageError, StorageResult};
pub use factory::StorageProviderFactory;
pub use provider::{store_relative_path, FileMetadata, StorageProvider};
