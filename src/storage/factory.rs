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

use std::sync::Arc;

use super::config::StorageConfig;
use super::error::StorageResult;
use super::object_store::ObjectStoreProvider;
use super::provider::StorageProvider;

/// Factory for creating storage providers
pub struct StorageProviderFactory;

impl StorageProviderFactory {
    /// Create a storage provider from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the backing
    /// store cannot be initialised.
    pub async fn from_config(config: StorageConfig) -> StorageResult<Arc<dyn StorageProvider>> {
        let provider = ObjectStoreProvider::new(config).await?;
        Ok(Arc::new(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_factory_create_local_provider() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = temp_dir.path().to_str().unwrap();

        let config = StorageConfig::local().with_option("path", temp_path);
        let result = StorageProviderFactory::from_config(config).await;

        assert!(result.is_ok());
        let provider = result.unwrap();
        assert!(provider.base_path().contains(temp_path));
    }

    #[tokio::test]
    async fn test_factory_local_provider_invalid_path() {
        let config =
            StorageConfig::local().with_option("path", "/nonexistent/path/that/does/not/exist");
        let result = StorageProviderFactory::from_config(config).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_factory_returns_shareable_provider() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = temp_dir.path().to_str().unwrap();

        let config = StorageConfig::local().with_option("path", temp_path);
        let provider = StorageProviderFactory::from_config(config).await.unwrap();

        let provider_clone = Arc::clone(&provider);
        assert_eq!(provider.base_path(), provider_clone.base_path());
    }
}
