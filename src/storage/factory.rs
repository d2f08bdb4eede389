use anyhow::{Context, Result};
use std::sync::Arc;

use super::backends::azure::AzureProvider;
use super::backends::memory::MemoryProvider;
use super::backends::minio::MinioProvider;
use super::backends::obs::ObsProvider;
use super::backends::oss::OssProvider;
use super::config::StorageConfig;
use super::contract::{BackendKind, ObjectStorage};
use super::provider::OpendalStorage;

pub type MinioStorage = OpendalStorage<MinioProvider>;
pub type OssStorage = OpendalStorage<OssProvider>;
pub type ObsStorage = OpendalStorage<ObsProvider>;
pub type AzureStorage = OpendalStorage<AzureProvider>;
pub type MemoryStorage = OpendalStorage<MemoryProvider>;

/// Selects and builds the process-wide backend.
pub struct StorageFactory;

impl StorageFactory {
    /// Build the adapter named by `config.kind`.
    ///
    /// # Errors
    ///
    /// Fails when the matching provider section is incomplete.
    pub fn create(config: &StorageConfig) -> Result<Arc<dyn ObjectStorage>> {
        let storage: Arc<dyn ObjectStorage> = match config.kind {
            BackendKind::Minio => Arc::new(MinioStorage::new(
                MinioProvider::new(&config.minio).context("invalid minio configuration")?,
            )),
            BackendKind::Oss => Arc::new(OssStorage::new(
                OssProvider::new(&config.oss).context("invalid oss configuration")?,
            )),
            BackendKind::Obs => Arc::new(ObsStorage::new(
                ObsProvider::new(&config.obs).context("invalid obs configuration")?,
            )),
            BackendKind::Azure => Arc::new(AzureStorage::new(
                AzureProvider::new(&config.azure).context("invalid azure configuration")?,
            )),
            BackendKind::Memory => Arc::new(MemoryStorage::new(MemoryProvider)),
        };
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_memory_backend() {
        let config = StorageConfig {
            kind: BackendKind::Memory,
            ..Default::default()
        };
        let storage = StorageFactory::create(&config).unwrap();
        assert_eq!(storage.kind(), BackendKind::Memory);
    }

    #[test]
    fn test_incomplete_provider_section_is_fatal() {
        let config = StorageConfig {
            kind: BackendKind::Obs,
            ..Default::default()
        };
        let err = StorageFactory::create(&config).err().unwrap();
        assert_eq!(err.to_string(), "invalid obs configuration");
        assert!(format!("{err:#}").contains("storage.obs.endpoint"));
    }
}
