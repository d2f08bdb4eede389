use anyhow::Result;
use opendal::Operator;
use opendal::services::S3;
use serde::Deserialize;

use super::{require, with_scheme};
use crate::storage::contract::BackendKind;
use crate::storage::directory::DirectoryListing;
use crate::storage::provider::Provider;

/// Settings for a MinIO (or other self-hosted S3) endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MinioConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_ssl: bool,
    pub region: String,
}

impl Default for MinioConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            use_ssl: false,
            region: "us-east-1".to_string(),
        }
    }
}

pub struct MinioProvider {
    endpoint: String,
    access_key: String,
    secret_key: String,
    region: String,
}

impl MinioProvider {
    pub fn new(config: &MinioConfig) -> Result<Self> {
        require("minio", "endpoint", &config.endpoint)?;
        Ok(Self {
            endpoint: with_scheme(&config.endpoint, config.use_ssl),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            region: config.region.clone(),
        })
    }
}

impl Provider for MinioProvider {
    const KIND: BackendKind = BackendKind::Minio;
    const DIRECTORY_LISTING: DirectoryListing = DirectoryListing::CommonPrefixes;

    fn operator(&self, bucket: &str) -> opendal::Result<Operator> {
        // Path-style addressing is opendal's default, which is what MinIO expects.
        let builder = S3::default()
            .endpoint(&self.endpoint)
            .region(&self.region)
            .bucket(bucket)
            .access_key_id(&self.access_key)
            .secret_access_key(&self.secret_key)
            .disable_config_load();
        Ok(Operator::new(builder)?.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_endpoint() {
        let err = MinioProvider::new(&MinioConfig::default()).err().unwrap();
        assert!(err.to_string().contains("storage.minio.endpoint"));
    }

    #[test]
    fn test_builds_operator_per_bucket() {
        let config = MinioConfig {
            endpoint: "localhost:9000".into(),
            access_key: "minioadmin".into(),
            secret_key: "minioadmin".into(),
            ..Default::default()
        };
        let provider = MinioProvider::new(&config).unwrap();
        assert_eq!(provider.endpoint, "http://localhost:9000");
        assert!(provider.operator("photos").is_ok());
    }
}
