use anyhow::Result;
use opendal::Operator;
use opendal::services::Oss;
use serde::Deserialize;

use super::{require, with_scheme};
use crate::storage::contract::BackendKind;
use crate::storage::directory::DirectoryListing;
use crate::storage::provider::Provider;

/// Aliyun OSS credentials and regional endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OssConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_ssl: bool,
}

pub struct OssProvider {
    endpoint: String,
    access_key: String,
    secret_key: String,
}

impl OssProvider {
    pub fn new(config: &OssConfig) -> Result<Self> {
        require("oss", "endpoint", &config.endpoint)?;
        require("oss", "access_key", &config.access_key)?;
        Ok(Self {
            endpoint: with_scheme(&config.endpoint, config.use_ssl),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }
}

impl Provider for OssProvider {
    const KIND: BackendKind = BackendKind::Oss;
    const DIRECTORY_LISTING: DirectoryListing = DirectoryListing::CommonPrefixes;

    fn operator(&self, bucket: &str) -> opendal::Result<Operator> {
        let builder = Oss::default()
            .endpoint(&self.endpoint)
            .bucket(bucket)
            .access_key_id(&self.access_key)
            .access_key_secret(&self.secret_key);
        Ok(Operator::new(builder)?.finish())
    }
}
