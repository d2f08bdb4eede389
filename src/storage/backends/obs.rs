use anyhow::Result;
use opendal::Operator;
use opendal::services::Obs;
use serde::Deserialize;

use super::{require, with_scheme};
use crate::storage::contract::BackendKind;
use crate::storage::directory::DirectoryListing;
use crate::storage::provider::Provider;

/// Huawei Cloud OBS credentials and regional endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObsConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_ssl: bool,
}

pub struct ObsProvider {
    endpoint: String,
    access_key: String,
    secret_key: String,
}

impl ObsProvider {
    pub fn new(config: &ObsConfig) -> Result<Self> {
        require("obs", "endpoint", &config.endpoint)?;
        require("obs", "access_key", &config.access_key)?;
        Ok(Self {
            endpoint: with_scheme(&config.endpoint, config.use_ssl),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }
}

impl Provider for ObsProvider {
    const KIND: BackendKind = BackendKind::Obs;
    const DIRECTORY_LISTING: DirectoryListing = DirectoryListing::CommonPrefixes;

    fn operator(&self, bucket: &str) -> opendal::Result<Operator> {
        let builder = Obs::default()
            .endpoint(&self.endpoint)
            .bucket(bucket)
            .access_key_id(&self.access_key)
            .secret_access_key(&self.secret_key);
        Ok(Operator::new(builder)?.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_http_endpoint() {
        let config = ObsConfig {
            endpoint: "obs.cn-north-4.myhuaweicloud.com".into(),
            access_key: "ak".into(),
            secret_key: "sk".into(),
            use_ssl: false,
        };
        let provider = ObsProvider::new(&config).unwrap();
        assert_eq!(provider.endpoint, "http://obs.cn-north-4.myhuaweicloud.com");
    }
}
