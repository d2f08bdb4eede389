use serde::Deserialize;

use super::backends::azure::AzureConfig;
use super::backends::minio::MinioConfig;
use super::backends::obs::ObsConfig;
use super::backends::oss::OssConfig;
use super::contract::BackendKind;

/// Bucket used when a request does not name one.
pub const DEFAULT_BUCKET: &str = "default";

/// Which backend to run against and how to reach it.
///
/// Only the section matching `kind` is read.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: BackendKind,
    pub bucket: String,
    pub minio: MinioConfig,
    pub oss: OssConfig,
    pub obs: ObsConfig,
    pub azure: AzureConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Minio,
            bucket: DEFAULT_BUCKET.to_string(),
            minio: MinioConfig::default(),
            oss: OssConfig::default(),
            obs: ObsConfig::default(),
            azure: AzureConfig::default(),
        }
    }
}
