//! The storage contract every provider adapter implements.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};
use std::io;
use std::str::FromStr;

use super::directory;
use super::error::StorageResult;
use crate::models::object::ObjectRecord;

/// Owned, single-use stream of object bytes.
///
/// Dropping the stream releases the underlying connection.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Supported backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// MinIO or any other self-hosted S3 endpoint
    Minio,
    /// Aliyun Object Storage Service
    Oss,
    /// Huawei Cloud Object Storage Service
    Obs,
    /// Azure Blob Storage
    Azure,
    /// Process-local store, nothing persisted
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Minio => "minio",
            BackendKind::Oss => "oss",
            BackendKind::Obs => "obs",
            BackendKind::Azure => "azure",
            BackendKind::Memory => "memory",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "minio" => Ok(BackendKind::Minio),
            "oss" => Ok(BackendKind::Oss),
            "obs" => Ok(BackendKind::Obs),
            "azure" => Ok(BackendKind::Azure),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!("unsupported storage type: {other}")),
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform file-object API over a flat object store.
///
/// Every method takes the bucket (or container) explicitly; the adapter does not
/// validate that it exists and reports whatever the provider answers. Calls are
/// cancelled by dropping the returned future.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Which provider this adapter talks to.
    fn kind(&self) -> BackendKind;

    /// Write `body` to `object_name`, replacing any existing object.
    ///
    /// `size_hint` is `None` when the transport did not announce a length.
    /// An empty `content_type` is stored as `application/octet-stream`.
    async fn upload(
        &self,
        bucket: &str,
        object_name: &str,
        body: ByteStream,
        size_hint: Option<u64>,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Open `object_name` for reading.
    ///
    /// # Errors
    ///
    /// `NotFound` when the key is absent.
    async fn download(&self, bucket: &str, object_name: &str) -> StorageResult<ByteStream>;

    /// Metadata and an open stream for `object_name`.
    ///
    /// Adapters that learn the metadata while opening the stream override this
    /// to answer with a single provider round trip.
    async fn open(
        &self,
        bucket: &str,
        object_name: &str,
    ) -> StorageResult<(ObjectRecord, ByteStream)> {
        let info = self.get_object_info(bucket, object_name).await?;
        let body = self.download(bucket, object_name).await?;
        Ok((info, body))
    }

    /// Remove `object_name`. Removing a missing key may or may not fail,
    /// depending on the provider.
    async fn delete(&self, bucket: &str, object_name: &str) -> StorageResult<()>;

    /// Every object whose name starts with `prefix`, all pages drained.
    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectRecord>>;

    /// Fresh metadata for a single key.
    ///
    /// # Errors
    ///
    /// `NotFound` when the key is absent.
    async fn get_object_info(&self, bucket: &str, object_name: &str)
    -> StorageResult<ObjectRecord>;

    /// Write a zero-length directory marker. `object_name` gets a trailing `/`
    /// if it lacks one.
    async fn create_directory(&self, bucket: &str, object_name: &str) -> StorageResult<()>;

    /// Directory records beneath `prefix`, each name appearing once.
    async fn list_directories(&self, bucket: &str, prefix: &str)
    -> StorageResult<Vec<ObjectRecord>>;

    /// Make sure the parent directory of `object_path` has a marker.
    ///
    /// A no-op when the marker already exists or the path has no parent.
    async fn ensure_path_exists(&self, bucket: &str, object_path: &str) -> StorageResult<()> {
        directory::ensure_path_exists(self, bucket, object_path).await
    }
}

impl Debug for dyn ObjectStorage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectStorage(kind={})", self.kind())
    }
}
