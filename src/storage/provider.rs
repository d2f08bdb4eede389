//! Storage contract implemented on top of opendal.
//!
//! Each provider only knows how to build an [`Operator`] for one bucket. The
//! shared [`OpendalStorage`] does the rest: error translation, record
//! building and the provider's directory listing strategy.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use opendal::layers::TracingLayer;
use opendal::raw::oio::Write as _;
use opendal::raw::{Access, OpWrite};
use opendal::{Metadata, Operator, Writer};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::contract::{BackendKind, ByteStream, ObjectStorage};
use super::directory::{
    DirectoryListing, common_prefix_directories, directory_prefix, normalize_directory,
    synthesize_directories,
};
use super::error::{StorageError, StorageResult};
use crate::models::object::{DIRECTORY_CONTENT_TYPE, ObjectRecord};

/// Uploads at or above this size (or of unknown size) are written in parts.
pub const MULTIPART_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Part size used for chunked uploads.
pub const UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Builds opendal operators for one provider.
pub trait Provider: Send + Sync + 'static {
    const KIND: BackendKind;
    const DIRECTORY_LISTING: DirectoryListing;

    /// A fresh operator scoped to `bucket`. Layers are added by the caller.
    fn operator(&self, bucket: &str) -> opendal::Result<Operator>;
}

/// Adapter shared by every opendal-backed provider.
///
/// Operators are created lazily, one per bucket, and reused for the life of
/// the process.
pub struct OpendalStorage<P> {
    provider: P,
    operators: RwLock<HashMap<String, Operator>>,
}

impl<P: Provider> OpendalStorage<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            operators: RwLock::new(HashMap::new()),
        }
    }

    fn operator(&self, bucket: &str) -> StorageResult<Operator> {
        if let Some(op) = self.operators.read().get(bucket) {
            return Ok(op.clone());
        }

        let mut operators = self.operators.write();
        if let Some(op) = operators.get(bucket) {
            return Ok(op.clone());
        }
        let op = self
            .provider
            .operator(bucket)
            .map_err(|err| StorageError::from_provider(err, bucket, ""))?
            .layer(TracingLayer);
        operators.insert(bucket.to_string(), op.clone());
        Ok(op)
    }

    fn record(path: &str, meta: &Metadata) -> ObjectRecord {
        if meta.is_dir() || path.ends_with('/') {
            return ObjectRecord::directory(path, meta.last_modified());
        }
        let record = ObjectRecord::file(
            path,
            meta.content_length(),
            meta.content_type(),
            meta.last_modified(),
        );
        match meta.user_metadata() {
            Some(user) => record.with_metadata(user.clone()),
            None => record,
        }
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectRecord>> {
        let op = self.operator(bucket)?;
        let entries = op
            .list_with(prefix)
            .recursive(true)
            .await
            .map_err(|err| StorageError::from_provider(err, bucket, prefix))?;

        Ok(entries
            .iter()
            .filter(|entry| {
                let path = entry.path();
                path != "/" && !path.is_empty() && path.starts_with(prefix)
            })
            .map(|entry| Self::record(entry.path(), entry.metadata()))
            .collect())
    }

    /// Look up the marker object stored at exactly `marker`.
    ///
    /// `stat` on a path ending in `/` answers for the whole prefix on these
    /// services, so it reports a directory as soon as any key lives below it.
    /// A recursive listing starts at the smallest key under the prefix, which
    /// is the marker itself when one was written.
    async fn marker(&self, bucket: &str, marker: &str) -> StorageResult<ObjectRecord> {
        let op = self.operator(bucket)?;
        let to_storage = |err: opendal::Error| StorageError::from_provider(err, bucket, marker);

        let mut lister = op
            .lister_with(marker)
            .recursive(true)
            .await
            .map_err(to_storage)?;
        match lister.try_next().await.map_err(to_storage)? {
            Some(entry) if entry.path() == marker => Ok(ObjectRecord::directory(
                marker,
                entry.metadata().last_modified(),
            )),
            _ => Err(StorageError::not_found(bucket, marker)),
        }
    }

    /// Write the zero-length marker object for `marker`.
    ///
    /// `Operator::write` refuses paths ending in `/`, so the marker goes
    /// through the accessor directly when the service can store its content
    /// type. Otherwise `create_dir` writes a plain empty object.
    async fn write_marker(op: &Operator, marker: &str) -> opendal::Result<()> {
        if !op.info().full_capability().write_with_content_type {
            return op.create_dir(marker).await;
        }
        let args = OpWrite::new().with_content_type(DIRECTORY_CONTENT_TYPE);
        let (_, mut writer) = op.inner().write(marker, args).await?;
        writer.close().await?;
        Ok(())
    }
}

/// An upload in progress.
///
/// Dropping it before `close` aborts the write, so a request that goes away
/// mid-body does not leave a pending multipart upload behind.
struct PendingUpload {
    writer: Option<Writer>,
    target: String,
}

impl PendingUpload {
    fn new(writer: Writer, target: String) -> Self {
        Self {
            writer: Some(writer),
            target,
        }
    }

    async fn write(&mut self, bytes: Bytes) -> opendal::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(bytes).await,
            None => Ok(()),
        }
    }

    async fn close(mut self) -> opendal::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.close().await?;
        }
        Ok(())
    }

    async fn abort(mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.abort().await {
                warn!("failed to abort upload of {}: {}", self.target, err);
            }
        }
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        let target = std::mem::take(&mut self.target);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("upload of {} dropped before completion, aborting", target);
                handle.spawn(async move {
                    if let Err(err) = writer.abort().await {
                        warn!("failed to abort upload of {}: {}", target, err);
                    }
                });
            }
            Err(_) => warn!("upload of {} dropped outside a runtime, not aborted", target),
        }
    }
}

fn require_object_name(bucket: &str, object_name: &str) -> StorageResult<()> {
    if object_name.is_empty() || object_name.ends_with('/') {
        return Err(StorageError::InvalidArgument(format!(
            "{bucket}/{object_name}: object name must be non-empty and not end with `/`"
        )));
    }
    Ok(())
}

#[async_trait]
impl<P: Provider> ObjectStorage for OpendalStorage<P> {
    fn kind(&self) -> BackendKind {
        P::KIND
    }

    async fn upload(
        &self,
        bucket: &str,
        object_name: &str,
        mut body: ByteStream,
        size_hint: Option<u64>,
        content_type: &str,
    ) -> StorageResult<()> {
        require_object_name(bucket, object_name)?;
        let op = self.operator(bucket)?;
        let to_storage = |err: opendal::Error| StorageError::from_provider(err, bucket, object_name);

        let mut request = op.writer_with(object_name);
        if !content_type.is_empty() && op.info().full_capability().write_with_content_type {
            request = request.content_type(content_type);
        }
        if size_hint.is_none_or(|size| size >= MULTIPART_THRESHOLD) {
            request = request.chunk(UPLOAD_CHUNK_SIZE);
        }
        let writer = request.await.map_err(to_storage)?;
        let mut upload = PendingUpload::new(writer, format!("{bucket}/{object_name}"));

        while let Some(chunk) = body.next().await {
            let written = match chunk {
                Ok(bytes) => upload.write(bytes).await.map_err(to_storage),
                Err(err) => Err(StorageError::from_body(err, bucket, object_name)),
            };
            if let Err(err) = written {
                upload.abort().await;
                return Err(err);
            }
        }

        upload.close().await.map_err(to_storage)
    }

    async fn download(&self, bucket: &str, object_name: &str) -> StorageResult<ByteStream> {
        let (_, body) = self.open(bucket, object_name).await?;
        Ok(body)
    }

    /// One `stat`; the reader is given the exact range so it does not stat again.
    async fn open(
        &self,
        bucket: &str,
        object_name: &str,
    ) -> StorageResult<(ObjectRecord, ByteStream)> {
        let op = self.operator(bucket)?;
        let to_storage = |err: opendal::Error| StorageError::from_provider(err, bucket, object_name);

        let meta = op.stat(object_name).await.map_err(to_storage)?;
        if meta.is_dir() || object_name.ends_with('/') {
            return Err(StorageError::InvalidArgument(format!(
                "{bucket}/{object_name} is a directory"
            )));
        }
        let info = Self::record(object_name, &meta);
        if info.size == 0 {
            return Ok((info, futures::stream::empty().boxed()));
        }

        let reader = op.reader(object_name).await.map_err(to_storage)?;
        let stream = reader
            .into_bytes_stream(0..info.size)
            .await
            .map_err(to_storage)?;
        Ok((info, stream.boxed()))
    }

    async fn delete(&self, bucket: &str, object_name: &str) -> StorageResult<()> {
        let op = self.operator(bucket)?;
        op.delete(object_name)
            .await
            .map_err(|err| StorageError::from_provider(err, bucket, object_name))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectRecord>> {
        self.list_keys(bucket, prefix).await
    }

    async fn get_object_info(
        &self,
        bucket: &str,
        object_name: &str,
    ) -> StorageResult<ObjectRecord> {
        if object_name.ends_with('/') {
            return self.marker(bucket, object_name).await;
        }
        let op = self.operator(bucket)?;
        let meta = op
            .stat(object_name)
            .await
            .map_err(|err| StorageError::from_provider(err, bucket, object_name))?;
        Ok(Self::record(object_name, &meta))
    }

    async fn create_directory(&self, bucket: &str, object_name: &str) -> StorageResult<()> {
        let marker = normalize_directory(object_name);
        if marker.is_empty() {
            return Err(StorageError::InvalidArgument(
                "directory name must not be empty".into(),
            ));
        }
        let op = self.operator(bucket)?;
        Self::write_marker(&op, &marker)
            .await
            .map_err(|err| StorageError::from_provider(err, bucket, &marker))
    }

    async fn list_directories(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> StorageResult<Vec<ObjectRecord>> {
        let prefix = directory_prefix(prefix);
        match P::DIRECTORY_LISTING {
            DirectoryListing::CommonPrefixes => {
                let op = self.operator(bucket)?;
                let entries = op
                    .list(&prefix)
                    .await
                    .map_err(|err| StorageError::from_provider(err, bucket, &prefix))?;
                let records = entries
                    .iter()
                    .map(|entry| Self::record(entry.path(), entry.metadata()));
                Ok(common_prefix_directories(&prefix, records))
            }
            DirectoryListing::Synthesized => {
                let records = self.list_keys(bucket, &prefix).await?;
                Ok(synthesize_directories(
                    &prefix,
                    records.iter().map(|record| record.name.as_str()),
                ))
            }
        }
    }
}
