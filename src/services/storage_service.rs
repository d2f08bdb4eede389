//! src/services/storage_service.rs
//!
//! StorageService: the operations the HTTP layer calls. Wraps the active
//! backend with default-bucket substitution, per-operation deadlines and the
//! prefix-scoped bulk operations.

use bytes::Bytes;
use futures::channel::mpsc::{self, Sender};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::archive;
use crate::models::object::ObjectRecord;
use crate::storage::directory::directory_prefix;
use crate::storage::{BackendKind, ByteStream, ObjectStorage, StorageError, StorageResult};

/// Chunks of compressed archive output buffered ahead of the client.
const ARCHIVE_CHANNEL_DEPTH: usize = 16;

/// Outcome of a prefix-scoped delete.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct PrefixDeletion {
    pub deleted: Vec<String>,
    pub errors: Vec<String>,
}

/// Shared handle to the process-wide backend.
///
/// Cheap to clone; every clone talks to the same adapter.
#[derive(Clone)]
pub struct StorageService {
    storage: Arc<dyn ObjectStorage>,
    default_bucket: String,
    operation_timeout: Option<Duration>,
}

impl StorageService {
    /// `operation_timeout` of `None` lets operations run until the client
    /// goes away.
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        default_bucket: impl Into<String>,
        operation_timeout: Option<Duration>,
    ) -> Self {
        Self {
            storage,
            default_bucket: default_bucket.into(),
            operation_timeout,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.storage.kind()
    }

    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }

    /// The bucket to use for a request: `bucket`, or the default when empty.
    pub fn resolve_bucket<'a>(&'a self, bucket: &'a str) -> &'a str {
        if bucket.is_empty() {
            &self.default_bucket
        } else {
            bucket
        }
    }

    async fn run<T, F>(&self, operation: &str, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        match self.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| StorageError::timed_out(operation, limit))?,
            None => fut.await,
        }
    }

    /// Make sure the parent directory exists, then store the object.
    ///
    /// The deadline covers creating the parent marker. The body itself may take
    /// as long as it needs, but fails with `TimedOut` once it goes a whole
    /// deadline without delivering a chunk.
    pub async fn upload(
        &self,
        bucket: &str,
        object_name: &str,
        body: ByteStream,
        size_hint: Option<u64>,
        content_type: &str,
    ) -> StorageResult<()> {
        let bucket = self.resolve_bucket(bucket);
        debug!("upload {}/{} (size hint {:?})", bucket, object_name, size_hint);
        self.run(
            "upload",
            self.storage.ensure_path_exists(bucket, object_name),
        )
        .await?;

        let body = match self.operation_timeout {
            Some(limit) => idle_timeout(body, limit),
            None => body,
        };
        self.storage
            .upload(bucket, object_name, body, size_hint, content_type)
            .await
    }

    /// Current metadata plus an open stream for the object.
    ///
    /// Only opening the stream is covered by the deadline; the body then runs
    /// for as long as the client keeps reading.
    pub async fn download(
        &self,
        bucket: &str,
        object_name: &str,
    ) -> StorageResult<(ObjectRecord, ByteStream)> {
        let bucket = self.resolve_bucket(bucket);
        debug!("download {}/{}", bucket, object_name);
        self.run("download", self.storage.open(bucket, object_name))
            .await
    }

    pub async fn delete(&self, bucket: &str, object_name: &str) -> StorageResult<()> {
        let bucket = self.resolve_bucket(bucket);
        debug!("delete {}/{}", bucket, object_name);
        self.run("delete", self.storage.delete(bucket, object_name))
            .await
    }

    /// Delete every object whose name starts with `prefix`.
    ///
    /// Keeps going after a failed delete; nothing is rolled back.
    pub async fn delete_prefix(&self, bucket: &str, prefix: &str) -> StorageResult<PrefixDeletion> {
        let bucket = self.resolve_bucket(bucket);
        let objects = self.run("list", self.storage.list(bucket, prefix)).await?;

        let mut outcome = PrefixDeletion::default();
        for object in objects {
            match self.run("delete", self.storage.delete(bucket, &object.name)).await {
                Ok(()) => outcome.deleted.push(object.name),
                Err(err) => {
                    warn!("prefix delete of {}/{} failed: {}", bucket, object.name, err);
                    outcome
                        .errors
                        .push(format!("Failed to delete {}: {}", object.name, err));
                }
            }
        }
        info!(
            "prefix delete {}/{}: {} deleted, {} failed",
            bucket,
            prefix,
            outcome.deleted.len(),
            outcome.errors.len()
        );
        Ok(outcome)
    }

    pub async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectRecord>> {
        let bucket = self.resolve_bucket(bucket);
        self.run("list", self.storage.list(bucket, prefix)).await
    }

    pub async fn list_directories(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> StorageResult<Vec<ObjectRecord>> {
        let bucket = self.resolve_bucket(bucket);
        self.run(
            "list directories",
            self.storage.list_directories(bucket, prefix),
        )
        .await
    }

    pub async fn get_object_info(
        &self,
        bucket: &str,
        object_name: &str,
    ) -> StorageResult<ObjectRecord> {
        let bucket = self.resolve_bucket(bucket);
        self.run("stat", self.storage.get_object_info(bucket, object_name))
            .await
    }

    pub async fn create_directory(&self, bucket: &str, object_name: &str) -> StorageResult<()> {
        let bucket = self.resolve_bucket(bucket);
        debug!("mkdir {}/{}", bucket, object_name);
        self.run("mkdir", self.storage.create_directory(bucket, object_name))
            .await
    }

    /// Start streaming a zip of everything under `prefix`.
    ///
    /// The listing happens before this returns so that listing errors can still
    /// become an error response. The archive itself is produced by a background
    /// task that stops as soon as the returned stream is dropped.
    pub async fn archive(&self, bucket: &str, prefix: &str) -> StorageResult<ByteStream> {
        let bucket = self.resolve_bucket(bucket).to_string();
        let entries = self
            .run(
                "list",
                archive::plan_archive(self.storage.as_ref(), &bucket, prefix),
            )
            .await?;

        let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(ARCHIVE_CHANNEL_DEPTH);
        let storage = Arc::clone(&self.storage);
        let prefix = directory_prefix(prefix);
        tokio::spawn(async move {
            let errors = tx.clone();
            match archive::write_archive(storage.as_ref(), &bucket, entries, tx).await {
                Ok(report) => info!(
                    "archive of {}/{}: {} archived, {} skipped",
                    bucket,
                    prefix,
                    report.archived.len(),
                    report.skipped.len()
                ),
                Err(err) => {
                    warn!("archive of {}/{} aborted: {}", bucket, prefix, err);
                    fail_stream(errors, err).await;
                }
            }
        });
        Ok(rx.boxed())
    }

    /// Ask the backend about a key that should not exist.
    ///
    /// Any answer from the provider, including `NotFound`, counts as ready.
    pub async fn probe(&self) -> StorageResult<()> {
        let key = format!(".readyz-{}", Uuid::new_v4());
        match self
            .run("probe", self.storage.get_object_info(&self.default_bucket, &key))
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// End `sink` with `err` so the client sees a failed body instead of a short
/// archive that looks complete.
async fn fail_stream(mut sink: Sender<io::Result<Bytes>>, err: StorageError) {
    if sink
        .send(Err(io::Error::other(err.to_string())))
        .await
        .is_err()
    {
        debug!("archive receiver already gone");
    }
}

/// Fail `body` with `TimedOut` when it goes `limit` without yielding a chunk.
fn idle_timeout(body: ByteStream, limit: Duration) -> ByteStream {
    futures::stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout(limit, body.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(body))),
            Ok(None) => None,
            Err(_) => {
                let err = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("upload body idle for {}s", limit.as_secs()),
                );
                Some((Err(err), None))
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::RecordingStorage;
    use async_trait::async_trait;

    fn service(storage: Arc<RecordingStorage>) -> StorageService {
        StorageService::new(storage, "default", Some(Duration::from_secs(5)))
    }

    fn body(data: &'static [u8]) -> ByteStream {
        futures::stream::iter(vec![Ok(Bytes::from_static(data))]).boxed()
    }

    #[tokio::test]
    async fn test_upload_creates_parent_marker() {
        let storage = Arc::new(RecordingStorage::new());
        let svc = service(storage.clone());

        svc.upload("", "reports/2025/q1.csv", body(b"a,b"), Some(3), "text/csv")
            .await
            .unwrap();

        assert_eq!(
            storage.keys("default"),
            vec!["reports/2025/", "reports/2025/q1.csv"]
        );
    }

    #[tokio::test]
    async fn test_download_returns_record_and_bytes() {
        let storage = Arc::new(RecordingStorage::new());
        storage.insert("photos", "cat.png", b"meow", "image/png");
        let svc = service(storage);

        let (info, stream) = svc.download("photos", "cat.png").await.unwrap();
        assert_eq!(info.content_type, "image/png");
        let chunks: Vec<io::Result<Bytes>> = stream.collect().await;
        assert_eq!(chunks[0].as_ref().unwrap().as_ref(), b"meow");
    }

    #[tokio::test]
    async fn test_download_stats_once() {
        let storage = Arc::new(RecordingStorage::new());
        storage.insert("photos", "dog.png", b"woof", "image/png");
        let svc = service(storage.clone());

        svc.download("photos", "dog.png").await.unwrap();
        assert_eq!(storage.stat_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_upload_outlives_deadline() {
        let storage = Arc::new(RecordingStorage::new());
        let svc = StorageService::new(storage.clone(), "default", Some(Duration::from_secs(300)));
        let slow = futures::stream::iter(0..10u8)
            .then(|i| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, io::Error>(Bytes::from(vec![i; 4]))
            })
            .boxed();

        svc.upload("b", "big/file.bin", slow, Some(40), "")
            .await
            .unwrap();
        assert_eq!(storage.keys("b"), vec!["big/", "big/file.bin"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_upload_body_times_out() {
        let storage = Arc::new(RecordingStorage::new());
        let svc = StorageService::new(storage.clone(), "default", Some(Duration::from_secs(2)));
        let stalled = futures::stream::iter(vec![Ok(Bytes::from_static(b"head"))])
            .chain(futures::stream::pending())
            .boxed();

        let err = svc
            .upload("b", "big/stalled.bin", stalled, None, "")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TimedOut(_)));
        assert_eq!(storage.keys("b"), vec!["big/"]);
    }

    #[tokio::test]
    async fn test_archive_failure_reaches_full_stream() {
        let (mut tx, rx) = mpsc::channel::<io::Result<Bytes>>(1);
        while tx.try_send(Ok(Bytes::from_static(b"zip"))).is_ok() {}

        let writer = tokio::spawn(fail_stream(
            tx,
            StorageError::Backend("writing archive: disk full".into()),
        ));
        let chunks: Vec<io::Result<Bytes>> = rx.collect().await;
        writer.await.unwrap();

        let last = chunks.last().unwrap();
        assert!(last.as_ref().is_err_and(|err| err.to_string().contains("disk full")));
    }

    #[tokio::test]
    async fn test_delete_prefix_on_empty_prefix() {
        let svc = service(Arc::new(RecordingStorage::new()));
        let outcome = svc.delete_prefix("bucket", "missing/").await.unwrap();
        assert_eq!(outcome, PrefixDeletion::default());
    }

    #[tokio::test]
    async fn test_delete_prefix_collects_failures() {
        let storage = Arc::new(RecordingStorage::new());
        storage.insert("bucket", "logs/a.log", b"1", "text/plain");
        storage.insert("bucket", "logs/b.log", b"2", "text/plain");
        storage.insert("bucket", "keep.txt", b"3", "text/plain");
        storage.fail_delete("logs/b.log");
        let svc = service(storage.clone());

        let outcome = svc.delete_prefix("bucket", "logs/").await.unwrap();

        assert_eq!(outcome.deleted, vec!["logs/a.log"]);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("Failed to delete logs/b.log"));
        assert_eq!(storage.keys("bucket"), vec!["keep.txt", "logs/b.log"]);
    }

    #[tokio::test]
    async fn test_probe_treats_not_found_as_ready() {
        let svc = service(Arc::new(RecordingStorage::new()));
        svc.probe().await.unwrap();
    }

    struct StalledStorage(RecordingStorage);

    #[async_trait]
    impl ObjectStorage for StalledStorage {
        fn kind(&self) -> BackendKind {
            BackendKind::Memory
        }
        async fn upload(
            &self,
            bucket: &str,
            object_name: &str,
            body: ByteStream,
            size_hint: Option<u64>,
            content_type: &str,
        ) -> StorageResult<()> {
            self.0
                .upload(bucket, object_name, body, size_hint, content_type)
                .await
        }
        async fn download(&self, bucket: &str, object_name: &str) -> StorageResult<ByteStream> {
            self.0.download(bucket, object_name).await
        }
        async fn delete(&self, bucket: &str, object_name: &str) -> StorageResult<()> {
            self.0.delete(bucket, object_name).await
        }
        async fn list(&self, _bucket: &str, _prefix: &str) -> StorageResult<Vec<ObjectRecord>> {
            futures::future::pending().await
        }
        async fn get_object_info(
            &self,
            bucket: &str,
            object_name: &str,
        ) -> StorageResult<ObjectRecord> {
            self.0.get_object_info(bucket, object_name).await
        }
        async fn create_directory(&self, bucket: &str, object_name: &str) -> StorageResult<()> {
            self.0.create_directory(bucket, object_name).await
        }
        async fn list_directories(
            &self,
            bucket: &str,
            prefix: &str,
        ) -> StorageResult<Vec<ObjectRecord>> {
            self.0.list_directories(bucket, prefix).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        let svc = StorageService::new(
            Arc::new(StalledStorage(RecordingStorage::new())),
            "default",
            Some(Duration::from_secs(2)),
        );
        let err = svc.list("", "").await.unwrap_err();
        assert!(matches!(err, StorageError::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_archive_streams_zip() {
        let storage = Arc::new(RecordingStorage::new());
        storage.insert("default", "site/index.html", b"<html>", "text/html");
        let svc = service(storage);

        let stream = svc.archive("", "site").await.unwrap();
        let chunks: Vec<io::Result<Bytes>> = stream.collect().await;
        let bytes: Vec<u8> = chunks
            .into_iter()
            .flat_map(|c| c.unwrap().to_vec())
            .collect();

        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 1);
        assert_eq!(zip.by_index(0).unwrap().name(), "index.html");
    }
}
