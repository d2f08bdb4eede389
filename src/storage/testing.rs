//! In-process `ObjectStorage` used by unit tests.
//!
//! Counts stat and write calls and can be told to fail specific keys, which the
//! opendal-backed adapters cannot do on demand.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::contract::{BackendKind, ByteStream, ObjectStorage};
use super::directory::{normalize_directory, synthesize_directories};
use super::error::{StorageError, StorageResult};
use crate::models::object::{DIRECTORY_CONTENT_TYPE, ObjectRecord};

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
}

#[derive(Default)]
pub(crate) struct RecordingStorage {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    failing_stats: Mutex<HashSet<String>>,
    failing_downloads: Mutex<HashSet<String>>,
    broken_streams: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    writes: AtomicUsize,
    stats: AtomicUsize,
}

impl RecordingStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a write.
    pub(crate) fn insert(&self, bucket: &str, key: &str, data: &[u8], content_type: &str) {
        self.objects.lock().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: Bytes::copy_from_slice(data),
                content_type: content_type.to_string(),
            },
        );
    }

    pub(crate) fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub(crate) fn stat_count(&self) -> usize {
        self.stats.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_stat(&self, key: &str) {
        self.failing_stats.lock().insert(key.to_string());
    }

    pub(crate) fn fail_download(&self, key: &str) {
        self.failing_downloads.lock().insert(key.to_string());
    }

    /// Downloads of `key` yield one chunk and then an I/O error.
    pub(crate) fn break_stream(&self, key: &str) {
        self.broken_streams.lock().insert(key.to_string());
    }

    pub(crate) fn fail_delete(&self, key: &str) {
        self.failing_deletes.lock().insert(key.to_string());
    }

    fn record(&self, bucket: &str, key: &str) -> Option<ObjectRecord> {
        let objects = self.objects.lock();
        let stored = objects.get(&(bucket.to_string(), key.to_string()))?;
        Some(if key.ends_with('/') {
            ObjectRecord::directory(key, Some(Utc::now()))
        } else {
            ObjectRecord::file(
                key,
                stored.data.len() as u64,
                Some(&stored.content_type),
                Some(Utc::now()),
            )
        })
    }
}

#[async_trait]
impl ObjectStorage for RecordingStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn upload(
        &self,
        bucket: &str,
        object_name: &str,
        mut body: ByteStream,
        _size_hint: Option<u64>,
        content_type: &str,
    ) -> StorageResult<()> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| StorageError::from_body(err, bucket, object_name))?;
            buf.extend_from_slice(&chunk);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.insert(bucket, object_name, &buf, content_type);
        Ok(())
    }

    async fn download(&self, bucket: &str, object_name: &str) -> StorageResult<ByteStream> {
        if self.failing_downloads.lock().contains(object_name) {
            return Err(StorageError::not_found(bucket, object_name));
        }
        let data = self
            .objects
            .lock()
            .get(&(bucket.to_string(), object_name.to_string()))
            .map(|stored| stored.data.clone())
            .ok_or_else(|| StorageError::not_found(bucket, object_name))?;

        if self.broken_streams.lock().contains(object_name) {
            let chunks: Vec<io::Result<Bytes>> = vec![
                Ok(data.slice(..data.len() / 2)),
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
            ];
            return Ok(futures::stream::iter(chunks).boxed());
        }
        Ok(futures::stream::iter(vec![Ok(data)]).boxed())
    }

    async fn delete(&self, bucket: &str, object_name: &str) -> StorageResult<()> {
        if self.failing_deletes.lock().contains(object_name) {
            return Err(StorageError::Backend(format!("AccessDenied: {object_name}")));
        }
        self.objects
            .lock()
            .remove(&(bucket.to_string(), object_name.to_string()));
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectRecord>> {
        let keys: Vec<String> = self
            .keys(bucket)
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();
        Ok(keys.iter().filter_map(|k| self.record(bucket, k)).collect())
    }

    async fn get_object_info(
        &self,
        bucket: &str,
        object_name: &str,
    ) -> StorageResult<ObjectRecord> {
        self.stats.fetch_add(1, Ordering::SeqCst);
        if self.failing_stats.lock().contains(object_name) {
            return Err(StorageError::Backend("503 SlowDown".into()));
        }
        self.record(bucket, object_name)
            .ok_or_else(|| StorageError::not_found(bucket, object_name))
    }

    async fn create_directory(&self, bucket: &str, object_name: &str) -> StorageResult<()> {
        let marker = normalize_directory(object_name);
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.insert(bucket, &marker, &[], DIRECTORY_CONTENT_TYPE);
        Ok(())
    }

    async fn list_directories(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> StorageResult<Vec<ObjectRecord>> {
        let keys: Vec<String> = self
            .keys(bucket)
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();
        Ok(synthesize_directories(
            prefix,
            keys.iter().map(String::as_str),
        ))
    }
}
