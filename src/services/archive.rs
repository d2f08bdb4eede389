//! Streaming zip archives of everything under a prefix.
//!
//! The archive is written into a small in-memory spool that is drained into a
//! channel after every write, so at most one chunk of compressed output is
//! held at a time. Objects that cannot be read are skipped and reported.

use bytes::Bytes;
use futures::channel::mpsc::Sender;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, warn};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::models::object::ObjectRecord;
use crate::storage::directory::directory_prefix;
use crate::storage::{ObjectStorage, StorageError, StorageResult};

/// One object to put in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Full key in the bucket.
    pub key: String,
    /// Name inside the archive: the key relative to the archived prefix.
    pub entry_name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedObject {
    pub name: String,
    pub reason: String,
}

/// What ended up in an archive.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ArchiveReport {
    pub archived: Vec<String>,
    pub skipped: Vec<SkippedObject>,
}

impl ArchiveReport {
    fn skip(&mut self, name: &str, reason: impl ToString) {
        let reason = reason.to_string();
        warn!("skipping {} in archive: {}", name, reason);
        self.skipped.push(SkippedObject {
            name: name.to_string(),
            reason,
        });
    }
}

/// Turn a listing into archive entries.
///
/// Directory records and trailing-slash keys are dropped; entry names are the
/// key with `prefix` (normalized to end in `/`) removed.
pub fn plan_entries(prefix: &str, records: Vec<ObjectRecord>) -> Vec<ArchiveEntry> {
    let prefix = directory_prefix(prefix);
    records
        .into_iter()
        .filter(|record| !record.is_marker())
        .filter_map(|record| {
            let entry_name = record.name.strip_prefix(prefix.as_str())?.to_string();
            if entry_name.is_empty() {
                return None;
            }
            Some(ArchiveEntry {
                key: record.name,
                entry_name,
            })
        })
        .collect()
}

/// `Write` target that the zip writer fills and the async side drains.
#[derive(Clone, Default)]
struct Spool(Arc<Mutex<Vec<u8>>>);

impl Spool {
    fn take(&self) -> Option<Bytes> {
        let mut buf = self.0.lock();
        if buf.is_empty() {
            return None;
        }
        Some(Bytes::from(std::mem::take(&mut *buf)))
    }
}

impl Write for Spool {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn zip_error(err: impl ToString) -> StorageError {
    StorageError::Backend(format!("writing archive: {}", err.to_string()))
}

async fn drain(spool: &Spool, sink: &mut Sender<io::Result<Bytes>>) -> StorageResult<()> {
    if let Some(chunk) = spool.take() {
        sink.send(Ok(chunk))
            .await
            .map_err(|_| StorageError::Backend("archive receiver dropped".into()))?;
    }
    Ok(())
}

/// Write `entries` from `bucket` as a zip into `sink`.
///
/// Per-object failures are recorded in the report and the archive goes on.
/// Only a failure of the archive itself (or the receiver going away) ends it
/// early with an error.
pub async fn write_archive(
    storage: &dyn ObjectStorage,
    bucket: &str,
    entries: Vec<ArchiveEntry>,
    mut sink: Sender<io::Result<Bytes>>,
) -> StorageResult<ArchiveReport> {
    let spool = Spool::default();
    let mut zip = ZipWriter::new_stream(spool.clone());
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .large_file(true);
    let mut report = ArchiveReport::default();

    for entry in entries {
        let mut source = match storage.download(bucket, &entry.key).await {
            Ok(source) => source,
            Err(err) => {
                report.skip(&entry.key, err);
                continue;
            }
        };

        if let Err(err) = zip.start_file(entry.entry_name.as_str(), options) {
            report.skip(&entry.key, zip_error(err));
            continue;
        }
        drain(&spool, &mut sink).await?;

        let mut failure = None;
        while let Some(chunk) = source.next().await {
            match chunk {
                Ok(bytes) => {
                    zip.write_all(&bytes).map_err(zip_error)?;
                    drain(&spool, &mut sink).await?;
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        drop(source);

        match failure {
            Some(err) => report.skip(&entry.key, format!("truncated after read error: {err}")),
            None => {
                debug!("archived {}/{} as {}", bucket, entry.key, entry.entry_name);
                report.archived.push(entry.entry_name);
            }
        }
    }

    zip.finish().map_err(zip_error)?;
    drain(&spool, &mut sink).await?;
    Ok(report)
}

/// List `prefix` in `bucket` and plan one entry per object beneath it.
pub async fn plan_archive(
    storage: &dyn ObjectStorage,
    bucket: &str,
    prefix: &str,
) -> StorageResult<Vec<ArchiveEntry>> {
    let records = storage.list(bucket, &directory_prefix(prefix)).await?;
    Ok(plan_entries(prefix, records))
}
