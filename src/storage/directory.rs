//! Virtual directories over flat key spaces.
//!
//! Object stores only know keys. A "directory" here is either a zero-length
//! marker object whose key ends in `/`, or a name derived from the keys below
//! it. Nothing in this module stores directories as their own entity.

use std::collections::BTreeSet;

use tracing::debug;

use super::contract::ObjectStorage;
use super::error::StorageResult;
use crate::models::object::ObjectRecord;

/// How an adapter answers `list_directories`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryListing {
    /// The provider groups keys by `/` itself and returns common prefixes.
    CommonPrefixes,
    /// List every key under the prefix and derive ancestors client-side.
    Synthesized,
}

/// Append a single trailing `/`, collapsing any existing run of them.
///
/// Returns an empty string for an empty or all-slash name.
pub fn normalize_directory(name: &str) -> String {
    let trimmed = name.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Prefix used for prefix-scoped work on a virtual directory.
///
/// Empty stays empty (the whole bucket); anything else ends with `/`.
pub fn directory_prefix(prefix: &str) -> String {
    if prefix.is_empty() {
        String::new()
    } else {
        normalize_directory(prefix)
    }
}

/// Directory marker key for the parent of `object_path`, or `None` at the root.
///
/// Empty and `.` segments are dropped so concatenation never yields `//`.
/// A marker path is its own parent: `a/b/` gives `a/b/`.
pub fn parent_directory(object_path: &str) -> Option<String> {
    let (dir, _) = object_path.rsplit_once('/')?;
    let segments: Vec<&str> = dir
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if segments.is_empty() {
        return None;
    }
    Some(format!("{}/", segments.join("/")))
}

/// Every ancestor directory of `key`, shallowest first.
///
/// `a/b/c.txt` yields `a/` and `a/b/`; a marker `a/b/` yields the same two.
pub fn ancestor_directories(key: &str) -> Vec<String> {
    let parts: Vec<&str> = key.split('/').collect();
    let mut dirs = Vec::new();
    let mut current = String::new();
    for part in &parts[..parts.len().saturating_sub(1)] {
        if part.is_empty() {
            continue;
        }
        current.push_str(part);
        current.push('/');
        dirs.push(current.clone());
    }
    dirs
}

/// Build directory records below `prefix` from a flat key listing.
///
/// Each full segment path appears exactly once no matter how many keys share
/// it. Ancestors at or above `prefix` are left out. Output is sorted by name.
pub fn synthesize_directories<'a, I>(prefix: &str, keys: I) -> Vec<ObjectRecord>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = BTreeSet::new();
    for key in keys {
        seen.extend(
            ancestor_directories(key)
                .into_iter()
                .filter(|dir| dir.len() > prefix.len() && dir.starts_with(prefix)),
        );
    }
    seen.into_iter()
        .map(|name| ObjectRecord::directory(name, None))
        .collect()
}

/// Keep the directory entries of a delimiter listing, dropping the listed
/// prefix itself and any repeats.
pub fn common_prefix_directories<I>(prefix: &str, entries: I) -> Vec<ObjectRecord>
where
    I: IntoIterator<Item = ObjectRecord>,
{
    let mut seen = BTreeSet::new();
    entries
        .into_iter()
        .filter(|record| record.is_marker() && record.name != prefix)
        .filter_map(|record| {
            let name = normalize_directory(&record.name);
            if name.is_empty() || !seen.insert(name.clone()) {
                return None;
            }
            Some(ObjectRecord::directory(name, record.last_modified))
        })
        .collect()
}

/// Make sure a marker exists for the parent directory of `object_path`.
///
/// Stats the marker key first; only a `NotFound` answer leads to a write, so
/// repeated calls for the same path write once. Other stat failures propagate.
pub async fn ensure_path_exists<S>(
    storage: &S,
    bucket: &str,
    object_path: &str,
) -> StorageResult<()>
where
    S: ObjectStorage + ?Sized,
{
    let Some(dir) = parent_directory(object_path) else {
        return Ok(());
    };

    match storage.get_object_info(bucket, &dir).await {
        Ok(_) => Ok(()),
        Err(err) if err.is_not_found() => {
            debug!("creating directory marker {}/{}", bucket, dir);
            storage.create_directory(bucket, &dir).await
        }
        Err(err) => Err(err),
    }
}
