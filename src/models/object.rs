//! Represents an object (file) or virtual directory stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Content type reported when the backend does not know one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type carried by directory markers.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/directory";

/// A single stored item within a bucket, as reported by the active backend.
///
/// Records are never cached: every List/GetObjectInfo call builds fresh ones
/// from the provider's answer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    /// Full key within the bucket. Directory markers end with `/`.
    pub name: String,

    /// Size in bytes. Directories report 0.
    pub size: u64,

    /// Content type (MIME type).
    pub content_type: String,

    /// Backend-reported modification time, if the provider returned one.
    pub last_modified: Option<DateTime<Utc>>,

    /// User-defined key/value pairs attached to the object.
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Whether this record is a virtual directory rather than content.
    pub is_directory: bool,
}

impl ObjectRecord {
    /// Build a record for a regular object.
    ///
    /// An empty `content_type` falls back to [`DEFAULT_CONTENT_TYPE`].
    pub fn file(
        name: impl Into<String>,
        size: u64,
        content_type: Option<&str>,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        let content_type = content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        Self {
            name: name.into(),
            size,
            content_type,
            last_modified,
            metadata: HashMap::new(),
            is_directory: false,
        }
    }

    /// Build a directory record. `name` is expected to already end with `/`.
    pub fn directory(name: impl Into<String>, last_modified: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            content_type: DIRECTORY_CONTENT_TYPE.to_string(),
            last_modified,
            metadata: HashMap::new(),
            is_directory: true,
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// True for anything that is a directory marker rather than content.
    pub fn is_marker(&self) -> bool {
        self.is_directory || self.name.ends_with('/')
    }
}
