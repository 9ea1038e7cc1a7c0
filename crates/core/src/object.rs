use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a stored object, unique within its container.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ObjectKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Named namespace holding objects (the bucket).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Container(String);

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Container {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// One page of a key listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListPage {
    pub keys: Vec<ObjectKey>,
    /// Opaque cursor for the next page; `None` on the last page.
    pub continuation: Option<String>,
}

impl ListPage {
    pub fn new(keys: Vec<ObjectKey>, continuation: Option<String>) -> Self {
        Self { keys, continuation }
    }

    pub fn is_last(&self) -> bool {
        self.continuation.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectVersion {
    pub key: ObjectKey,
    pub version_id: String,
    pub is_latest: bool,
    pub is_delete_marker: bool,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: u64,
}

/// One page of a version listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionedListPage {
    pub versions: Vec<ObjectVersion>,
    /// Key to resume from; `None` when no more versions remain.
    pub next_key_marker: Option<String>,
    pub next_version_id_marker: Option<String>,
}

impl VersionedListPage {
    pub fn is_last(&self) -> bool {
        self.next_key_marker.is_none()
    }
}
