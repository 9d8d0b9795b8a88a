#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Object listing types, key normalization, and content type helpers.
//!
//! This crate defines the plain data shared by the store client and the
//! upload pipeline: what a listing page looks like, how directory-like
//! prefixes are normalized, how "keep both" names are derived, and how
//! file names map to content types and browse categories.

pub mod keys;
pub mod mime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Whether a browse entry is a folder (common prefix) or a file (object).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntryKind {
    /// A key prefix ending in `/`.
    Folder,
    /// A stored object.
    File,
}

/// How to handle a destination key that already exists.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ConflictPolicy {
    /// Overwrite the existing object.
    Replace,
    /// Leave the existing object alone and drop the incoming one.
    Skip,
    /// Store the incoming object under a ` (n)` suffixed name.
    KeepBoth,
}

/// A single entry shown when browsing or searching a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Display name relative to the listed prefix (last segment for
    /// search results).
    pub name: String,
    /// Folder or file.
    pub kind: EntryKind,
    /// Full key (folders end with `/`).
    pub key: String,
    /// Size in bytes. Always `0` for folders.
    pub size: u64,
    /// Last modification time, when the store reports one.
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectEntry {
    /// Creates a folder entry for the given full prefix.
    #[must_use]
    pub fn folder(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Folder,
            key: key.into(),
            size: 0,
            last_modified: None,
        }
    }

    /// Returns `true` if this entry is a folder.
    #[must_use]
    pub const fn is_folder(&self) -> bool {
        matches!(self.kind, EntryKind::Folder)
    }
}

/// A raw object as returned by a listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedObject {
    /// Full object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a `ListObjectsV2`-style listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPage {
    /// Objects on this page.
    pub objects: Vec<ListedObject>,
    /// Common prefixes (only populated for delimiter listings).
    pub common_prefixes: Vec<String>,
    /// Whether more pages remain.
    pub is_truncated: bool,
    /// Token to pass to fetch the next page.
    pub next_token: Option<String>,
}

/// Metadata returned by a `HeadObject` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Content length in bytes.
    pub size: u64,
    /// `ETag` as reported by the store (usually quoted).
    pub etag: Option<String>,
    /// Content type, when known.
    pub content_type: Option<String>,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
}

/// A part confirmed by the store during a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: u32,
    /// `ETag` returned by `UploadPart`.
    pub etag: String,
}

/// Aggregate statistics for everything under a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderStats {
    /// Sum of object sizes in bytes.
    pub total_size: u64,
    /// Number of objects (folder marker excluded).
    pub object_count: u64,
    /// Oldest last-modified timestamp.
    pub earliest_modified: Option<DateTime<Utc>>,
    /// Newest last-modified timestamp.
    pub latest_modified: Option<DateTime<Utc>>,
}

impl FolderStats {
    /// Folds one listed object into the running totals.
    pub fn record(&mut self, object: &ListedObject) {
        self.object_count += 1;
        self.total_size += object.size;
        if let Some(modified) = object.last_modified {
            if self.earliest_modified.is_none_or(|e| modified < e) {
                self.earliest_modified = Some(modified);
            }
            if self.latest_modified.is_none_or(|l| modified > l) {
                self.latest_modified = Some(modified);
            }
        }
    }
}

impl std::fmt::Display for FolderStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        #[allow(clippy::cast_precision_loss)] // display-only MB value
        let mb = self.total_size as f64 / 1_048_576.0;
        write!(f, "{} object(s), {mb:.1} MB", self.object_count)
    }
}
