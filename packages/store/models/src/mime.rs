//! Content type guessing and browse categories derived from file names.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::ObjectEntry;

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg"];
const VIDEO_EXTS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "flv"];
const AUDIO_EXTS: &[&str] = &["mp3", "wav", "aac", "ogg", "flac", "m4a", "wma"];
const DOCUMENT_EXTS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "rtf", "odt", "ods", "odp", "csv",
    "tsv", "md", "markdown", "log",
];
const CODE_EXTS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "py", "java", "c", "cpp", "cs", "rb", "php", "go", "rs", "swift",
    "kt", "html", "css", "json", "xml", "sh", "bat", "pl", "m", "scala", "dart", "sql", "ipynb",
    "yml", "yaml", "toml",
];
const ARCHIVE_EXTS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "iso", "jar"];

/// Content types for the extensions we upload most often.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("flac", "audio/flac"),
    ("m4a", "audio/mp4"),
    ("pdf", "application/pdf"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("txt", "text/plain; charset=utf-8"),
    ("log", "text/plain; charset=utf-8"),
    ("md", "text/markdown; charset=utf-8"),
    ("csv", "text/csv; charset=utf-8"),
    ("html", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "text/javascript; charset=utf-8"),
];

/// Fallback content type for unknown extensions.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Browse category of a file, derived from its extension.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FileCategory {
    Image,
    Video,
    Audio,
    Document,
    Code,
    Archive,
    Other,
}

/// Returns the lowercased extension of a name (without the dot), or `""`.
#[must_use]
pub fn extension_of(name: &str) -> String {
    let last = name.rsplit('/').next().unwrap_or(name);
    match last.rfind('.') {
        Some(dot) => last[dot + 1..].to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Classifies a file name into a [`FileCategory`].
#[must_use]
pub fn category_of(name: &str) -> FileCategory {
    let ext = extension_of(name);
    let ext = ext.as_str();
    if IMAGE_EXTS.contains(&ext) {
        FileCategory::Image
    } else if VIDEO_EXTS.contains(&ext) {
        FileCategory::Video
    } else if AUDIO_EXTS.contains(&ext) {
        FileCategory::Audio
    } else if ARCHIVE_EXTS.contains(&ext) {
        FileCategory::Archive
    } else if CODE_EXTS.contains(&ext) {
        FileCategory::Code
    } else if DOCUMENT_EXTS.contains(&ext) {
        FileCategory::Document
    } else {
        FileCategory::Other
    }
}

/// Guesses a content type from a file name.
#[must_use]
pub fn guess_content_type(name: &str) -> &'static str {
    let ext = extension_of(name);
    CONTENT_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map_or(DEFAULT_CONTENT_TYPE, |(_, ct)| ct)
}

/// A browse filter: everything, one category, or a literal extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
    All,
    Category(FileCategory),
    Extension(String),
}

impl FromStr for CategoryFilter {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        Ok(FileCategory::from_str(s).map_or_else(
            |_| Self::Extension(s.trim_start_matches('.').to_ascii_lowercase()),
            Self::Category,
        ))
    }
}

impl CategoryFilter {
    /// Returns `true` if the entry passes the filter. Folders only pass
    /// [`CategoryFilter::All`].
    #[must_use]
    pub fn matches(&self, entry: &ObjectEntry) -> bool {
        match self {
            Self::All => true,
            _ if entry.is_folder() => false,
            Self::Category(category) => category_of(&entry.name) == *category,
            Self::Extension(ext) => extension_of(&entry.name) == *ext,
        }
    }
}

/// Keeps only the entries that pass `filter`.
#[must_use]
pub fn filter_by_category(entries: Vec<ObjectEntry>, filter: &CategoryFilter) -> Vec<ObjectEntry> {
    entries.into_iter().filter(|e| filter.matches(e)).collect()
}
