//! Queue items and their state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use bucket_browser_upload_models::{ItemSnapshot, UploadStatus};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::source::ByteSource;

/// A local file offered for upload.
#[derive(Clone)]
pub struct UploadCandidate {
    /// Slash-separated path relative to the picked file or folder,
    /// including the folder name as its first segment.
    pub relative_path: String,
    pub source: Arc<dyn ByteSource>,
}

impl UploadCandidate {
    #[must_use]
    pub fn new(relative_path: impl Into<String>, source: Arc<dyn ByteSource>) -> Self {
        Self {
            relative_path: relative_path.into(),
            source,
        }
    }
}

/// Item state. Only an uploading item carries a live progress counter and
/// cancel handle.
#[derive(Debug, Clone)]
pub enum ItemState {
    Pending,
    Uploading {
        progress: Arc<AtomicU8>,
        cancel: CancellationToken,
    },
    Done,
    Error {
        message: String,
    },
    Canceled,
    Conflict,
    Skipped,
}

impl ItemState {
    #[must_use]
    pub const fn status(&self) -> UploadStatus {
        match self {
            Self::Pending => UploadStatus::Pending,
            Self::Uploading { .. } => UploadStatus::Uploading,
            Self::Done => UploadStatus::Done,
            Self::Error { .. } => UploadStatus::Error,
            Self::Canceled => UploadStatus::Canceled,
            Self::Conflict => UploadStatus::Conflict,
            Self::Skipped => UploadStatus::Skipped,
        }
    }
}

/// One unit of work in an [`UploadQueue`](crate::queue::UploadQueue).
pub struct UploadItem {
    id: Uuid,
    source: Arc<dyn ByteSource>,
    relative_path: String,
    target_key: String,
    pub(crate) state: ItemState,
    /// Percentage reached by the last attempt.
    pub(crate) last_progress: u8,
}

impl UploadItem {
    pub(crate) fn new(candidate: UploadCandidate, target_key: String, state: ItemState) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: candidate.source,
            relative_path: candidate.relative_path,
            target_key,
            state,
            last_progress: 0,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn source(&self) -> &Arc<dyn ByteSource> {
        &self.source
    }

    #[must_use]
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    #[must_use]
    pub fn target_key(&self) -> &str {
        &self.target_key
    }

    /// Changes the target key. Only conflict resolution does this, before
    /// the item becomes pending.
    pub(crate) fn retarget(&mut self, key: String) {
        self.target_key = key;
    }

    #[must_use]
    pub const fn state(&self) -> &ItemState {
        &self.state
    }

    #[must_use]
    pub const fn status(&self) -> UploadStatus {
        self.state.status()
    }

    /// Percent complete, 0 to 100.
    #[must_use]
    pub fn progress(&self) -> u8 {
        match &self.state {
            ItemState::Uploading { progress, .. } => progress.load(Ordering::Relaxed),
            ItemState::Done => 100,
            _ => self.last_progress,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            relative_path: self.relative_path.clone(),
            target_key: self.target_key.clone(),
            size: self.source.len(),
            status: self.status(),
            progress: self.progress(),
            error: match &self.state {
                ItemState::Error { message } => Some(message.clone()),
                _ => None,
            },
        }
    }
}

impl std::fmt::Debug for UploadItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadItem")
            .field("id", &self.id)
            .field("relative_path", &self.relative_path)
            .field("target_key", &self.target_key)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
