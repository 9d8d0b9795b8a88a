#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Chunked multipart uploads and the conflict-aware queue that feeds them.
//!
//! [`multipart::upload`] moves one byte source to one key: it splits the
//! source into parts, uploads them with bounded concurrency, and either
//! completes or aborts the multipart session before returning. Nothing is
//! visible at the key unless every part made it.
//!
//! [`queue::UploadQueue`] sits in front of it. Enqueued files are
//! deduplicated by relative path, checked against the bucket (one listing
//! per top-level folder, cached per connection), and split into pending
//! items and conflicts that wait for a replace, skip, or keep-both
//! decision. [`queue::UploadQueue::drain`] then uploads pending items one
//! at a time in insertion order.

pub mod cache;
pub mod item;
pub mod multipart;
pub mod progress;
pub mod queue;
pub mod session;
pub mod source;

use bucket_browser_store::StoreError;
use bucket_browser_upload_models::UploadStatus;
use uuid::Uuid;

pub use bucket_browser_upload_models as models;

/// Errors that stop an upload or queue operation before it starts.
///
/// Failures during an upload are not errors at this level: they end the
/// attempt with [`multipart::UploadOutcome::Failed`] and the session
/// aborted.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// No store connection has been established.
    #[error("Store connection is not initialized")]
    NotConnected,

    /// The target key is empty.
    #[error("Upload target key is empty")]
    EmptyKey,

    /// The part size is zero.
    #[error("Part size must be greater than zero")]
    InvalidPartSize,

    /// The source needs more parts than a multipart upload allows.
    #[error("{size} bytes at {part_size} bytes per part needs {parts} parts (max 10000)")]
    TooManyParts {
        /// Source size in bytes.
        size: u64,
        /// Configured part size.
        part_size: u64,
        /// Parts required.
        parts: u64,
    },

    /// Queue bookkeeping rejected the request.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// A store call made outside of a multipart session failed.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for UploadError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotConnected => Self::NotConnected,
            other => Self::Store(other),
        }
    }
}

/// Invalid queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// No item with this id is in the queue.
    #[error("No queued item with id {id}")]
    UnknownItem {
        /// Requested item id.
        id: Uuid,
    },

    /// The item's current state does not allow the requested action.
    #[error("Cannot {action} item {id} while it is {status}")]
    InvalidTransition {
        /// Item id.
        id: Uuid,
        /// Current status.
        status: UploadStatus,
        /// What was attempted.
        action: &'static str,
    },

    /// Another pending or uploading item already targets this key.
    #[error("Another queued item is already uploading to {key}")]
    TargetKeyBusy {
        /// Contested key.
        key: String,
    },

    /// Keep-both could not find a free name.
    #[error("No free keep-both name for {key}")]
    NoFreeName {
        /// Key that was taken.
        key: String,
    },
}
