#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Upload queue item states and the summaries reported back to callers.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

pub use bucket_browser_store_models::ConflictPolicy;

/// Lifecycle state of a queued upload.
///
/// `pending → uploading → done | error | canceled`. `conflict` resolves to
/// `pending` (replace, keep-both) or `skipped`. `error`, `canceled`, and
/// `skipped` return to `pending` only through an explicit retry.
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
#[strum(serialize_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Done,
    Error,
    Canceled,
    Conflict,
    Skipped,
}

impl UploadStatus {
    /// Whether the item holds its target key against other queue items.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Uploading)
    }
}

/// Point-in-time view of one queue item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: Uuid,
    /// Slash-separated path relative to the picked file or folder.
    pub relative_path: String,
    /// Destination key in the bucket.
    pub target_key: String,
    /// Source size in bytes.
    pub size: u64,
    pub status: UploadStatus,
    /// Percent complete, 0 to 100.
    pub progress: u8,
    /// Failure description for items in [`UploadStatus::Error`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of enqueuing a batch of local files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueSummary {
    /// Items ready for upload.
    pub queued: Vec<ItemSnapshot>,
    /// Items whose target key is already taken.
    pub conflicts: Vec<ItemSnapshot>,
    /// Candidates dropped because their relative path was already queued.
    pub duplicates: usize,
}

/// Result of draining the pending items of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainSummary {
    pub uploaded: usize,
    pub failed: usize,
    pub canceled: usize,
    /// `true` if the drain was stopped before every pending item ran.
    pub stopped: bool,
}

impl std::fmt::Display for DrainSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} uploaded, {} failed, {} canceled",
            self.uploaded, self.failed, self.canceled
        )?;
        if self.stopped {
            write!(f, " (stopped)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn statuses_use_snake_case_names() {
        assert_eq!(UploadStatus::Canceled.to_string(), "canceled");
        assert_eq!(UploadStatus::from_str("skipped").unwrap(), UploadStatus::Skipped);
        assert_eq!(
            serde_json::to_string(&UploadStatus::Uploading).unwrap(),
            "\"uploading\""
        );
    }

    #[test]
    fn only_pending_and_uploading_hold_keys() {
        assert!(UploadStatus::Pending.is_active());
        assert!(UploadStatus::Uploading.is_active());
        assert!(!UploadStatus::Conflict.is_active());
        assert!(!UploadStatus::Done.is_active());
    }

    #[test]
    fn conflict_policy_parses_cli_names() {
        assert_eq!(ConflictPolicy::from_str("keep-both").unwrap(), ConflictPolicy::KeepBoth);
        assert_eq!(ConflictPolicy::from_str("Replace").unwrap(), ConflictPolicy::Replace);
    }

    #[test]
    fn drain_summary_display() {
        let summary = DrainSummary {
            uploaded: 2,
            failed: 1,
            canceled: 0,
            stopped: true,
        };
        assert_eq!(summary.to_string(), "2 uploaded, 1 failed, 0 canceled (stopped)");
    }
}
