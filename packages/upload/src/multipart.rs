//! The chunked upload orchestrator.
//!
//! ```text
//! create session ─► workers claim parts from a shared cursor ─► all ok? ─► complete
//!                          │                                       │
//!                          └── part failed / canceled ──► stop ────┴──► abort
//! ```
//!
//! Workers are futures polled together on the caller's task, so they
//! interleave at store calls rather than running in parallel. A failed
//! part stops further claims; parts already in flight finish (their
//! results are discarded) before the session is aborted.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bucket_browser_store::{ConnectionSlot, ObjectStore, StoreError};
use bucket_browser_store_models::keys::basename;
use bucket_browser_store_models::mime::guess_content_type;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::UploadError;
use crate::progress::{ProgressCallback, null_progress};
use crate::session::{Incomplete, MultipartSession};
use crate::source::ByteSource;

/// Default part size (5 MiB, the S3 minimum for non-final parts).
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Default number of concurrent part uploads.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound on concurrent part uploads.
pub const MAX_CONCURRENCY: usize = 8;

/// Maximum parts in one multipart upload.
pub const MAX_PARTS: u64 = 10_000;

/// Tuning, cancellation, and progress for one upload.
#[derive(Clone)]
pub struct UploadOptions {
    /// Bytes per part. The last part may be smaller.
    pub part_size: u64,
    /// Requested concurrent part uploads, clamped to `1..=8`.
    pub concurrency: usize,
    /// Cancels the upload at the next suspension point. Part uploads
    /// already sent are allowed to finish.
    pub cancel: CancellationToken,
    /// Receives the source length and the running confirmed byte count.
    pub progress: Arc<dyn ProgressCallback>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            cancel: CancellationToken::new(),
            progress: null_progress(),
        }
    }
}

impl UploadOptions {
    #[must_use]
    pub const fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Concurrency actually used.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

/// Why an upload attempt did not produce an object.
#[derive(Debug, thiserror::Error)]
pub enum FailureReason {
    /// The cancel token fired before completion.
    #[error("upload canceled")]
    Canceled,

    /// Reading the local source failed.
    #[error("failed to read source: {0}")]
    Read(#[source] std::io::Error),

    /// A store call failed.
    #[error(transparent)]
    Store(StoreError),
}

/// Result of one upload attempt.
#[derive(Debug)]
pub enum UploadOutcome {
    /// The object now exists at the target key.
    Completed {
        /// Parts sent (0 for an empty source written with a single put).
        parts: usize,
        /// Bytes written.
        bytes: u64,
    },
    /// No object was created.
    Failed {
        reason: FailureReason,
        /// Upload id of a session whose abort also failed. Its staged
        /// parts stay on the store until cleaned up out of band.
        orphaned_upload_id: Option<String>,
    },
}

impl UploadOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                reason: FailureReason::Canceled,
                ..
            }
        )
    }
}

/// Uploads `source` to `key` on the store connected in `slot`.
///
/// # Errors
///
/// Returns [`UploadError::NotConnected`] if `slot` is empty, and the
/// configuration errors of [`upload_to`]. Store and cancellation failures
/// are reported through [`UploadOutcome::Failed`].
pub async fn upload(
    slot: &ConnectionSlot,
    source: &dyn ByteSource,
    key: &str,
    options: &UploadOptions,
) -> Result<UploadOutcome, UploadError> {
    let store = slot.require()?;
    upload_to(store.as_ref(), source, key, options).await
}

/// Uploads `source` to `key` on `store`.
///
/// Empty sources are written with a single `PutObject` and never open a
/// multipart session. Everything else goes through one session that is
/// completed or aborted before this returns.
///
/// The returned future must be driven to completion. To stop an upload,
/// cancel [`UploadOptions::cancel`] and await the outcome; dropping the
/// future instead leaves the multipart session open on the store with no
/// way to learn its upload id.
///
/// # Errors
///
/// Returns [`UploadError::EmptyKey`], [`UploadError::InvalidPartSize`], or
/// [`UploadError::TooManyParts`] before any store call is made.
pub async fn upload_to(
    store: &dyn ObjectStore,
    source: &dyn ByteSource,
    key: &str,
    options: &UploadOptions,
) -> Result<UploadOutcome, UploadError> {
    if key.is_empty() {
        return Err(UploadError::EmptyKey);
    }
    if options.part_size == 0 {
        return Err(UploadError::InvalidPartSize);
    }

    let total = source.len();
    let part_count = total.div_ceil(options.part_size);
    if part_count > MAX_PARTS {
        return Err(UploadError::TooManyParts {
            size: total,
            part_size: options.part_size,
            parts: part_count,
        });
    }

    let content_type = guess_content_type(basename(key));
    options.progress.set_total(total);

    if options.cancel.is_cancelled() {
        return Ok(failed(FailureReason::Canceled, None));
    }

    if total == 0 {
        log::info!("Uploading {} -> {key} (empty, single put)", source.name());
        return Ok(match store.put_object(key, Vec::new(), content_type).await {
            Ok(()) => {
                options.progress.set_position(0);
                UploadOutcome::Completed { parts: 0, bytes: 0 }
            }
            Err(e) => failed(FailureReason::Store(e), None),
        });
    }

    #[allow(clippy::cast_precision_loss)] // display-only MB value
    let mb = total as f64 / 1_048_576.0;
    log::info!(
        "Uploading {} -> {key} ({mb:.1} MB, {part_count} part(s))",
        source.name()
    );

    let session = match MultipartSession::open(store, key, content_type).await {
        Ok(session) => session,
        Err(e) => return Ok(failed(FailureReason::Store(e), None)),
    };

    // `part_count <= MAX_PARTS`, so it fits.
    let part_count = u32::try_from(part_count).unwrap_or(u32::MAX);
    let stop = options.cancel.child_token();
    let run = PartRun {
        session: &session,
        source,
        total,
        part_size: options.part_size,
        part_count,
        cursor: AtomicU32::new(0),
        confirmed: AtomicU64::new(0),
        failure: Mutex::new(None),
        stop: &stop,
        progress: options.progress.as_ref(),
    };

    let workers = options.effective_concurrency().min(part_count as usize);
    join_all((0..workers).map(|_| run.worker())).await;

    let failure = run
        .failure
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .or_else(|| options.cancel.is_cancelled().then_some(FailureReason::Canceled));

    match failure {
        None => match session.complete().await {
            Ok(parts) => {
                log::info!("  uploaded {key}");
                Ok(UploadOutcome::Completed {
                    parts,
                    bytes: total,
                })
            }
            Err(Incomplete { session, error }) => {
                Ok(abort(session, FailureReason::Store(error)).await)
            }
        },
        Some(reason) => Ok(abort(session, reason).await),
    }
}

const fn failed(reason: FailureReason, orphaned_upload_id: Option<String>) -> UploadOutcome {
    UploadOutcome::Failed {
        reason,
        orphaned_upload_id,
    }
}

/// Aborts the session after a failure. An abort error does not replace
/// the original reason; it only marks the upload id as orphaned.
async fn abort(session: MultipartSession<'_>, reason: FailureReason) -> UploadOutcome {
    let key = session.key().to_string();
    let upload_id = session.upload_id().to_string();
    log::info!("  aborting upload of {key}: {reason}");

    match session.abort().await {
        Ok(()) => failed(reason, None),
        Err(e) => {
            log::warn!(
                "Could not abort multipart upload {upload_id} for {key}, \
                 staged parts remain until cleaned up: {e}"
            );
            failed(reason, Some(upload_id))
        }
    }
}

/// Shared state for the workers of one upload.
struct PartRun<'a> {
    session: &'a MultipartSession<'a>,
    source: &'a dyn ByteSource,
    total: u64,
    part_size: u64,
    part_count: u32,
    /// Last part number handed out.
    cursor: AtomicU32,
    /// Sum of confirmed part sizes.
    confirmed: AtomicU64,
    failure: Mutex<Option<FailureReason>>,
    stop: &'a CancellationToken,
    progress: &'a dyn ProgressCallback,
}

impl PartRun<'_> {
    async fn worker(&self) {
        loop {
            if self.stop.is_cancelled() {
                return;
            }
            let part_number = self.cursor.fetch_add(1, Ordering::Relaxed) + 1;
            if part_number > self.part_count {
                return;
            }

            let offset = u64::from(part_number - 1) * self.part_size;
            let len = self.part_size.min(self.total - offset);
            // Bounded by `part_size`, which fits in memory by construction.
            let len_usize = usize::try_from(len).unwrap_or(usize::MAX);

            let body = match self.source.read_range(offset, len_usize).await {
                Ok(body) => body,
                Err(e) => {
                    self.fail(FailureReason::Read(e));
                    return;
                }
            };
            if self.stop.is_cancelled() {
                return;
            }

            if let Err(e) = self.session.upload_part(part_number, body).await {
                self.fail(FailureReason::Store(e));
                return;
            }

            let confirmed = self.confirmed.fetch_add(len, Ordering::Relaxed) + len;
            log::debug!("  part {part_number}/{} confirmed", self.part_count);
            self.progress.set_position(confirmed);
        }
    }

    /// Records the first failure and stops further claims.
    fn fail(&self, reason: FailureReason) {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if failure.is_none() {
            *failure = Some(reason);
        }
        self.stop.cancel();
    }
}
