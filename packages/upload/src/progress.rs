//! Byte progress reporting for uploads.
//!
//! The orchestrator reports through [`ProgressCallback`] and never knows
//! how (or whether) progress is rendered. The CLI plugs in `indicatif`
//! bars; tests plug in recorders.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Receives progress for one upload.
///
/// During an upload, `set_total` is called once with the source length,
/// then `set_position` once per confirmed part with the running total of
/// confirmed bytes. In-flight bytes are never reported. The queue calls
/// `finish` once the item reaches a terminal state.
pub trait ProgressCallback: Send + Sync {
    /// Source length in bytes.
    fn set_total(&self, total: u64);

    /// Confirmed bytes so far (absolute, not delta).
    fn set_position(&self, confirmed: u64);

    /// The item settled; `outcome` is a short human-readable line.
    fn finish(&self, outcome: String);
}

/// Ignores all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _confirmed: u64) {}
    fn finish(&self, _outcome: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// Tracks an item's integer percentage while forwarding every update.
///
/// The percentage only ever moves forward, even if positions arrive out of
/// order.
pub struct PercentProgress {
    percent: Arc<AtomicU8>,
    total: AtomicU64,
    inner: Arc<dyn ProgressCallback>,
}

impl PercentProgress {
    #[must_use]
    pub fn new(percent: Arc<AtomicU8>, inner: Arc<dyn ProgressCallback>) -> Self {
        Self {
            percent,
            total: AtomicU64::new(0),
            inner,
        }
    }

    fn record(&self, pos: u64) {
        let total = self.total.load(Ordering::Relaxed);
        let pct = if total == 0 {
            100
        } else {
            u8::try_from(pos.min(total).saturating_mul(100) / total).unwrap_or(100)
        };
        self.percent.fetch_max(pct, Ordering::Relaxed);
    }
}

impl ProgressCallback for PercentProgress {
    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.inner.set_total(total);
    }

    fn set_position(&self, confirmed: u64) {
        self.record(confirmed);
        self.inner.set_position(confirmed);
    }

    fn finish(&self, outcome: String) {
        self.inner.finish(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_never_moves_backwards() {
        let percent = Arc::new(AtomicU8::new(0));
        let progress = PercentProgress::new(percent.clone(), null_progress());
        progress.set_total(200);

        progress.set_position(100);
        assert_eq!(percent.load(Ordering::Relaxed), 50);

        progress.set_position(20);
        assert_eq!(percent.load(Ordering::Relaxed), 50);

        progress.set_position(200);
        assert_eq!(percent.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn empty_sources_report_complete() {
        let percent = Arc::new(AtomicU8::new(0));
        let progress = PercentProgress::new(percent.clone(), null_progress());
        progress.set_total(0);
        progress.set_position(0);
        assert_eq!(percent.load(Ordering::Relaxed), 100);
    }
}
