//! The conflict-aware upload queue.
//!
//! Enqueue runs the conflict checks, resolution methods move conflicts to
//! pending or skipped, and [`UploadQueue::drain`] uploads pending items in
//! insertion order. A [`QueueController`] cloned out of the queue can
//! cancel the running item or stop the drain from another task.
//!
//! No two pending or uploading items ever share a target key. A candidate
//! whose key is already held by another active item is a conflict, the
//! same as one whose key exists in the bucket.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::AtomicU8;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bucket_browser_store::ConnectionSlot;
use bucket_browser_store::exists::{find_free_key, probe_exists};
use bucket_browser_store_models::ConflictPolicy;
use bucket_browser_store_models::keys::{join_key, normalize_prefix, top_level_segment};
use bucket_browser_upload_models::{DrainSummary, EnqueueSummary, ItemSnapshot, UploadStatus};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::{ListingCache, ListingScope};
use crate::item::{ItemState, UploadCandidate, UploadItem};
use crate::multipart::{FailureReason, UploadOptions, UploadOutcome, upload_to};
use crate::progress::{PercentProgress, ProgressCallback};
use crate::{QueueError, UploadError};

#[derive(Default)]
struct Control {
    stop: CancellationToken,
    running: HashMap<Uuid, CancellationToken>,
}

/// Cancels items and stops drains from outside the queue.
#[derive(Clone, Default)]
pub struct QueueController {
    inner: Arc<Mutex<Control>>,
}

impl QueueController {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancels the item if it is uploading. Returns `false` otherwise.
    pub fn cancel(&self, id: Uuid) -> bool {
        self.lock().running.get(&id).is_some_and(|token| {
            token.cancel();
            true
        })
    }

    /// Cancels the running item and stops the current drain before the
    /// next item starts. A stop issued while no drain is running stops
    /// the next drain before its first item.
    pub fn stop(&self) {
        self.lock().stop.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.lock().stop.is_cancelled()
    }

    fn begin(&self, id: Uuid) -> CancellationToken {
        let mut control = self.lock();
        let token = control.stop.child_token();
        control.running.insert(id, token.clone());
        token
    }

    fn end(&self, id: Uuid) {
        self.lock().running.remove(&id);
    }

    fn reset(&self) {
        self.lock().stop = CancellationToken::new();
    }
}

/// Upload items, their listing cache, and the controller shared with
/// other tasks.
#[derive(Default)]
pub struct UploadQueue {
    items: Vec<UploadItem>,
    cache: ListingCache,
    controller: QueueController,
}

impl UploadQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn controller(&self) -> QueueController {
        self.controller.clone()
    }

    #[must_use]
    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&UploadItem> {
        self.items.iter().find(|i| i.id() == id)
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<ItemSnapshot> {
        self.items.iter().map(UploadItem::snapshot).collect()
    }

    /// Ids of items waiting for a conflict decision, in insertion order.
    #[must_use]
    pub fn conflicts(&self) -> Vec<Uuid> {
        self.ids_with(UploadStatus::Conflict)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.ids_with(UploadStatus::Pending).len()
    }

    #[must_use]
    pub const fn cache(&self) -> &ListingCache {
        &self.cache
    }

    fn ids_with(&self, status: UploadStatus) -> Vec<Uuid> {
        self.items
            .iter()
            .filter(|i| i.status() == status)
            .map(UploadItem::id)
            .collect()
    }

    fn index_of(&self, id: Uuid) -> Result<usize, QueueError> {
        self.items
            .iter()
            .position(|i| i.id() == id)
            .ok_or(QueueError::UnknownItem { id })
    }

    fn active_keys_except(&self, id: Uuid) -> HashSet<String> {
        self.items
            .iter()
            .filter(|i| i.id() != id && i.status().is_active())
            .map(|i| i.target_key().to_string())
            .collect()
    }

    fn ensure_key_free(&self, idx: usize) -> Result<(), QueueError> {
        let item = &self.items[idx];
        if self.active_keys_except(item.id()).contains(item.target_key()) {
            return Err(QueueError::TargetKeyBusy {
                key: item.target_key().to_string(),
            });
        }
        Ok(())
    }

    fn expect_status(
        &self,
        idx: usize,
        allowed: &[UploadStatus],
        action: &'static str,
    ) -> Result<(), QueueError> {
        let item = &self.items[idx];
        if allowed.contains(&item.status()) {
            Ok(())
        } else {
            Err(QueueError::InvalidTransition {
                id: item.id(),
                status: item.status(),
                action,
            })
        }
    }

    /// Adds local files destined for `destination_dir`.
    ///
    /// Candidates whose relative path is already queued (or repeated in the
    /// batch) are dropped and counted as duplicates. The rest are checked
    /// against the bucket with one listing per top-level folder (files at
    /// the top level share one `/`-delimited listing of the directory).
    /// When a listing fails, each item in that group is probed on its own,
    /// and a probe that cannot answer counts as a conflict.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::NotConnected`] if `slot` is empty.
    pub async fn enqueue(
        &mut self,
        slot: &ConnectionSlot,
        candidates: Vec<UploadCandidate>,
        destination_dir: &str,
    ) -> Result<EnqueueSummary, UploadError> {
        let store = slot.require()?;
        self.cache.sync_epoch(slot.epoch());
        let dir = normalize_prefix(destination_dir);

        let mut seen: HashSet<String> = self
            .items
            .iter()
            .map(|i| i.relative_path().to_string())
            .collect();
        let mut duplicates = 0;
        let mut fresh = Vec::new();
        for mut candidate in candidates {
            candidate.relative_path = candidate.relative_path.trim_start_matches('/').to_string();
            if candidate.relative_path.is_empty() {
                log::warn!("Ignoring candidate with an empty path");
                continue;
            }
            if seen.insert(candidate.relative_path.clone()) {
                fresh.push(candidate);
            } else {
                log::debug!("Dropping duplicate {}", candidate.relative_path);
                duplicates += 1;
            }
        }

        let keys: Vec<String> = fresh
            .iter()
            .map(|c| join_key(&dir, &c.relative_path))
            .collect();

        let mut groups: BTreeMap<Option<&str>, Vec<usize>> = BTreeMap::new();
        for (idx, candidate) in fresh.iter().enumerate() {
            groups
                .entry(top_level_segment(&candidate.relative_path))
                .or_default()
                .push(idx);
        }

        let mut exists = vec![false; fresh.len()];
        for (top, members) in &groups {
            let (prefix, scope) = match top {
                Some(top) => (format!("{dir}{top}/"), ListingScope::Recursive),
                None => (dir.clone(), ListingScope::Shallow),
            };

            match self.cache.keys(store.as_ref(), &prefix, scope).await {
                Ok(listed) => {
                    for &idx in members {
                        exists[idx] = listed.contains(&keys[idx]);
                    }
                }
                Err(e) => {
                    log::warn!(
                        "Listing {prefix:?} failed, checking {} item(s) one by one: {e}",
                        members.len()
                    );
                    for &idx in members {
                        exists[idx] = probe_exists(store.as_ref(), &keys[idx]).await;
                    }
                }
            }
        }
        drop(groups);

        let mut summary = EnqueueSummary {
            duplicates,
            ..EnqueueSummary::default()
        };
        for ((candidate, key), exists) in fresh.into_iter().zip(keys).zip(exists) {
            let held = self
                .items
                .iter()
                .any(|i| i.status().is_active() && i.target_key() == key);
            let state = if exists || held {
                ItemState::Conflict
            } else {
                ItemState::Pending
            };

            let item = UploadItem::new(candidate, key, state);
            if item.status() == UploadStatus::Conflict {
                summary.conflicts.push(item.snapshot());
            } else {
                summary.queued.push(item.snapshot());
            }
            self.items.push(item);
        }

        log::info!(
            "Queued {} item(s) for {dir:?}: {} conflict(s), {duplicates} duplicate(s) dropped",
            summary.queued.len(),
            summary.conflicts.len()
        );
        Ok(summary)
    }

    /// Applies a conflict decision to one item and returns its new status.
    ///
    /// Keep-both probes the bucket again at this point, so names taken
    /// since the item was enqueued are avoided, as are keys held by other
    /// active items.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] unless the item is in
    /// conflict, [`QueueError::TargetKeyBusy`] when replacing a key another
    /// active item holds, and [`UploadError::NotConnected`] for keep-both
    /// without a connection.
    pub async fn resolve(
        &mut self,
        slot: &ConnectionSlot,
        id: Uuid,
        policy: ConflictPolicy,
    ) -> Result<UploadStatus, UploadError> {
        let idx = self.index_of(id)?;
        self.expect_status(idx, &[UploadStatus::Conflict], "resolve")?;

        match policy {
            ConflictPolicy::Skip => {
                self.items[idx].state = ItemState::Skipped;
            }
            ConflictPolicy::Replace => {
                self.ensure_key_free(idx)?;
                self.items[idx].state = ItemState::Pending;
            }
            ConflictPolicy::KeepBoth => {
                let store = slot.require()?;
                let held = self.active_keys_except(id);
                let taken = self.items[idx].target_key().to_string();
                let key = find_free_key(store.as_ref(), &taken, |k| held.contains(k))
                    .await
                    .map_err(|_| QueueError::NoFreeName { key: taken.clone() })?;

                log::info!("Keeping both: {taken} -> {key}");
                let item = &mut self.items[idx];
                item.retarget(key);
                item.state = ItemState::Pending;
            }
        }

        Ok(self.items[idx].status())
    }

    /// Applies one decision to every item in conflict, in insertion order.
    /// Returns how many were resolved.
    ///
    /// # Errors
    ///
    /// Stops at the first failing item and returns its error; items
    /// resolved before it keep their new state.
    pub async fn resolve_all(
        &mut self,
        slot: &ConnectionSlot,
        policy: ConflictPolicy,
    ) -> Result<usize, UploadError> {
        let ids = self.conflicts();
        for id in &ids {
            self.resolve(slot, *id, policy).await?;
        }
        Ok(ids.len())
    }

    /// Resets a failed or canceled item to pending. The next attempt opens
    /// a new multipart session.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] for other states and
    /// [`QueueError::TargetKeyBusy`] if another active item took the key.
    pub fn retry(&mut self, id: Uuid) -> Result<(), QueueError> {
        let idx = self.index_of(id)?;
        self.expect_status(idx, &[UploadStatus::Error, UploadStatus::Canceled], "retry")?;
        self.ensure_key_free(idx)?;

        let item = &mut self.items[idx];
        item.state = ItemState::Pending;
        item.last_progress = 0;
        Ok(())
    }

    /// Moves a skipped item back to pending, overwriting the existing
    /// object when it runs.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] unless the item was
    /// skipped and [`QueueError::TargetKeyBusy`] if another active item
    /// holds the key.
    pub fn upload_anyway(&mut self, id: Uuid) -> Result<(), QueueError> {
        let idx = self.index_of(id)?;
        self.expect_status(idx, &[UploadStatus::Skipped], "upload anyway")?;
        self.ensure_key_free(idx)?;
        self.items[idx].state = ItemState::Pending;
        Ok(())
    }

    /// Removes an item that is not uploading.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownItem`] or, for an uploading item,
    /// [`QueueError::InvalidTransition`].
    pub fn remove(&mut self, id: Uuid) -> Result<ItemSnapshot, QueueError> {
        let idx = self.index_of(id)?;
        if self.items[idx].status() == UploadStatus::Uploading {
            return Err(QueueError::InvalidTransition {
                id,
                status: UploadStatus::Uploading,
                action: "remove",
            });
        }
        Ok(self.items.remove(idx).snapshot())
    }

    /// Removes every finished item. Returns how many were removed.
    pub fn clear_done(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|i| i.status() != UploadStatus::Done);
        before - self.items.len()
    }

    /// Uploads pending items one at a time in insertion order.
    ///
    /// `progress_for` supplies the progress sink for each item as it
    /// starts. Each item ends as done, error, or canceled; a
    /// [`QueueController::stop`] cancels the running item and leaves the
    /// rest pending, and [`DrainSummary::stopped`] reports whether any
    /// pending item was left behind by it.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::NotConnected`] if `slot` is empty.
    pub async fn drain<F>(
        &mut self,
        slot: &ConnectionSlot,
        options: &UploadOptions,
        mut progress_for: F,
    ) -> Result<DrainSummary, UploadError>
    where
        F: FnMut(&UploadItem) -> Arc<dyn ProgressCallback>,
    {
        let store = slot.require()?;
        self.cache.sync_epoch(slot.epoch());
        let mut summary = DrainSummary::default();

        while let Some(idx) = self
            .items
            .iter()
            .position(|i| i.status() == UploadStatus::Pending)
        {
            if self.controller.is_stopped() {
                break;
            }

            let id = self.items[idx].id();
            let key = self.items[idx].target_key().to_string();
            let source = Arc::clone(self.items[idx].source());
            let cancel = self.controller.begin(id);
            let percent = Arc::new(AtomicU8::new(0));
            let progress = Arc::new(PercentProgress::new(
                Arc::clone(&percent),
                progress_for(&self.items[idx]),
            ));
            self.items[idx].state = ItemState::Uploading {
                progress: percent,
                cancel: cancel.clone(),
            };

            let item_options = UploadOptions {
                cancel,
                progress: progress.clone(),
                ..options.clone()
            };
            let result = upload_to(store.as_ref(), source.as_ref(), &key, &item_options).await;
            self.controller.end(id);

            let item = &mut self.items[idx];
            item.last_progress = item.progress();
            item.state = match result {
                Ok(UploadOutcome::Completed { .. }) => {
                    summary.uploaded += 1;
                    self.cache.note_key(&key);
                    progress.finish(format!("{key} uploaded"));
                    ItemState::Done
                }
                Ok(UploadOutcome::Failed {
                    reason: FailureReason::Canceled,
                    ..
                }) => {
                    summary.canceled += 1;
                    progress.finish(format!("{key} canceled"));
                    ItemState::Canceled
                }
                Ok(UploadOutcome::Failed {
                    reason,
                    orphaned_upload_id,
                }) => {
                    summary.failed += 1;
                    let message = match orphaned_upload_id {
                        Some(upload_id) => {
                            format!("{reason} (multipart upload {upload_id} left open)")
                        }
                        None => reason.to_string(),
                    };
                    log::error!("Upload of {key} failed: {message}");
                    progress.finish(format!("{key} failed"));
                    ItemState::Error { message }
                }
                Err(e) => {
                    summary.failed += 1;
                    log::error!("Upload of {key} rejected: {e}");
                    progress.finish(format!("{key} failed"));
                    ItemState::Error {
                        message: e.to_string(),
                    }
                }
            };
        }

        // Stopped only if the stop left pending work behind. The token is
        // consumed here so the next drain starts fresh.
        summary.stopped = self.controller.is_stopped() && self.pending_count() > 0;
        self.controller.reset();
        log::info!("Drain finished: {summary}");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use bucket_browser_store::memory::{MemoryStore, StoreCall};

    use super::*;
    use crate::progress::null_progress;
    use crate::source::MemorySource;

    fn candidate(path: &str, body: &str) -> UploadCandidate {
        UploadCandidate::new(
            path,
            Arc::new(MemorySource::new(path, body.as_bytes().to_vec())),
        )
    }

    fn connected() -> (Arc<MemoryStore>, ConnectionSlot) {
        let store = Arc::new(MemoryStore::new("b"));
        let slot = ConnectionSlot::connected(store.clone());
        (store, slot)
    }

    fn list_calls(store: &MemoryStore) -> Vec<String> {
        store
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::List { prefix, .. } => Some(prefix),
                _ => None,
            })
            .collect()
    }

    fn small_parts() -> UploadOptions {
        UploadOptions::default().with_part_size(4).with_concurrency(2)
    }

    async fn drain_quietly(queue: &mut UploadQueue, slot: &ConnectionSlot) -> DrainSummary {
        queue.drain(slot, &small_parts(), |_| null_progress()).await.unwrap()
    }

    #[tokio::test]
    async fn existing_keys_become_conflicts() {
        let (store, slot) = connected();
        store.insert("up/a.txt", "old");

        let mut queue = UploadQueue::new();
        let summary = queue
            .enqueue(&slot, vec![candidate("a.txt", "new"), candidate("b.txt", "b")], "/up")
            .await
            .unwrap();

        assert_eq!(summary.conflicts.len(), 1);
        assert_eq!(summary.conflicts[0].target_key, "up/a.txt");
        assert_eq!(summary.conflicts[0].status, UploadStatus::Conflict);
        assert_eq!(summary.queued.len(), 1);
        assert_eq!(summary.queued[0].target_key, "up/b.txt");
        assert_eq!(queue.pending_count(), 1);
    }

    #[tokio::test]
    async fn nested_paths_share_one_listing_per_top_folder() {
        let (store, slot) = connected();
        store.insert("up/pics/x.png", "x");

        let mut queue = UploadQueue::new();
        let summary = queue
            .enqueue(
                &slot,
                vec![
                    candidate("pics/x.png", "x"),
                    candidate("pics/y.png", "y"),
                    candidate("pics/deep/z.png", "z"),
                    candidate("notes.txt", "n"),
                ],
                "up",
            )
            .await
            .unwrap();

        assert_eq!(summary.conflicts.len(), 1);
        assert_eq!(summary.queued.len(), 3);
        let mut lists = list_calls(&store);
        lists.sort();
        assert_eq!(lists, ["up/", "up/pics/"]);
    }

    #[tokio::test]
    async fn duplicate_paths_are_dropped() {
        let (_store, slot) = connected();
        let mut queue = UploadQueue::new();

        let first = queue
            .enqueue(&slot, vec![candidate("a.txt", "1"), candidate("a.txt", "2")], "")
            .await
            .unwrap();
        assert_eq!(first.queued.len(), 1);
        assert_eq!(first.duplicates, 1);

        let second = queue
            .enqueue(&slot, vec![candidate("/a.txt", "3")], "elsewhere")
            .await
            .unwrap();
        assert!(second.queued.is_empty());
        assert_eq!(second.duplicates, 1);
        assert_eq!(queue.items().len(), 1);
    }

    #[tokio::test]
    async fn listing_failure_falls_back_to_head() {
        let (store, slot) = connected();
        store.insert("up/a.txt", "old");
        store.fail_listing(true);

        let mut queue = UploadQueue::new();
        let summary = queue
            .enqueue(&slot, vec![candidate("a.txt", "1"), candidate("b.txt", "2")], "up")
            .await
            .unwrap();

        assert_eq!(summary.conflicts.len(), 1);
        assert_eq!(summary.conflicts[0].target_key, "up/a.txt");
        assert_eq!(summary.queued.len(), 1);
        let heads = store
            .calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Head { .. }))
            .count();
        assert_eq!(heads, 2);
        assert!(queue.cache().is_empty());
    }

    #[tokio::test]
    async fn ambiguous_existence_is_a_conflict() {
        let (store, slot) = connected();
        store.fail_listing(true);
        store.fail_head(true);

        let mut queue = UploadQueue::new();
        let summary = queue
            .enqueue(&slot, vec![candidate("a.txt", "1"), candidate("d/b.txt", "2")], "up")
            .await
            .unwrap();
        assert_eq!(summary.conflicts.len(), 2);
        assert!(summary.queued.is_empty());
    }

    #[tokio::test]
    async fn keep_both_picks_next_free_suffix() {
        let (store, slot) = connected();
        store.insert("up/a.txt", "old");
        store.insert("up/a (1).txt", "older");

        let mut queue = UploadQueue::new();
        queue.enqueue(&slot, vec![candidate("a.txt", "new")], "up").await.unwrap();
        let id = queue.conflicts()[0];

        let status = queue.resolve(&slot, id, ConflictPolicy::KeepBoth).await.unwrap();
        assert_eq!(status, UploadStatus::Pending);
        assert_eq!(queue.get(id).unwrap().target_key(), "up/a (2).txt");

        let summary = drain_quietly(&mut queue, &slot).await;
        assert_eq!(summary.uploaded, 1);
        assert_eq!(store.object("up/a (2).txt").unwrap(), b"new");
        assert_eq!(store.object("up/a.txt").unwrap(), b"old");
    }

    #[tokio::test]
    async fn keep_both_reprobes_at_resolution_time() {
        let (store, slot) = connected();
        store.insert("up/a.txt", "old");

        let mut queue = UploadQueue::new();
        queue.enqueue(&slot, vec![candidate("a.txt", "new")], "up").await.unwrap();
        store.insert("up/a (1).txt", "raced");

        let id = queue.conflicts()[0];
        queue.resolve(&slot, id, ConflictPolicy::KeepBoth).await.unwrap();
        assert_eq!(queue.get(id).unwrap().target_key(), "up/a (2).txt");
    }

    #[tokio::test]
    async fn keep_both_avoids_keys_held_by_queued_items() {
        let (store, slot) = connected();
        store.insert("up/a.txt", "old");

        let mut queue = UploadQueue::new();
        queue
            .enqueue(&slot, vec![candidate("a.txt", "new"), candidate("a (1).txt", "other")], "up")
            .await
            .unwrap();

        let id = queue.conflicts()[0];
        queue.resolve(&slot, id, ConflictPolicy::KeepBoth).await.unwrap();
        assert_eq!(queue.get(id).unwrap().target_key(), "up/a (2).txt");
    }

    #[tokio::test]
    async fn replace_and_skip() {
        let (store, slot) = connected();
        store.insert("up/a.txt", "old");
        store.insert("up/b.txt", "old");

        let mut queue = UploadQueue::new();
        queue
            .enqueue(&slot, vec![candidate("a.txt", "new"), candidate("b.txt", "new")], "up")
            .await
            .unwrap();
        let ids = queue.conflicts();

        queue.resolve(&slot, ids[0], ConflictPolicy::Replace).await.unwrap();
        queue.resolve(&slot, ids[1], ConflictPolicy::Skip).await.unwrap();
        assert_eq!(queue.get(ids[0]).unwrap().target_key(), "up/a.txt");
        assert_eq!(queue.get(ids[1]).unwrap().status(), UploadStatus::Skipped);

        let summary = drain_quietly(&mut queue, &slot).await;
        assert_eq!(summary.uploaded, 1);
        assert_eq!(store.object("up/a.txt").unwrap(), b"new");
        assert_eq!(store.object("up/b.txt").unwrap(), b"old");

        queue.upload_anyway(ids[1]).unwrap();
        drain_quietly(&mut queue, &slot).await;
        assert_eq!(store.object("up/b.txt").unwrap(), b"new");
    }

    #[tokio::test]
    async fn two_items_never_hold_one_key() {
        let (_store, slot) = connected();
        let mut queue = UploadQueue::new();

        queue.enqueue(&slot, vec![candidate("x/a.txt", "1")], "up").await.unwrap();
        let summary = queue
            .enqueue(&slot, vec![candidate("a.txt", "2")], "up/x")
            .await
            .unwrap();
        assert_eq!(summary.conflicts.len(), 1);

        let id = summary.conflicts[0].id;
        let err = queue.resolve(&slot, id, ConflictPolicy::Replace).await.unwrap_err();
        assert!(matches!(err, UploadError::Queue(QueueError::TargetKeyBusy { .. })));

        queue.resolve(&slot, id, ConflictPolicy::Skip).await.unwrap();
        assert!(matches!(
            queue.upload_anyway(id),
            Err(QueueError::TargetKeyBusy { .. })
        ));
    }

    #[tokio::test]
    async fn drains_in_insertion_order() {
        let (store, slot) = connected();
        let mut queue = UploadQueue::new();
        queue
            .enqueue(
                &slot,
                vec![
                    candidate("c.txt", "ccccccccc"),
                    candidate("a.txt", "aaaa"),
                    candidate("b.txt", ""),
                ],
                "up",
            )
            .await
            .unwrap();

        let summary = drain_quietly(&mut queue, &slot).await;
        assert_eq!(summary.uploaded, 3);
        assert!(!summary.stopped);

        let order: Vec<_> = store
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::CreateMultipart { key } | StoreCall::Put { key, .. } => Some(key),
                _ => None,
            })
            .collect();
        assert_eq!(order, ["up/c.txt", "up/a.txt", "up/b.txt"]);

        for item in queue.snapshot() {
            assert_eq!(item.status, UploadStatus::Done);
            assert_eq!(item.progress, 100);
        }
        assert_eq!(store.open_uploads(), 0);
    }

    #[tokio::test]
    async fn failed_items_can_be_retried() {
        let (store, slot) = connected();
        store.fail_part(Some(2));

        let mut queue = UploadQueue::new();
        queue
            .enqueue(&slot, vec![candidate("a.txt", "0123456789")], "up")
            .await
            .unwrap();
        let id = queue.items()[0].id();

        let summary = drain_quietly(&mut queue, &slot).await;
        assert_eq!(summary.failed, 1);
        let snapshot = queue.get(id).unwrap().snapshot();
        assert_eq!(snapshot.status, UploadStatus::Error);
        assert!(snapshot.error.is_some());
        assert!(!store.contains("up/a.txt"));
        assert_eq!(store.open_uploads(), 0);

        assert!(queue.upload_anyway(id).is_err());
        store.fail_part(None);
        queue.retry(id).unwrap();
        assert_eq!(queue.get(id).unwrap().progress(), 0);

        let summary = drain_quietly(&mut queue, &slot).await;
        assert_eq!(summary.uploaded, 1);
        assert_eq!(store.object("up/a.txt").unwrap(), b"0123456789");
    }

    /// Stops the queue once the first part of any item is confirmed.
    struct StopOnFirstPart(QueueController);

    impl ProgressCallback for StopOnFirstPart {
        fn set_total(&self, _total: u64) {}
        fn set_position(&self, _pos: u64) {
            self.0.stop();
        }
        fn finish(&self, _outcome: String) {}
    }

    #[tokio::test]
    async fn stop_cancels_running_item_and_keeps_rest_pending() {
        let (store, slot) = connected();
        let mut queue = UploadQueue::new();
        queue
            .enqueue(
                &slot,
                vec![candidate("a.txt", "0123456789abcdef"), candidate("b.txt", "bb")],
                "up",
            )
            .await
            .unwrap();

        let controller = queue.controller();
        let options = UploadOptions::default().with_part_size(4).with_concurrency(1);
        let summary = queue
            .drain(&slot, &options, |_| -> Arc<dyn ProgressCallback> {
                Arc::new(StopOnFirstPart(controller.clone()))
            })
            .await
            .unwrap();

        assert_eq!(summary.canceled, 1);
        assert!(summary.stopped);
        let statuses: Vec<_> = queue.items().iter().map(UploadItem::status).collect();
        assert_eq!(statuses, [UploadStatus::Canceled, UploadStatus::Pending]);
        assert!(!store.contains("up/a.txt"));
        assert_eq!(store.open_uploads(), 0);
        assert!(queue.items()[0].progress() > 0);

        let summary = drain_quietly(&mut queue, &slot).await;
        assert_eq!(summary.uploaded, 1);
        assert!(store.contains("up/b.txt"));

        let id = queue.items()[0].id();
        queue.retry(id).unwrap();
        drain_quietly(&mut queue, &slot).await;
        assert!(store.contains("up/a.txt"));
    }

    #[tokio::test]
    async fn stop_before_drain_uploads_nothing() {
        let (store, slot) = connected();
        let mut queue = UploadQueue::new();
        queue
            .enqueue(&slot, vec![candidate("a.txt", "0123456789")], "up")
            .await
            .unwrap();

        queue.controller().stop();
        let summary = drain_quietly(&mut queue, &slot).await;
        assert_eq!(summary.uploaded, 0);
        assert!(summary.stopped);
        assert_eq!(queue.items()[0].status(), UploadStatus::Pending);
        assert!(store.calls().is_empty());

        assert!(!queue.controller().is_stopped());
        let summary = drain_quietly(&mut queue, &slot).await;
        assert_eq!(summary.uploaded, 1);
        assert!(!summary.stopped);
        assert!(store.contains("up/a.txt"));
    }

    #[tokio::test]
    async fn stop_during_last_item_is_not_reported_as_stopped() {
        let (store, slot) = connected();
        let mut queue = UploadQueue::new();
        queue
            .enqueue(&slot, vec![candidate("a.txt", "0123456789abcdef")], "up")
            .await
            .unwrap();

        let controller = queue.controller();
        let options = UploadOptions::default().with_part_size(4).with_concurrency(1);
        let summary = queue
            .drain(&slot, &options, |_| -> Arc<dyn ProgressCallback> {
                Arc::new(StopOnFirstPart(controller.clone()))
            })
            .await
            .unwrap();

        assert_eq!(summary.canceled, 1);
        assert!(!summary.stopped);
        assert_eq!(queue.pending_count(), 0);
        assert!(!store.contains("up/a.txt"));
    }

    #[tokio::test]
    async fn controller_cancel_only_affects_running_items() {
        let (_store, slot) = connected();
        let mut queue = UploadQueue::new();
        queue.enqueue(&slot, vec![candidate("a.txt", "a")], "").await.unwrap();
        assert!(!queue.controller().cancel(queue.items()[0].id()));
    }

    #[tokio::test]
    async fn connection_change_clears_cached_listings() {
        let first = Arc::new(MemoryStore::new("first"));
        first.insert("up/b.txt", "b");
        let mut slot = ConnectionSlot::connected(first.clone());

        let mut queue = UploadQueue::new();
        queue.enqueue(&slot, vec![candidate("a.txt", "a")], "up").await.unwrap();
        assert_eq!(queue.cache().len(), 1);

        let second = Arc::new(MemoryStore::new("second"));
        slot.connect(second.clone(), None);

        let summary = queue
            .enqueue(&slot, vec![candidate("b.txt", "b")], "up")
            .await
            .unwrap();
        assert_eq!(summary.queued.len(), 1);
        assert_eq!(list_calls(&second), ["up/"]);
        assert_eq!(queue.cache().epoch(), slot.epoch());
    }

    #[tokio::test]
    async fn uploaded_keys_are_remembered_by_the_cache() {
        let (store, slot) = connected();
        let mut queue = UploadQueue::new();
        queue.enqueue(&slot, vec![candidate("a.txt", "a")], "up").await.unwrap();
        drain_quietly(&mut queue, &slot).await;
        assert_eq!(queue.clear_done(), 1);

        store.clear_calls();
        let summary = queue
            .enqueue(&slot, vec![candidate("a.txt", "again")], "up")
            .await
            .unwrap();
        assert_eq!(summary.conflicts.len(), 1);
        assert!(list_calls(&store).is_empty());
    }

    #[tokio::test]
    async fn rejects_invalid_transitions() {
        let (_store, slot) = connected();
        let mut queue = UploadQueue::new();
        queue.enqueue(&slot, vec![candidate("a.txt", "a")], "").await.unwrap();
        let id = queue.items()[0].id();

        let err = queue.resolve(&slot, id, ConflictPolicy::Skip).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Queue(QueueError::InvalidTransition {
                status: UploadStatus::Pending,
                ..
            })
        ));
        assert!(matches!(queue.retry(id), Err(QueueError::InvalidTransition { .. })));
        assert!(matches!(
            queue.retry(Uuid::new_v4()),
            Err(QueueError::UnknownItem { .. })
        ));

        queue.remove(id).unwrap();
        assert!(queue.items().is_empty());
    }

    #[tokio::test]
    async fn disconnected_queue_fails_fast() {
        let slot = ConnectionSlot::new();
        let mut queue = UploadQueue::new();
        let err = queue
            .enqueue(&slot, vec![candidate("a.txt", "a")], "")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::NotConnected));

        let err = queue.drain(&slot, &UploadOptions::default(), |_| null_progress()).await.unwrap_err();
        assert!(matches!(err, UploadError::NotConnected));
    }
}
