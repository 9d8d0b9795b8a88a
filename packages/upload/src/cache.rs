//! Per-connection cache of remote listings used for conflict detection.
//!
//! Entries are keyed by prefix and listing scope. The cache is tied to a
//! [`ConnectionSlot`](bucket_browser_store::ConnectionSlot) epoch: when the
//! slot moves to a new epoch (another bucket or profile) the next
//! [`ListingCache::sync_epoch`] drops everything, so keys from one bucket
//! never answer existence checks for another.

use std::collections::{HashMap, HashSet};

use bucket_browser_store::ObjectStore;
use bucket_browser_store::StoreError;
use bucket_browser_store::browse::list_raw;
use bucket_browser_store_models::keys::parent_prefix;

/// How far below the prefix a listing reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingScope {
    /// Objects directly under the prefix (`/`-delimited listing).
    Shallow,
    /// Every object under the prefix.
    Recursive,
}

impl ListingScope {
    fn covers(self, prefix: &str, key: &str) -> bool {
        match self {
            Self::Shallow => parent_prefix(key) == prefix,
            Self::Recursive => key.starts_with(prefix),
        }
    }
}

#[derive(Debug, Default)]
pub struct ListingCache {
    epoch: u64,
    listings: HashMap<(String, ListingScope), HashSet<String>>,
}

impl ListingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the cache if `epoch` differs from the one it was filled in.
    pub fn sync_epoch(&mut self, epoch: u64) {
        if self.epoch != epoch {
            if !self.listings.is_empty() {
                log::debug!(
                    "Connection changed ({} -> {epoch}), dropping {} cached listing(s)",
                    self.epoch,
                    self.listings.len()
                );
            }
            self.listings.clear();
            self.epoch = epoch;
        }
    }

    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    #[must_use]
    pub fn get(&self, prefix: &str, scope: ListingScope) -> Option<&HashSet<String>> {
        self.listings.get(&(prefix.to_string(), scope))
    }

    /// Returns the keys under `prefix`, listing the store on a miss.
    ///
    /// Failed listings are not cached.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::List`] if the listing fails.
    pub async fn keys(
        &mut self,
        store: &dyn ObjectStore,
        prefix: &str,
        scope: ListingScope,
    ) -> Result<&HashSet<String>, StoreError> {
        let entry = (prefix.to_string(), scope);
        if !self.listings.contains_key(&entry) {
            let keys = match scope {
                ListingScope::Recursive => list_raw(store, prefix)
                    .await?
                    .into_iter()
                    .map(|o| o.key)
                    .collect(),
                ListingScope::Shallow => list_shallow(store, prefix).await?,
            };
            log::debug!("Cached {} key(s) under {prefix:?} ({scope:?})", keys.len());
            self.listings.insert(entry.clone(), keys);
        }

        Ok(self.listings.entry(entry).or_default())
    }

    /// Adds a key known to exist (for example, just uploaded) to every
    /// cached listing that covers it.
    pub fn note_key(&mut self, key: &str) {
        for ((prefix, scope), keys) in &mut self.listings {
            if scope.covers(prefix, key) {
                keys.insert(key.to_string());
            }
        }
    }

    pub fn clear(&mut self) {
        self.listings.clear();
    }
}

async fn list_shallow(store: &dyn ObjectStore, prefix: &str) -> Result<HashSet<String>, StoreError> {
    let mut keys = HashSet::new();
    let mut continuation_token: Option<String> = None;

    loop {
        let page = store
            .list_objects(prefix, continuation_token.as_deref(), Some("/"))
            .await?;
        keys.extend(page.objects.into_iter().map(|o| o.key));

        match (page.is_truncated, page.next_token) {
            (true, Some(token)) => continuation_token = Some(token),
            _ => break,
        }
    }

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use bucket_browser_store::memory::{MemoryStore, StoreCall};

    use super::*;

    fn list_calls(store: &MemoryStore) -> usize {
        store
            .calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::List { .. }))
            .count()
    }

    #[tokio::test]
    async fn caches_listings_by_prefix_and_scope() {
        let store = MemoryStore::new("b").with_page_size(1);
        store.insert("up/a.txt", "a");
        store.insert("up/pics/b.png", "b");
        store.insert("up/pics/deep/c.png", "c");

        let mut cache = ListingCache::new();
        let shallow = cache.keys(&store, "up/", ListingScope::Shallow).await.unwrap();
        assert!(shallow.contains("up/a.txt"));
        assert!(!shallow.contains("up/pics/b.png"));

        let recursive = cache.keys(&store, "up/pics/", ListingScope::Recursive).await.unwrap();
        assert_eq!(recursive.len(), 2);

        let calls = list_calls(&store);
        cache.keys(&store, "up/", ListingScope::Shallow).await.unwrap();
        cache.keys(&store, "up/pics/", ListingScope::Recursive).await.unwrap();
        assert_eq!(list_calls(&store), calls);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn failed_listings_are_not_cached() {
        let store = MemoryStore::new("b");
        store.fail_listing(true);

        let mut cache = ListingCache::new();
        assert!(cache.keys(&store, "x/", ListingScope::Recursive).await.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn epoch_change_clears_everything() {
        let store = MemoryStore::new("b");
        store.insert("a.txt", "a");

        let mut cache = ListingCache::new();
        cache.sync_epoch(1);
        cache.keys(&store, "", ListingScope::Shallow).await.unwrap();
        cache.sync_epoch(1);
        assert_eq!(cache.len(), 1);

        cache.sync_epoch(2);
        assert!(cache.is_empty());
        assert_eq!(cache.epoch(), 2);
    }

    #[tokio::test]
    async fn noted_keys_join_covering_listings() {
        let store = MemoryStore::new("b");
        let mut cache = ListingCache::new();
        cache.keys(&store, "up/", ListingScope::Shallow).await.unwrap();
        cache.keys(&store, "up/pics/", ListingScope::Recursive).await.unwrap();

        cache.note_key("up/new.txt");
        cache.note_key("up/pics/deep/x.png");

        let shallow = cache.get("up/", ListingScope::Shallow).unwrap();
        assert!(shallow.contains("up/new.txt"));
        assert!(!shallow.contains("up/pics/deep/x.png"));
        assert!(cache
            .get("up/pics/", ListingScope::Recursive)
            .unwrap()
            .contains("up/pics/deep/x.png"));
    }
}
