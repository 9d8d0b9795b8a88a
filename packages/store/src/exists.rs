//! Conservative existence checks.
//!
//! An existence check that cannot get a clear answer (permission errors,
//! throttling, network failures) reports "exists". A false conflict costs
//! the user one extra prompt; a false "free" silently overwrites data.

use bucket_browser_store_models::keys::{is_folder_key, keep_both_key};

use crate::{ObjectStore, StoreError};

/// Upper bound on ` (n)` suffixes tried before giving up.
pub const MAX_KEEP_BOTH_ATTEMPTS: u32 = 1000;

/// Returns whether `key` exists, treating any ambiguous answer as `true`.
///
/// Folder keys (ending in `/`) exist if anything is stored under them, not
/// just a marker object.
pub async fn probe_exists(store: &dyn ObjectStore, key: &str) -> bool {
    if is_folder_key(key) {
        return match store.list_objects(key, None, None).await {
            Ok(page) => !page.objects.is_empty() || !page.common_prefixes.is_empty(),
            Err(e) => {
                log::warn!("Listing {key:?} failed, assuming it exists: {e}");
                true
            }
        };
    }

    match store.head_object(key).await {
        Ok(meta) => meta.is_some(),
        Err(e) => {
            log::warn!("HEAD {key:?} failed, assuming it exists: {e}");
            true
        }
    }
}

/// Finds the first free "keep both" name for `key`: `name (1).ext`,
/// `name (2).ext`, ...
///
/// A candidate is free when `is_reserved` rejects it and the store
/// reports it absent. Probes run sequentially against the live store, so
/// the answer reflects the namespace at call time.
///
/// # Errors
///
/// Returns [`StoreError::InvalidArgument`] if no free name is found within
/// [`MAX_KEEP_BOTH_ATTEMPTS`].
pub async fn find_free_key(
    store: &dyn ObjectStore,
    key: &str,
    is_reserved: impl Fn(&str) -> bool + Send,
) -> Result<String, StoreError> {
    for n in 1..=MAX_KEEP_BOTH_ATTEMPTS {
        let candidate = keep_both_key(key, n);
        if is_reserved(&candidate) {
            continue;
        }
        if !probe_exists(store, &candidate).await {
            log::debug!("Keep-both name for {key:?} is {candidate:?}");
            return Ok(candidate);
        }
    }

    Err(StoreError::InvalidArgument {
        message: format!(
            "no free name for {key:?} after {MAX_KEEP_BOTH_ATTEMPTS} attempts"
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn probes_objects_and_folders() {
        let store = MemoryStore::new("b");
        store.insert("a.txt", "x");
        store.insert("dir/child.txt", "x");

        assert!(probe_exists(&store, "a.txt").await);
        assert!(!probe_exists(&store, "b.txt").await);
        assert!(probe_exists(&store, "dir/").await);
        assert!(!probe_exists(&store, "other/").await);
    }

    #[tokio::test]
    async fn ambiguous_probes_report_existing() {
        let store = MemoryStore::new("b");
        store.fail_head(true);
        store.fail_listing(true);

        assert!(probe_exists(&store, "missing.txt").await);
        assert!(probe_exists(&store, "missing/").await);
    }

    #[tokio::test]
    async fn finds_next_free_suffix() {
        let store = MemoryStore::new("b");
        store.insert("a.txt", "x");
        store.insert("a (1).txt", "x");

        let key = find_free_key(&store, "a.txt", |_| false).await.unwrap();
        assert_eq!(key, "a (2).txt");

        let key = find_free_key(&store, "a.txt", |k| k == "a (2).txt")
            .await
            .unwrap();
        assert_eq!(key, "a (3).txt");
    }

    #[tokio::test]
    async fn gives_up_when_every_probe_is_ambiguous() {
        let store = MemoryStore::new("b");
        store.fail_head(true);
        assert!(find_free_key(&store, "a.txt", |_| false).await.is_err());
    }
}
