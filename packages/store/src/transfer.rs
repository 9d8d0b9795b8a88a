//! Move and copy with destination resolution and conflict handling.

use bucket_browser_store_models::ConflictPolicy;
use bucket_browser_store_models::keys::{basename, is_folder_key, normalize_prefix};

use crate::exists::{find_free_key, probe_exists};
use crate::manage::{copy_item, delete_item};
use crate::{ObjectStore, StoreError};

/// Whether the source survives a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Copy,
    Move,
}

/// Resolves the key an item lands at when transferred to `dst`.
///
/// `dst` is treated as a directory (and the source name appended) when it
/// is empty, ends with `/`, the source is a folder, or it has several
/// segments and no extension in the last one. Otherwise it is the full
/// destination key.
#[must_use]
pub fn resolve_destination(src: &str, dst: &str) -> String {
    let dst = dst.trim().trim_start_matches('/');
    let src_is_folder = is_folder_key(src);
    let last_segment = dst.split('/').rfind(|s| !s.is_empty()).unwrap_or_default();

    let looks_like_dir = dst.is_empty()
        || dst.ends_with('/')
        || src_is_folder
        || (dst.contains('/') && !last_segment.contains('.'));
    if !looks_like_dir {
        return dst.to_string();
    }

    let name = basename(src);
    let suffix = if src_is_folder { "/" } else { "" };
    format!("{}{name}{suffix}", normalize_prefix(dst))
}

/// Copies or moves `src` to `dst`, applying `policy` when the resolved
/// destination is already taken.
///
/// Returns the key the item landed at, or `None` when it was skipped.
/// [`ConflictPolicy::Replace`] skips the existence check entirely.
///
/// # Errors
///
/// Returns [`StoreError::InvalidArgument`] for an empty source or a folder
/// moved into itself, and the underlying store error otherwise.
pub async fn transfer(
    store: &dyn ObjectStore,
    src: &str,
    dst: &str,
    mode: TransferMode,
    policy: ConflictPolicy,
) -> Result<Option<String>, StoreError> {
    if src.is_empty() {
        return Err(StoreError::InvalidArgument {
            message: "transfer source is empty".to_string(),
        });
    }

    let resolved = resolve_destination(src, dst);
    if resolved == src {
        log::info!("{src} is already at its destination");
        return Ok(Some(resolved));
    }
    if is_folder_key(src) && resolved.starts_with(src) {
        return Err(StoreError::InvalidArgument {
            message: format!("destination {resolved:?} is inside source folder {src:?}"),
        });
    }

    let target = match policy {
        ConflictPolicy::Replace => resolved,
        ConflictPolicy::Skip => {
            if probe_exists(store, &resolved).await {
                log::info!("Skipping {src}: {resolved} already exists");
                return Ok(None);
            }
            resolved
        }
        ConflictPolicy::KeepBoth => {
            if probe_exists(store, &resolved).await {
                find_free_key(store, &resolved, |_| false).await?
            } else {
                resolved
            }
        }
    };

    copy_item(store, src, &target).await?;
    if mode == TransferMode::Move {
        delete_item(store, src).await?;
    }

    log::info!("{mode:?} {src} -> {target}");
    Ok(Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn resolves_directory_like_destinations() {
        assert_eq!(resolve_destination("docs/a.txt", ""), "a.txt");
        assert_eq!(resolve_destination("docs/a.txt", "archive/"), "archive/a.txt");
        assert_eq!(resolve_destination("docs/a.txt", "archive/2024"), "archive/2024/a.txt");
        assert_eq!(resolve_destination("docs/a.txt", "b.txt"), "b.txt");
        assert_eq!(resolve_destination("docs/a.txt", "/x/b.txt"), "x/b.txt");
        assert_eq!(resolve_destination("docs/", "archive"), "archive/docs/");
    }

    #[tokio::test]
    async fn moves_files() {
        let store = MemoryStore::new("b");
        store.insert("docs/a.txt", "a");

        let key = transfer(&store, "docs/a.txt", "archive/", TransferMode::Move, ConflictPolicy::Skip)
            .await
            .unwrap();
        assert_eq!(key.as_deref(), Some("archive/a.txt"));
        assert_eq!(store.keys(), ["archive/a.txt"]);
    }

    #[tokio::test]
    async fn skip_leaves_existing_destination() {
        let store = MemoryStore::new("b");
        store.insert("a.txt", "new");
        store.insert("archive/a.txt", "old");

        let key = transfer(&store, "a.txt", "archive/", TransferMode::Move, ConflictPolicy::Skip)
            .await
            .unwrap();
        assert!(key.is_none());
        assert_eq!(store.object("archive/a.txt").unwrap(), b"old");
        assert!(store.contains("a.txt"));
    }

    #[tokio::test]
    async fn keep_both_picks_suffixed_name() {
        let store = MemoryStore::new("b");
        store.insert("a.txt", "new");
        store.insert("archive/a.txt", "old");

        let key = transfer(&store, "a.txt", "archive/", TransferMode::Copy, ConflictPolicy::KeepBoth)
            .await
            .unwrap();
        assert_eq!(key.as_deref(), Some("archive/a (1).txt"));
        assert_eq!(store.object("archive/a (1).txt").unwrap(), b"new");
        assert!(store.contains("a.txt"));
    }

    #[tokio::test]
    async fn replace_overwrites_without_probing() {
        let store = MemoryStore::new("b");
        store.insert("a.txt", "new");
        store.insert("archive/a.txt", "old");
        store.fail_head(true);

        transfer(&store, "a.txt", "archive/", TransferMode::Copy, ConflictPolicy::Replace)
            .await
            .unwrap();
        assert_eq!(store.object("archive/a.txt").unwrap(), b"new");
    }

    #[tokio::test]
    async fn moves_folders_and_rejects_self_nesting() {
        let store = MemoryStore::new("b");
        store.insert("photos/", "");
        store.insert("photos/x.png", "p");

        let err = transfer(&store, "photos/", "photos/inner", TransferMode::Move, ConflictPolicy::Skip)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument { .. }));

        let key = transfer(&store, "photos/", "archive", TransferMode::Move, ConflictPolicy::Skip)
            .await
            .unwrap();
        assert_eq!(key.as_deref(), Some("archive/photos/"));
        assert_eq!(store.keys(), ["archive/photos/", "archive/photos/x.png"]);
    }
}
