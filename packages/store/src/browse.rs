//! Read-only browsing: directory listings, recursive listings, folder
//! statistics, and name search.

use std::collections::HashSet;

use bucket_browser_store_models::keys::normalize_prefix;
use bucket_browser_store_models::{EntryKind, FolderStats, ListedObject, ObjectEntry};

use crate::{ObjectStore, StoreError};

/// Lists every object under `prefix` (recursively), following
/// continuation tokens to exhaustion.
///
/// The prefix is normalized first. The folder marker object equal to the
/// prefix itself is skipped.
///
/// # Errors
///
/// Returns [`StoreError::List`] if any page fails.
pub async fn list_all_objects(
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<Vec<ListedObject>, StoreError> {
    let prefix = normalize_prefix(prefix);
    let mut results = list_raw(store, &prefix).await?;
    if !prefix.is_empty() {
        results.retain(|o| o.key != prefix);
    }
    Ok(results)
}

/// Lists every key starting with `prefix` exactly as given (no
/// normalization, marker objects included).
///
/// # Errors
///
/// Returns [`StoreError::List`] if any page fails.
pub async fn list_raw(
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<Vec<ListedObject>, StoreError> {
    let mut results = Vec::new();
    let mut continuation_token: Option<String> = None;

    loop {
        let page = store
            .list_objects(prefix, continuation_token.as_deref(), None)
            .await?;
        results.extend(page.objects);

        if page.is_truncated {
            continuation_token = page.next_token;
            if continuation_token.is_none() {
                log::warn!("Truncated listing of {prefix:?} without a continuation token");
                break;
            }
        } else {
            break;
        }
    }

    log::debug!(
        "Listed {} object(s) under s3://{}/{prefix}",
        results.len(),
        store.bucket()
    );
    Ok(results)
}

/// Lists the immediate children of a directory: folders first (from
/// common prefixes), then files.
///
/// # Errors
///
/// Returns [`StoreError::List`] if any page fails.
pub async fn list_directory(
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<Vec<ObjectEntry>, StoreError> {
    let prefix = normalize_prefix(prefix);
    let mut folders = Vec::new();
    let mut files = Vec::new();
    let mut continuation_token: Option<String> = None;

    loop {
        let page = store
            .list_objects(&prefix, continuation_token.as_deref(), Some("/"))
            .await?;

        for common in page.common_prefixes {
            let name = common[prefix.len()..].trim_end_matches('/').to_string();
            folders.push(ObjectEntry::folder(name, common));
        }

        for object in page.objects {
            if object.key == prefix {
                continue;
            }
            files.push(ObjectEntry {
                name: object.key[prefix.len()..].to_string(),
                kind: EntryKind::File,
                key: object.key,
                size: object.size,
                last_modified: object.last_modified,
            });
        }

        match (page.is_truncated, page.next_token) {
            (true, Some(token)) => continuation_token = Some(token),
            _ => break,
        }
    }

    folders.extend(files);
    Ok(folders)
}

/// Computes size, count, and modification range for everything under
/// `prefix`.
///
/// # Errors
///
/// Returns [`StoreError::List`] if any page fails.
pub async fn folder_stats(store: &dyn ObjectStore, prefix: &str) -> Result<FolderStats, StoreError> {
    let mut stats = FolderStats::default();
    for object in list_all_objects(store, prefix).await? {
        stats.record(&object);
    }
    Ok(stats)
}

/// Searches file and folder names under `prefix`.
///
/// With a non-empty `term`, returns files whose name contains it
/// (case-insensitive) and the implicit folders along each key whose
/// segment contains it, each folder once. With an empty term every file
/// is returned and no folders.
///
/// # Errors
///
/// Returns [`StoreError::List`] if the recursive listing fails.
pub async fn search(
    store: &dyn ObjectStore,
    prefix: &str,
    term: &str,
) -> Result<Vec<ObjectEntry>, StoreError> {
    let prefix = normalize_prefix(prefix);
    let objects = list_all_objects(store, &prefix).await?;
    Ok(search_objects(&prefix, objects, term))
}

fn search_objects(prefix: &str, objects: Vec<ListedObject>, term: &str) -> Vec<ObjectEntry> {
    let term = term.trim().to_lowercase();
    let has_term = !term.is_empty();
    let mut results = Vec::new();
    let mut seen_folders = HashSet::new();

    for object in objects {
        let Some(relative) = object.key.strip_prefix(prefix) else {
            continue;
        };
        let segments: Vec<&str> = relative.split('/').collect();

        if has_term {
            let mut folder_path = String::new();
            for segment in &segments[..segments.len() - 1] {
                if segment.is_empty() {
                    continue;
                }
                folder_path.push_str(segment);
                folder_path.push('/');
                let full = format!("{prefix}{folder_path}");
                if seen_folders.insert(full.clone()) && segment.to_lowercase().contains(&term) {
                    results.push(ObjectEntry::folder(*segment, full));
                }
            }
        }

        if object.key.ends_with('/') {
            continue;
        }

        let file_name = segments[segments.len() - 1];
        if !has_term || file_name.to_lowercase().contains(&term) {
            results.push(ObjectEntry {
                name: file_name.to_string(),
                kind: EntryKind::File,
                key: object.key.clone(),
                size: object.size,
                last_modified: object.last_modified,
            });
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn sample_store() -> MemoryStore {
        let store = MemoryStore::new("b").with_page_size(2);
        store.insert("photos/", "");
        store.insert("photos/beach.jpg", vec![0; 10]);
        store.insert("photos/2024/summer/beach2.png", vec![0; 20]);
        store.insert("photos/2024/notes.txt", vec![0; 5]);
        store.insert("docs/report.pdf", vec![0; 7]);
        store
    }

    #[tokio::test]
    async fn lists_directory_folders_first() {
        let store = sample_store();
        let entries = list_directory(&store, "/photos").await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Folder);
        assert_eq!(entries[0].name, "2024");
        assert_eq!(entries[0].key, "photos/2024/");
        assert_eq!(entries[1].name, "beach.jpg");
        assert_eq!(entries[1].size, 10);
    }

    #[tokio::test]
    async fn lists_root_directory() {
        let store = sample_store();
        let entries = list_directory(&store, "/").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["docs", "photos"]);
    }

    #[tokio::test]
    async fn recursive_listing_skips_marker_and_paginates() {
        let store = sample_store();
        let objects = list_all_objects(&store, "photos").await.unwrap();
        assert_eq!(objects.len(), 3);
        assert!(objects.iter().all(|o| o.key != "photos/"));
    }

    #[tokio::test]
    async fn computes_folder_stats() {
        let store = sample_store();
        let stats = folder_stats(&store, "photos/").await.unwrap();
        assert_eq!(stats.object_count, 3);
        assert_eq!(stats.total_size, 35);
        assert!(stats.earliest_modified.is_some());
    }

    #[tokio::test]
    async fn search_matches_files_and_implicit_folders_once() {
        let store = sample_store();
        let results = search(&store, "", "BEACH").await.unwrap();
        let keys: Vec<_> = results.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["photos/2024/summer/beach2.png", "photos/beach.jpg"]);

        let results = search(&store, "photos", "20").await.unwrap();
        let folders: Vec<_> = results.iter().filter(|e| e.is_folder()).collect();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].key, "photos/2024/");
    }

    #[tokio::test]
    async fn empty_search_returns_every_file() {
        let store = sample_store();
        let results = search(&store, "photos/", "  ").await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|e| !e.is_folder()));
    }
}
