//! Mutating file-manager operations: folders, text objects, copy, delete,
//! and rename.
//!
//! Folders are emulated. A folder is either a zero-byte marker object whose
//! key ends in `/` or simply the shared prefix of the keys under it, so
//! every folder operation expands into per-key calls.

use bucket_browser_store_models::keys::{
    basename, is_folder_key, normalize_prefix, parent_prefix, reroot,
};

use crate::browse::list_raw;
use crate::{ObjectStore, StoreError};

/// Maximum keys per `DeleteObjects` request.
const DELETE_BATCH_SIZE: usize = 1000;

/// Content type for zero-byte folder marker objects.
const FOLDER_CONTENT_TYPE: &str = "application/x-directory";

/// Default content type for [`put_text`].
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Creates a folder marker object and returns its key.
///
/// # Errors
///
/// Returns [`StoreError::InvalidArgument`] for an empty path and
/// [`StoreError::Put`] if the write fails.
pub async fn create_folder(store: &dyn ObjectStore, path: &str) -> Result<String, StoreError> {
    let key = normalize_prefix(path);
    if key.is_empty() {
        return Err(StoreError::InvalidArgument {
            message: "folder path is empty".to_string(),
        });
    }

    log::info!("Creating folder s3://{}/{key}", store.bucket());
    store.put_object(&key, Vec::new(), FOLDER_CONTENT_TYPE).await?;
    Ok(key)
}

/// Writes a small text body to `key`.
///
/// # Errors
///
/// Returns [`StoreError::Put`] if the write fails.
pub async fn put_text(
    store: &dyn ObjectStore,
    key: &str,
    body: &str,
    content_type: Option<&str>,
) -> Result<(), StoreError> {
    if key.is_empty() || is_folder_key(key) {
        return Err(StoreError::InvalidArgument {
            message: format!("{key:?} is not a file key"),
        });
    }

    store
        .put_object(
            key,
            body.as_bytes().to_vec(),
            content_type.unwrap_or(TEXT_CONTENT_TYPE),
        )
        .await
}

/// Copies a single object, or every object under a folder prefix.
///
/// Returns the number of objects copied. Copying onto itself is a no-op.
///
/// # Errors
///
/// Returns [`StoreError::InvalidArgument`] for empty keys or a folder
/// destination inside its own source, and the underlying list/copy error
/// otherwise.
pub async fn copy_item(store: &dyn ObjectStore, src: &str, dst: &str) -> Result<usize, StoreError> {
    if src.is_empty() || dst.is_empty() {
        return Err(StoreError::InvalidArgument {
            message: "copy source and destination must be non-empty".to_string(),
        });
    }
    if src == dst {
        return Ok(0);
    }

    if !is_folder_key(src) {
        log::info!("Copying {src} -> {dst}");
        store.copy_object(src, dst).await?;
        return Ok(1);
    }

    let src_prefix = normalize_prefix(src);
    let dst_prefix = normalize_prefix(dst);
    if src_prefix == dst_prefix {
        return Ok(0);
    }
    if dst_prefix.starts_with(&src_prefix) {
        return Err(StoreError::InvalidArgument {
            message: format!("cannot copy {src_prefix:?} into itself ({dst_prefix:?})"),
        });
    }

    log::info!("Copying folder {src_prefix} -> {dst_prefix}");
    let mut copied = 0;
    for object in list_raw(store, &src_prefix).await? {
        if let Some(new_key) = reroot(&object.key, &src_prefix, &dst_prefix) {
            store.copy_object(&object.key, &new_key).await?;
            copied += 1;
        }
    }

    log::info!("  copied {copied} object(s)");
    Ok(copied)
}

/// Deletes a single object, or everything under a folder prefix.
///
/// Returns the number of keys deleted.
///
/// # Errors
///
/// Returns the underlying list/delete error.
pub async fn delete_item(store: &dyn ObjectStore, key: &str) -> Result<usize, StoreError> {
    delete_many(store, &[key.to_string()]).await
}

/// Deletes a selection of files and folders in batches of at most 1000
/// keys.
///
/// # Errors
///
/// Returns the underlying list/delete error. Batches already sent stay
/// deleted.
pub async fn delete_many(store: &dyn ObjectStore, keys: &[String]) -> Result<usize, StoreError> {
    let mut expanded = Vec::new();
    for key in keys {
        if key.is_empty() {
            return Err(StoreError::InvalidArgument {
                message: "refusing to delete an empty key (the whole bucket)".to_string(),
            });
        }
        if is_folder_key(key) {
            expanded.extend(list_raw(store, key).await?.into_iter().map(|o| o.key));
        } else {
            expanded.push(key.clone());
        }
    }
    expanded.sort();
    expanded.dedup();

    for batch in expanded.chunks(DELETE_BATCH_SIZE) {
        log::info!(
            "Deleting {} object(s) from s3://{}",
            batch.len(),
            store.bucket()
        );
        store.delete_objects(batch).await?;
    }

    Ok(expanded.len())
}

/// Renames a file within its directory and returns the new key.
///
/// # Errors
///
/// Returns [`StoreError::InvalidArgument`] for an empty or nested name, and
/// the underlying copy/delete error otherwise.
pub async fn rename_file(
    store: &dyn ObjectStore,
    old_key: &str,
    new_name: &str,
) -> Result<String, StoreError> {
    validate_name(new_name)?;
    let new_key = format!("{}{new_name}", parent_prefix(old_key));
    if new_key == old_key {
        return Ok(new_key);
    }

    store.copy_object(old_key, &new_key).await?;
    store.delete_objects(&[old_key.to_string()]).await?;
    Ok(new_key)
}

/// Renames a folder (its last path segment) and returns the new prefix.
///
/// # Errors
///
/// Returns [`StoreError::InvalidArgument`] for an empty or nested name, and
/// the underlying copy/delete error otherwise.
pub async fn rename_folder(
    store: &dyn ObjectStore,
    old_prefix: &str,
    new_name: &str,
) -> Result<String, StoreError> {
    validate_name(new_name)?;
    let old_prefix = normalize_prefix(old_prefix);
    let new_prefix = format!("{}{new_name}/", parent_prefix(&old_prefix));
    if new_prefix == old_prefix || basename(&old_prefix).is_empty() {
        return Ok(old_prefix);
    }

    copy_item(store, &old_prefix, &new_prefix).await?;
    delete_item(store, &old_prefix).await?;
    Ok(new_prefix)
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() || name.contains('/') {
        return Err(StoreError::InvalidArgument {
            message: format!("{name:?} is not a valid name"),
        });
    }
    Ok(())
}
