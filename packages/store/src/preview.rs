//! Preview links and local downloads.

use std::path::Path;
use std::time::Duration;

use bucket_browser_store_models::ObjectMeta;
use bucket_browser_store_models::keys::basename;

use crate::s3::encode_key;
use crate::{ObjectStore, StoreError};

/// Lifetime of presigned preview and download links.
pub const PRESIGN_EXPIRY: Duration = Duration::from_secs(3600);

/// Returns a URL for viewing or downloading `key`.
///
/// With a public base URL and `download == false` the link is built
/// directly from the base URL. Downloads always use a presigned link so
/// the response carries an attachment disposition named after the key's
/// last segment.
///
/// # Errors
///
/// Returns [`StoreError::Presign`] if presigning fails.
pub async fn preview_url(
    store: &dyn ObjectStore,
    key: &str,
    download: bool,
    public_base_url: Option<&str>,
) -> Result<String, StoreError> {
    if !download && let Some(base) = public_base_url.filter(|b| !b.trim().is_empty()) {
        return Ok(format!("{}/{}", base.trim_end_matches('/'), encode_key(key)));
    }

    let download_name = download.then(|| match basename(key) {
        "" => "file",
        name => name,
    });
    store.presign_get(key, PRESIGN_EXPIRY, download_name).await
}

/// Result of [`download_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The object was fetched and written.
    Downloaded {
        /// Bytes written.
        bytes: u64,
    },
    /// The local file already matched the remote object.
    Skipped,
}

/// Downloads `key` into `local_path`, creating parent directories.
///
/// Unless `force` is set, the download is skipped when the local file
/// already matches the remote object (same size, and same MD5 when the
/// `ETag` is a plain MD5 digest).
///
/// # Errors
///
/// Returns [`StoreError::Get`] if the object cannot be read and
/// [`StoreError::Io`] if the local file cannot be written.
pub async fn download_to(
    store: &dyn ObjectStore,
    key: &str,
    local_path: &Path,
    force: bool,
) -> Result<DownloadOutcome, StoreError> {
    log::info!(
        "Pulling s3://{}/{key} -> {}",
        store.bucket(),
        local_path.display()
    );

    if !force
        && let Ok(Some(remote)) = store.head_object(key).await
        && local_copy_matches(local_path, &remote).await
    {
        log::info!("{} already matches {key}", local_path.display());
        return Ok(DownloadOutcome::Skipped);
    }

    let data = store.get_object(key).await?;
    if let Some(parent) = local_path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(local_path, &data).await?;

    log::debug!("Wrote {} bytes to {}", data.len(), local_path.display());
    Ok(DownloadOutcome::Downloaded {
        bytes: data.len() as u64,
    })
}

/// Returns the hex digest when `etag` is a single-part MD5 `ETag`.
///
/// Multipart `ETag`s look like `"<hex>-<parts>"` and carry no usable
/// digest of the whole object.
fn plain_md5_etag(etag: &str) -> Option<&str> {
    let digest = etag.trim_matches('"');
    (digest.len() == 32 && digest.bytes().all(|b| b.is_ascii_hexdigit())).then_some(digest)
}

/// A local copy matches when its size equals the remote size and, if the
/// remote `ETag` is a plain MD5, its digest matches as well.
async fn local_copy_matches(local_path: &Path, remote: &ObjectMeta) -> bool {
    match tokio::fs::metadata(local_path).await {
        Ok(meta) if meta.len() == remote.size => {}
        _ => return false,
    }

    let Some(expected) = remote.etag.as_deref().and_then(plain_md5_etag) else {
        return true;
    };
    file_md5(local_path)
        .await
        .map_or(true, |actual| actual.eq_ignore_ascii_case(expected))
}

async fn file_md5(path: &Path) -> Result<String, std::io::Error> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<String, std::io::Error> {
        use std::io::Read;

        let mut file = std::fs::File::open(&path)?;
        let mut digest = md5::Context::new();
        let mut chunk = vec![0u8; 256 * 1024];
        loop {
            match file.read(&mut chunk)? {
                0 => break,
                n => digest.consume(&chunk[..n]),
            }
        }
        Ok(format!("{:x}", digest.finalize()))
    })
    .await
    .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StoreCall};

    #[tokio::test]
    async fn public_base_url_is_used_for_views() {
        let store = MemoryStore::new("b");
        let url = preview_url(&store, "a b/c.png", false, Some("https://cdn.example.com/"))
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example.com/a%20b/c.png");
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn downloads_are_presigned_with_attachment_name() {
        let store = MemoryStore::new("b");
        let url = preview_url(&store, "docs/report.pdf", true, Some("https://cdn"))
            .await
            .unwrap();
        assert_eq!(url, "memory://b/docs/report.pdf?expires=3600&download=report.pdf");

        let url = preview_url(&store, "docs/report.pdf", false, None).await.unwrap();
        assert_eq!(url, "memory://b/docs/report.pdf?expires=3600");
    }

    #[tokio::test]
    async fn downloads_then_skips_unchanged_file() {
        let store = MemoryStore::new("b");
        store.insert("data/file.bin", vec![7u8; 1024]);

        let dir = std::env::temp_dir().join(format!("bucket_browser_dl_{}", std::process::id()));
        let path = dir.join("nested/file.bin");
        let _ = std::fs::remove_dir_all(&dir);

        let first = download_to(&store, "data/file.bin", &path, false).await.unwrap();
        assert_eq!(first, DownloadOutcome::Downloaded { bytes: 1024 });
        assert_eq!(std::fs::read(&path).unwrap(), vec![7u8; 1024]);

        store.clear_calls();
        let second = download_to(&store, "data/file.bin", &path, false).await.unwrap();
        assert_eq!(second, DownloadOutcome::Skipped);
        assert!(!store.calls().iter().any(|c| matches!(c, StoreCall::Get { .. })));

        let forced = download_to(&store, "data/file.bin", &path, true).await.unwrap();
        assert_eq!(forced, DownloadOutcome::Downloaded { bytes: 1024 });

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_objects_fail() {
        let store = MemoryStore::new("b");
        let path = std::env::temp_dir().join("bucket_browser_missing_download.bin");
        let err = download_to(&store, "nope", &path, true).await.unwrap_err();
        assert!(matches!(err, StoreError::Get { .. }));
    }
}
