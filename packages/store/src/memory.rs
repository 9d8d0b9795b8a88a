//! In-memory [`ObjectStore`] for tests and dry runs.
//!
//! Follows S3 multipart rules closely enough to catch orchestration bugs:
//! parts are staged per upload id and invisible to listings, completion
//! requires a strictly ascending part list whose `ETag`s match what was
//! uploaded, and abort discards the staged parts. Every call is recorded
//! and most calls can be made to fail on demand.
//!
//! Each call yields to the scheduler before touching state, so
//! concurrently polled workers interleave the way they would against a
//! real network.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bucket_browser_store_models::{CompletedPart, ListPage, ListedObject, ObjectMeta};
use chrono::{DateTime, Utc};

use crate::{ObjectStore, StoreError};

/// Default number of entries per listing page (matches S3).
const DEFAULT_PAGE_SIZE: usize = 1000;

/// Maximum keys accepted by one `DeleteObjects` request.
const MAX_DELETE_BATCH: usize = 1000;

/// A recorded call against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    CreateMultipart { key: String },
    UploadPart { key: String, part_number: u32, size: usize },
    CompleteMultipart { key: String, parts: Vec<u32> },
    AbortMultipart { key: String, upload_id: String },
    Put { key: String, size: usize },
    Get { key: String },
    Presign { key: String },
    List { prefix: String, delimiter: Option<String> },
    Head { key: String },
    Delete { keys: Vec<String> },
    Copy { src: String, dst: String },
}

struct StoredObject {
    data: Vec<u8>,
    content_type: String,
    etag: String,
    last_modified: DateTime<Utc>,
}

struct PendingUpload {
    key: String,
    content_type: String,
    parts: BTreeMap<u32, (String, Vec<u8>)>,
}

#[derive(Default)]
struct Faults {
    create: bool,
    part: Option<u32>,
    complete: bool,
    abort: bool,
    listing: bool,
    head: bool,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    uploads: BTreeMap<String, PendingUpload>,
    next_upload_id: u64,
    calls: Vec<StoreCall>,
    faults: Faults,
}

enum Row {
    Object(ListedObject),
    Prefix(String),
}

/// An [`ObjectStore`] that keeps everything in process memory.
pub struct MemoryStore {
    bucket: String,
    page_size: usize,
    state: Mutex<State>,
    parts_in_flight: AtomicUsize,
    peak_parts_in_flight: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store for `bucket`.
    #[must_use]
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(State::default()),
            parts_in_flight: AtomicUsize::new(0),
            peak_parts_in_flight: AtomicUsize::new(0),
        }
    }

    /// Sets the number of entries returned per listing page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores an object directly, bypassing the call log.
    pub fn insert(&self, key: &str, data: impl Into<Vec<u8>>) {
        let data = data.into();
        let object = StoredObject {
            etag: etag_of(&data),
            data,
            content_type: bucket_browser_store_models::mime::DEFAULT_CONTENT_TYPE.to_string(),
            last_modified: Utc::now(),
        };
        self.state().objects.insert(key.to_string(), object);
    }

    /// Returns a copy of an object's bytes.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state().objects.get(key).map(|o| o.data.clone())
    }

    /// Returns the content type an object was stored with.
    #[must_use]
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.state().objects.get(key).map(|o| o.content_type.clone())
    }

    /// Returns `true` if an object exists at `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.state().objects.contains_key(key)
    }

    /// Returns every stored key in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    /// Returns the calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Highest number of `UploadPart` calls that were suspended at the
    /// same time.
    #[must_use]
    pub fn peak_parts_in_flight(&self) -> usize {
        self.peak_parts_in_flight.load(Ordering::SeqCst)
    }

    /// Number of multipart sessions neither completed nor aborted.
    #[must_use]
    pub fn open_uploads(&self) -> usize {
        self.state().uploads.len()
    }

    /// Makes `CreateMultipartUpload` fail.
    pub fn fail_create(&self, fail: bool) {
        self.state().faults.create = fail;
    }

    /// Makes `UploadPart` fail for the given part number.
    pub fn fail_part(&self, part_number: Option<u32>) {
        self.state().faults.part = part_number;
    }

    /// Makes `CompleteMultipartUpload` fail.
    pub fn fail_complete(&self, fail: bool) {
        self.state().faults.complete = fail;
    }

    /// Makes `AbortMultipartUpload` fail (the session stays open).
    pub fn fail_abort(&self, fail: bool) {
        self.state().faults.abort = fail;
    }

    /// Makes `ListObjectsV2` fail, as with a missing `s3:ListBucket`
    /// permission.
    pub fn fail_listing(&self, fail: bool) {
        self.state().faults.listing = fail;
    }

    /// Makes `HeadObject` fail with an error other than `NotFound`.
    pub fn fail_head(&self, fail: bool) {
        self.state().faults.head = fail;
    }

    fn injected(what: &str) -> crate::BoxError {
        format!("injected {what} failure").into()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.calls.push(StoreCall::CreateMultipart {
            key: key.to_string(),
        });

        if state.faults.create {
            return Err(StoreError::CreateMultipart {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source: Self::injected("create"),
            });
        }

        state.next_upload_id += 1;
        let upload_id = format!("upload-{}", state.next_upload_id);
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );

        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Vec<u8>,
    ) -> Result<String, StoreError> {
        let in_flight = self.parts_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_parts_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.parts_in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state();
        state.calls.push(StoreCall::UploadPart {
            key: key.to_string(),
            part_number,
            size: body.len(),
        });

        let part_error = |source| StoreError::UploadPart {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            part_number,
            source,
        };

        if state.faults.part == Some(part_number) {
            return Err(part_error(Self::injected("part")));
        }
        if !(1..=10_000).contains(&part_number) {
            return Err(part_error("part number out of range".into()));
        }

        let Some(upload) = state.uploads.get_mut(upload_id) else {
            return Err(part_error("NoSuchUpload".into()));
        };
        if upload.key != key {
            return Err(part_error("key does not match upload".into()));
        }

        let etag = etag_of(&body);
        upload.parts.insert(part_number, (etag.clone(), body));
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.calls.push(StoreCall::CompleteMultipart {
            key: key.to_string(),
            parts: parts.iter().map(|p| p.part_number).collect(),
        });

        let complete_error = |source| StoreError::CompleteMultipart {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            source,
        };

        if state.faults.complete {
            return Err(complete_error(Self::injected("complete")));
        }
        if parts.is_empty() {
            return Err(complete_error("MalformedXML: no parts".into()));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(complete_error("InvalidPartOrder".into()));
        }

        let Some(upload) = state.uploads.get(upload_id) else {
            return Err(complete_error("NoSuchUpload".into()));
        };

        let mut data = Vec::new();
        let mut digests = Vec::with_capacity(parts.len() * 16);
        for (idx, part) in parts.iter().enumerate() {
            let Some((etag, body)) = upload.parts.get(&part.part_number) else {
                return Err(complete_error(
                    format!("InvalidPart: {} was never uploaded", part.part_number).into(),
                ));
            };
            if *etag != part.etag {
                return Err(complete_error(
                    format!("InvalidPart: ETag mismatch for {}", part.part_number).into(),
                ));
            }
            if body.is_empty() && idx + 1 < parts.len() {
                return Err(complete_error("EntityTooSmall: empty non-final part".into()));
            }
            data.extend_from_slice(body);
            digests.extend_from_slice(&md5::compute(body).0);
        }

        let Some(upload) = state.uploads.remove(upload_id) else {
            return Err(complete_error("NoSuchUpload".into()));
        };
        let object = StoredObject {
            data,
            content_type: upload.content_type,
            etag: format!("\"{:x}-{}\"", md5::compute(&digests), parts.len()),
            last_modified: Utc::now(),
        };
        state.objects.insert(upload.key, object);

        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.calls.push(StoreCall::AbortMultipart {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        });

        if state.faults.abort {
            return Err(StoreError::AbortMultipart {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                upload_id: upload_id.to_string(),
                source: Self::injected("abort"),
            });
        }

        // Aborting an unknown upload is a no-op, as on S3 after a retry.
        state.uploads.remove(upload_id);
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.calls.push(StoreCall::Put {
            key: key.to_string(),
            size: body.len(),
        });

        let object = StoredObject {
            etag: etag_of(&body),
            data: body,
            content_type: content_type.to_string(),
            last_modified: Utc::now(),
        };
        state.objects.insert(key.to_string(), object);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.calls.push(StoreCall::Get {
            key: key.to_string(),
        });

        state
            .objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::Get {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source: "NoSuchKey".into(),
            })
    }

    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
        download_name: Option<&str>,
    ) -> Result<String, StoreError> {
        tokio::task::yield_now().await;
        self.state().calls.push(StoreCall::Presign {
            key: key.to_string(),
        });

        let mut url = format!(
            "memory://{}/{}?expires={}",
            self.bucket,
            crate::s3::encode_key(key),
            expires_in.as_secs()
        );
        if let Some(name) = download_name {
            url.push_str("&download=");
            url.push_str(&urlencoding::encode(name));
        }
        Ok(url)
    }

    async fn list_objects(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.calls.push(StoreCall::List {
            prefix: prefix.to_string(),
            delimiter: delimiter.map(String::from),
        });

        let list_error = |source| StoreError::List {
            bucket: self.bucket.clone(),
            prefix: prefix.to_string(),
            source,
        };

        if state.faults.listing {
            return Err(list_error("AccessDenied".into()));
        }

        let start = match continuation_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| list_error("invalid continuation token".into()))?,
            None => 0,
        };

        let mut rows = Vec::new();
        let mut seen_prefixes = BTreeSet::new();
        for (key, object) in state.objects.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            let rest = &key[prefix.len()..];
            if let Some(delimiter) = delimiter.filter(|d| !d.is_empty())
                && let Some(idx) = rest.find(delimiter)
            {
                let common = format!("{prefix}{}", &rest[..idx + delimiter.len()]);
                if seen_prefixes.insert(common.clone()) {
                    rows.push(Row::Prefix(common));
                }
                continue;
            }
            rows.push(Row::Object(ListedObject {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: Some(object.last_modified),
            }));
        }

        let end = rows.len().min(start.saturating_add(self.page_size));
        let is_truncated = end < rows.len();

        let mut page = ListPage {
            is_truncated,
            next_token: is_truncated.then(|| end.to_string()),
            ..ListPage::default()
        };
        for row in rows.into_iter().skip(start).take(end.saturating_sub(start)) {
            match row {
                Row::Object(object) => page.objects.push(object),
                Row::Prefix(common) => page.common_prefixes.push(common),
            }
        }

        Ok(page)
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.calls.push(StoreCall::Head {
            key: key.to_string(),
        });

        if state.faults.head {
            return Err(StoreError::Head {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source: "Forbidden".into(),
            });
        }

        Ok(state.objects.get(key).map(|o| ObjectMeta {
            size: o.data.len() as u64,
            etag: Some(o.etag.clone()),
            content_type: Some(o.content_type.clone()),
            last_modified: Some(o.last_modified),
        }))
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.calls.push(StoreCall::Delete {
            keys: keys.to_vec(),
        });

        if keys.len() > MAX_DELETE_BATCH {
            return Err(StoreError::Delete {
                bucket: self.bucket.clone(),
                count: keys.len(),
                source: "MalformedXML: more than 1000 keys".into(),
            });
        }

        for key in keys {
            state.objects.remove(key);
        }
        Ok(())
    }

    async fn copy_object(&self, src_key: &str, dst_key: &str) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.calls.push(StoreCall::Copy {
            src: src_key.to_string(),
            dst: dst_key.to_string(),
        });

        let Some(source) = state.objects.get(src_key) else {
            return Err(StoreError::Copy {
                bucket: self.bucket.clone(),
                src: src_key.to_string(),
                dst: dst_key.to_string(),
                source: "NoSuchKey".into(),
            });
        };

        let copy = StoredObject {
            data: source.data.clone(),
            content_type: source.content_type.clone(),
            etag: source.etag.clone(),
            last_modified: Utc::now(),
        };
        state.objects.insert(dst_key.to_string(), copy);
        Ok(())
    }
}

/// Quoted MD5 hex digest, like a single-part S3 `ETag`.
fn etag_of(data: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn paginates_listings() {
        let store = MemoryStore::new("b").with_page_size(2);
        for key in ["a/1", "a/2", "a/3", "b/1"] {
            store.insert(key, "x");
        }

        let first = store.list_objects("a/", None, None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert!(first.is_truncated);

        let second = store
            .list_objects("a/", first.next_token.as_deref(), None)
            .await
            .unwrap();
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].key, "a/3");
        assert!(!second.is_truncated);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn delimiter_listing_groups_common_prefixes() {
        let store = MemoryStore::new("b");
        for key in ["docs/", "docs/a.txt", "docs/sub/b.txt", "docs/sub/c.txt"] {
            store.insert(key, "");
        }

        let page = store.list_objects("docs/", None, Some("/")).await.unwrap();
        let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["docs/", "docs/a.txt"]);
        assert_eq!(page.common_prefixes, ["docs/sub/"]);
    }

    #[tokio::test]
    async fn multipart_objects_are_invisible_until_completed() {
        let store = MemoryStore::new("b");
        let id = store.create_multipart_upload("k", "text/plain").await.unwrap();
        let e1 = store.upload_part("k", &id, 1, b"hello ".to_vec()).await.unwrap();
        let e2 = store.upload_part("k", &id, 2, b"world".to_vec()).await.unwrap();
        assert!(!store.contains("k"));

        let out_of_order = [
            CompletedPart { part_number: 2, etag: e2.clone() },
            CompletedPart { part_number: 1, etag: e1.clone() },
        ];
        assert!(store.complete_multipart_upload("k", &id, &out_of_order).await.is_err());

        let parts = [
            CompletedPart { part_number: 1, etag: e1 },
            CompletedPart { part_number: 2, etag: e2 },
        ];
        store.complete_multipart_upload("k", &id, &parts).await.unwrap();
        assert_eq!(store.object("k").unwrap(), b"hello world");
        assert_eq!(store.content_type("k").as_deref(), Some("text/plain"));
        assert_eq!(store.open_uploads(), 0);

        let meta = store.head_object("k").await.unwrap().unwrap();
        assert!(meta.etag.unwrap().ends_with("-2\""));
    }

    #[tokio::test]
    async fn abort_discards_staged_parts() {
        let store = MemoryStore::new("b");
        let id = store.create_multipart_upload("k", "text/plain").await.unwrap();
        store.upload_part("k", &id, 1, vec![1, 2, 3]).await.unwrap();
        store.abort_multipart_upload("k", &id).await.unwrap();

        assert_eq!(store.open_uploads(), 0);
        assert!(!store.contains("k"));
    }

    #[tokio::test]
    async fn head_reports_missing_as_none() {
        let store = MemoryStore::new("b");
        assert!(store.head_object("nope").await.unwrap().is_none());

        store.fail_head(true);
        assert!(store.head_object("nope").await.is_err());
    }
}
