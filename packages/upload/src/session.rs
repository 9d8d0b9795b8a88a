//! One multipart upload session.
//!
//! A session is opened against one key and ends exactly once, through
//! [`MultipartSession::complete`] or [`MultipartSession::abort`]. Both
//! consume the session. A session dropped without either is logged with
//! its upload id so the staged parts can be cleaned up out of band.

use std::sync::{Mutex, PoisonError};

use bucket_browser_store::ObjectStore;
use bucket_browser_store::StoreError;
use bucket_browser_store_models::CompletedPart;

/// An open multipart session and the parts confirmed so far.
pub struct MultipartSession<'a> {
    store: &'a dyn ObjectStore,
    key: String,
    upload_id: String,
    parts: Mutex<Vec<CompletedPart>>,
    ended: bool,
}

/// A completion attempt that failed. The session is still open.
pub struct Incomplete<'a> {
    pub session: MultipartSession<'a>,
    pub error: StoreError,
}

impl<'a> MultipartSession<'a> {
    /// Opens a session for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CreateMultipart`] if the store refuses.
    pub async fn open(
        store: &'a dyn ObjectStore,
        key: &str,
        content_type: &str,
    ) -> Result<Self, StoreError> {
        let upload_id = store.create_multipart_upload(key, content_type).await?;
        log::debug!("Opened multipart upload {upload_id} for {key}");

        Ok(Self {
            store,
            key: key.to_string(),
            upload_id,
            parts: Mutex::new(Vec::new()),
            ended: false,
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// Number of parts confirmed so far.
    #[must_use]
    pub fn part_count(&self) -> usize {
        self.parts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Uploads one part and records its `ETag`.
    ///
    /// Safe to call from several workers at once; parts may be confirmed
    /// in any order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UploadPart`] if the store rejects the part.
    pub async fn upload_part(&self, part_number: u32, body: Vec<u8>) -> Result<(), StoreError> {
        let etag = self
            .store
            .upload_part(&self.key, &self.upload_id, part_number, body)
            .await?;

        self.parts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CompletedPart { part_number, etag });
        Ok(())
    }

    /// Finalizes the object from the recorded parts, sorted by part
    /// number. Returns the number of parts.
    ///
    /// # Errors
    ///
    /// Returns the still-open session alongside the store error, so the
    /// caller can abort it.
    pub async fn complete(mut self) -> Result<usize, Incomplete<'a>> {
        let mut parts = std::mem::take(self.parts.get_mut().unwrap_or_else(PoisonError::into_inner));
        parts.sort_by_key(|p| p.part_number);

        match self
            .store
            .complete_multipart_upload(&self.key, &self.upload_id, &parts)
            .await
        {
            Ok(()) => {
                self.ended = true;
                log::debug!("Completed multipart upload {} ({} parts)", self.upload_id, parts.len());
                Ok(parts.len())
            }
            Err(error) => {
                *self.parts.get_mut().unwrap_or_else(PoisonError::into_inner) = parts;
                Err(Incomplete {
                    session: self,
                    error,
                })
            }
        }
    }

    /// Discards the session and every staged part.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AbortMultipart`] (which carries the upload id)
    /// if the store refuses. The session is considered ended either way.
    pub async fn abort(mut self) -> Result<(), StoreError> {
        self.ended = true;
        self.store
            .abort_multipart_upload(&self.key, &self.upload_id)
            .await?;
        log::debug!("Aborted multipart upload {} for {}", self.upload_id, self.key);
        Ok(())
    }
}

impl Drop for MultipartSession<'_> {
    fn drop(&mut self) {
        if !self.ended {
            log::warn!(
                "Multipart upload {} for {} was dropped while open; its parts need cleanup",
                self.upload_id,
                self.key
            );
        }
    }
}
