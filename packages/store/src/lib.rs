#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! S3-compatible object store client for the bucket browser.
//!
//! The [`ObjectStore`] trait is the whole capability surface the rest of
//! the system consumes: multipart upload primitives, single-shot puts and
//! gets, paginated listings, `HEAD` probes, copies, and batch deletes.
//! [`s3::S3Store`] implements it on top of `aws-sdk-s3`; the `memory`
//! feature adds [`memory::MemoryStore`] for tests and dry runs.
//!
//! Everything that needs a store goes through a [`ConnectionSlot`], which
//! fails fast with [`StoreError::NotConnected`] when no profile has been
//! connected yet.
//!
//! # Environment Variables
//!
//! Used only when no profile file exists (see [`profile`]).
//!
//! | Variable | Required | Description |
//! |---|---|---|
//! | `BUCKET_BROWSER_BUCKET` | Yes | Bucket name |
//! | `BUCKET_BROWSER_ENDPOINT` | Yes | S3-compatible endpoint URL |
//! | `BUCKET_BROWSER_ACCESS_KEY_ID` | Yes | Access key |
//! | `BUCKET_BROWSER_SECRET_ACCESS_KEY` | Yes | Secret key |
//! | `BUCKET_BROWSER_REGION` | No | Region (default `auto`) |
//! | `BUCKET_BROWSER_PUBLIC_URL` | No | Public base URL for previews |

pub mod browse;
pub mod connection;
pub mod exists;
pub mod manage;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod preview;
pub mod profile;
pub mod s3;
pub mod transfer;

use std::time::Duration;

use async_trait::async_trait;
use bucket_browser_store_models::{CompletedPart, ListPage, ObjectMeta};

pub use bucket_browser_store_models as models;
pub use connection::ConnectionSlot;

/// Boxed error from the underlying SDK or transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No store connection has been established.
    #[error("Store connection is not initialized")]
    NotConnected,

    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: String,
    },

    /// Invalid or incomplete connection profile configuration.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of what is wrong.
        message: String,
    },

    /// A caller-supplied argument was rejected before any remote call.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of what is wrong.
        message: String,
    },

    /// S3 `CreateMultipartUpload` failed.
    #[error("Failed to start multipart upload for s3://{bucket}/{key}: {source}")]
    CreateMultipart {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// S3 `UploadPart` failed.
    #[error("Failed to upload part {part_number} of s3://{bucket}/{key}: {source}")]
    UploadPart {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// 1-based part number.
        part_number: u32,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// S3 `CompleteMultipartUpload` failed.
    #[error("Failed to complete multipart upload for s3://{bucket}/{key}: {source}")]
    CompleteMultipart {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// S3 `AbortMultipartUpload` failed.
    #[error("Failed to abort multipart upload {upload_id} for s3://{bucket}/{key}: {source}")]
    AbortMultipart {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Upload id left open on the store.
        upload_id: String,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// S3 `PutObject` failed.
    #[error("Failed to upload s3://{bucket}/{key}: {source}")]
    Put {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// S3 `GetObject` failed.
    #[error("Failed to download s3://{bucket}/{key}: {source}")]
    Get {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// Presigning a `GetObject` request failed.
    #[error("Failed to presign s3://{bucket}/{key}: {source}")]
    Presign {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// S3 `ListObjectsV2` failed.
    #[error("Failed to list s3://{bucket}/{prefix}: {source}")]
    List {
        /// Bucket name.
        bucket: String,
        /// Key prefix.
        prefix: String,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// S3 `HeadObject` failed with something other than `NotFound`.
    #[error("Failed to head s3://{bucket}/{key}: {source}")]
    Head {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// S3 `DeleteObjects` failed.
    #[error("Failed to delete {count} object(s) from s3://{bucket}: {source}")]
    Delete {
        /// Bucket name.
        bucket: String,
        /// Number of keys in the failed batch.
        count: usize,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// S3 `CopyObject` failed.
    #[error("Failed to copy s3://{bucket}/{src} to {dst}: {source}")]
    Copy {
        /// Bucket name.
        bucket: String,
        /// Source key.
        src: String,
        /// Destination key.
        dst: String,
        /// Underlying SDK error.
        source: BoxError,
    },

    /// I/O error reading or writing local files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Profile file could not be parsed.
    #[error("Profile parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// The object store capability consumed by the browser and the upload
/// pipeline.
///
/// Every method is a single remote call (a suspension point). The store is
/// bound to one bucket for its whole lifetime.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the bucket this store operates on.
    fn bucket(&self) -> &str;

    /// Opens a multipart session and returns its upload id.
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StoreError>;

    /// Uploads one part and returns its `ETag`.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Vec<u8>,
    ) -> Result<String, StoreError>;

    /// Finalizes a multipart session. `parts` must be in ascending
    /// part-number order.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StoreError>;

    /// Discards a multipart session and every part staged under it.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), StoreError>;

    /// Writes a whole object in one request.
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError>;

    /// Reads a whole object.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Returns a time-limited URL for reading `key`. When `download_name`
    /// is set the response is served as an attachment with that name.
    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
        download_name: Option<&str>,
    ) -> Result<String, StoreError>;

    /// Fetches one listing page under `prefix`.
    async fn list_objects(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListPage, StoreError>;

    /// Fetches object metadata. Returns `None` if the object does not
    /// exist.
    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError>;

    /// Deletes up to 1000 keys in one request.
    async fn delete_objects(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Server-side copy within the bucket.
    async fn copy_object(&self, src_key: &str, dst_key: &str) -> Result<(), StoreError>;
}
