//! `aws-sdk-s3` implementation of [`ObjectStore`].
//!
//! Works against any S3-compatible endpoint (AWS, R2, `MinIO`, ...) using
//! path-style addressing and static credentials from a
//! [`ConnectionProfile`].

use std::time::Duration;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, Delete, ObjectIdentifier};
use bucket_browser_store_models::{CompletedPart, ListPage, ListedObject, ObjectMeta};
use chrono::{DateTime, Utc};

use crate::profile::ConnectionProfile;
use crate::{ObjectStore, StoreError};

/// Object store backed by an `aws_sdk_s3::Client` bound to one bucket.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    /// Builds a client for the given profile.
    ///
    /// No network call is made; credentials are validated lazily by the
    /// first request.
    #[must_use]
    pub fn connect(profile: &ConnectionProfile) -> Self {
        let creds = Credentials::new(
            &profile.access_key,
            &profile.secret_key,
            None,
            None,
            "bucket-browser-profile",
        );

        let config = aws_sdk_s3::Config::builder()
            .endpoint_url(&profile.endpoint)
            .region(Region::new(profile.region.clone()))
            .credentials_provider(creds)
            .force_path_style(true)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .build();

        log::debug!(
            "Connected profile {} ({})",
            profile.name,
            profile.endpoint
        );

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
            bucket: profile.name.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::CreateMultipart {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source: Box::new(e),
            })?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StoreError::CreateMultipart {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source: "response did not include an upload id".into(),
            })
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Vec<u8>,
    ) -> Result<String, StoreError> {
        let part_error = |source: crate::BoxError| StoreError::UploadPart {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            part_number,
            source,
        };

        let sdk_part_number =
            i32::try_from(part_number).map_err(|e| part_error(Box::new(e)))?;

        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(sdk_part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| part_error(Box::new(e)))?;

        output
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| part_error("response did not include an ETag".into()))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StoreError> {
        let complete_error = |source: crate::BoxError| StoreError::CompleteMultipart {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            source,
        };

        let mut sdk_parts = Vec::with_capacity(parts.len());
        for part in parts {
            let part_number =
                i32::try_from(part.part_number).map_err(|e| complete_error(Box::new(e)))?;
            sdk_parts.push(
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(&part.etag)
                    .build(),
            );
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(sdk_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| complete_error(Box::new(e)))?;

        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), StoreError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| StoreError::AbortMultipart {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                upload_id: upload_id.to_string(),
                source: Box::new(e),
            })?;

        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::Put {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source: Box::new(e),
            })?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let get_error = |source: crate::BoxError| StoreError::Get {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            source,
        };

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| get_error(Box::new(e)))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| get_error(Box::new(e)))?;

        Ok(bytes.into_bytes().to_vec())
    }

    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
        download_name: Option<&str>,
    ) -> Result<String, StoreError> {
        let presign_error = |source: crate::BoxError| StoreError::Presign {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            source,
        };

        let config = PresigningConfig::expires_in(expires_in).map_err(|e| presign_error(Box::new(e)))?;
        let disposition =
            download_name.map(|name| format!("attachment; filename=\"{}\"", encode_filename(name)));

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_response_content_disposition(disposition)
            .presigned(config)
            .await
            .map_err(|e| presign_error(Box::new(e)))?;

        Ok(request.uri().to_string())
    }

    async fn list_objects(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        log::trace!("Listing s3://{}/{prefix}* (token={continuation_token:?})", self.bucket);

        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_continuation_token(continuation_token.map(String::from))
            .set_delimiter(delimiter.map(String::from))
            .send()
            .await
            .map_err(|e| StoreError::List {
                bucket: self.bucket.clone(),
                prefix: prefix.to_string(),
                source: Box::new(e),
            })?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?.to_string();
                #[allow(clippy::cast_sign_loss)] // S3 sizes are non-negative
                let size = obj.size().unwrap_or(0).max(0) as u64;
                Some(ListedObject {
                    key,
                    size,
                    last_modified: obj.last_modified().and_then(to_chrono),
                })
            })
            .collect();

        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        Ok(ListPage {
            objects,
            common_prefixes,
            is_truncated: output.is_truncated() == Some(true),
            next_token: output.next_continuation_token().map(String::from),
        })
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                #[allow(clippy::cast_sign_loss)] // S3 content-length is non-negative
                let size = output.content_length().unwrap_or(0).max(0) as u64;
                Ok(Some(ObjectMeta {
                    size,
                    etag: output.e_tag().map(str::to_string),
                    content_type: output.content_type().map(str::to_string),
                    last_modified: output.last_modified().and_then(to_chrono),
                }))
            }
            Err(err) => {
                // A missing object is a clean "not found"
                let service_err = err.as_service_error();
                if service_err
                    .is_some_and(aws_sdk_s3::operation::head_object::HeadObjectError::is_not_found)
                {
                    return Ok(None);
                }
                Err(StoreError::Head {
                    bucket: self.bucket.clone(),
                    key: key.to_string(),
                    source: Box::new(err),
                })
            }
        }
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }

        let delete_error = |source: crate::BoxError| StoreError::Delete {
            bucket: self.bucket.clone(),
            count: keys.len(),
            source,
        };

        let mut identifiers = Vec::with_capacity(keys.len());
        for key in keys {
            identifiers.push(
                ObjectIdentifier::builder()
                    .key(key)
                    .build()
                    .map_err(|e| delete_error(Box::new(e)))?,
            );
        }

        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(|e| delete_error(Box::new(e)))?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| delete_error(Box::new(e)))?;

        if let Some(first) = output.errors().first() {
            return Err(delete_error(
                format!(
                    "{} key(s) not deleted, first: {} ({})",
                    output.errors().len(),
                    first.key().unwrap_or_default(),
                    first.message().unwrap_or("no message"),
                )
                .into(),
            ));
        }

        Ok(())
    }

    async fn copy_object(&self, src_key: &str, dst_key: &str) -> Result<(), StoreError> {
        let copy_source = format!("{}/{}", self.bucket, encode_key(src_key));

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source)
            .key(dst_key)
            .send()
            .await
            .map_err(|e| StoreError::Copy {
                bucket: self.bucket.clone(),
                src: src_key.to_string(),
                dst: dst_key.to_string(),
                source: Box::new(e),
            })?;

        Ok(())
    }
}

/// URL-encodes each `/`-separated segment of a key, keeping the slashes.
#[must_use]
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Encodes a download file name for a `Content-Disposition` header.
/// Spaces are kept readable.
fn encode_filename(name: &str) -> String {
    urlencoding::encode(name).replace("%20", " ")
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}
