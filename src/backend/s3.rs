//! S3 backend
//!
//! Implements the multipart protocol with `aws-sdk-s3`. Works against AWS
//! and S3-compatible stores (MinIO, RustFS) when an endpoint is configured.
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | CreateMultipartUpload | `s3.create_multipart_upload` | bucket, key, upload_id |
//! | UploadPart | `s3.upload_part` | bucket, upload_id, part_number, bytes, etag |
//! | CompleteMultipartUpload | `s3.complete_multipart_upload` | bucket, upload_id, parts_count |
//! | AbortMultipartUpload | `s3.abort_multipart_upload` | bucket, upload_id |

use super::{BackendError, CompletedPart, MultipartBackend, ObjectStore};
use crate::config::S3Config;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::time::Duration;

/// S3 backend for one bucket
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl S3Backend {
    /// Build a client from configuration
    ///
    /// Static credentials are used when both keys are configured; otherwise
    /// the default AWS provider chain (environment, profile, IMDS) applies.
    /// A custom endpoint switches to path-style addressing.
    pub async fn connect(config: &S3Config) -> Result<Self, BackendError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(config.timeout_seconds))
                    .build(),
            )
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts));

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "upload-bench-config",
            ));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint.is_some())
            .build();

        tracing::info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = ?config.endpoint,
            "Configured S3 backend"
        );

        Ok(Self::from_client(Client::from_conf(s3_config), &config.bucket))
    }

    /// Wrap an existing client
    pub fn from_client(client: Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn request_error<E>(operation: &str, err: E) -> BackendError
where
    E: std::error::Error + 'static,
{
    BackendError::Request(format!("{} failed: {}", operation, DisplayErrorContext(err)))
}

fn sdk_part_number(part_number: u32) -> Result<i32, BackendError> {
    i32::try_from(part_number).map_err(|_| BackendError::InvalidPart {
        part_number,
        reason: "part number out of range".into(),
    })
}

#[async_trait::async_trait]
impl MultipartBackend for S3Backend {
    #[tracing::instrument(
        name = "s3.create_multipart_upload",
        skip(self),
        fields(
            s3.bucket = %self.bucket,
            s3.key = %key,
            s3.upload_id = tracing::field::Empty
        ),
        err
    )]
    async fn initiate_upload(&self, key: &str) -> Result<String, BackendError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| request_error("CreateMultipartUpload", e))?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| BackendError::Request("CreateMultipartUpload returned no upload id".into()))?
            .to_string();

        tracing::Span::current().record("s3.upload_id", upload_id.as_str());
        Ok(upload_id)
    }

    #[tracing::instrument(
        name = "s3.upload_part",
        skip(self, data),
        fields(
            s3.bucket = %self.bucket,
            s3.upload_id = %session_id,
            s3.part_number = part_number,
            upload.bytes = data.len(),
            upload.is_final = is_final,
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    async fn upload_part(
        &self,
        session_id: &str,
        key: &str,
        part_number: u32,
        data: Bytes,
        is_final: bool,
    ) -> Result<String, BackendError> {
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(session_id)
            .part_number(sdk_part_number(part_number)?)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| request_error("UploadPart", e))?;

        let etag = output
            .e_tag()
            .ok_or_else(|| BackendError::InvalidPart {
                part_number,
                reason: "UploadPart returned no ETag".into(),
            })?
            .to_string();

        tracing::Span::current().record("s3.etag", etag.as_str());
        Ok(etag)
    }

    #[tracing::instrument(
        name = "s3.complete_multipart_upload",
        skip(self, parts),
        fields(
            s3.bucket = %self.bucket,
            s3.upload_id = %session_id,
            parts_count = parts.len()
        ),
        err
    )]
    async fn complete_upload(
        &self,
        session_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> Result<String, BackendError> {
        let mut completed = Vec::with_capacity(parts.len());
        for part in parts {
            completed.push(
                S3CompletedPart::builder()
                    .part_number(sdk_part_number(part.part_number)?)
                    .e_tag(&part.ack_token)
                    .build(),
            );
        }

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(session_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| request_error("CompleteMultipartUpload", e))?;

        Ok(output
            .location()
            .map(str::to_string)
            .unwrap_or_else(|| format!("s3://{}/{}", self.bucket, key)))
    }

    #[tracing::instrument(
        name = "s3.abort_multipart_upload",
        skip(self),
        fields(s3.bucket = %self.bucket, s3.upload_id = %session_id),
        err
    )]
    async fn abort_upload(&self, session_id: &str, key: &str) -> Result<(), BackendError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(session_id)
            .send()
            .await
            .map_err(|e| request_error("AbortMultipartUpload", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3Backend {
    #[tracing::instrument(name = "s3.get_object", skip(self), fields(s3.bucket = %self.bucket), err)]
    async fn get_object(&self, key: &str) -> Result<Bytes, BackendError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if e.as_service_error().map_or(false, |se| se.is_no_such_key()) => {
                return Err(BackendError::NoSuchKey(key.to_string()))
            }
            Err(e) => return Err(request_error("GetObject", e)),
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| request_error("GetObject body", e))?;
        Ok(body.into_bytes())
    }

    #[tracing::instrument(name = "s3.delete_object", skip(self), fields(s3.bucket = %self.bucket), err)]
    async fn delete_object(&self, key: &str) -> Result<(), BackendError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| request_error("DeleteObject", e))?;
        Ok(())
    }
}
