//! S3-compatible blob client (MinIO, AWS S3, Backblaze, etc.)
//!
//! Uploads stream through a bounded buffer: objects that fit in one part go
//! up as a single `PutObject` with an explicit content length, larger ones as
//! a multipart upload that is aborted on any failure.

use std::time::Instant;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream as S3ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use super::{validate_bucket, BlobClient, KeyStream};
use crate::crypto::ByteStream;
use crate::error::{Result, StorageError};
use crate::object_key::StorageKey;

/// Smallest part we upload; S3 requires at least 5 MiB for all but the last.
const MIN_PART_SIZE: u64 = 8 * 1024 * 1024;
/// S3 limits on a multipart upload.
const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;
const MAX_PARTS: u64 = 10_000;
const DEFAULT_REGION: &str = "us-east-1";
const CONTENT_TYPE: &str = "application/octet-stream";

/// [`BlobClient`] over an S3-compatible service.
#[derive(Debug, Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
    region: String,
}

impl S3Client {
    /// Create a client with static credentials and path-style addressing.
    ///
    /// # Arguments
    /// * `endpoint` - S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
    /// * `access_key` - S3 access key ID
    /// * `secret_key` - S3 secret access key
    /// * `bucket` - S3 bucket name
    /// * `region` - Optional S3 region (defaults to "us-east-1")
    pub fn new(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        region: Option<&str>,
    ) -> Result<Self> {
        validate_bucket(bucket)?;
        url::Url::parse(endpoint).map_err(|e| {
            StorageError::Configuration(format!("invalid endpoint '{}': {}", endpoint, e))
        })?;
        if access_key.is_empty() || secret_key.is_empty() {
            return Err(StorageError::Configuration(
                "missing S3 access credentials".to_string(),
            ));
        }

        let region = region.unwrap_or(DEFAULT_REGION).to_string();
        let credentials = Credentials::new(access_key, secret_key, None, None, "sealbin");
        let config = aws_sdk_s3::Config::builder()
            .endpoint_url(endpoint)
            .region(Region::new(region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .behavior_version(BehaviorVersion::latest())
            .build();

        info!(endpoint = %endpoint, bucket = %bucket, "established session to S3");
        Ok(Self::from_client(Client::from_conf(config), bucket, &region))
    }

    /// Wrap an existing SDK client.
    pub fn from_client(client: Client, bucket: &str, region: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            region: region.to_string(),
        }
    }

    async fn put_single(&self, key: &StorageKey, body: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .content_type(CONTENT_TYPE)
            .content_length(body.len() as i64)
            .body(S3ByteStream::from(body))
            .send()
            .await
            .map_err(|e| transport("PUT", e))?;
        Ok(())
    }

    /// Upload `first` and the rest of `data` as parts of a multipart upload.
    async fn put_multipart(
        &self,
        key: &StorageKey,
        first: Bytes,
        data: &mut ByteStream,
        buffer: &mut BytesMut,
        written: &mut u64,
        size: u64,
        part_size: usize,
    ) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key.as_str())
            .content_type(CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| transport("CREATE MULTIPART", e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::Transport("multipart upload without id".to_string()))?
            .to_string();

        let result = self
            .upload_parts(key, &upload_id, first, data, buffer, written, size, part_size)
            .await;

        match result {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key.as_str())
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| transport("COMPLETE MULTIPART", e))?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key.as_str())
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key = %key, error = %DisplayErrorContext(&abort), "failed to abort upload");
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_parts(
        &self,
        key: &StorageKey,
        upload_id: &str,
        first: Bytes,
        data: &mut ByteStream,
        buffer: &mut BytesMut,
        written: &mut u64,
        size: u64,
        part_size: usize,
    ) -> Result<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut part = first;
        let mut exhausted = false;

        loop {
            let part_number = parts.len() as i32 + 1;
            let output = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key.as_str())
                .upload_id(upload_id)
                .part_number(part_number)
                .content_length(part.len() as i64)
                .body(S3ByteStream::from(part))
                .send()
                .await
                .map_err(|e| transport("UPLOAD PART", e))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );

            if exhausted {
                break;
            }
            exhausted = fill_part(data, buffer, written, size, part_size).await?;
            if buffer.is_empty() {
                break;
            }
            part = buffer.split().freeze();
        }

        Ok(parts)
    }

    /// Fetch one page of the bucket listing, starting at `token`.
    async fn list_page(&self, token: Option<String>) -> Result<(Vec<StorageKey>, Option<String>)> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_continuation_token(token)
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    StorageError::NotFound(format!("bucket '{}'", self.bucket))
                } else {
                    transport("LIST", e)
                }
            })?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .map(|key| StorageKey::from(key.to_string()))
            .collect();
        let next = response.next_continuation_token().map(str::to_string);
        Ok((keys, next))
    }
}

/// Part size for an upload of `size` bytes, grown so the whole object fits
/// in [`MAX_PARTS`] parts.
fn part_size(size: u64) -> Result<usize> {
    let part = MIN_PART_SIZE.max(size.div_ceil(MAX_PARTS));
    let too_large = || StorageError::PayloadTooLarge {
        size,
        max: MAX_PART_SIZE * MAX_PARTS,
    };
    if part > MAX_PART_SIZE {
        return Err(too_large());
    }
    usize::try_from(part).map_err(|_| too_large())
}

/// Pull from `data` until `buffer` holds `part_size` bytes or the stream ends.
///
/// Returns `true` once the stream is exhausted.
async fn fill_part(
    data: &mut ByteStream,
    buffer: &mut BytesMut,
    written: &mut u64,
    size: u64,
    part_size: usize,
) -> Result<bool> {
    while buffer.len() < part_size {
        match data.try_next().await? {
            Some(chunk) => {
                *written += chunk.len() as u64;
                if *written > size {
                    return Err(StorageError::SizeMismatch {
                        expected: size,
                        actual: *written,
                    });
                }
                buffer.extend_from_slice(&chunk);
            }
            None => {
                if *written != size {
                    return Err(StorageError::SizeMismatch {
                        expected: size,
                        actual: *written,
                    });
                }
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[async_trait]
impl BlobClient for S3Client {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &StorageKey, mut data: ByteStream, size: u64) -> Result<u64> {
        let start = Instant::now();
        let part_size = part_size(size)?;
        let mut buffer = BytesMut::with_capacity(part_size.min(size as usize));
        let mut written: u64 = 0;

        let done = fill_part(&mut data, &mut buffer, &mut written, size, part_size).await?;
        let first = buffer.split().freeze();

        if done {
            self.put_single(key, first).await?;
        } else {
            self.put_multipart(
                key,
                first,
                &mut data,
                &mut buffer,
                &mut written,
                size,
                part_size,
            )
            .await?;
        }

        debug!(
            key = %key,
            bytes = written,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "uploaded object"
        );
        Ok(written)
    }

    async fn get(&self, key: &StorageKey) -> Result<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    StorageError::NotFound(key.to_string())
                } else {
                    transport("GET", e)
                }
            })?;

        let body = futures::stream::try_unfold(output.body, |mut body| async move {
            match body.try_next().await {
                Ok(Some(bytes)) => Ok(Some((bytes, body))),
                Ok(None) => Ok(None),
                Err(e) => Err(StorageError::Transport(format!(
                    "failed to read body: {}",
                    DisplayErrorContext(&e)
                ))),
            }
        });
        Ok(body.boxed())
    }

    async fn delete(&self, key: &StorageKey) -> Result<()> {
        // S3 delete is already idempotent; some gateways still answer 404
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(transport("DELETE", e)),
        }
    }

    fn list(&self) -> KeyStream<'_> {
        // State is the next page to fetch; `None` once the last page is in.
        let first: Option<Option<String>> = Some(None);
        futures::stream::try_unfold(first, move |page| async move {
            let Some(token) = page else {
                return Ok::<_, StorageError>(None);
            };
            let (keys, next) = self.list_page(token).await?;
            let keys = futures::stream::iter(keys.into_iter().map(Ok::<_, StorageError>));
            Ok(Some((keys, next.map(Some))))
        })
        .try_flatten()
        .boxed()
    }

    async fn bucket_exists(&self) -> Result<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(transport("HEAD BUCKET", e)),
        }
    }

    async fn create_bucket(&self) -> Result<()> {
        let start = Instant::now();
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                debug!(
                    bucket = %self.bucket,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "bucket created"
                );
                Ok(())
            }
            Err(e) => {
                // Another process may have won the race to create it
                if self.bucket_exists().await? {
                    debug!(bucket = %self.bucket, "bucket already exists");
                    Ok(())
                } else {
                    Err(transport("CREATE BUCKET", e))
                }
            }
        }
    }

    async fn delete_bucket(&self) -> Result<()> {
        match self.client.delete_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!(bucket = %self.bucket, "removed bucket");
                Ok(())
            }
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(transport("DELETE BUCKET", e)),
        }
    }
}

fn transport<E>(operation: &str, err: SdkError<E>) -> StorageError
where
    E: std::error::Error + 'static,
{
    StorageError::Transport(format!(
        "S3 {} failed: {}",
        operation,
        DisplayErrorContext(&err)
    ))
}

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    matches!(err, SdkError::ServiceError(e) if e.raw().status().as_u16() == 404)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_of(pieces: Vec<usize>) -> ByteStream {
        let frames: Vec<Result<Bytes>> = pieces
            .into_iter()
            .map(|len| Ok(Bytes::from(vec![7u8; len])))
            .collect();
        futures::stream::iter(frames).boxed()
    }

    #[tokio::test]
    async fn test_new_validates_configuration() {
        assert!(S3Client::new("http://localhost:9000", "ak", "sk", "bucket", None).is_ok());

        for (endpoint, access, secret, bucket) in [
            ("not a url", "ak", "sk", "bucket"),
            ("http://localhost:9000", "", "sk", "bucket"),
            ("http://localhost:9000", "ak", "", "bucket"),
            ("http://localhost:9000", "ak", "sk", ""),
            ("http://localhost:9000", "ak", "sk", "a/b"),
        ] {
            assert!(matches!(
                S3Client::new(endpoint, access, secret, bucket, None),
                Err(StorageError::Configuration(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_region_defaults() {
        let client = S3Client::new("http://localhost:9000", "ak", "sk", "b", None).unwrap();
        assert_eq!(client.region, DEFAULT_REGION);
        assert_eq!(client.bucket(), "b");

        let client =
            S3Client::new("http://localhost:9000", "ak", "sk", "b", Some("eu-west-1")).unwrap();
        assert_eq!(client.region, "eu-west-1");
    }

    #[test]
    fn test_part_size() {
        const MIB: u64 = 1024 * 1024;
        const GIB: u64 = 1024 * MIB;

        assert_eq!(part_size(0).unwrap() as u64, MIN_PART_SIZE);
        assert_eq!(part_size(MIN_PART_SIZE * MAX_PARTS).unwrap() as u64, MIN_PART_SIZE);
        assert_eq!(part_size(MIN_PART_SIZE * MAX_PARTS + 1).unwrap() as u64, MIN_PART_SIZE + 1);

        // Objects past the fixed-part ceiling still fit in MAX_PARTS parts
        for size in [100 * GIB, 1024 * GIB, MAX_PART_SIZE * MAX_PARTS] {
            let part = part_size(size).unwrap() as u64;
            assert!(part <= MAX_PART_SIZE);
            assert!(part * MAX_PARTS >= size);
        }

        assert!(matches!(
            part_size(MAX_PART_SIZE * MAX_PARTS + 1),
            Err(StorageError::PayloadTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_fill_part_small_object_fits_one_part() {
        let mut data = stream_of(vec![10, 20, 30]);
        let mut buffer = BytesMut::new();
        let mut written = 0;

        let done = fill_part(&mut data, &mut buffer, &mut written, 60, 1024).await.unwrap();
        assert!(done);
        assert_eq!(buffer.len(), 60);
        assert_eq!(written, 60);
    }

    #[tokio::test]
    async fn test_fill_part_stops_at_part_size() {
        let part = 4096;
        let mut data = stream_of(vec![part / 2, part / 2, 1]);
        let mut buffer = BytesMut::new();
        let mut written = 0;
        let size = part as u64 + 1;

        let done = fill_part(&mut data, &mut buffer, &mut written, size, part)
            .await
            .unwrap();
        assert!(!done);
        assert_eq!(buffer.len(), part);

        buffer.clear();
        let done = fill_part(&mut data, &mut buffer, &mut written, size, part)
            .await
            .unwrap();
        assert!(done);
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_fill_part_checks_declared_size() {
        let mut buffer = BytesMut::new();
        let mut written = 0;
        let err = fill_part(&mut stream_of(vec![5]), &mut buffer, &mut written, 10, 1024)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::SizeMismatch {
                expected: 10,
                actual: 5
            }
        ));

        let mut buffer = BytesMut::new();
        let mut written = 0;
        let err = fill_part(&mut stream_of(vec![5, 6]), &mut buffer, &mut written, 10, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SizeMismatch { actual: 11, .. }));
    }
}
