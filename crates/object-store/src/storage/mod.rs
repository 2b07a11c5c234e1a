//! Blob client abstraction over the remote store (S3/MinIO, local filesystem, memory).
//!
//! A [`BlobClient`] is a thin transport: it moves opaque bytes to and from a
//! single bucket and never retries. Retry policy belongs to the caller, since
//! only the caller knows whether an operation is safe to repeat.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;

use crate::config::BackendConfig;
use crate::crypto::ByteStream;
use crate::error::Result;
use crate::object_key::StorageKey;

mod object_store;
mod s3;

pub use self::object_store::ObjectStoreClient;
pub use self::s3::S3Client;

/// Lazy, finite listing of the keys in a bucket.
///
/// Not restartable: call [`BlobClient::list`] again for a fresh listing.
pub type KeyStream<'a> = BoxStream<'a, Result<StorageKey>>;

/// Transport to one bucket of a remote blob store.
///
/// Implementations must be safe to share across concurrent calls; connection
/// pooling is their own concern.
#[async_trait]
pub trait BlobClient: Send + Sync + Debug {
    /// Name of the bucket this client talks to.
    fn bucket(&self) -> &str;

    /// Store `size` bytes from `data` under `key`, replacing any existing object.
    ///
    /// Returns the number of bytes written. Fails with
    /// [`StorageError::SizeMismatch`](crate::StorageError::SizeMismatch) if the
    /// stream does not yield exactly `size` bytes; nothing is stored then.
    async fn put(&self, key: &StorageKey, data: ByteStream, size: u64) -> Result<u64>;

    /// Open the object under `key` for streaming.
    ///
    /// Fails with [`StorageError::NotFound`](crate::StorageError::NotFound)
    /// if no such object exists.
    async fn get(&self, key: &StorageKey) -> Result<ByteStream>;

    /// Remove the object under `key`. Removing a missing object succeeds.
    async fn delete(&self, key: &StorageKey) -> Result<()>;

    /// List every key in the bucket.
    fn list(&self) -> KeyStream<'_>;

    async fn bucket_exists(&self) -> Result<bool>;

    /// Create the bucket. Losing a creation race to another process is not an error.
    async fn create_bucket(&self) -> Result<()>;

    /// Remove the (empty) bucket. Removing a missing bucket succeeds.
    async fn delete_bucket(&self) -> Result<()>;
}

/// Build the blob client described by `config`.
pub async fn connect(config: &BackendConfig) -> Result<Arc<dyn BlobClient>> {
    let client: Arc<dyn BlobClient> = match config {
        BackendConfig::Memory { bucket } => Arc::new(ObjectStoreClient::memory(bucket)?),

        BackendConfig::Local { path, bucket } => {
            Arc::new(ObjectStoreClient::local(path, bucket).await?)
        }

        BackendConfig::S3 {
            endpoint,
            access_key,
            secret_key,
            bucket,
            region,
        } => Arc::new(S3Client::new(
            endpoint,
            access_key,
            secret_key,
            bucket,
            region.as_deref(),
        )?),
    };
    Ok(client)
}

/// Drain a byte stream into one contiguous buffer.
pub async fn collect(stream: ByteStream) -> Result<bytes::Bytes> {
    let frames: Vec<bytes::Bytes> = stream.try_collect().await?;
    Ok(bytes::Bytes::from(frames.concat()))
}

/// Reject bucket names that cannot address a single bucket.
pub(crate) fn validate_bucket(bucket: &str) -> Result<()> {
    if bucket.is_empty() || bucket.contains('/') {
        return Err(crate::StorageError::Configuration(format!(
            "invalid bucket name '{}'",
            bucket
        )));
    }
    Ok(())
}
