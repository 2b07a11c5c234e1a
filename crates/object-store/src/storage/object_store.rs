//! Blob client backed by the `object_store` crate (in-memory or local filesystem).
//!
//! Both backends keep every bucket under one root store, as a top-level path
//! prefix. A local bucket exists while its directory does; an in-memory bucket
//! is a flag on the client.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, WriteMultipart};
use tracing::{debug, info, warn};

use super::{validate_bucket, BlobClient, KeyStream};
use crate::crypto::ByteStream;
use crate::error::{Result, StorageError};
use crate::object_key::StorageKey;

/// Parts buffered ahead of the upload before the writer applies backpressure.
const MAX_CONCURRENT_PARTS: usize = 2;

#[derive(Debug)]
enum Backend {
    Memory { exists: AtomicBool },
    Local { root: PathBuf },
}

/// [`BlobClient`] over an in-memory or local-filesystem `object_store`.
#[derive(Debug)]
pub struct ObjectStoreClient {
    inner: Arc<dyn ObjectStore>,
    backend: Backend,
    bucket: String,
    prefix: ObjectPath,
}

impl ObjectStoreClient {
    /// In-memory store (for testing). The bucket starts out missing.
    pub fn memory(bucket: &str) -> Result<Self> {
        validate_bucket(bucket)?;
        Ok(Self {
            inner: Arc::new(InMemory::new()),
            backend: Backend::Memory {
                exists: AtomicBool::new(false),
            },
            bucket: bucket.to_string(),
            prefix: ObjectPath::from(bucket),
        })
    }

    /// Local filesystem store rooted at `path`; the bucket lives at `path/bucket`.
    pub async fn local(path: &Path, bucket: &str) -> Result<Self> {
        validate_bucket(bucket)?;
        tokio::fs::create_dir_all(path).await?;
        let store = LocalFileSystem::new_with_prefix(path)
            .map_err(|e| StorageError::Configuration(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(store),
            backend: Backend::Local {
                root: path.join(bucket),
            },
            bucket: bucket.to_string(),
            prefix: ObjectPath::from(bucket),
        })
    }

    fn object_path(&self, key: &StorageKey) -> ObjectPath {
        ObjectPath::from(format!("{}/{}", self.bucket, key))
    }

    fn storage_key(&self, location: &ObjectPath) -> Result<StorageKey> {
        let location = location.as_ref();
        location
            .strip_prefix(self.bucket.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|key| StorageKey::from(key.to_string()))
            .ok_or_else(|| {
                StorageError::Transport(format!("listed object outside bucket: {}", location))
            })
    }

    async fn ensure_bucket(&self) -> Result<()> {
        if self.bucket_exists().await? {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("bucket '{}'", self.bucket)))
        }
    }
}

#[async_trait]
impl BlobClient for ObjectStoreClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &StorageKey, mut data: ByteStream, size: u64) -> Result<u64> {
        self.ensure_bucket().await?;

        let path = self.object_path(key);
        let upload = self.inner.put_multipart(&path).await?;
        let mut writer = WriteMultipart::new(upload);
        let mut written: u64 = 0;

        loop {
            let chunk = match data.try_next().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => return Err(abort(writer, e).await),
            };

            written += chunk.len() as u64;
            if written > size {
                let e = StorageError::SizeMismatch {
                    expected: size,
                    actual: written,
                };
                return Err(abort(writer, e).await);
            }

            if let Err(e) = writer.wait_for_capacity(MAX_CONCURRENT_PARTS).await {
                return Err(abort(writer, e.into()).await);
            }
            writer.write(&chunk);
        }

        if written != size {
            let e = StorageError::SizeMismatch {
                expected: size,
                actual: written,
            };
            return Err(abort(writer, e).await);
        }

        writer.finish().await?;
        debug!(key = %key, bytes = written, "stored object");
        Ok(written)
    }

    async fn get(&self, key: &StorageKey) -> Result<ByteStream> {
        self.ensure_bucket().await?;

        let path = self.object_path(key);
        let result = self.inner.get(&path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => StorageError::NotFound(key.to_string()),
            e => e.into(),
        })?;
        Ok(result.into_stream().map_err(StorageError::from).boxed())
    }

    async fn delete(&self, key: &StorageKey) -> Result<()> {
        let path = self.object_path(key);
        // The object may already be gone
        match self.inner.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> KeyStream<'_> {
        futures::stream::once(self.ensure_bucket())
            .map_ok(move |()| {
                self.inner
                    .list(Some(&self.prefix))
                    .map(move |meta| self.storage_key(&meta?.location))
            })
            .try_flatten()
            .boxed()
    }

    async fn bucket_exists(&self) -> Result<bool> {
        match &self.backend {
            Backend::Memory { exists } => Ok(exists.load(Ordering::Acquire)),
            Backend::Local { root } => Ok(tokio::fs::try_exists(root).await?),
        }
    }

    async fn create_bucket(&self) -> Result<()> {
        match &self.backend {
            Backend::Memory { exists } => exists.store(true, Ordering::Release),
            Backend::Local { root } => tokio::fs::create_dir_all(root).await?,
        }
        debug!(bucket = %self.bucket, "bucket directory ready");
        Ok(())
    }

    async fn delete_bucket(&self) -> Result<()> {
        if !self.bucket_exists().await? {
            return Ok(());
        }

        let mut objects = self.inner.list(Some(&self.prefix));
        if objects.try_next().await?.is_some() {
            return Err(StorageError::Transport(format!(
                "bucket '{}' is not empty",
                self.bucket
            )));
        }
        drop(objects);

        match &self.backend {
            Backend::Memory { exists } => exists.store(false, Ordering::Release),
            Backend::Local { root } => match tokio::fs::remove_dir_all(root).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        info!(bucket = %self.bucket, "removed bucket");
        Ok(())
    }
}

/// Abort a multipart upload after `err`, keeping `err` as the reported cause.
async fn abort(writer: WriteMultipart, err: StorageError) -> StorageError {
    if let Err(e) = writer.abort().await {
        warn!(error = %e, "failed to abort upload");
    }
    err
}
