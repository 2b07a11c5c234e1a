//! StorageAdapter - encrypted, content-addressed object storage over a [`BlobClient`].
//!
//! Every object is sealed under its own key, derived from the master secret
//! and a fresh random nonce, and stored at an opaque key computed from its
//! logical `(container, filename)` pair. The caller keeps the nonce.
//!
//! The adapter starts [`AdapterState::Uninitialized`]; [`StorageAdapter::init`]
//! checks for (or creates) the bucket and moves it to [`AdapterState::Ready`].
//! Put, Get and Delete fail with [`StorageError::NotInitialized`] before that.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::crypto::{decrypt_stream, derive_key, encrypt_stream, ByteStream, MasterSecret, Nonce};
use crate::error::{Result, StorageError};
use crate::object_key::{map_key, StorageKey};
use crate::record::ObjectRecord;
use crate::storage::{self, BlobClient, KeyStream};

/// How initialization found the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    Existing,
    Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Uninitialized,
    Ready(BucketStatus),
}

/// Encrypted object storage over one bucket.
///
/// Cheap to share behind an `Arc`: every operation takes `&self` and the only
/// shared state is the immutable master secret and the transport handle.
#[derive(Debug)]
pub struct StorageAdapter {
    client: Arc<dyn BlobClient>,
    secret: MasterSecret,
    state: AdapterState,
}

impl StorageAdapter {
    /// Create an uninitialized adapter over `client`.
    pub fn new(client: Arc<dyn BlobClient>, secret: MasterSecret) -> Self {
        Self {
            client,
            secret,
            state: AdapterState::Uninitialized,
        }
    }

    /// Build the client described by `config` and initialize the bucket.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let secret = config.master_secret()?;
        let client = storage::connect(&config.backend).await?;
        info!(bucket = %client.bucket(), "storage session established");

        let mut adapter = Self::new(client, secret);
        adapter.init().await?;
        Ok(adapter)
    }

    /// Make sure the bucket exists, creating it if needed.
    ///
    /// Idempotent: once ready, later calls return the original status without
    /// touching the remote store.
    pub async fn init(&mut self) -> Result<BucketStatus> {
        if let AdapterState::Ready(status) = self.state {
            return Ok(status);
        }

        let start = Instant::now();
        let bucket = self.client.bucket().to_string();
        let status = if self.client.bucket_exists().await? {
            info!(
                bucket = %bucket,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "found bucket"
            );
            BucketStatus::Existing
        } else {
            self.client.create_bucket().await?;
            info!(
                bucket = %bucket,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "created bucket"
            );
            BucketStatus::Created
        };

        self.state = AdapterState::Ready(status);
        Ok(status)
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, AdapterState::Ready(_))
    }

    pub fn client(&self) -> &Arc<dyn BlobClient> {
        &self.client
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            AdapterState::Ready(_) => Ok(()),
            AdapterState::Uninitialized => Err(StorageError::NotInitialized),
        }
    }

    /// Encrypt and upload `size` bytes of `plaintext` as `(container, filename)`.
    ///
    /// Returns the object's nonce. Persist it: the object cannot be read
    /// without it. An existing object under the same name is replaced.
    pub async fn put<S, E>(
        &self,
        container: &str,
        filename: &str,
        plaintext: S,
        size: u64,
    ) -> Result<Nonce>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Into<StorageError> + 'static,
    {
        self.ensure_ready()?;
        let start = Instant::now();

        let nonce = Nonce::generate()?;
        let key = derive_key(&self.secret, &nonce)?;
        let storage_key = map_key(container, filename);

        let (ciphertext, ciphertext_size) = encrypt_stream(plaintext, &key, size)?;
        debug!(key = %storage_key, bytes = size, ciphertext_size, "uploading object");

        let written = self
            .client
            .put(&storage_key, ciphertext, ciphertext_size)
            .await?;

        info!(
            key = %storage_key,
            bytes = size,
            written,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "object uploaded"
        );
        Ok(nonce)
    }

    /// Encrypt and upload an in-memory payload.
    pub async fn put_bytes(
        &self,
        container: &str,
        filename: &str,
        data: impl Into<Bytes>,
    ) -> Result<Nonce> {
        let data = data.into();
        let size = data.len() as u64;
        let stream = futures::stream::once(async move { Ok::<_, StorageError>(data) });
        self.put(container, filename, stream, size).await
    }

    /// Like [`put`](Self::put), also computing the plaintext's SHA-256 on the
    /// way through and returning the full record to persist.
    pub async fn put_record<S, E>(
        &self,
        container: &str,
        filename: &str,
        plaintext: S,
        size: u64,
    ) -> Result<ObjectRecord>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Into<StorageError> + 'static,
    {
        let hasher = Arc::new(Mutex::new(Sha256::new()));
        let tap = hasher.clone();
        let plaintext = plaintext.inspect_ok(move |chunk| tap.lock().update(chunk));

        let nonce = self.put(container, filename, plaintext, size).await?;
        let digest = hasher.lock().clone().finalize();

        Ok(ObjectRecord {
            container: container.to_string(),
            filename: filename.to_string(),
            nonce,
            bytes: size,
            sha256: hex::encode(digest),
            created: Utc::now(),
        })
    }

    /// Open `(container, filename)` for reading with the nonce returned by Put.
    ///
    /// Decryption is lazy and happens chunk by chunk as the stream is polled.
    /// A wrong nonce or tampered ciphertext yields
    /// [`StorageError::Integrity`]; a missing object fails here with
    /// [`StorageError::NotFound`].
    pub async fn get(&self, container: &str, filename: &str, nonce: &Nonce) -> Result<ByteStream> {
        self.ensure_ready()?;

        let key = derive_key(&self.secret, nonce)?;
        let storage_key = map_key(container, filename);
        debug!(key = %storage_key, "opening object");

        let ciphertext = self.client.get(&storage_key).await?;
        Ok(decrypt_stream(ciphertext, key))
    }

    /// Read and decrypt a whole object into memory.
    ///
    /// Never returns partial plaintext: any integrity failure fails the call.
    pub async fn get_bytes(&self, container: &str, filename: &str, nonce: &Nonce) -> Result<Bytes> {
        let stream = self.get(container, filename, nonce).await?;
        storage::collect(stream).await
    }

    /// Remove `(container, filename)`. Removing a missing object succeeds.
    pub async fn delete(&self, container: &str, filename: &str) -> Result<()> {
        self.ensure_ready()?;

        let storage_key = map_key(container, filename);
        self.client.delete(&storage_key).await?;

        info!(key = %storage_key, "object removed");
        Ok(())
    }

    /// Lazily list every storage key in the bucket.
    pub fn list_keys(&self) -> KeyStream<'_> {
        if let Err(e) = self.ensure_ready() {
            return futures::stream::once(async move { Err(e) }).boxed();
        }
        self.client.list()
    }

    /// Remove every object and then the bucket itself.
    ///
    /// Not atomic, but resumable: calling it again after a partial failure
    /// finishes the job, and calling it on a missing bucket succeeds. Works in
    /// any state; afterwards the adapter is uninitialized.
    pub async fn teardown_bucket(&mut self) -> Result<u64> {
        let start = Instant::now();
        let bucket = self.client.bucket().to_string();

        if !self.client.bucket_exists().await? {
            debug!(bucket = %bucket, "bucket already gone");
            self.state = AdapterState::Uninitialized;
            return Ok(0);
        }

        let removed = remove_all(self.client.as_ref()).await?;
        self.client.delete_bucket().await?;
        self.state = AdapterState::Uninitialized;

        info!(
            bucket = %bucket,
            removed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "bucket removed"
        );
        Ok(removed)
    }
}

/// Delete every key a fresh listing yields.
async fn remove_all(client: &dyn BlobClient) -> Result<u64> {
    let keys: Vec<StorageKey> = client.list().try_collect().await?;

    let mut removed = 0;
    for key in keys {
        if !key.is_mapped() {
            warn!(key = %key, "removing object with unmapped key");
        }
        client.delete(&key).await?;
        removed += 1;
    }
    Ok(removed)
}
