//! Shared test utilities for storage adapter integration tests
#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use sealbin_object_store::{
    storage, BlobClient, MasterSecret, ObjectStoreClient, StorageAdapter, StorageError,
    StorageKey, MIN_MASTER_SECRET_SIZE,
};
use tempfile::TempDir;

/// Route adapter logs through the test harness; `RUST_LOG=debug` to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn master_secret() -> MasterSecret {
    MasterSecret::new(b"integration-test-master-secret-".repeat(3)).unwrap()
}

pub fn other_secret() -> MasterSecret {
    MasterSecret::new(vec![0xA5; MIN_MASTER_SECRET_SIZE]).unwrap()
}

/// Set up a ready adapter over an in-memory bucket, returning the shared client too
pub async fn setup_memory_adapter() -> (StorageAdapter, Arc<dyn BlobClient>) {
    init_tracing();
    let client: Arc<dyn BlobClient> = Arc::new(ObjectStoreClient::memory("test").unwrap());
    let mut adapter = StorageAdapter::new(client.clone(), master_secret());
    adapter.init().await.unwrap();
    (adapter, client)
}

/// Set up a ready adapter over a local-filesystem bucket in a fresh temp dir
pub async fn setup_local_adapter() -> (StorageAdapter, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let adapter = local_adapter(&temp_dir).await;
    (adapter, temp_dir)
}

/// Open (and initialize) an adapter over an existing temp dir
pub async fn local_adapter(dir: &TempDir) -> StorageAdapter {
    init_tracing();
    let client = Arc::new(ObjectStoreClient::local(dir.path(), "test").await.unwrap());
    let mut adapter = StorageAdapter::new(client, master_secret());
    adapter.init().await.unwrap();
    adapter
}

/// Deterministic payload that is not trivially compressible
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Split a payload into a stream of `frame`-sized pieces
pub fn frames(
    data: &[u8],
    frame: usize,
) -> impl futures::Stream<Item = Result<Bytes, StorageError>> + Send + 'static {
    let chunks: Vec<Result<Bytes, StorageError>> = data
        .chunks(frame.max(1))
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    futures::stream::iter(chunks)
}

/// Fetch the stored ciphertext for `key`, bypassing the adapter
pub async fn read_raw(client: &Arc<dyn BlobClient>, key: &StorageKey) -> Bytes {
    storage::collect(client.get(key).await.unwrap())
        .await
        .unwrap()
}

/// Overwrite the stored ciphertext for `key`, bypassing the adapter
pub async fn write_raw(client: &Arc<dyn BlobClient>, key: &StorageKey, data: Bytes) {
    let size = data.len() as u64;
    let stream = futures::stream::iter(vec![Ok::<_, StorageError>(data)]).boxed();
    client.put(key, stream, size).await.unwrap();
}
