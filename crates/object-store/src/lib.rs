//! Encrypted, content-addressed object storage
//!
//! This crate stores opaque objects in an S3-compatible bucket (or a local /
//! in-memory stand-in) so that the remote side sees neither plaintext nor
//! logical names.
//!
//! # Features
//!
//! - Per-object keys: HKDF-SHA256 over a master secret and a random nonce
//! - Streaming authenticated encryption (ChaCha20-Poly1305 STREAM), no
//!   whole-object buffering in either direction
//! - Storage keys derived one-way from `(container, filename)`
//! - Multiple storage backends: S3, MinIO, local filesystem, in-memory
//!
//! # Example
//!
//! ```rust,no_run
//! use sealbin_object_store::{StorageAdapter, StorageConfig};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), sealbin_object_store::StorageError> {
//! let config = StorageConfig::load(Path::new("sealbin.toml"))?;
//! let adapter = StorageAdapter::connect(&config).await?;
//!
//! let nonce = adapter.put_bytes("bin", "notes.txt", "hello").await?;
//! let data = adapter.get_bytes("bin", "notes.txt", &nonce).await?;
//! assert_eq!(&data[..], b"hello");
//! # Ok(())
//! # }
//! ```

mod adapter;
mod config;
mod crypto;
mod error;
mod naming;
mod object_key;
mod record;
pub mod storage;

pub use adapter::{AdapterState, BucketStatus, StorageAdapter};
pub use config::{BackendConfig, StorageConfig};
pub use crypto::{
    ciphertext_size, decrypt_stream, derive_key, encrypt_stream, plaintext_size, ByteStream,
    DerivedKey, MasterSecret, Nonce, CHUNK_SIZE, HEADER_SIZE, MAX_PLAINTEXT_SIZE,
    MIN_MASTER_SECRET_SIZE, NONCE_SIZE, TAG_SIZE,
};
pub use error::{Result, StorageError};
pub use naming::sanitize_filename;
pub use object_key::{map_key, StorageKey};
pub use record::ObjectRecord;
pub use storage::{BlobClient, KeyStream, ObjectStoreClient, S3Client};
