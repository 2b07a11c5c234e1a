//! Cryptographic primitives for the encrypted object store
//!
//! - **Key derivation**: HKDF-SHA256 turns the process-wide `MasterSecret` and
//!   a random per-object `Nonce` into a unique 256-bit `DerivedKey`
//! - **Streaming encryption**: ChaCha20-Poly1305 in STREAM mode seals a payload
//!   chunk by chunk, so uploads and downloads never buffer a whole object
//!
//! # Security Model
//!
//! Compromise of one object's key does not expose any other object: keys are
//! derived one-way from the master secret and a fresh nonce, are never stored,
//! and each nonce is used for exactly one object. Only the nonce is persisted
//! (by the metadata layer); it is not secret.

mod keys;
mod stream;

pub use keys::{derive_key, DerivedKey, MasterSecret, Nonce, MIN_MASTER_SECRET_SIZE, NONCE_SIZE};
pub use stream::{
    ciphertext_size, decrypt_stream, encrypt_stream, plaintext_size, ByteStream, CHUNK_SIZE,
    HEADER_SIZE, MAX_PLAINTEXT_SIZE, TAG_SIZE,
};
