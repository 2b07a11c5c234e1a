//! Streaming authenticated encryption using ChaCha20-Poly1305 in STREAM mode
//!
//! Payloads are split into fixed-size chunks that are sealed independently, so
//! both directions work on one chunk of memory at a time and decryption
//! verifies as it goes. The encrypted format is:
//!
//! ```text
//! version (1) || stream nonce prefix (7) || chunk_0 || ... || chunk_n
//! chunk_i = encrypted(plaintext_i) || tag (16)
//! ```
//!
//! Every chunk but the last carries exactly `CHUNK_SIZE` bytes of plaintext.
//! The last chunk carries between 1 and `CHUNK_SIZE` bytes (0 only for an
//! empty payload) and is sealed with the STREAM "last block" flag, so a
//! stream cut at a chunk boundary or extended with extra bytes fails
//! authentication.

use bytes::{Bytes, BytesMut};
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::stream::{DecryptorBE32, EncryptorBE32};
use chacha20poly1305::aead::KeyInit;
use chacha20poly1305::{ChaCha20Poly1305, Key};
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use tracing::trace;

use crate::crypto::keys::DerivedKey;
use crate::error::{Result, StorageError};

/// Plaintext bytes per chunk (64 KiB)
pub const CHUNK_SIZE: usize = 64 * 1024;
/// Size of the Poly1305 authentication tag appended to every chunk
pub const TAG_SIZE: usize = 16;
/// Size of the stream header (version + stream nonce prefix)
pub const HEADER_SIZE: usize = 1 + STREAM_NONCE_SIZE;
/// Largest plaintext a single stream can carry (32-bit chunk counter)
pub const MAX_PLAINTEXT_SIZE: u64 = CHUNK_SIZE as u64 * u32::MAX as u64;

const FORMAT_VERSION: u8 = 0x01;
/// ChaCha20-Poly1305 nonce (12) minus the STREAM BE32 counter and flag (5)
const STREAM_NONCE_SIZE: usize = 7;
const SEALED_CHUNK_SIZE: usize = CHUNK_SIZE + TAG_SIZE;

/// A fallible stream of bytes, the currency of every streaming operation.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Exact number of bytes [`encrypt_stream`] produces for a plaintext of
/// `plaintext_size` bytes.
pub fn ciphertext_size(plaintext_size: u64) -> u64 {
    let chunks = plaintext_size.div_ceil(CHUNK_SIZE as u64).max(1);
    HEADER_SIZE as u64 + plaintext_size + chunks * TAG_SIZE as u64
}

/// Plaintext length of a well-formed ciphertext of `ciphertext_size` bytes.
///
/// Returns `None` if no plaintext length encrypts to exactly that size.
pub fn plaintext_size(ciphertext_size: u64) -> Option<u64> {
    let body = ciphertext_size.checked_sub(HEADER_SIZE as u64)?;
    let full_chunks = body / SEALED_CHUNK_SIZE as u64;
    let remainder = body % SEALED_CHUNK_SIZE as u64;

    let size = match (full_chunks, remainder) {
        (0, r) if r == TAG_SIZE as u64 => 0,
        (n, 0) if n > 0 => n * CHUNK_SIZE as u64,
        (n, r) if r > TAG_SIZE as u64 => n * CHUNK_SIZE as u64 + r - TAG_SIZE as u64,
        _ => return None,
    };
    Some(size)
}

/// Wrap a plaintext stream into an authenticated-encrypted stream.
///
/// Returns the ciphertext stream together with its exact length, which remote
/// stores need upfront. The returned stream fails with
/// [`StorageError::SizeMismatch`] if `plaintext` yields more or fewer than
/// `plaintext_size` bytes.
pub fn encrypt_stream<S, E>(
    plaintext: S,
    key: &DerivedKey,
    plaintext_size: u64,
) -> Result<(ByteStream, u64)>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<StorageError> + 'static,
{
    if plaintext_size > MAX_PLAINTEXT_SIZE {
        return Err(StorageError::PayloadTooLarge {
            size: plaintext_size,
            max: MAX_PLAINTEXT_SIZE,
        });
    }

    let mut prefix = [0u8; STREAM_NONCE_SIZE];
    getrandom::getrandom(&mut prefix).map_err(|e| {
        StorageError::KeyDerivation(format!("failed to generate stream nonce: {}", e))
    })?;

    let mut header = [0u8; HEADER_SIZE];
    header[0] = FORMAT_VERSION;
    header[1..].copy_from_slice(&prefix);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let sealer = Sealer {
        source: plaintext.map_err(Into::into).boxed(),
        buffer: BytesMut::with_capacity(CHUNK_SIZE + 1),
        encryptor: Some(EncryptorBE32::from_aead(
            cipher,
            GenericArray::from_slice(&prefix),
        )),
        header: Some(header),
        source_done: false,
        consumed: 0,
        expected: plaintext_size,
    };

    let stream = futures::stream::try_unfold(sealer, |mut sealer| async move {
        Ok::<_, StorageError>(sealer.next_frame().await?.map(|frame| (frame, sealer)))
    })
    .boxed();

    Ok((stream, ciphertext_size(plaintext_size)))
}

/// Wrap a ciphertext stream into the plaintext stream it encrypts.
///
/// Decryption is lazy: each poll pulls and verifies at most one chunk. Any
/// authentication failure yields [`StorageError::Integrity`] and ends the
/// stream; errors from `ciphertext` are passed through unchanged.
pub fn decrypt_stream<S, E>(ciphertext: S, key: DerivedKey) -> ByteStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<StorageError> + 'static,
{
    let opener = Opener {
        source: ciphertext.map_err(Into::into).boxed(),
        buffer: BytesMut::with_capacity(SEALED_CHUNK_SIZE + 1),
        key: Some(key),
        decryptor: None,
        source_done: false,
        chunk: 0,
    };

    futures::stream::try_unfold(opener, |mut opener| async move {
        Ok::<_, StorageError>(opener.next_frame().await?.map(|frame| (frame, opener)))
    })
    .boxed()
}

struct Sealer {
    source: ByteStream,
    buffer: BytesMut,
    encryptor: Option<EncryptorBE32<ChaCha20Poly1305>>,
    header: Option<[u8; HEADER_SIZE]>,
    source_done: bool,
    consumed: u64,
    expected: u64,
}

impl Sealer {
    async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if let Some(header) = self.header.take() {
            return Ok(Some(Bytes::copy_from_slice(&header)));
        }
        if self.encryptor.is_none() {
            return Ok(None);
        }

        // One byte of lookahead decides whether the buffered chunk is the last.
        while self.buffer.len() <= CHUNK_SIZE && !self.source_done {
            match self.source.try_next().await? {
                Some(bytes) => {
                    self.consumed += bytes.len() as u64;
                    if self.consumed > self.expected {
                        return Err(StorageError::SizeMismatch {
                            expected: self.expected,
                            actual: self.consumed,
                        });
                    }
                    self.buffer.extend_from_slice(&bytes);
                }
                None => self.source_done = true,
            }
        }

        if self.buffer.len() > CHUNK_SIZE {
            let chunk = self.buffer.split_to(CHUNK_SIZE);
            let sealed = match self.encryptor.as_mut() {
                Some(encryptor) => encryptor.encrypt_next(chunk.as_ref()),
                None => return Ok(None),
            }
            .map_err(|_| StorageError::Integrity("failed to seal chunk".to_string()))?;
            return Ok(Some(Bytes::from(sealed)));
        }

        if self.consumed != self.expected {
            return Err(StorageError::SizeMismatch {
                expected: self.expected,
                actual: self.consumed,
            });
        }

        let last = self.buffer.split();
        let sealed = match self.encryptor.take() {
            Some(encryptor) => encryptor.encrypt_last(last.as_ref()),
            None => return Ok(None),
        }
        .map_err(|_| StorageError::Integrity("failed to seal final chunk".to_string()))?;
        Ok(Some(Bytes::from(sealed)))
    }
}

struct Opener {
    source: ByteStream,
    buffer: BytesMut,
    key: Option<DerivedKey>,
    decryptor: Option<DecryptorBE32<ChaCha20Poly1305>>,
    source_done: bool,
    chunk: u64,
}

impl Opener {
    /// Pull from the source until more than `want` bytes are buffered or the
    /// source is exhausted.
    async fn fill(&mut self, want: usize) -> Result<()> {
        while self.buffer.len() <= want && !self.source_done {
            match self.source.try_next().await? {
                Some(bytes) => self.buffer.extend_from_slice(&bytes),
                None => self.source_done = true,
            }
        }
        Ok(())
    }

    async fn open_header(&mut self, key: DerivedKey) -> Result<()> {
        self.fill(HEADER_SIZE).await?;
        if self.buffer.len() < HEADER_SIZE {
            return Err(StorageError::Integrity(format!(
                "stream too short for header: {} bytes",
                self.buffer.len()
            )));
        }

        let header = self.buffer.split_to(HEADER_SIZE);
        if header[0] != FORMAT_VERSION {
            return Err(StorageError::Integrity(format!(
                "unsupported stream version {:#04x}",
                header[0]
            )));
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        self.decryptor = Some(DecryptorBE32::from_aead(
            cipher,
            GenericArray::from_slice(&header[1..]),
        ));
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if let Some(key) = self.key.take() {
            self.open_header(key).await?;
        }
        if self.decryptor.is_none() {
            return Ok(None);
        }

        self.fill(SEALED_CHUNK_SIZE).await?;

        if self.buffer.len() > SEALED_CHUNK_SIZE {
            let chunk = self.buffer.split_to(SEALED_CHUNK_SIZE);
            let index = self.chunk;
            self.chunk += 1;
            let plaintext = match self.decryptor.as_mut() {
                Some(decryptor) => decryptor.decrypt_next(chunk.as_ref()),
                None => return Ok(None),
            }
            .map_err(|_| {
                StorageError::Integrity(format!("authentication failed for chunk {}", index))
            })?;
            trace!(chunk = index, bytes = plaintext.len(), "opened chunk");
            return Ok(Some(Bytes::from(plaintext)));
        }

        if self.buffer.len() < TAG_SIZE {
            return Err(StorageError::Integrity(format!(
                "final chunk truncated to {} bytes",
                self.buffer.len()
            )));
        }

        let last = self.buffer.split();
        let index = self.chunk;
        let plaintext = match self.decryptor.take() {
            Some(decryptor) => decryptor.decrypt_last(last.as_ref()),
            None => return Ok(None),
        }
        .map_err(|_| {
            StorageError::Integrity(format!("authentication failed for final chunk {}", index))
        })?;

        if plaintext.is_empty() {
            return Ok(None);
        }
        Ok(Some(Bytes::from(plaintext)))
    }
}
