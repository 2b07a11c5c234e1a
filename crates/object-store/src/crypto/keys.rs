//! Per-object key derivation
//!
//! Every stored object gets its own 256-bit key, derived with HKDF-SHA256 from
//! the process-wide [`MasterSecret`] and a random per-object [`Nonce`]. The
//! nonce is not secret and is handed back to the caller for persistence; the
//! derived key is never stored and is recomputed on every read.

use std::fmt;

use hkdf::Hkdf;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, StorageError};

/// Size of a per-object nonce in bytes
pub const NONCE_SIZE: usize = 24;
/// Size of a derived key in bytes (256 bits)
pub const DERIVED_KEY_SIZE: usize = 32;
/// Minimum master secret length; the SHA-256 block size
pub const MIN_MASTER_SECRET_SIZE: usize = 64;

/// Root secret from which all per-object keys are derived.
///
/// Loaded once at startup and zeroized on drop. Its `Debug` output never
/// includes the secret bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret(Vec<u8>);

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterSecret(<{} bytes redacted>)", self.0.len())
    }
}

impl MasterSecret {
    /// Create a master secret from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the secret is shorter than
    /// [`MIN_MASTER_SECRET_SIZE`] bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() < MIN_MASTER_SECRET_SIZE {
            return Err(StorageError::Configuration(format!(
                "master secret must be at least {} bytes, got {}",
                MIN_MASTER_SECRET_SIZE,
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Parse a master secret from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex).map_err(|e| {
            StorageError::Configuration(format!("master secret hex decode error: {}", e))
        })?;
        Self::new(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Random, non-secret, per-object value that selects the object's key.
///
/// Generated once at upload time from the OS CSPRNG. Losing it loses the
/// object: there is no other way to recompute the key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_SIZE]);

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.to_hex())
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; NONCE_SIZE]> for Nonce {
    fn from(bytes: [u8; NONCE_SIZE]) -> Self {
        Nonce(bytes)
    }
}

impl Nonce {
    /// Generate a fresh nonce from the operating system's CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns a key derivation error if the entropy source fails. This is
    /// fatal for the operation and must not be retried with a weaker source.
    pub fn generate() -> Result<Self> {
        let mut buff = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut buff).map_err(|e| {
            StorageError::KeyDerivation(format!("failed to read random data: {}", e))
        })?;
        Ok(Self(buff))
    }

    /// Create a nonce from a byte slice
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the slice length is not exactly
    /// `NONCE_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() != NONCE_SIZE {
            return Err(StorageError::Configuration(format!(
                "invalid nonce size, expected {}, got {}",
                NONCE_SIZE,
                data.len()
            )));
        }
        let mut buff = [0u8; NONCE_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    /// Parse a nonce from a hexadecimal string
    ///
    /// Returns a configuration error on malformed input.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0u8; NONCE_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|e| StorageError::Configuration(format!("nonce hex decode error: {}", e)))?;
        Ok(buff.into())
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Nonce::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A 256-bit symmetric key for a single stored object.
///
/// Lives for one call and is zeroized on drop.
#[derive(PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; DERIVED_KEY_SIZE]);

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

impl DerivedKey {
    pub(crate) fn as_bytes(&self) -> &[u8; DERIVED_KEY_SIZE] {
        &self.0
    }
}

/// Derive the key for one object: HKDF-SHA256 with the nonce as salt, the
/// master secret as input keying material and no context info.
pub fn derive_key(secret: &MasterSecret, nonce: &Nonce) -> Result<DerivedKey> {
    let hk = Hkdf::<Sha256>::new(Some(nonce.as_bytes()), secret.as_bytes());
    let mut okm = [0u8; DERIVED_KEY_SIZE];
    hk.expand(&[], &mut okm)
        .map_err(|e| StorageError::KeyDerivation(format!("failed to derive key: {}", e)))?;
    let key = DerivedKey(okm);
    okm.zeroize();
    Ok(key)
}

#[cfg(test)]
mod test {
    use super::*;

    fn secret() -> MasterSecret {
        MasterSecret::new(vec![7u8; MIN_MASTER_SECRET_SIZE]).unwrap()
    }

    #[test]
    fn test_derive_is_deterministic() {
        let secret = secret();
        let nonce = Nonce::generate().unwrap();

        let a = derive_key(&secret, &nonce).unwrap();
        let b = derive_key(&secret, &nonce).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_nonces_give_distinct_keys() {
        let secret = secret();
        let n1 = Nonce::from([1u8; NONCE_SIZE]);
        let n2 = Nonce::from([2u8; NONCE_SIZE]);

        assert_ne!(
            derive_key(&secret, &n1).unwrap(),
            derive_key(&secret, &n2).unwrap()
        );
    }

    #[test]
    fn test_distinct_secrets_give_distinct_keys() {
        let nonce = Nonce::from([9u8; NONCE_SIZE]);
        let other = MasterSecret::new(vec![8u8; MIN_MASTER_SECRET_SIZE]).unwrap();

        assert_ne!(
            derive_key(&secret(), &nonce).unwrap(),
            derive_key(&other, &nonce).unwrap()
        );
    }

    #[test]
    fn test_short_master_secret_rejected() {
        let result = MasterSecret::new(vec![1u8; MIN_MASTER_SECRET_SIZE - 1]);
        assert!(matches!(result, Err(StorageError::Configuration(_))));
    }

    #[test]
    fn test_master_secret_from_hex() {
        let hex = "ab".repeat(MIN_MASTER_SECRET_SIZE);
        assert!(MasterSecret::from_hex(&hex).is_ok());
        assert!(MasterSecret::from_hex(&format!("0x{}", hex)).is_ok());
        assert!(MasterSecret::from_hex("zz").is_err());
    }

    #[test]
    fn test_master_secret_debug_is_redacted() {
        let secret = MasterSecret::new(b"s".repeat(MIN_MASTER_SECRET_SIZE)).unwrap();
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("sss"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_generated_nonces_are_filled_and_unique() {
        let a = Nonce::generate().unwrap();
        let b = Nonce::generate().unwrap();

        assert_eq!(a.as_bytes().len(), NONCE_SIZE);
        assert_ne!(a.as_bytes(), &[0u8; NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_nonce_hex() {
        let nonce = Nonce::generate().unwrap();
        let hex = nonce.to_hex();
        assert_eq!(hex.len(), NONCE_SIZE * 2);
        assert_eq!(Nonce::from_hex(&hex).unwrap(), nonce);

        let not_hex = "0g".repeat(NONCE_SIZE);
        for bad in ["abcd", "zz", not_hex.as_str()] {
            assert!(matches!(
                Nonce::from_hex(bad),
                Err(StorageError::Configuration(_))
            ));
        }
        assert!(matches!(
            Nonce::from_slice(&[0u8; 16]),
            Err(StorageError::Configuration(_))
        ));
    }
}
