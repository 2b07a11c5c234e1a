//! Metadata describing one stored object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::Nonce;
use crate::object_key::{map_key, StorageKey};

/// What a caller needs to persist to read an object back.
///
/// The nonce is the only piece that cannot be recomputed; losing it makes the
/// object unrecoverable. `bytes` and `sha256` describe the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub container: String,
    pub filename: String,
    pub nonce: Nonce,
    pub bytes: u64,
    /// Hex-encoded SHA-256 of the plaintext
    pub sha256: String,
    pub created: DateTime<Utc>,
}

impl ObjectRecord {
    /// Where the ciphertext lives in the bucket.
    pub fn storage_key(&self) -> StorageKey {
        map_key(&self.container, &self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::NONCE_SIZE;

    fn record() -> ObjectRecord {
        ObjectRecord {
            container: "bin".to_string(),
            filename: "file.txt".to_string(),
            nonce: Nonce::from([3u8; NONCE_SIZE]),
            bytes: 12,
            sha256: "00".repeat(32),
            created: Utc::now(),
        }
    }

    #[test]
    fn test_storage_key_matches_mapping() {
        assert_eq!(record().storage_key(), map_key("bin", "file.txt"));
    }

    #[test]
    fn test_json_uses_hex_nonce() {
        let record = record();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["nonce"], "03".repeat(NONCE_SIZE));

        let back: ObjectRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
