//! Mapping of logical names to opaque storage keys.

use std::fmt;

use sha2::{Digest, Sha256};

/// Opaque locator of an object in the remote store.
///
/// Keys produced by [`map_key`] have the form `hex(sha256(container))/hex(sha256(filename))`
/// and reveal nothing about the logical names. Keys read back from a bucket
/// listing may be anything the remote holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key has the shape produced by [`map_key`].
    pub fn is_mapped(&self) -> bool {
        match self.0.split_once('/') {
            Some((container, filename)) => is_digest(container) && is_digest(filename),
            None => false,
        }
    }
}

fn is_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Raw key as listed by the remote store.
impl From<String> for StorageKey {
    fn from(key: String) -> Self {
        StorageKey(key)
    }
}

/// Derive the storage key for a logical `(container, filename)` pair.
///
/// Each component is hashed on its own and the digests are joined, so the
/// mapping is deterministic, one-way and immune to path traversal in either
/// component. Put, Get and Delete must all go through this function.
pub fn map_key(container: &str, filename: &str) -> StorageKey {
    let container = hex::encode(Sha256::digest(container.as_bytes()));
    let filename = hex::encode(Sha256::digest(filename.as_bytes()));
    StorageKey(format!("{}/{}", container, filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_key_is_stable() {
        assert_eq!(map_key("bin", "file.txt"), map_key("bin", "file.txt"));
    }

    #[test]
    fn test_map_key_isolates_namespaces() {
        assert_ne!(map_key("a", "x"), map_key("b", "x"));
        assert_ne!(map_key("a", "x"), map_key("a", "y"));
        // Joining before hashing would collide these two.
        assert_ne!(map_key("a/b", "c"), map_key("a", "b/c"));
    }

    #[test]
    fn test_map_key_hides_names() {
        let key = map_key("secret-bin", "../../etc/passwd");
        assert!(!key.as_str().contains("secret"));
        assert!(!key.as_str().contains(".."));
        assert!(key.is_mapped());
        assert_eq!(key.as_str().len(), 129);
    }

    #[test]
    fn test_map_key_known_digest() {
        // sha256("") is a well-known constant
        let key = map_key("", "");
        let empty = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(key.as_str(), format!("{}/{}", empty, empty));
    }

    #[test]
    fn test_raw_keys_are_not_mapped() {
        assert!(!StorageKey::from("bin/file.txt".to_string()).is_mapped());
        assert!(!StorageKey::from("orphan".to_string()).is_mapped());
    }
}
