//! Content fingerprints for deduplication.
//!
//! A [`Fingerprint`] is the SHA-256 digest of a file's raw bytes. Two uploads
//! with the same filename and the same fingerprint are the same upload.

use std::fmt;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// 256-bit content digest. Displays and serializes as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

/// Compute the fingerprint of a byte payload.
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Fingerprint(hasher.finalize().into())
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let payload = b"The quick brown fox";
        assert_eq!(fingerprint(payload), fingerprint(payload));
    }

    #[test]
    fn known_digest_of_empty_input() {
        assert_eq!(
            fingerprint(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn single_byte_mutations_change_the_digest() {
        let base: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let original = fingerprint(&base);
        for pos in (0..base.len()).step_by(97) {
            let mut mutated = base.clone();
            mutated[pos] ^= 0x01;
            assert_ne!(fingerprint(&mutated), original, "mutation at {}", pos);
        }
        let mut extended = base.clone();
        extended.push(0);
        assert_ne!(fingerprint(&extended), original);
    }

    #[test]
    fn hex_forms() {
        let fp = fingerprint(b"abc");
        assert_eq!(fp.to_hex().len(), 64);
        assert!(fp.to_hex().starts_with(&fp.short()));
        assert_eq!(
            serde_json::to_value(fp).unwrap(),
            serde_json::Value::String(fp.to_hex())
        );
    }
}
