//! Session keys and the mutual authentication handshake.
//!
//! The device and host share two embedded secrets. Per connection the host
//! derives a fresh 32-byte nonce, and both sides prove knowledge of the
//! secrets by exchanging SHA-256 digests over them. Key comparisons are
//! constant-time; keys live only for the connection and are never persisted.

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Shared device secret appended to the client nonce when deriving the
/// session key. Must match the firmware byte-for-byte.
pub const PRIVATE_KEY: [u8; 41] = [
    0x4F, 0x70, 0x65, 0x6E, 0x53, 0x69, 0x67, 0x68, 0x74, 0x2D, 0x4C, 0x47, 0x31, 0x00, 0x6B,
    0xD3, 0x91, 0x2A, 0x5C, 0x07, 0xEE, 0x48, 0xB0, 0x19, 0xF6, 0x63, 0x8D, 0xC4, 0x35, 0x7A,
    0xA1, 0x0E, 0x52, 0xBF, 0x9C, 0x21, 0xD8, 0x44, 0x6F, 0xE7, 0x13,
];

/// Shared secret appended to the device's handshake challenge.
/// Must match the firmware byte-for-byte.
pub const HANDSHAKE_KEY: [u8; 32] = [
    0x83, 0x1D, 0xC9, 0x56, 0x0A, 0xF2, 0x6E, 0xB4, 0x47, 0x9B, 0x20, 0xDD, 0x75, 0x3C, 0xE1,
    0x08, 0x99, 0x62, 0xAF, 0x14, 0xCB, 0x70, 0x2D, 0xE6, 0x5B, 0x38, 0x81, 0xFC, 0x46, 0x0F,
    0xB7, 0x2A,
];

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Session key the device must answer a given nonce with.
pub fn session_key_for(nonce: &[u8; 32]) -> [u8; 32] {
    sha256(&[nonce, &PRIVATE_KEY])
}

/// Host response to the device's 32-byte handshake challenge.
pub fn handshake_digest(challenge: &[u8; 32]) -> [u8; 32] {
    sha256(&[challenge, &HANDSHAKE_KEY])
}

/// Per-connection key material.
#[derive(Clone)]
pub struct SessionKeys {
    public_key: [u8; 32],
    session_key: [u8; 32],
}

impl SessionKeys {
    /// Generate fresh keys: the public nonce is the SHA-256 of a random
    /// 16-byte identifier.
    pub fn generate() -> Self {
        let mut identifier = [0u8; 16];
        rand::rng().fill_bytes(&mut identifier);
        Self::from_identifier(&identifier)
    }

    /// Deterministic construction from a known identifier, for tests and
    /// golden traces.
    pub fn from_identifier(identifier: &[u8; 16]) -> Self {
        let public_key = sha256(&[identifier]);
        let session_key = session_key_for(&public_key);
        Self {
            public_key,
            session_key,
        }
    }

    /// The nonce transmitted to the device.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// Constant-time comparison of the device's session key against ours.
    pub fn matches(&self, device_key: &[u8; 32]) -> bool {
        self.session_key.ct_eq(device_key).into()
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_sizes() {
        assert_eq!(PRIVATE_KEY.len(), 41);
        assert_eq!(HANDSHAKE_KEY.len(), 32);
    }

    #[test]
    fn test_session_key_is_hash_of_nonce_and_private_key() {
        let keys = SessionKeys::from_identifier(&[7u8; 16]);
        let expected = sha256(&[keys.public_key(), &PRIVATE_KEY]);
        assert!(keys.matches(&expected));
    }

    #[test]
    fn test_wrong_device_key_is_rejected() {
        let keys = SessionKeys::from_identifier(&[7u8; 16]);
        let mut wrong = *keys.public_key();
        wrong[0] ^= 1;
        assert!(!keys.matches(&wrong));
    }

    #[test]
    fn test_generate_produces_distinct_nonces() {
        let a = SessionKeys::generate();
        let b = SessionKeys::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_handshake_digest_depends_on_challenge() {
        let a = handshake_digest(&[1u8; 32]);
        let b = handshake_digest(&[2u8; 32]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_does_not_leak_key_material() {
        let keys = SessionKeys::from_identifier(&[9u8; 16]);
        let rendered = format!("{keys:?}");
        assert!(!rendered.contains("public_key"));
        assert!(!rendered.contains("session_key"));
    }
}
