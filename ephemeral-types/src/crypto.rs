//! Cryptographic envelope types: AEAD payloads, proofs and commitments.
//!
//! These are plain data — the operations that produce and consume them
//! (HKDF derivation, AEAD seal/open, Ed25519 sign/verify, commitment
//! hashing) live in `ephemeral-crypto`.

use serde::{Deserialize, Serialize};

/// A generic authenticated-encryption output.
///
/// `aad` is not stored — callers must supply the same associated data on
/// decryption as they did on encryption, and symmetric absence/presence of
/// `aad` is itself authenticated (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// The AEAD ciphertext.
    pub ciphertext: Vec<u8>,
    /// 96-bit nonce, unique per encryption under a given key.
    pub nonce: [u8; 12],
    /// 128-bit authentication tag.
    pub auth_tag: [u8; 16],
    /// Identifier of the temporal key used to produce this payload.
    pub key_id: String,
}

/// A zero-knowledge proof of possession of a private key, bound to a
/// challenge and a timestamp (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthProof {
    /// Ed25519 signature over `challenge ∥ participant_id ∥ timestamp_ms`.
    pub signature: Vec<u8>,
    /// Timestamp folded into the signed message, in epoch milliseconds.
    pub timestamp_ms: i64,
}

/// An opaque digest proving that a named key existed over a stated window,
/// publishable after the key itself has been destroyed (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commitment {
    /// Identifier of the key this commitment is about.
    pub key_id: String,
    /// Start of the key's validity, in epoch milliseconds.
    pub valid_from_ms: i64,
    /// End of the key's validity, in epoch milliseconds.
    pub valid_until_ms: i64,
    /// 32-byte digest binding `key_id ∥ valid_from_ms ∥ valid_until_ms ∥
    /// material`.
    pub hash: [u8; 32],
    /// When this commitment was created, in epoch milliseconds.
    pub timestamp_ms: i64,
}
