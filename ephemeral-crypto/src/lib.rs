//! Cryptographic primitives backing the ephemeral collaborative-editing
//! protocol: temporal key derivation, time-locked AEAD, publishable
//! commitments, zero-knowledge participant authentication, per-operation
//! encryption, and the multi-recipient metadata envelope.
//!
//! Every primitive here is a pure function over key material the caller
//! supplies — this crate holds no state and makes no I/O. State (which keys
//! are live, which workspace they belong to) lives in `ephemeral-service`.

#![deny(missing_docs)]

pub mod commitment;
pub mod metadata_envelope;
pub mod operation_encryptor;
pub mod participant_auth;
pub mod temporal_key;
pub mod time_locked_encryption;

use thiserror::Error;

/// Errors produced by the primitives in this crate.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD seal or open failed — on open, this means the ciphertext, nonce,
    /// tag or associated data did not match what was sealed.
    #[error("authenticated encryption operation failed")]
    Aead,
    /// An Ed25519 signature did not verify.
    #[error("signature verification failed")]
    InvalidSignature,
    /// A key id on an incoming frame did not match any temporal key the
    /// caller considers live (including its grace window).
    #[error("key id {0} is not currently valid")]
    UnknownKey(String),
    /// A commitment's hash did not match the recomputed digest.
    #[error("commitment verification failed")]
    InvalidCommitment,
    /// A CBOR encode/decode step failed.
    #[error("payload serialization failed: {0}")]
    Codec(String),
    /// A public key did not decode to a valid curve point.
    #[error("malformed public key")]
    MalformedKey,
}
