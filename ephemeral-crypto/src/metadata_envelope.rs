//! Multi-recipient encryption of [`WorkspaceMetadata`] (§4.8).
//!
//! A standalone ECIES-style scheme: for each recipient, generate a fresh
//! ephemeral X25519 keypair, derive a shared secret with the recipient's
//! static X25519 public key, and seal the metadata under a key derived
//! from that secret. The ephemeral public key travels with the ciphertext
//! (as its first 32 bytes) so the recipient can recompute the same shared
//! secret without any prior exchange.
//!
//! This is a placeholder for a real ECIES construction (e.g. HPKE) —
//! adequate for the threat model here (passive server, honest-but-curious
//! relay) but not a substitute for a standardized scheme if this protocol
//! were to leave the demo/internal stage.

use ephemeral_types::{crypto::EncryptedPayload, workspace::WorkspaceMetadata};
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::CryptoError;

const EPHEMERAL_PUBLIC_KEY_LEN: usize = 32;

fn derive_symmetric_key(shared_secret: &x25519_dalek::SharedSecret, ephemeral_public: &PublicKey, recipient_public: &PublicKey) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, shared_secret.as_bytes());
    let mut info = Vec::with_capacity(64);
    info.extend_from_slice(ephemeral_public.as_bytes());
    info.extend_from_slice(recipient_public.as_bytes());
    let mut okm = [0u8; 32];
    hk.expand(&info, &mut okm).expect("32 bytes is a valid HKDF-SHA256 output length");
    okm
}

/// Encrypts `metadata` for a single recipient identified by
/// `recipient_public_key` (raw X25519 bytes).
pub fn encrypt_for_recipient(recipient_public_key: &[u8; 32], metadata: &WorkspaceMetadata) -> Result<EncryptedPayload, CryptoError> {
    let recipient_public = PublicKey::from(*recipient_public_key);
    let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);
    let shared_secret = ephemeral_secret.diffie_hellman(&recipient_public);
    let symmetric_key = derive_symmetric_key(&shared_secret, &ephemeral_public, &recipient_public);

    let mut plaintext = Vec::new();
    ciborium::into_writer(metadata, &mut plaintext).map_err(|e| CryptoError::Codec(e.to_string()))?;

    let temporal_key = ephemeral_types::time::TemporalKey::new(
        "metadata-envelope".into(),
        ephemeral_types::time::KeyMaterial::new(symmetric_key),
        i64::MIN,
        i64::MAX - 1,
        i64::MAX,
    )
    .expect("static validity bounds are well-ordered");

    let aad = ephemeral_public.as_bytes().to_vec();
    let (ciphertext, nonce, tag) = crate::time_locked_encryption::seal(&temporal_key, &aad, &plaintext)?;

    let mut blob = Vec::with_capacity(EPHEMERAL_PUBLIC_KEY_LEN + ciphertext.len());
    blob.extend_from_slice(ephemeral_public.as_bytes());
    blob.extend_from_slice(&ciphertext);

    Ok(EncryptedPayload {
        ciphertext: blob,
        nonce,
        auth_tag: tag,
        key_id: "metadata-envelope".to_string(),
    })
}

/// Encrypts `metadata` for every participant in `recipients`, producing the
/// full [`ephemeral_types::workspace::EncryptedWorkspaceMetadata`].
pub fn encrypt_for_all(
    recipients: &[[u8; 32]],
    metadata: &WorkspaceMetadata,
) -> Result<ephemeral_types::workspace::EncryptedWorkspaceMetadata, CryptoError> {
    let sealed = recipients
        .iter()
        .map(|public_key| encrypt_for_recipient(public_key, metadata).map(|payload| (public_key.to_vec(), payload)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ephemeral_types::workspace::EncryptedWorkspaceMetadata { recipients: sealed })
}

/// Decrypts an [`EncryptedPayload`] produced by [`encrypt_for_recipient`]
/// using the recipient's static secret key.
pub fn decrypt(recipient_secret: &StaticSecret, payload: &EncryptedPayload) -> Result<WorkspaceMetadata, CryptoError> {
    if payload.ciphertext.len() < EPHEMERAL_PUBLIC_KEY_LEN {
        return Err(CryptoError::Aead);
    }
    let (ephemeral_public_bytes, ciphertext) = payload.ciphertext.split_at(EPHEMERAL_PUBLIC_KEY_LEN);
    let ephemeral_public_bytes: [u8; 32] = ephemeral_public_bytes.try_into().expect("checked length above");
    let ephemeral_public = PublicKey::from(ephemeral_public_bytes);
    let recipient_public = PublicKey::from(recipient_secret);

    let shared_secret = recipient_secret.diffie_hellman(&ephemeral_public);
    let symmetric_key = derive_symmetric_key(&shared_secret, &ephemeral_public, &recipient_public);

    let temporal_key = ephemeral_types::time::TemporalKey::new(
        "metadata-envelope".into(),
        ephemeral_types::time::KeyMaterial::new(symmetric_key),
        i64::MIN,
        i64::MAX - 1,
        i64::MAX,
    )
    .expect("static validity bounds are well-ordered");

    let aad = ephemeral_public_bytes.to_vec();
    let plaintext = crate::time_locked_encryption::open(&temporal_key, &aad, ciphertext, &payload.nonce, &payload.auth_tag)?;
    ciborium::from_reader(plaintext.as_slice()).map_err(|e| CryptoError::Codec(e.to_string()))
}
