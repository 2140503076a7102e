//! Sealing and opening [`CRDTOperation`]s into [`EncryptedOperation`]s.
//!
//! Routing metadata (`position`, `kind`, `participant_id`, `timestamp_ms`,
//! `workspace_id`) stays unencrypted so the server can route without
//! decrypting, but is bound into the AEAD associated data and covered by
//! the author's signature — so the server can forward it but never forge
//! or silently alter it.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use ephemeral_types::{
    WorkspaceId,
    operation::{CRDTOperation, EncryptedOperation, OperationError, OperationPayload},
    time::TemporalKey,
};

use crate::{CryptoError, time_locked_encryption};

fn routing_aad(op: &EncryptedOperation) -> Vec<u8> {
    let mut aad = Vec::with_capacity(16 + 16 + 8 + 8 + 1);
    aad.extend_from_slice(op.workspace_id.as_bytes());
    aad.extend_from_slice(op.participant_id.as_bytes());
    aad.extend_from_slice(&op.timestamp_ms.to_be_bytes());
    aad.extend_from_slice(&(op.position as u64).to_be_bytes());
    aad.push(op.kind.aad_tag());
    aad
}

fn routed_bytes(op: &EncryptedOperation) -> Vec<u8> {
    let mut bytes = routing_aad(op);
    bytes.extend_from_slice(&op.encrypted_content);
    bytes.extend_from_slice(&op.nonce);
    bytes.extend_from_slice(&op.auth_tag);
    bytes.extend_from_slice(op.key_id.as_bytes());
    bytes
}

/// Seals `op` under `key`, signing the result with `signing_key`.
pub fn encrypt_operation(
    op: &CRDTOperation,
    workspace_id: WorkspaceId,
    key: &TemporalKey,
    signing_key: &SigningKey,
) -> Result<EncryptedOperation, CryptoError> {
    let payload = OperationPayload::from(op);
    let mut plaintext = Vec::new();
    ciborium::into_writer(&payload, &mut plaintext).map_err(|e| CryptoError::Codec(e.to_string()))?;

    let mut unsigned = EncryptedOperation {
        id: op.id,
        workspace_id,
        participant_id: op.participant_id,
        timestamp_ms: op.timestamp_ms,
        position: op.position,
        kind: op.kind,
        encrypted_content: Vec::new(),
        nonce: [0u8; 12],
        auth_tag: [0u8; 16],
        signature: Vec::new(),
        key_id: key.id.clone(),
    };

    let aad = routing_aad(&unsigned);
    let (ciphertext, nonce, tag) = time_locked_encryption::seal(key, &aad, &plaintext)?;
    unsigned.encrypted_content = ciphertext;
    unsigned.nonce = nonce;
    unsigned.auth_tag = tag;

    let signature = signing_key.sign(&routed_bytes(&unsigned));
    unsigned.signature = signature.to_bytes().to_vec();
    Ok(unsigned)
}

/// Verifies `op.signature` against `public_key`.
pub fn verify_signature(op: &EncryptedOperation, public_key: &[u8; 32]) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_bytes(public_key).map_err(|_| CryptoError::MalformedKey)?;
    let signature_bytes: [u8; 64] = op.signature.as_slice().try_into().map_err(|_| CryptoError::InvalidSignature)?;
    let signature = Signature::from_bytes(&signature_bytes);
    verifying_key
        .verify(&routed_bytes(op), &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Verifies `op`'s signature then opens its sealed payload under `key`,
/// reconstructing the original [`CRDTOperation`].
pub fn decrypt_operation(
    op: &EncryptedOperation,
    public_key: &[u8; 32],
    key: &TemporalKey,
) -> Result<CRDTOperation, CryptoError> {
    verify_signature(op, public_key)?;
    let aad = routing_aad(op);
    let plaintext = time_locked_encryption::open(key, &aad, &op.encrypted_content, &op.nonce, &op.auth_tag)?;
    let payload: OperationPayload =
        ciborium::from_reader(plaintext.as_slice()).map_err(|e| CryptoError::Codec(e.to_string()))?;

    let reconstructed = CRDTOperation {
        id: op.id,
        participant_id: op.participant_id,
        timestamp_ms: op.timestamp_ms,
        kind: op.kind,
        position: op.position,
        content: payload.content,
        length: payload.length,
    };
    reconstructed
        .validate()
        .map_err(|_: OperationError| CryptoError::Codec("decrypted payload did not match operation kind".into()))?;
    Ok(reconstructed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use ephemeral_types::{ParticipantId, time::KeyMaterial};
    use rand_core::OsRng;

    fn key() -> TemporalKey {
        TemporalKey::new("key-0".into(), KeyMaterial::new([4u8; 32]), 0, 10_000, 10_000).unwrap()
    }

    #[test]
    fn insert_round_trips() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let workspace_id = WorkspaceId::new_random();
        let op = CRDTOperation::insert(
            ephemeral_types::OperationId::new_random(),
            ParticipantId::new_random(),
            5,
            0,
            "hi".to_string(),
        );
        let key = key();
        let encrypted = encrypt_operation(&op, workspace_id, &key, &signing_key).unwrap();
        let decrypted = decrypt_operation(&encrypted, signing_key.verifying_key().as_bytes(), &key).unwrap();
        assert_eq!(decrypted, op);
    }

    #[test]
    fn tampered_routing_metadata_fails_verification() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let workspace_id = WorkspaceId::new_random();
        let op = CRDTOperation::insert(
            ephemeral_types::OperationId::new_random(),
            ParticipantId::new_random(),
            5,
            0,
            "hi".to_string(),
        );
        let key = key();
        let mut encrypted = encrypt_operation(&op, workspace_id, &key, &signing_key).unwrap();
        encrypted.position = 99;
        assert!(decrypt_operation(&encrypted, signing_key.verifying_key().as_bytes(), &key).is_err());
    }

    #[test]
    fn wrong_key_fails_open() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let workspace_id = WorkspaceId::new_random();
        let op = CRDTOperation::insert(
            ephemeral_types::OperationId::new_random(),
            ParticipantId::new_random(),
            5,
            0,
            "hi".to_string(),
        );
        let key = key();
        let encrypted = encrypt_operation(&op, workspace_id, &key, &signing_key).unwrap();
        let other_key = TemporalKey::new("key-1".into(), KeyMaterial::new([9u8; 32]), 0, 10_000, 10_000).unwrap();
        assert!(decrypt_operation(&encrypted, signing_key.verifying_key().as_bytes(), &other_key).is_err());
    }
}
