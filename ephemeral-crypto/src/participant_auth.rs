//! Challenge/response proof of key possession (§4.4): the server never
//! learns anything about a participant beyond "this public key signed this
//! challenge", which is exactly what a zero-knowledge proof of possession
//! requires here.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use ephemeral_types::{ParticipantId, crypto::AuthProof};
use rand_core::OsRng;

use crate::CryptoError;

/// Maximum allowed skew, in milliseconds, between a proof's `timestamp_ms`
/// and the server's clock at verification time.
pub const MAX_PROOF_SKEW_MS: i64 = 30_000;

/// Generates a fresh random 32-byte challenge.
pub fn generate_challenge() -> [u8; 32] {
    use rand_core::RngCore;
    let mut challenge = [0u8; 32];
    OsRng.fill_bytes(&mut challenge);
    challenge
}

fn signed_message(challenge: &[u8; 32], participant_id: ParticipantId, timestamp_ms: i64) -> Vec<u8> {
    let mut message = Vec::with_capacity(32 + 16 + 8);
    message.extend_from_slice(challenge);
    message.extend_from_slice(participant_id.as_bytes());
    message.extend_from_slice(&timestamp_ms.to_be_bytes());
    message
}

/// Signs `challenge` as the given participant, binding the signature to
/// `timestamp_ms` so that a captured proof cannot be replayed indefinitely.
pub fn generate_proof(signing_key: &SigningKey, participant_id: ParticipantId, challenge: &[u8; 32], timestamp_ms: i64) -> AuthProof {
    let message = signed_message(challenge, participant_id, timestamp_ms);
    let signature = signing_key.sign(&message);
    AuthProof {
        signature: signature.to_bytes().to_vec(),
        timestamp_ms,
    }
}

/// Verifies `proof` against `public_key`, `participant_id` and `challenge`,
/// and that `proof.timestamp_ms` is within [`MAX_PROOF_SKEW_MS`] of
/// `now_ms`.
pub fn verify_proof(
    public_key: &[u8; 32],
    participant_id: ParticipantId,
    challenge: &[u8; 32],
    proof: &AuthProof,
    now_ms: i64,
) -> Result<(), CryptoError> {
    if (proof.timestamp_ms - now_ms).abs() > MAX_PROOF_SKEW_MS {
        return Err(CryptoError::InvalidSignature);
    }
    let verifying_key = VerifyingKey::from_bytes(public_key).map_err(|_| CryptoError::MalformedKey)?;
    let signature_bytes: [u8; 64] = proof.signature.as_slice().try_into().map_err(|_| CryptoError::InvalidSignature)?;
    let signature = Signature::from_bytes(&signature_bytes);
    let message = signed_message(challenge, participant_id, proof.timestamp_ms);
    verifying_key
        .verify(&message, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    fn participant() -> ParticipantId {
        ParticipantId::new_random()
    }

    #[test]
    fn valid_proof_verifies() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        let participant_id = participant();
        let challenge = generate_challenge();
        let proof = generate_proof(&signing_key, participant_id, &challenge, 1_000);
        assert!(verify_proof(verifying_key.as_bytes(), participant_id, &challenge, &proof, 1_000).is_ok());
    }

    #[test]
    fn wrong_challenge_is_rejected() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        let participant_id = participant();
        let challenge = generate_challenge();
        let proof = generate_proof(&signing_key, participant_id, &challenge, 1_000);
        let other_challenge = generate_challenge();
        assert!(verify_proof(verifying_key.as_bytes(), participant_id, &other_challenge, &proof, 1_000).is_err());
    }

    #[test]
    fn stale_proof_is_rejected() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        let participant_id = participant();
        let challenge = generate_challenge();
        let proof = generate_proof(&signing_key, participant_id, &challenge, 1_000);
        assert!(verify_proof(verifying_key.as_bytes(), participant_id, &challenge, &proof, 1_000 + MAX_PROOF_SKEW_MS + 1).is_err());
    }
}
