//! Publishable commitments proving a key existed over a stated window,
//! without revealing the key material itself.

use ephemeral_types::{crypto::Commitment, time::TemporalKey};

use crate::CryptoError;

/// Computes the commitment digest for `key`, binding its id, validity
/// bounds and material.
///
/// Must be called before the key's material is destroyed — the whole point
/// of a commitment is to let a party who only holds the digest verify,
/// after destruction, that the original material was known at commitment
/// time (by recomputing the digest from material recovered another way, or
/// by trusting the committing party not to have forged it beforehand).
pub fn create_commitment(key: &TemporalKey, timestamp_ms: i64) -> Commitment {
    Commitment {
        key_id: key.id.clone(),
        valid_from_ms: key.valid_from_ms,
        valid_until_ms: key.valid_until_ms,
        hash: digest(&key.id, key.valid_from_ms, key.valid_until_ms, key.material.as_bytes()),
        timestamp_ms,
    }
}

/// Recomputes the digest from `material` and checks it against
/// `commitment.hash`.
pub fn verify_commitment(commitment: &Commitment, material: &[u8; 32]) -> Result<(), CryptoError> {
    let expected = digest(
        &commitment.key_id,
        commitment.valid_from_ms,
        commitment.valid_until_ms,
        material,
    );
    if expected == commitment.hash {
        Ok(())
    } else {
        Err(CryptoError::InvalidCommitment)
    }
}

fn digest(key_id: &str, valid_from_ms: i64, valid_until_ms: i64, material: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(key_id.as_bytes());
    hasher.update(&valid_from_ms.to_be_bytes());
    hasher.update(&valid_until_ms.to_be_bytes());
    hasher.update(material);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_types::time::KeyMaterial;

    #[test]
    fn commitment_round_trips() {
        let key = TemporalKey::new("key-0".into(), KeyMaterial::new([3u8; 32]), 0, 1000, 1000).unwrap();
        let commitment = create_commitment(&key, 500);
        assert!(verify_commitment(&commitment, key.material.as_bytes()).is_ok());
    }

    #[test]
    fn commitment_rejects_wrong_material() {
        let key = TemporalKey::new("key-0".into(), KeyMaterial::new([3u8; 32]), 0, 1000, 1000).unwrap();
        let commitment = create_commitment(&key, 500);
        assert!(verify_commitment(&commitment, &[9u8; 32]).is_err());
    }

    #[test]
    fn commitment_survives_destroyed_key() {
        let mut key = TemporalKey::new("key-0".into(), KeyMaterial::new([3u8; 32]), 0, 1000, 1000).unwrap();
        let original_bytes = *key.material.as_bytes();
        let commitment = create_commitment(&key, 500);
        crate::time_locked_encryption::destroy_key(&mut key.material);
        assert!(key.material.is_zeroed());
        assert!(verify_commitment(&commitment, &original_bytes).is_ok());
    }
}
