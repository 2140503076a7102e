//! ChaCha20-Poly1305 sealing and opening under a [`TemporalKey`], plus
//! explicit, observable key destruction.

use chacha20poly1305::{
    AeadCore, ChaCha20Poly1305, KeyInit, Nonce,
    aead::{Aead, Payload},
};
use ephemeral_types::time::{KeyMaterial, TemporalKey};
use rand_core::OsRng;
use zeroize::Zeroize;

use crate::CryptoError;

/// Generates a fresh random 96-bit nonce.
///
/// Callers must never reuse a nonce under the same key: each seal under a
/// given temporal key must draw a fresh nonce from this function (or an
/// equivalent CSPRNG source).
pub fn generate_nonce() -> [u8; 12] {
    ChaCha20Poly1305::generate_nonce(&mut OsRng).into()
}

/// Seals `plaintext` under `key.material` with a freshly generated nonce,
/// authenticating `aad` alongside it.
///
/// Returns `(ciphertext, nonce, auth_tag)`, split apart because the wire
/// types carry them as separate fields rather than one concatenated blob.
pub fn seal(
    key: &TemporalKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; 12], [u8; 16]), CryptoError> {
    let nonce_bytes = generate_nonce();
    let cipher = ChaCha20Poly1305::new(key.material.as_bytes().into());
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::Aead)?;
    let tag_offset = sealed.len() - 16;
    let tag_bytes: [u8; 16] = sealed.split_off(tag_offset).try_into().expect("poly1305 tag is 16 bytes");
    Ok((sealed, nonce_bytes, tag_bytes))
}

/// Opens a ciphertext sealed by [`seal`] under `key.material`.
///
/// `aad` must be bit-identical to what was passed to `seal` — including its
/// absence, since an empty slice and a differing non-empty slice both fail
/// authentication rather than silently succeeding on the wrong associated
/// data (§4.2's AAD symmetry requirement).
pub fn open(
    key: &TemporalKey,
    aad: &[u8],
    ciphertext: &[u8],
    nonce: &[u8; 12],
    auth_tag: &[u8; 16],
) -> Result<Vec<u8>, CryptoError> {
    let mut sealed = Vec::with_capacity(ciphertext.len() + 16);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(auth_tag);
    let cipher = ChaCha20Poly1305::new(key.material.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: &sealed, aad })
        .map_err(|_| CryptoError::Aead)
}

/// Destroys `key`'s material in place, zeroing its bytes so that
/// [`KeyMaterial::is_zeroed`] reports `true` afterward.
///
/// Called when a key's grace period elapses, before the commitment for it
/// is published — the commitment's hash is computed from the key's bounds,
/// not from its (now destroyed) material, so destruction and publication
/// can happen in either order.
pub fn destroy_key(material: &mut KeyMaterial) {
    material.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_types::time::KeyMaterial;

    fn key() -> TemporalKey {
        TemporalKey::new("key-0".into(), KeyMaterial::new([7u8; 32]), 0, 1000, 1000).unwrap()
    }

    #[test]
    fn round_trips() {
        let key = key();
        let (ct, nonce, tag) = seal(&key, b"aad", b"hello workspace").unwrap();
        let pt = open(&key, b"aad", &ct, &nonce, &tag).unwrap();
        assert_eq!(pt, b"hello workspace");
    }

    #[test]
    fn rejects_aad_mismatch() {
        let key = key();
        let (ct, nonce, tag) = seal(&key, b"aad-a", b"payload").unwrap();
        assert!(open(&key, b"aad-b", &ct, &nonce, &tag).is_err());
    }

    #[test]
    fn rejects_aad_presence_mismatch() {
        let key = key();
        let (ct, nonce, tag) = seal(&key, b"", b"payload").unwrap();
        assert!(open(&key, b"nonempty", &ct, &nonce, &tag).is_err());
    }

    #[test]
    fn destroy_zeroes_material() {
        let mut key = key();
        destroy_key(&mut key.material);
        assert!(key.material.is_zeroed());
    }
}
