//! Derivation of [`TemporalKey`]s from a per-workspace root secret.
//!
//! Keys are derived, never stored: a workspace's `TimeWindow` plus a root
//! secret deterministically produce every rotation's key material, so the
//! server never needs to persist more than the root secret and the window.

use ephemeral_types::time::{KeyMaterial, TemporalKey, TimeWindow};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::CryptoError;

/// Derives the key id for the rotation covering `now_ms`, e.g. `"key-3"`.
///
/// Returns `None` if `now_ms` falls outside `[window.start_ms,
/// window.end_ms + window.grace_period_ms)`.
pub fn key_id_for_instant(window: &TimeWindow, now_ms: i64) -> Option<String> {
    if now_ms < window.start_ms || now_ms >= window.end_ms + window.grace_period_ms {
        return None;
    }
    let elapsed = (now_ms - window.start_ms).min(window.duration_ms() - 1);
    let index = elapsed / window.rotation_ms();
    Some(rotation_key_id(index))
}

/// Formats a rotation index as the key id used in derivation, wire frames
/// and commitments.
pub fn rotation_key_id(rotation_index: i64) -> String {
    format!("key-{rotation_index}")
}

/// Derives the [`TemporalKey`] for rotation `rotation_index` of `window`
/// from `root_secret`, via HKDF-SHA256 (extract with the workspace id as
/// salt, expand with the key id as info).
///
/// Deterministic: calling this twice with the same arguments yields
/// bit-identical key material, so any server replica can recompute a key
/// without coordinating with whichever replica derived it first.
pub fn derive_temporal_key(
    root_secret: &[u8],
    workspace_salt: &[u8],
    window: &TimeWindow,
    rotation_index: i64,
) -> Result<TemporalKey, CryptoError> {
    let rotation_count = window.duration_ms() / window.rotation_ms();
    if rotation_index < 0 || rotation_index >= rotation_count {
        return Err(CryptoError::UnknownKey(rotation_key_id(rotation_index)));
    }

    let id = rotation_key_id(rotation_index);
    let hk = Hkdf::<Sha256>::new(Some(workspace_salt), root_secret);
    let mut okm = [0u8; 32];
    hk.expand(id.as_bytes(), &mut okm)
        .map_err(|_| CryptoError::Aead)?;

    let valid_from_ms = window.start_ms + rotation_index * window.rotation_ms();
    let valid_until_ms = valid_from_ms + window.rotation_ms();
    let grace_end_ms = valid_until_ms + window.grace_period_ms;

    TemporalKey::new(id, KeyMaterial::new(okm), valid_from_ms, valid_until_ms, grace_end_ms)
        .map_err(|_| CryptoError::UnknownKey(rotation_key_id(rotation_index)))
}

/// Derives every temporal key live for `window`, from rotation 0 through
/// the last rotation before `window.end_ms`.
///
/// Intended for bootstrapping a freshly created workspace's key schedule,
/// not for steady-state lookups (use [`derive_temporal_key`] with
/// [`key_id_for_instant`] for those).
pub fn derive_all(root_secret: &[u8], workspace_salt: &[u8], window: &TimeWindow) -> Vec<TemporalKey> {
    let rotation_count = window.duration_ms() / window.rotation_ms();
    (0..rotation_count)
        .filter_map(|i| derive_temporal_key(root_secret, workspace_salt, window, i).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> TimeWindow {
        TimeWindow::new(0, 30 * 60_000, 5, 10_000).unwrap()
    }

    #[test]
    fn derivation_is_deterministic() {
        let w = window();
        let a = derive_temporal_key(b"root", b"workspace-1", &w, 1).unwrap();
        let b = derive_temporal_key(b"root", b"workspace-1", &w, 1).unwrap();
        assert_eq!(a.material.as_bytes(), b.material.as_bytes());
    }

    #[test]
    fn different_workspaces_diverge() {
        let w = window();
        let a = derive_temporal_key(b"root", b"workspace-1", &w, 1).unwrap();
        let b = derive_temporal_key(b"root", b"workspace-2", &w, 1).unwrap();
        assert_ne!(a.material.as_bytes(), b.material.as_bytes());
    }

    #[test]
    fn out_of_range_rotation_is_rejected() {
        let w = window();
        assert!(derive_temporal_key(b"root", b"workspace-1", &w, 6).is_err());
    }

    #[test]
    fn key_id_for_instant_tracks_rotation_boundaries() {
        let w = window();
        assert_eq!(key_id_for_instant(&w, 0), Some("key-0".to_string()));
        assert_eq!(key_id_for_instant(&w, 5 * 60_000), Some("key-1".to_string()));
        assert_eq!(key_id_for_instant(&w, 30 * 60_000 + 9_999), Some("key-5".to_string()));
        assert_eq!(key_id_for_instant(&w, 30 * 60_000 + 10_000), None);
    }
}
