//! Rotation windows and the public shape of a temporal key.
//!
//! This module defines [`TimeWindow`], the schedule a workspace's temporal
//! keys rotate on, and [`TemporalKey`], the key material itself. Deriving a
//! [`TemporalKey`] from a workspace secret and checking its validity against
//! the grace period both live in `ephemeral-crypto`; this module only models
//! the data.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Lower bound (inclusive) on a workspace's total duration, in minutes.
pub const MIN_DURATION_MINUTES: i64 = 5;
/// Upper bound (inclusive) on a workspace's total duration, in minutes.
pub const MAX_DURATION_MINUTES: i64 = 120;

/// Errors returned when constructing a [`TimeWindow`] or [`TemporalKey`] with
/// values that violate their invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimeModelError {
    /// `end_ms - start_ms` was outside `[5, 120]` minutes.
    #[error("window duration must be between {MIN_DURATION_MINUTES} and {MAX_DURATION_MINUTES} minutes, got {0} ms")]
    InvalidDuration(i64),
    /// `rotation_interval_min` does not evenly divide the window's duration.
    #[error("rotation interval of {0} min does not evenly divide the window")]
    RotationDoesNotDivideWindow(i64),
    /// `grace_period_ms` was not smaller than one rotation interval.
    #[error("grace period of {0} ms must be smaller than one rotation interval")]
    GraceTooLarge(i64),
    /// `valid_from_ms < valid_until_ms <= grace_end_ms` did not hold.
    #[error("temporal key validity bounds are not strictly ordered")]
    InvalidKeyBounds,
}

/// The rotation schedule in effect for a workspace.
///
/// Invariants (enforced by [`TimeWindow::new`]):
/// - `end_ms - start_ms` is between 5 and 120 minutes.
/// - `rotation_interval_min` evenly divides the window's duration.
/// - `grace_period_ms` is smaller than one rotation interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the workspace's validity, in epoch milliseconds.
    pub start_ms: i64,
    /// End of the workspace's validity, in epoch milliseconds.
    pub end_ms: i64,
    /// Length of one temporal-key rotation period, in minutes.
    pub rotation_interval_min: i64,
    /// Grace period after a key's `valid_until`, in milliseconds.
    pub grace_period_ms: i64,
}

impl TimeWindow {
    /// Constructs a new [`TimeWindow`], validating all invariants.
    pub fn new(
        start_ms: i64,
        end_ms: i64,
        rotation_interval_min: i64,
        grace_period_ms: i64,
    ) -> Result<Self, TimeModelError> {
        let duration_ms = end_ms - start_ms;
        let duration_min = duration_ms / 60_000;
        if duration_ms <= 0
            || !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration_min)
        {
            return Err(TimeModelError::InvalidDuration(duration_ms));
        }
        if rotation_interval_min <= 0 || duration_min % rotation_interval_min != 0 {
            return Err(TimeModelError::RotationDoesNotDivideWindow(
                rotation_interval_min,
            ));
        }
        let rotation_ms = rotation_interval_min * 60_000;
        if grace_period_ms < 0 || grace_period_ms >= rotation_ms {
            return Err(TimeModelError::GraceTooLarge(grace_period_ms));
        }
        Ok(Self {
            start_ms,
            end_ms,
            rotation_interval_min,
            grace_period_ms,
        })
    }

    /// Length of one rotation period, in milliseconds.
    pub fn rotation_ms(&self) -> i64 {
        self.rotation_interval_min * 60_000
    }

    /// Total duration of the window, in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// Returns a copy of this window with `end_ms` pushed back by
    /// `additional_minutes`, re-validating all invariants.
    pub fn extended_by(&self, additional_minutes: i64) -> Result<Self, TimeModelError> {
        Self::new(
            self.start_ms,
            self.end_ms + additional_minutes * 60_000,
            self.rotation_interval_min,
            self.grace_period_ms,
        )
    }
}

/// 32 bytes of symmetric key material that zeroizes itself on drop.
///
/// In addition to this automatic zeroization, callers must still invoke
/// `ephemeral_crypto::time_locked_encryption::destroy_key` at the end of a
/// key's life so that destruction is observable (for commitments) rather
/// than implicit.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct KeyMaterial(pub(crate) [u8; 32]);

impl KeyMaterial {
    /// Wraps raw bytes as [`KeyMaterial`].
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrows the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns `true` iff every byte is zero (i.e. the key has been
    /// destroyed).
    pub fn is_zeroed(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial(..)")
    }
}

/// A symmetric key valid for a bounded time window.
///
/// Invariant: `valid_from_ms < valid_until_ms <= grace_end_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalKey {
    /// Identifier of this key, e.g. `"key-3"`.
    pub id: String,
    /// 32 bytes of symmetric key material.
    pub material: KeyMaterial,
    /// Start of this key's validity, in epoch milliseconds.
    pub valid_from_ms: i64,
    /// End of this key's validity (exclusive of grace), in epoch
    /// milliseconds.
    pub valid_until_ms: i64,
    /// End of the grace period during which this key is still accepted for
    /// decryption, in epoch milliseconds.
    pub grace_end_ms: i64,
}

impl TemporalKey {
    /// Constructs a [`TemporalKey`], validating that its bounds are
    /// strictly ordered.
    pub fn new(
        id: String,
        material: KeyMaterial,
        valid_from_ms: i64,
        valid_until_ms: i64,
        grace_end_ms: i64,
    ) -> Result<Self, TimeModelError> {
        if !(valid_from_ms < valid_until_ms && valid_until_ms <= grace_end_ms) {
            return Err(TimeModelError::InvalidKeyBounds);
        }
        Ok(Self {
            id,
            material,
            valid_from_ms,
            valid_until_ms,
            grace_end_ms,
        })
    }

    /// Returns `true` iff `now_ms` falls within `[valid_from_ms, grace_end_ms]`.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        (self.valid_from_ms..=self.grace_end_ms).contains(&now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_duration() {
        assert!(TimeWindow::new(0, 3 * 60_000, 1, 0).is_err());
        assert!(TimeWindow::new(0, 121 * 60_000, 1, 0).is_err());
    }

    #[test]
    fn rejects_non_dividing_rotation() {
        assert!(TimeWindow::new(0, 30 * 60_000, 7, 0).is_err());
    }

    #[test]
    fn rejects_grace_period_too_large() {
        assert!(TimeWindow::new(0, 30 * 60_000, 5, 5 * 60_000).is_err());
    }

    #[test]
    fn accepts_valid_window() {
        let window = TimeWindow::new(0, 30 * 60_000, 5, 10_000).unwrap();
        assert_eq!(window.rotation_ms(), 5 * 60_000);
    }

    #[test]
    fn extend_revalidates() {
        let window = TimeWindow::new(0, 30 * 60_000, 5, 10_000).unwrap();
        let extended = window.extended_by(10).unwrap();
        assert_eq!(extended.end_ms, 40 * 60_000);
    }

    #[test]
    fn temporal_key_enforces_ordering() {
        let material = KeyMaterial::new([1u8; 32]);
        assert!(TemporalKey::new("key-0".into(), material.clone(), 100, 50, 200).is_err());
        assert!(TemporalKey::new("key-0".into(), material, 0, 100, 100).is_ok());
    }
}
