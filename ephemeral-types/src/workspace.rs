//! Workspace configuration, membership and the encrypted metadata envelope.

use serde::{Deserialize, Serialize};

use crate::{ParticipantId, WorkspaceId, crypto::EncryptedPayload, time::TimeWindow};

/// Status of a [`Workspace`] (the server-side record).
///
/// Invariant (enforced by `WorkspaceManager`, not by this type): transitions
/// are monotone — `active` may move to `expired` or `revoked`; both of those
/// are terminal/absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceStatus {
    /// The workspace accepts handshakes and operations.
    Active,
    /// The workspace's scheduled lifetime elapsed.
    Expired,
    /// The workspace was explicitly torn down before its scheduled expiry.
    Revoked,
}

impl WorkspaceStatus {
    /// Returns `true` iff the workspace is in a state from which it will
    /// never return to `active`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkspaceStatus::Active)
    }
}

/// The creator-supplied configuration of a workspace, fixed at creation time
/// (besides `expires_at_ms`/`window.end_ms`, which `extend_workspace` may
/// push back).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Identifier of the workspace.
    pub id: WorkspaceId,
    /// Creation time, in epoch milliseconds.
    pub created_at_ms: i64,
    /// Scheduled expiration time, in epoch milliseconds.
    pub expires_at_ms: i64,
    /// Temporal-key rotation schedule.
    pub window: TimeWindow,
    /// Hard ceiling on the number of distinct participants.
    pub max_participants: usize,
    /// Whether `extend_workspace` may be called on this workspace.
    pub allow_extension: bool,
}

/// A member of a workspace, as carried inside [`WorkspaceMetadata`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    /// The participant's identifier.
    pub id: ParticipantId,
    /// Raw Ed25519 public key bytes identifying the participant.
    pub public_key: [u8; 32],
    /// Raw X25519 public key bytes used to seal this participant's copy of
    /// the metadata envelope (§4.8). Distinct from `public_key`: Ed25519
    /// identity keys are not safely reusable as Diffie-Hellman keys.
    pub x25519_public_key: [u8; 32],
    /// Whether this participant created the workspace.
    pub is_creator: bool,
    /// When this participant joined, in epoch milliseconds.
    pub joined_at_ms: i64,
}

/// The plaintext shape of a workspace's metadata.
///
/// Stored server-side only in encrypted form — see
/// [`EncryptedWorkspaceMetadata`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    /// The workspace's configuration.
    pub config: WorkspaceConfig,
    /// Current membership.
    pub participants: Vec<ParticipantInfo>,
    /// Identifier of the temporal key currently in use.
    pub current_key_id: String,
    /// When the next rotation is scheduled, in epoch milliseconds.
    pub next_rotation_at_ms: i64,
}

/// A [`WorkspaceMetadata`] envelope, encrypted once per recipient public
/// key.
///
/// Re-encrypted in full whenever membership changes (§4.8), so that a
/// removed participant's public key no longer appears among the recipients
/// and subsequent decryption attempts against fresh metadata fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedWorkspaceMetadata {
    /// One [`EncryptedPayload`] per current recipient, keyed by the
    /// recipient's raw X25519 public key bytes (see
    /// `ephemeral-crypto::metadata_envelope`).
    pub recipients: Vec<(Vec<u8>, EncryptedPayload)>,
}

impl WorkspaceConfig {
    /// Returns `true` iff the given timestamp is at or past this
    /// workspace's scheduled expiration.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at_ms <= now_ms
    }
}
