//! The CRDT operation model: plaintext and encrypted operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{OperationId, ParticipantId, WorkspaceId};

/// Discriminator for a [`CRDTOperation`] / [`EncryptedOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Inserts `content` at `position`.
    Insert,
    /// Deletes `length` characters starting at `position`.
    Delete,
}

impl OperationKind {
    /// A one-byte tag used when folding the operation kind into AEAD
    /// associated data (§4.5).
    pub fn aad_tag(self) -> u8 {
        match self {
            OperationKind::Insert => 0,
            OperationKind::Delete => 1,
        }
    }
}

/// Error returned when constructing a [`CRDTOperation`] whose payload does
/// not match its declared [`OperationKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OperationError {
    /// `kind = Insert` but `content` was absent, or `length` was present.
    #[error("insert operations must carry content and no length")]
    MalformedInsert,
    /// `kind = Delete` but `length` was absent or zero, or `content` was
    /// present.
    #[error("delete operations must carry a length >= 1 and no content")]
    MalformedDelete,
}

/// A plaintext CRDT operation, as produced by a client before encryption.
///
/// Invariant: `kind = Insert` implies `content` is `Some` and `length` is
/// `None`; `kind = Delete` implies `length` is `Some(n)` with `n >= 1` and
/// `content` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CRDTOperation {
    /// Identifier of this operation.
    pub id: OperationId,
    /// The participant that authored this operation.
    pub participant_id: ParticipantId,
    /// Logical timestamp used for total ordering (§4.6).
    pub timestamp_ms: i64,
    /// Whether this is an insert or a delete.
    pub kind: OperationKind,
    /// Character offset the operation applies at.
    pub position: usize,
    /// Inserted text. Present iff `kind = Insert`.
    pub content: Option<String>,
    /// Number of characters removed. Present iff `kind = Delete`.
    pub length: Option<u32>,
}

impl CRDTOperation {
    /// Constructs an insert operation.
    pub fn insert(
        id: OperationId,
        participant_id: ParticipantId,
        timestamp_ms: i64,
        position: usize,
        content: String,
    ) -> Self {
        Self {
            id,
            participant_id,
            timestamp_ms,
            kind: OperationKind::Insert,
            position,
            content: Some(content),
            length: None,
        }
    }

    /// Constructs a delete operation.
    ///
    /// # Errors
    /// Returns [`OperationError::MalformedDelete`] if `length` is zero.
    pub fn delete(
        id: OperationId,
        participant_id: ParticipantId,
        timestamp_ms: i64,
        position: usize,
        length: u32,
    ) -> Result<Self, OperationError> {
        if length == 0 {
            return Err(OperationError::MalformedDelete);
        }
        Ok(Self {
            id,
            participant_id,
            timestamp_ms,
            kind: OperationKind::Delete,
            position,
            content: None,
            length: Some(length),
        })
    }

    /// Validates that `content`/`length` match `kind`.
    ///
    /// Used when reconstructing a [`CRDTOperation`] from an untrusted source
    /// (e.g. after decrypting an [`EncryptedOperation`]).
    pub fn validate(&self) -> Result<(), OperationError> {
        match self.kind {
            OperationKind::Insert => {
                if self.content.is_none() || self.length.is_some() {
                    return Err(OperationError::MalformedInsert);
                }
            }
            OperationKind::Delete => {
                if self.length.is_none_or(|len| len == 0) || self.content.is_some() {
                    return Err(OperationError::MalformedDelete);
                }
            }
        }
        Ok(())
    }

    /// The total order used for CRDT convergence: `(timestamp_ms, id)`
    /// ascending (§4.6).
    pub fn order_key(&self) -> (i64, OperationId) {
        (self.timestamp_ms, self.id)
    }
}

/// The only part of a [`CRDTOperation`]'s payload that is encrypted —
/// everything else in [`EncryptedOperation`] is routing metadata.
///
/// Public so that `ephemeral-crypto` can seal/open it; callers outside this
/// crate should still prefer constructing a [`CRDTOperation`] and going
/// through `ephemeral-crypto::operation_encryptor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationPayload {
    /// Inserted text, mirroring [`CRDTOperation::content`].
    pub content: Option<String>,
    /// Deleted length, mirroring [`CRDTOperation::length`].
    pub length: Option<u32>,
}

impl From<&CRDTOperation> for OperationPayload {
    fn from(op: &CRDTOperation) -> Self {
        Self {
            content: op.content.clone(),
            length: op.length,
        }
    }
}

/// A [`CRDTOperation`] with its payload sealed under a temporal key and
/// signed by the author.
///
/// `position`, `kind`, `id`, `timestamp_ms` and `participant_id` are
/// unencrypted metadata used for routing only (§1, "zero-knowledge
/// routing") — the server forwards based on these fields without ever
/// decrypting `encrypted_content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedOperation {
    /// Identifier of the underlying operation.
    pub id: OperationId,
    /// Workspace this operation belongs to.
    pub workspace_id: WorkspaceId,
    /// The authoring participant.
    pub participant_id: ParticipantId,
    /// Logical timestamp used for total ordering and routing.
    pub timestamp_ms: i64,
    /// Character offset, unencrypted (routing metadata only).
    pub position: usize,
    /// Whether this is an insert or delete, unencrypted (routing metadata
    /// only).
    pub kind: OperationKind,
    /// The sealed `{content?, length?}` payload.
    pub encrypted_content: Vec<u8>,
    /// 96-bit AEAD nonce used to seal `encrypted_content`.
    pub nonce: [u8; 12],
    /// 128-bit AEAD authentication tag.
    pub auth_tag: [u8; 16],
    /// Ed25519 signature over the routed fields, by the author.
    pub signature: Vec<u8>,
    /// Identifier of the temporal key used to seal this operation.
    pub key_id: String,
}
