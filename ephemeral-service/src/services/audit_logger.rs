//! Per-workspace encrypted event journal (§4.7).

use std::collections::HashMap;

use ephemeral_types::time::{KeyMaterial, TemporalKey};
use ephemeral_types::{ParticipantId, WorkspaceId};
use parking_lot::RwLock;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

/// The kind of lifecycle or protocol event an [`AuditEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    /// A workspace was created.
    WorkspaceCreated,
    /// A workspace's expiration was pushed back.
    WorkspaceExtended,
    /// A workspace was explicitly revoked.
    WorkspaceRevoked,
    /// A workspace's scheduled lifetime elapsed.
    WorkspaceExpired,
    /// A participant completed a handshake.
    ParticipantJoined,
    /// A participant's session was removed (disconnect or reconnect takeover).
    ParticipantLeft,
    /// A participant was administratively removed from a workspace.
    ParticipantRevoked,
    /// An operation was accepted and routed.
    OperationSubmitted,
    /// A temporal key's rotation boundary was crossed.
    KeyRotated,
    /// A temporal key's material was destroyed.
    KeyDeleted,
}

/// A single audit entry, before sealing.
///
/// The sealed form ([`SealedEvent`]) never contains `event_type` or any other
/// field in the clear — only the workspace id travels alongside it, as AAD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier of this event.
    pub id: Uuid,
    /// When this event occurred, in epoch milliseconds.
    pub timestamp_ms: i64,
    /// The kind of event.
    pub event_type: AuditEventType,
    /// The participant this event concerns, if any.
    pub participant_id: Option<ParticipantId>,
    /// Free-form context, e.g. an operation id or a rotated key's id.
    pub metadata: Option<String>,
}

impl AuditEvent {
    /// Constructs an event stamped with the current time.
    pub fn new(event_type: AuditEventType, participant_id: Option<ParticipantId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp_ms: super::workspace_manager::now_ms(),
            event_type,
            participant_id,
            metadata: None,
        }
    }

    /// Attaches free-form metadata to this event.
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

/// A sealed [`AuditEvent`], as retained in a workspace's log.
#[derive(Debug, Clone)]
pub struct SealedEvent {
    /// AEAD ciphertext of the CBOR-encoded [`AuditEvent`].
    pub ciphertext: Vec<u8>,
    /// Nonce used to seal this entry.
    pub nonce: [u8; 12],
    /// Authentication tag for this entry.
    pub auth_tag: [u8; 16],
}

struct AuditKeyState {
    key: TemporalKey,
    log: Vec<SealedEvent>,
}

fn fresh_audit_key() -> TemporalKey {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    TemporalKey::new("audit-key".into(), KeyMaterial::new(bytes), i64::MIN, i64::MAX - 1, i64::MAX)
        .expect("static validity bounds are well-ordered")
}

/// Owns every workspace's audit key and its sealed event log.
pub struct AuditLogger {
    state: RwLock<HashMap<WorkspaceId, AuditKeyState>>,
}

impl AuditLogger {
    /// Constructs an empty logger.
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self { state: RwLock::new(HashMap::new()) })
    }

    /// Seals `event` under `workspace_id`'s audit key (lazily generated on
    /// first use) and appends it to the workspace's log.
    pub fn log(&self, workspace_id: WorkspaceId, event: AuditEvent) {
        let mut plaintext = Vec::new();
        if ciborium::into_writer(&event, &mut plaintext).is_err() {
            return;
        }
        let aad = workspace_id.as_bytes().to_vec();

        let mut guard = self.state.write();
        let entry = guard.entry(workspace_id).or_insert_with(|| AuditKeyState { key: fresh_audit_key(), log: Vec::new() });
        if let Ok((ciphertext, nonce, auth_tag)) = ephemeral_crypto::time_locked_encryption::seal(&entry.key, &aad, &plaintext) {
            entry.log.push(SealedEvent { ciphertext, nonce, auth_tag });
        }
    }

    /// Returns the audit key currently in use for `workspace_id`, generating
    /// one (with an empty log) if none exists yet.
    pub fn get_audit_key(&self, workspace_id: WorkspaceId) -> TemporalKey {
        let mut guard = self.state.write();
        guard.entry(workspace_id).or_insert_with(|| AuditKeyState { key: fresh_audit_key(), log: Vec::new() }).key.clone()
    }

    /// Returns every sealed entry logged so far for `workspace_id`.
    pub fn sealed_log(&self, workspace_id: WorkspaceId) -> Vec<SealedEvent> {
        self.state.read().get(&workspace_id).map(|entry| entry.log.clone()).unwrap_or_default()
    }

    /// Clears `workspace_id`'s log and destroys its audit key in place.
    ///
    /// The next [`AuditLogger::log`] or [`AuditLogger::get_audit_key`] call
    /// for the same workspace generates a fresh key and starts a new log.
    pub fn delete_workspace_logs(&self, workspace_id: WorkspaceId) {
        let mut guard = self.state.write();
        if let Some(mut entry) = guard.remove(&workspace_id) {
            entry.log.clear();
            entry.key.material.zeroize();
        }
    }
}
