//! Session table, authenticated admission, and reconnection takeover (§4.9).

use std::collections::HashMap;
use std::sync::Arc;

use ephemeral_crypto::participant_auth;
use ephemeral_types::crypto::AuthProof;
use ephemeral_types::{ParticipantId, WorkspaceId};
use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;

use ephemeral_types::api::v1::Message;

use crate::metrics::METRICS_ID_PARTICIPANTS_CONNECTED;
use crate::services::audit_logger::{AuditEvent, AuditEventType, AuditLogger};
use crate::services::workspace_manager::now_ms;

/// Errors returned by [`ParticipantManager::authenticate`].
#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum ParticipantManagerError {
    /// The submitted proof did not verify against `public_key`.
    #[error("authentication failed")]
    AuthFailed,
}

/// An authenticated participant's live connection state.
///
/// The `transport` is a back-reference the session does not own: dropping it
/// (e.g. on disconnect) does not free the session, and removing the session
/// does not, by itself, close the transport (the caller must do that).
#[derive(Clone)]
pub struct ParticipantSession {
    /// The participant this session belongs to.
    pub participant_id: ParticipantId,
    /// The workspace this session is scoped to.
    pub workspace_id: WorkspaceId,
    /// Raw Ed25519 public key bytes of this participant.
    pub public_key: [u8; 32],
    /// When this session was established, in epoch milliseconds.
    pub connected_at_ms: i64,
    /// When this session last sent or received a message, in epoch
    /// milliseconds.
    pub last_activity_ms: i64,
    /// Channel back to the connection's send loop, if still live.
    pub transport: Option<UnboundedSender<Message>>,
}

/// Owns every live [`ParticipantSession`], keyed by `(workspace_id,
/// participant_id)`.
///
/// Invariant: at most one live session per key — authenticating again for
/// the same key closes the prior session's transport and replaces it.
pub struct ParticipantManager {
    sessions: RwLock<HashMap<(WorkspaceId, ParticipantId), ParticipantSession>>,
    audit_logger: Arc<AuditLogger>,
}

impl ParticipantManager {
    /// Constructs an empty manager.
    pub fn new(audit_logger: Arc<AuditLogger>) -> Arc<Self> {
        Arc::new(Self { sessions: RwLock::new(HashMap::new()), audit_logger })
    }

    /// Verifies `proof` against `public_key` and `challenge`; on success,
    /// replaces any existing session for `(workspace_id, participant_id)`
    /// and installs a fresh one bound to `transport`.
    ///
    /// Emits `participant_joined` on success. Creates no session, and emits
    /// nothing, on failure.
    pub fn authenticate(
        &self,
        workspace_id: WorkspaceId,
        participant_id: ParticipantId,
        public_key: [u8; 32],
        challenge: &[u8; 32],
        proof: &AuthProof,
        transport: UnboundedSender<Message>,
    ) -> Result<ParticipantSession, ParticipantManagerError> {
        participant_auth::verify_proof(&public_key, participant_id, challenge, proof, now_ms())
            .map_err(|_| ParticipantManagerError::AuthFailed)?;

        let now = now_ms();
        let session = ParticipantSession {
            participant_id,
            workspace_id,
            public_key,
            connected_at_ms: now,
            last_activity_ms: now,
            transport: Some(transport),
        };

        let mut guard = self.sessions.write();
        let replaced = guard.insert((workspace_id, participant_id), session.clone()).is_some();
        drop(guard);
        if !replaced {
            metrics::gauge!(METRICS_ID_PARTICIPANTS_CONNECTED).increment(1.0);
        }
        self.audit_logger.log(workspace_id, AuditEvent::new(AuditEventType::ParticipantJoined, Some(participant_id)));
        Ok(session)
    }

    /// Returns the live session for `(workspace_id, participant_id)`, if any.
    pub fn get_session(&self, workspace_id: WorkspaceId, participant_id: ParticipantId) -> Option<ParticipantSession> {
        self.sessions.read().get(&(workspace_id, participant_id)).cloned()
    }

    /// Updates `last_activity_ms` for a live session to the current time.
    pub fn touch(&self, workspace_id: WorkspaceId, participant_id: ParticipantId) {
        if let Some(session) = self.sessions.write().get_mut(&(workspace_id, participant_id)) {
            session.last_activity_ms = now_ms();
        }
    }

    /// Returns every live session in `workspace_id`.
    pub fn list_workspace_participants(&self, workspace_id: WorkspaceId) -> Vec<ParticipantSession> {
        self.sessions.read().values().filter(|session| session.workspace_id == workspace_id).cloned().collect()
    }

    /// Returns the number of live sessions across every workspace.
    pub fn total_participant_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Removes the session for `(workspace_id, participant_id)`, if one
    /// exists, dropping its transport sender (the connection's send loop
    /// observes the closed channel and tears itself down).
    ///
    /// Idempotent: removing an already-absent session is a no-op. Emits
    /// `participant_left` only when a session actually existed.
    pub fn remove_participant(&self, workspace_id: WorkspaceId, participant_id: ParticipantId) {
        let removed = self.sessions.write().remove(&(workspace_id, participant_id));
        if removed.is_some() {
            metrics::gauge!(METRICS_ID_PARTICIPANTS_CONNECTED).decrement(1.0);
            self.audit_logger.log(workspace_id, AuditEvent::new(AuditEventType::ParticipantLeft, Some(participant_id)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use ephemeral_crypto::participant_auth::{generate_challenge, generate_proof};
    use rand_core::OsRng;

    fn channel() -> UnboundedSender<Message> {
        tokio::sync::mpsc::unbounded_channel().0
    }

    #[test]
    fn successful_auth_creates_exactly_one_session() {
        let manager = ParticipantManager::new(AuditLogger::new());
        let workspace_id = WorkspaceId::new_random();
        let signing_key = SigningKey::generate(&mut OsRng);
        let participant_id = ParticipantId::new_random();
        let challenge = generate_challenge();
        let proof = generate_proof(&signing_key, participant_id, &challenge, now_ms());

        let public_key = signing_key.verifying_key().to_bytes();
        let session = manager
            .authenticate(workspace_id, participant_id, public_key, &challenge, &proof, channel())
            .unwrap();
        assert_eq!(session.participant_id, participant_id);
        assert_eq!(manager.total_participant_count(), 1);
    }

    #[test]
    fn wrong_key_is_rejected_and_creates_no_session() {
        let manager = ParticipantManager::new(AuditLogger::new());
        let workspace_id = WorkspaceId::new_random();
        let challenge = generate_challenge();
        let participant_id = ParticipantId::new_random();

        let signer_a = SigningKey::generate(&mut OsRng);
        let signer_b = SigningKey::generate(&mut OsRng);
        let proof = generate_proof(&signer_a, participant_id, &challenge, now_ms());

        let result = manager.authenticate(
            workspace_id,
            participant_id,
            signer_b.verifying_key().to_bytes(),
            &challenge,
            &proof,
            channel(),
        );
        assert!(result.is_err());
        assert_eq!(manager.total_participant_count(), 0);
    }

    #[test]
    fn reauthentication_replaces_prior_session() {
        let manager = ParticipantManager::new(AuditLogger::new());
        let workspace_id = WorkspaceId::new_random();
        let signing_key = SigningKey::generate(&mut OsRng);
        let participant_id = ParticipantId::new_random();
        let public_key = signing_key.verifying_key().to_bytes();

        for _ in 0..2 {
            let challenge = generate_challenge();
            let proof = generate_proof(&signing_key, participant_id, &challenge, now_ms());
            manager.authenticate(workspace_id, participant_id, public_key, &challenge, &proof, channel()).unwrap();
        }
        assert_eq!(manager.total_participant_count(), 1);
    }

    #[test]
    fn remove_participant_is_idempotent() {
        let manager = ParticipantManager::new(AuditLogger::new());
        let workspace_id = WorkspaceId::new_random();
        let participant_id = ParticipantId::new_random();
        manager.remove_participant(workspace_id, participant_id);
        manager.remove_participant(workspace_id, participant_id);
        assert_eq!(manager.total_participant_count(), 0);
    }
}
