//! Workspace lifecycle, metadata re-encryption on membership change, and
//! expiration scheduling (§4.8).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ephemeral_crypto::temporal_key;
use ephemeral_types::time::{KeyMaterial, TemporalKey, TimeWindow};
use ephemeral_types::workspace::{
    EncryptedWorkspaceMetadata, ParticipantInfo, WorkspaceConfig, WorkspaceMetadata, WorkspaceStatus,
};
use ephemeral_types::{ParticipantId, WorkspaceId};
use parking_lot::{Mutex, RwLock};
use rand_core::{OsRng, RngCore};
use tokio_util::sync::CancellationToken;

use crate::metrics::{METRICS_ID_WORKSPACES_ACTIVE, METRICS_ID_WORKSPACES_CREATED, METRICS_ID_WORKSPACES_EXPIRED, METRICS_ID_WORKSPACES_REVOKED};
use crate::services::audit_logger::{AuditEvent, AuditEventType, AuditLogger};

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_millis() as i64
}

/// Errors returned by [`WorkspaceManager`] operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkspaceManagerError {
    /// `duration_minutes` was outside `[5, 120]`, or the resulting window
    /// otherwise violated [`TimeWindow`]'s invariants.
    #[error("invalid expiration duration: {0}")]
    InvalidDuration(String),
    /// No workspace exists with the given id.
    #[error("workspace not found")]
    NotFound,
    /// The workspace has already moved to a terminal state.
    #[error("workspace expired")]
    Expired,
    /// `extend_workspace` was called on a workspace whose config forbids it.
    #[error("extension not allowed for this workspace")]
    ExtensionNotAllowed,
    /// No temporal key is valid (including grace) for the requested instant.
    #[error("key {0} is not currently available")]
    KeyUnavailable(String),
}

/// Input to [`WorkspaceManager::create_workspace`], the caller-chosen half of
/// a [`WorkspaceConfig`] (the rest — id, timestamps — is assigned here).
#[derive(Debug, Clone)]
pub struct CreateWorkspaceInput {
    /// Total workspace lifetime, in minutes. Must be in `[5, 120]`.
    pub duration_minutes: i64,
    /// Temporal-key rotation period, in minutes. Must evenly divide
    /// `duration_minutes`.
    pub rotation_interval_min: i64,
    /// Grace period after a key's `valid_until`, in milliseconds.
    pub grace_period_ms: i64,
    /// Hard ceiling on participant count.
    pub max_participants: usize,
    /// Whether `extend_workspace` may later be called.
    pub allow_extension: bool,
}

/// The public, non-secret view of a workspace returned across the HTTP/WS
/// boundary (§6).
#[derive(Debug, Clone)]
pub struct WorkspaceDescriptor {
    /// Identifier of the workspace.
    pub id: WorkspaceId,
    /// Creation time, in epoch milliseconds.
    pub created_at_ms: i64,
    /// Scheduled (or actual, if revoked) expiration time, in epoch
    /// milliseconds.
    pub expires_at_ms: i64,
    /// Current lifecycle status.
    pub status: WorkspaceStatus,
    /// Number of current participants.
    pub participant_count: usize,
    /// The current encrypted metadata envelope.
    pub encrypted_metadata: EncryptedWorkspaceMetadata,
}

struct WorkspaceRecord {
    config: WorkspaceConfig,
    status: WorkspaceStatus,
    /// Root secret every temporal key is derived from. Never leaves this
    /// record; zeroized on drop.
    root_secret: KeyMaterial,
    participants: Vec<ParticipantInfo>,
    current_key_id: String,
    encrypted_metadata: EncryptedWorkspaceMetadata,
    expiry_token: CancellationToken,
}

impl WorkspaceRecord {
    fn descriptor(&self, id: WorkspaceId) -> WorkspaceDescriptor {
        WorkspaceDescriptor {
            id,
            created_at_ms: self.config.created_at_ms,
            expires_at_ms: self.config.expires_at_ms,
            status: self.status,
            participant_count: self.participants.len(),
            encrypted_metadata: self.encrypted_metadata.clone(),
        }
    }

    fn metadata(&self) -> WorkspaceMetadata {
        WorkspaceMetadata {
            config: self.config.clone(),
            participants: self.participants.clone(),
            current_key_id: self.current_key_id.clone(),
            next_rotation_at_ms: self.config.window.start_ms + self.config.window.rotation_ms(),
        }
    }

    fn reencrypt_metadata(&mut self) -> Result<(), WorkspaceManagerError> {
        let recipients: Vec<[u8; 32]> = self.participants.iter().map(|p| p.x25519_public_key).collect();
        let metadata = self.metadata();
        self.encrypted_metadata = ephemeral_crypto::metadata_envelope::encrypt_for_all(&recipients, &metadata)
            .map_err(|err| WorkspaceManagerError::InvalidDuration(err.to_string()))?;
        Ok(())
    }
}

/// Owns every [`WorkspaceRecord`] and the one-shot expiration timer
/// scheduled for each.
pub struct WorkspaceManager {
    workspaces: RwLock<HashMap<WorkspaceId, Arc<Mutex<WorkspaceRecord>>>>,
    audit_logger: Arc<AuditLogger>,
    shutdown: CancellationToken,
}

impl WorkspaceManager {
    /// Constructs an empty manager. `shutdown`, when cancelled, cancels every
    /// workspace's expiration timer without running their callbacks.
    pub fn new(audit_logger: Arc<AuditLogger>, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            workspaces: RwLock::new(HashMap::new()),
            audit_logger,
            shutdown,
        })
    }

    /// Creates a new workspace, scheduling its expiration and emitting
    /// `workspace_created`.
    pub fn create_workspace(
        self: &Arc<Self>,
        input: CreateWorkspaceInput,
        creator_id: ParticipantId,
        creator_public_key: [u8; 32],
        creator_x25519_public_key: [u8; 32],
    ) -> Result<WorkspaceDescriptor, WorkspaceManagerError> {
        let id = WorkspaceId::new_random();
        let created_at_ms = now_ms();
        let window = TimeWindow::new(
            created_at_ms,
            created_at_ms + input.duration_minutes * 60_000,
            input.rotation_interval_min,
            input.grace_period_ms,
        )
        .map_err(|err| WorkspaceManagerError::InvalidDuration(err.to_string()))?;

        let config = WorkspaceConfig {
            id,
            created_at_ms,
            expires_at_ms: window.end_ms,
            window,
            max_participants: input.max_participants,
            allow_extension: input.allow_extension,
        };

        let mut root_secret_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut root_secret_bytes);
        let root_secret = KeyMaterial::new(root_secret_bytes);

        let creator = ParticipantInfo {
            id: creator_id,
            public_key: creator_public_key,
            x25519_public_key: creator_x25519_public_key,
            is_creator: true,
            joined_at_ms: created_at_ms,
        };

        let mut record = WorkspaceRecord {
            config: config.clone(),
            status: WorkspaceStatus::Active,
            root_secret,
            participants: vec![creator],
            current_key_id: temporal_key::rotation_key_id(0),
            encrypted_metadata: EncryptedWorkspaceMetadata { recipients: vec![] },
            expiry_token: self.shutdown.child_token(),
        };
        record.reencrypt_metadata()?;
        let descriptor = record.descriptor(id);

        self.workspaces.write().insert(id, Arc::new(Mutex::new(record)));
        metrics::counter!(METRICS_ID_WORKSPACES_CREATED).increment(1);
        metrics::gauge!(METRICS_ID_WORKSPACES_ACTIVE).increment(1.0);
        self.schedule_expiration(id, config.expires_at_ms);
        self.audit_logger.log(id, AuditEvent::new(AuditEventType::WorkspaceCreated, None));

        Ok(descriptor)
    }

    fn record(&self, id: WorkspaceId) -> Result<Arc<Mutex<WorkspaceRecord>>, WorkspaceManagerError> {
        self.workspaces.read().get(&id).cloned().ok_or(WorkspaceManagerError::NotFound)
    }

    /// Returns the number of workspaces currently in `Active` status, for
    /// the `/health` endpoint.
    pub fn active_workspace_count(&self) -> usize {
        self.workspaces.read().values().filter(|record| record.lock().status == WorkspaceStatus::Active).count()
    }

    /// Returns the public descriptor for `id`, if it exists.
    pub fn get_descriptor(&self, id: WorkspaceId) -> Option<WorkspaceDescriptor> {
        self.workspaces.read().get(&id).map(|record| record.lock().descriptor(id))
    }

    /// Returns `true` iff the workspace's scheduled lifetime has elapsed or
    /// its status is no longer `Active`.
    pub fn is_workspace_expired(&self, id: WorkspaceId) -> bool {
        match self.workspaces.read().get(&id) {
            None => true,
            Some(record) => {
                let record = record.lock();
                record.status != WorkspaceStatus::Active || record.config.is_expired_at(now_ms())
            }
        }
    }

    /// Extends a workspace's lifetime by `additional_minutes`, rescheduling
    /// its expiration timer.
    pub fn extend_workspace(
        self: &Arc<Self>,
        id: WorkspaceId,
        additional_minutes: i64,
    ) -> Result<WorkspaceDescriptor, WorkspaceManagerError> {
        let record_handle = self.record(id)?;
        let descriptor = {
            let mut record = record_handle.lock();
            if record.status != WorkspaceStatus::Active {
                return Err(WorkspaceManagerError::Expired);
            }
            if !record.config.allow_extension {
                return Err(WorkspaceManagerError::ExtensionNotAllowed);
            }
            let extended_window = record
                .config
                .window
                .extended_by(additional_minutes)
                .map_err(|err| WorkspaceManagerError::InvalidDuration(err.to_string()))?;
            record.config.window = extended_window;
            record.config.expires_at_ms = extended_window.end_ms;
            record.expiry_token.cancel();
            record.expiry_token = self.shutdown.child_token();
            record.descriptor(id)
        };
        self.schedule_expiration(id, descriptor.expires_at_ms);
        self.audit_logger.log(id, AuditEvent::new(AuditEventType::WorkspaceExtended, None));
        Ok(descriptor)
    }

    /// Revokes a workspace immediately, cancelling its expiration timer.
    pub fn revoke_workspace(&self, id: WorkspaceId) -> Result<(), WorkspaceManagerError> {
        let record_handle = self.record(id)?;
        {
            let mut record = record_handle.lock();
            if record.status.is_terminal() {
                return Ok(());
            }
            record.status = WorkspaceStatus::Revoked;
            record.config.expires_at_ms = now_ms();
            record.expiry_token.cancel();
        }
        metrics::gauge!(METRICS_ID_WORKSPACES_ACTIVE).decrement(1.0);
        metrics::counter!(METRICS_ID_WORKSPACES_REVOKED).increment(1);
        self.audit_logger.log(id, AuditEvent::new(AuditEventType::WorkspaceRevoked, None));
        Ok(())
    }

    /// Adds `participant` to the workspace's membership and re-encrypts the
    /// metadata envelope for the updated recipient set.
    ///
    /// A no-op (returning the existing envelope) if the participant is
    /// already a member.
    pub fn add_participant(
        &self,
        id: WorkspaceId,
        participant: ParticipantInfo,
    ) -> Result<EncryptedWorkspaceMetadata, WorkspaceManagerError> {
        let record_handle = self.record(id)?;
        let mut record = record_handle.lock();
        if record.status.is_terminal() {
            return Err(WorkspaceManagerError::Expired);
        }
        if record.participants.iter().any(|p| p.id == participant.id) {
            return Ok(record.encrypted_metadata.clone());
        }
        if record.participants.len() >= record.config.max_participants {
            return Err(WorkspaceManagerError::InvalidDuration(
                "participant limit exceeded for this workspace".into(),
            ));
        }
        record.participants.push(participant);
        record.reencrypt_metadata()?;
        Ok(record.encrypted_metadata.clone())
    }

    /// Removes `participant_id` from the workspace's membership and
    /// re-encrypts the metadata envelope so the departed participant's
    /// public key is no longer among the recipients.
    pub fn remove_participant(
        &self,
        id: WorkspaceId,
        participant_id: ParticipantId,
    ) -> Result<EncryptedWorkspaceMetadata, WorkspaceManagerError> {
        let record_handle = self.record(id)?;
        let mut record = record_handle.lock();
        record.participants.retain(|p| p.id != participant_id);
        record.reencrypt_metadata()?;
        Ok(record.encrypted_metadata.clone())
    }

    /// Returns the identifiers of every current participant, excluding
    /// `except`, for routing purposes.
    pub fn other_participant_ids(&self, id: WorkspaceId, except: ParticipantId) -> Vec<ParticipantId> {
        match self.workspaces.read().get(&id) {
            None => Vec::new(),
            Some(record) => record.lock().participants.iter().map(|p| p.id).filter(|p| *p != except).collect(),
        }
    }

    /// Returns the current encrypted metadata envelope plus the currently
    /// active key id, as sent in `HandshakeAck`/`MetadataResponse`.
    pub fn current_metadata(&self, id: WorkspaceId) -> Result<(String, EncryptedWorkspaceMetadata), WorkspaceManagerError> {
        let record_handle = self.record(id)?;
        let record = record_handle.lock();
        Ok((record.current_key_id.clone(), record.encrypted_metadata.clone()))
    }

    /// Derives the temporal key currently valid for `id` at `now_ms`.
    pub fn current_key(&self, id: WorkspaceId) -> Result<TemporalKey, WorkspaceManagerError> {
        let record_handle = self.record(id)?;
        let mut record = record_handle.lock();
        let window = record.config.window;
        let now = now_ms();
        let key_id = temporal_key::key_id_for_instant(&window, now).ok_or(WorkspaceManagerError::KeyUnavailable("none".into()))?;
        record.current_key_id = key_id.clone();
        self.derive(&record, &window, &key_id)
    }

    /// Derives the temporal key identified by `key_id`, validating it is
    /// still within its grace window.
    pub fn key_by_id(&self, id: WorkspaceId, key_id: &str) -> Result<TemporalKey, WorkspaceManagerError> {
        let record_handle = self.record(id)?;
        let record = record_handle.lock();
        let window = record.config.window;
        let key = self.derive(&record, &window, key_id)?;
        if !key.is_valid_at(now_ms()) {
            return Err(WorkspaceManagerError::KeyUnavailable(key_id.to_string()));
        }
        Ok(key)
    }

    fn derive(&self, record: &WorkspaceRecord, window: &TimeWindow, key_id: &str) -> Result<TemporalKey, WorkspaceManagerError> {
        let ordinal: i64 = key_id
            .strip_prefix("key-")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| WorkspaceManagerError::KeyUnavailable(key_id.to_string()))?;
        temporal_key::derive_temporal_key(record.root_secret.as_bytes(), record.config.id.as_bytes(), window, ordinal)
            .map_err(|_| WorkspaceManagerError::KeyUnavailable(key_id.to_string()))
    }

    fn schedule_expiration(self: &Arc<Self>, id: WorkspaceId, expires_at_ms: i64) {
        let token = match self.workspaces.read().get(&id) {
            Some(record) => record.lock().expiry_token.clone(),
            None => return,
        };
        let manager = Arc::clone(self);
        let delay_ms = (expires_at_ms - now_ms()).max(0) as u64;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(delay_ms)) => {
                    manager.expire(id);
                }
                _ = token.cancelled() => {}
            }
        });
    }

    fn expire(&self, id: WorkspaceId) {
        let Some(record_handle) = self.workspaces.read().get(&id).cloned() else {
            return;
        };
        {
            let mut record = record_handle.lock();
            if record.status != WorkspaceStatus::Active {
                return;
            }
            record.status = WorkspaceStatus::Expired;
        }
        metrics::gauge!(METRICS_ID_WORKSPACES_ACTIVE).decrement(1.0);
        metrics::counter!(METRICS_ID_WORKSPACES_EXPIRED).increment(1);
        self.audit_logger.log(id, AuditEvent::new(AuditEventType::WorkspaceExpired, None));
        self.audit_logger.delete_workspace_logs(id);
    }
}
