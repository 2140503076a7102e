//! Broadcast to connected peers; buffer for offline peers; prune expired
//! buffers (§4.11).

use std::collections::{HashMap, VecDeque};

use ephemeral_types::api::v1::{Message, MessageType, Payload};
use ephemeral_types::operation::EncryptedOperation;
use ephemeral_types::{ParticipantId, WorkspaceId};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::metrics::{METRICS_ID_OPERATIONS_BUFFERED, METRICS_ID_OPERATIONS_BUFFER_EXPIRED, METRICS_ID_OPERATIONS_DELIVERED};
use crate::services::participant_manager::ParticipantManager;
use crate::services::workspace_manager::{WorkspaceManager, now_ms};

/// Errors returned by [`OperationRouter::route`].
#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum OperationRouterError {
    /// No workspace exists with the given id.
    #[error("workspace not found")]
    WorkspaceNotFound,
    /// The workspace exists but is no longer active.
    #[error("workspace expired")]
    WorkspaceExpired,
}

fn operation_message(op: EncryptedOperation) -> Message {
    Message {
        message_type: MessageType::Operation,
        payload: Payload::Operation(ephemeral_types::api::v1::OperationPayload { operation: op }),
        timestamp_ms: now_ms(),
        message_id: Uuid::new_v4(),
    }
}

/// Per-`(workspace, participant)` buffers of operations that could not be
/// delivered live, plus the routing logic that decides whether to deliver
/// or buffer.
pub struct OperationRouter {
    buffers: Mutex<HashMap<(WorkspaceId, ParticipantId), VecDeque<EncryptedOperation>>>,
}

impl Default for OperationRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRouter {
    /// Constructs a router with empty buffers.
    pub fn new() -> Self {
        Self { buffers: Mutex::new(HashMap::new()) }
    }

    /// Routes `op` to every participant in `op.workspace_id` except `sender`:
    /// delivered directly to a live transport where one exists, buffered
    /// otherwise. Best-effort — a failed send degrades to buffering rather
    /// than erroring.
    pub fn route(
        &self,
        workspace_manager: &WorkspaceManager,
        participant_manager: &ParticipantManager,
        op: EncryptedOperation,
        sender: ParticipantId,
    ) -> Result<(), OperationRouterError> {
        let workspace_id = op.workspace_id;
        if workspace_manager.get_descriptor(workspace_id).is_none() {
            return Err(OperationRouterError::WorkspaceNotFound);
        }
        if workspace_manager.is_workspace_expired(workspace_id) {
            return Err(OperationRouterError::WorkspaceExpired);
        }

        for participant_id in workspace_manager.other_participant_ids(workspace_id, sender) {
            let session = participant_manager.get_session(workspace_id, participant_id);
            let delivered = session
                .as_ref()
                .and_then(|session| session.transport.as_ref())
                .map(|transport| transport.send(operation_message(op.clone())).is_ok())
                .unwrap_or(false);

            if delivered {
                metrics::counter!(METRICS_ID_OPERATIONS_DELIVERED).increment(1);
            } else {
                self.buffer(workspace_id, participant_id, op.clone());
            }
        }
        Ok(())
    }

    /// Returns and clears the buffer for `(workspace_id, participant_id)`,
    /// in insertion order.
    pub fn get_buffered(&self, workspace_id: WorkspaceId, participant_id: ParticipantId) -> Vec<EncryptedOperation> {
        self.buffers
            .lock()
            .remove(&(workspace_id, participant_id))
            .map(|deque| deque.into_iter().collect())
            .unwrap_or_default()
    }

    /// Appends `op` to `(workspace_id, participant_id)`'s buffer.
    pub fn buffer(&self, workspace_id: WorkspaceId, participant_id: ParticipantId, op: EncryptedOperation) {
        self.buffers.lock().entry((workspace_id, participant_id)).or_default().push_back(op);
        metrics::counter!(METRICS_ID_OPERATIONS_BUFFERED).increment(1);
    }

    /// Retains, in every buffer, only operations with `timestamp_ms >
    /// cutoff_ms`; drops buffers left empty.
    pub fn clear_expired(&self, cutoff_ms: i64) {
        let mut guard = self.buffers.lock();
        let mut dropped = 0u64;
        guard.retain(|_, deque| {
            let before = deque.len();
            deque.retain(|op| op.timestamp_ms > cutoff_ms);
            dropped += (before - deque.len()) as u64;
            !deque.is_empty()
        });
        if dropped > 0 {
            metrics::counter!(METRICS_ID_OPERATIONS_BUFFER_EXPIRED).increment(dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_types::OperationId;
    use ephemeral_types::operation::OperationKind;

    fn sample_op(workspace_id: WorkspaceId, timestamp_ms: i64) -> EncryptedOperation {
        EncryptedOperation {
            id: OperationId::new_random(),
            workspace_id,
            participant_id: ParticipantId::new_random(),
            timestamp_ms,
            position: 0,
            kind: OperationKind::Insert,
            encrypted_content: vec![1, 2, 3],
            nonce: [0u8; 12],
            auth_tag: [0u8; 16],
            signature: vec![],
            key_id: "key-0".into(),
        }
    }

    #[test]
    fn buffer_then_retrieve_returns_insertion_order() {
        let router = OperationRouter::new();
        let workspace_id = WorkspaceId::new_random();
        let participant_id = ParticipantId::new_random();
        router.buffer(workspace_id, participant_id, sample_op(workspace_id, 100));
        router.buffer(workspace_id, participant_id, sample_op(workspace_id, 200));
        router.buffer(workspace_id, participant_id, sample_op(workspace_id, 300));

        let drained = router.get_buffered(workspace_id, participant_id);
        assert_eq!(drained.iter().map(|op| op.timestamp_ms).collect::<Vec<_>>(), vec![100, 200, 300]);
        assert!(router.get_buffered(workspace_id, participant_id).is_empty());
    }

    #[test]
    fn clear_expired_retains_only_newer_operations() {
        let router = OperationRouter::new();
        let workspace_id = WorkspaceId::new_random();
        let participant_id = ParticipantId::new_random();
        router.buffer(workspace_id, participant_id, sample_op(workspace_id, 100));
        router.buffer(workspace_id, participant_id, sample_op(workspace_id, 200));
        router.buffer(workspace_id, participant_id, sample_op(workspace_id, 300));

        router.clear_expired(200);
        let remaining = router.get_buffered(workspace_id, participant_id);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].timestamp_ms, 300);
    }

    #[test]
    fn empty_buffers_are_dropped_after_sweep() {
        let router = OperationRouter::new();
        let workspace_id = WorkspaceId::new_random();
        let participant_id = ParticipantId::new_random();
        router.buffer(workspace_id, participant_id, sample_op(workspace_id, 100));
        router.clear_expired(500);
        assert!(router.buffers.lock().is_empty());
    }
}
