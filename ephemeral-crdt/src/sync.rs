//! The authoritative, ordered operation log a workspace's participants
//! resynchronize against.

use std::collections::HashSet;

use ephemeral_types::{OperationId, operation::EncryptedOperation};

/// An ordered, deduplicated log of [`EncryptedOperation`]s.
///
/// Establishes the single total order (`timestamp_ms` ascending, `id`
/// ascending as a tiebreaker) every replica applies operations in — the
/// property [`crate::text::EncryptedTextCRDT`] depends on for convergence.
#[derive(Debug, Default)]
pub struct SyncEngine {
    history: Vec<EncryptedOperation>,
    seen: HashSet<OperationId>,
}

impl SyncEngine {
    /// Constructs an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `op` in the log, maintaining total order.
    ///
    /// Returns `true` if `op` was newly recorded, `false` if its id had
    /// already been seen (idempotent — re-delivery of an operation the
    /// engine already has is a no-op).
    pub fn record(&mut self, op: EncryptedOperation) -> bool {
        if !self.seen.insert(op.id) {
            return false;
        }
        let index = self
            .history
            .partition_point(|existing| (existing.timestamp_ms, existing.id) <= (op.timestamp_ms, op.id));
        self.history.insert(index, op);
        true
    }

    /// Returns every operation with `timestamp_ms` strictly greater than
    /// `cutoff_ms`, in total order.
    pub fn operations_since(&self, cutoff_ms: i64) -> Vec<&EncryptedOperation> {
        self.history.iter().filter(|op| op.timestamp_ms > cutoff_ms).collect()
    }

    /// Returns the full history, in total order.
    pub fn history(&self) -> &[EncryptedOperation] {
        &self.history
    }

    /// Returns `true` iff `op_id` is already recorded.
    pub fn contains(&self, op_id: OperationId) -> bool {
        self.seen.contains(&op_id)
    }

    /// Number of distinct operations recorded.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Returns `true` iff no operations have been recorded.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_types::{ParticipantId, WorkspaceId, operation::OperationKind};

    fn op(id: OperationId, timestamp_ms: i64) -> EncryptedOperation {
        EncryptedOperation {
            id,
            workspace_id: WorkspaceId::new_random(),
            participant_id: ParticipantId::new_random(),
            timestamp_ms,
            position: 0,
            kind: OperationKind::Insert,
            encrypted_content: vec![],
            nonce: [0u8; 12],
            auth_tag: [0u8; 16],
            signature: vec![],
            key_id: "key-0".to_string(),
        }
    }

    #[test]
    fn maintains_total_order_regardless_of_insertion_order() {
        let mut engine = SyncEngine::new();
        let first = OperationId::new_random();
        let second = OperationId::new_random();
        engine.record(op(second, 10));
        engine.record(op(first, 5));
        let history = engine.history();
        assert_eq!(history[0].id, first);
        assert_eq!(history[1].id, second);
    }

    #[test]
    fn duplicate_record_is_rejected() {
        let mut engine = SyncEngine::new();
        let id = OperationId::new_random();
        assert!(engine.record(op(id, 1)));
        assert!(!engine.record(op(id, 1)));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn operations_since_is_strict() {
        let mut engine = SyncEngine::new();
        engine.record(op(OperationId::new_random(), 10));
        engine.record(op(OperationId::new_random(), 20));
        assert_eq!(engine.operations_since(10).len(), 1);
        assert_eq!(engine.operations_since(9).len(), 2);
    }
}
