//! A tombstone-based text CRDT over `char`s, convergent under a total
//! order rather than under delivery order.

use std::collections::HashSet;

use bincode::{Decode, Encode};
use ephemeral_types::{OperationId, ParticipantId, operation::CRDTOperation, operation::OperationKind};
use serde::{Deserialize, Serialize};

use crate::CrdtError;

/// Identifies one `char` produced by an insert operation: the `offset`-th
/// character of `op`'s content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct ElementId {
    op: OperationId,
    offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Element {
    id: ElementId,
    value: char,
    tombstone: bool,
}

/// A single document's text, reconstructed from a sequence of decrypted
/// [`CRDTOperation`]s.
///
/// Every applied operation is kept in [`CRDTOperation::order_key`] order
/// (`timestamp_ms` ascending, `id` as a tiebreaker — §4.6), and `elements`
/// is always the result of replaying that ordered log from scratch. Two
/// replicas that have applied the same set of operations therefore hold the
/// same log and replay to the same text, regardless of the order the calls
/// to [`Self::apply`] actually arrived in. Deletes mark elements as
/// tombstoned rather than removing them, so a delete racing a concurrent
/// insert at an overlapping position lands on a stable element once both
/// sides of the race are in the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptedTextCRDT {
    operations: Vec<CRDTOperation>,
    elements: Vec<Element>,
    applied: HashSet<OperationId>,
}

/// The wire-stable encoding of a [`CRDTOperation`], since the latter only
/// derives `serde` traits and [`EncryptedTextCRDT::get_state`] needs a
/// `bincode` one.
#[derive(Encode, Decode)]
struct StateOperation {
    id: [u8; 16],
    participant_id: [u8; 16],
    timestamp_ms: i64,
    position: u64,
    content: Option<String>,
    length: Option<u32>,
}

impl From<&CRDTOperation> for StateOperation {
    fn from(op: &CRDTOperation) -> Self {
        Self {
            id: *op.id.as_bytes(),
            participant_id: *op.participant_id.as_bytes(),
            timestamp_ms: op.timestamp_ms,
            position: op.position as u64,
            content: op.content.clone(),
            length: op.length,
        }
    }
}

impl StateOperation {
    fn into_operation(self) -> CRDTOperation {
        let id = OperationId::from_uuid(uuid::Uuid::from_bytes(self.id));
        let participant_id = ParticipantId::from_uuid(uuid::Uuid::from_bytes(self.participant_id));
        let position = self.position as usize;
        match self.content {
            Some(content) => CRDTOperation::insert(id, participant_id, self.timestamp_ms, position, content),
            None => CRDTOperation {
                id,
                participant_id,
                timestamp_ms: self.timestamp_ms,
                kind: OperationKind::Delete,
                position,
                content: None,
                length: self.length,
            },
        }
    }
}

/// The wire-stable encoding of [`EncryptedTextCRDT::get_state`]: the
/// ordered operation log itself, not a rendering of it. A receiver merges
/// it by applying each operation through the same idempotent [`apply`]
/// path a live operation goes through.
///
/// [`apply`]: EncryptedTextCRDT::apply
#[derive(Encode, Decode)]
struct StateBlob {
    operations: Vec<StateOperation>,
}

impl EncryptedTextCRDT {
    /// Constructs an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `op`, mutating the document.
    ///
    /// Idempotent: applying the same operation id twice is a no-op on the
    /// second call, so duplicate delivery (e.g. after a reconnect replay)
    /// cannot corrupt the document. Order-independent: inserting `op` into
    /// the ordered log and replaying is equivalent no matter what other
    /// operations this replica has already applied, or in what order.
    pub fn apply(&mut self, op: &CRDTOperation) -> Result<(), CrdtError> {
        op.validate()?;
        if self.applied.contains(&op.id) {
            return Ok(());
        }

        let index = self.operations.partition_point(|existing| existing.order_key() <= op.order_key());
        self.operations.insert(index, op.clone());
        self.applied.insert(op.id);
        self.rebuild();
        Ok(())
    }

    /// Merges a snapshot produced by [`Self::get_state`] into this document.
    ///
    /// Already-applied operations are left untouched; only operations this
    /// replica has not yet seen are folded in. Safe to call on a document
    /// that already holds local edits — it is a merge, not a replacement.
    pub fn apply_state(&mut self, bytes: &[u8]) -> Result<(), CrdtError> {
        let (blob, _): (StateBlob, usize) =
            bincode::decode_from_slice(bytes, bincode::config::standard()).map_err(|e| CrdtError::Codec(e.to_string()))?;
        for state_op in blob.operations {
            self.apply(&state_op.into_operation())?;
        }
        Ok(())
    }

    /// Recomputes `elements` from `operations`, which is always kept in
    /// [`CRDTOperation::order_key`] order.
    fn rebuild(&mut self) {
        self.elements.clear();
        for op in &self.operations {
            match (op.content.as_ref(), op.length) {
                (Some(content), None) => Self::apply_insert(&mut self.elements, op.id, op.position, content),
                (None, Some(length)) => Self::apply_delete(&mut self.elements, op.position, length as usize),
                _ => unreachable!("op.validate() rejects any other combination"),
            }
        }
    }

    fn apply_insert(elements: &mut Vec<Element>, op_id: OperationId, position: usize, content: &str) {
        let mut raw_index = Self::visible_to_raw_index(elements, position);
        for (offset, value) in content.chars().enumerate() {
            elements.insert(raw_index, Element { id: ElementId { op: op_id, offset: offset as u32 }, value, tombstone: false });
            raw_index += 1;
        }
    }

    fn apply_delete(elements: &mut [Element], position: usize, length: usize) {
        let mut raw_index = Self::visible_to_raw_index(elements, position);
        let mut remaining = length;
        while remaining > 0 {
            while raw_index < elements.len() && elements[raw_index].tombstone {
                raw_index += 1;
            }
            let Some(element) = elements.get_mut(raw_index) else {
                // Position already gone, e.g. a concurrent delete overlapped
                // this range. Deleting fewer characters than requested is
                // the correct convergent behavior, not an error.
                break;
            };
            element.tombstone = true;
            raw_index += 1;
            remaining -= 1;
        }
    }

    fn visible_to_raw_index(elements: &[Element], target: usize) -> usize {
        let mut visible_seen = 0;
        for (raw_index, element) in elements.iter().enumerate() {
            if !element.tombstone {
                if visible_seen == target {
                    return raw_index;
                }
                visible_seen += 1;
            }
        }
        elements.len()
    }

    /// Returns the document's current visible text.
    pub fn get_text(&self) -> String {
        self.elements.iter().filter(|e| !e.tombstone).map(|e| e.value).collect()
    }

    /// Returns the number of visible characters.
    pub fn len(&self) -> usize {
        self.elements.iter().filter(|e| !e.tombstone).count()
    }

    /// Returns `true` iff the document has no visible characters.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` iff `op_id` has already been applied to this document.
    pub fn has_applied(&self, op_id: OperationId) -> bool {
        self.applied.contains(&op_id)
    }

    /// Serializes the ordered operation log so a peer can merge it via
    /// [`Self::apply_state`].
    pub fn get_state(&self) -> Result<Vec<u8>, CrdtError> {
        let blob = StateBlob { operations: self.operations.iter().map(StateOperation::from).collect() };
        bincode::encode_to_vec(&blob, bincode::config::standard()).map_err(|e| CrdtError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(pos: usize, text: &str, timestamp_ms: i64) -> CRDTOperation {
        CRDTOperation::insert(OperationId::new_random(), ParticipantId::new_random(), timestamp_ms, pos, text.to_string())
    }

    fn delete(pos: usize, length: u32, timestamp_ms: i64) -> CRDTOperation {
        CRDTOperation::delete(OperationId::new_random(), ParticipantId::new_random(), timestamp_ms, pos, length).unwrap()
    }

    #[test]
    fn insert_and_delete_produce_expected_text() {
        let mut doc = EncryptedTextCRDT::new();
        doc.apply(&insert(0, "hello", 0)).unwrap();
        assert_eq!(doc.get_text(), "hello");
        doc.apply(&insert(5, " world", 1)).unwrap();
        assert_eq!(doc.get_text(), "hello world");
        doc.apply(&delete(5, 6, 2)).unwrap();
        assert_eq!(doc.get_text(), "hello");
    }

    #[test]
    fn duplicate_operation_is_idempotent() {
        let mut doc = EncryptedTextCRDT::new();
        let op = insert(0, "hi", 0);
        doc.apply(&op).unwrap();
        doc.apply(&op).unwrap();
        assert_eq!(doc.get_text(), "hi");
    }

    #[test]
    fn delete_past_end_does_not_panic() {
        let mut doc = EncryptedTextCRDT::new();
        doc.apply(&insert(0, "hi", 0)).unwrap();
        doc.apply(&delete(0, 10, 1)).unwrap();
        assert_eq!(doc.get_text(), "");
    }

    /// Two replicas apply the same two concurrent inserts in opposite
    /// arrival order. Arrival order must not matter: both converge on the
    /// `(timestamp_ms, id)` total order, so `a` (timestamp 0) always lands
    /// before `b` (timestamp 1) regardless of which one each replica saw
    /// first.
    #[test]
    fn concurrent_inserts_at_same_position_converge_regardless_of_arrival_order() {
        let a = insert(0, "A", 0);
        let b = insert(0, "B", 1);

        let mut replica_one = EncryptedTextCRDT::new();
        replica_one.apply(&a).unwrap();
        replica_one.apply(&b).unwrap();

        let mut replica_two = EncryptedTextCRDT::new();
        replica_two.apply(&b).unwrap();
        replica_two.apply(&a).unwrap();

        assert_eq!(replica_one.get_text(), replica_two.get_text());
        assert_eq!(replica_one.get_text(), "AB");
    }

    #[test]
    fn state_round_trips() {
        let mut doc = EncryptedTextCRDT::new();
        doc.apply(&insert(0, "hello", 0)).unwrap();
        doc.apply(&delete(0, 1, 1)).unwrap();

        let state = doc.get_state().unwrap();
        let mut restored = EncryptedTextCRDT::new();
        restored.apply_state(&state).unwrap();
        assert_eq!(restored.get_text(), doc.get_text());
        assert!(restored.has_applied(doc.applied.iter().next().copied().unwrap()));
    }

    /// `apply_state` folds a peer snapshot into a document that already has
    /// local edits, rather than clobbering it.
    #[test]
    fn apply_state_merges_into_existing_local_edits() {
        let shared_insert = insert(0, "base", 0);

        let mut replica_one = EncryptedTextCRDT::new();
        replica_one.apply(&shared_insert).unwrap();
        replica_one.apply(&insert(4, "-one", 1)).unwrap();

        let mut replica_two = EncryptedTextCRDT::new();
        replica_two.apply(&shared_insert).unwrap();
        replica_two.apply(&insert(4, "-two", 2)).unwrap();

        let snapshot_from_two = replica_two.get_state().unwrap();
        replica_one.apply_state(&snapshot_from_two).unwrap();

        assert_eq!(replica_one.get_text(), "base-one-two");
        assert!(replica_one.has_applied(shared_insert.id));
    }
}
