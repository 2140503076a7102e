//! Conflict-free replicated text model.
//!
//! [`text::EncryptedTextCRDT`] applies decrypted [`CRDTOperation`]s to a
//! document by keeping them in [`CRDTOperation::order_key`] order internally
//! and replaying that log from scratch on every apply. Convergence does not
//! depend on the delivery order `apply` is called in — any replica holding
//! the same set of operations replays to the same text. [`sync::SyncEngine`]
//! keeps the same total order over encrypted, still-undecrypted operations,
//! so a resynchronizing replica via `operations_since` gets them in an order
//! that already matches what it would derive on its own.
//!
//! [`CRDTOperation::order_key`]: ephemeral_types::operation::CRDTOperation::order_key
//!
//! [`CRDTOperation`]: ephemeral_types::operation::CRDTOperation

#![deny(missing_docs)]

pub mod sync;
pub mod text;

use thiserror::Error;

/// Errors produced while applying operations or (de)serializing CRDT state.
#[derive(Debug, Error)]
pub enum CrdtError {
    /// An operation's `content`/`length` did not match its declared kind.
    #[error(transparent)]
    MalformedOperation(#[from] ephemeral_types::operation::OperationError),
    /// Encoding or decoding a state snapshot failed.
    #[error("crdt state (de)serialization failed: {0}")]
    Codec(String),
}
