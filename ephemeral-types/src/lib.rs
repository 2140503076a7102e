#![deny(missing_docs)]
//! Wire types and data model for the ephemeral collaborative-editing protocol.
//!
//! This crate groups together the strongly-typed values exchanged between
//! participants, the central router, and the protocol engine. It provides:
//!
//! * Opaque 128-bit identifiers ([`WorkspaceId`], [`ParticipantId`],
//!   [`OperationId`]), compared by value.
//! * The temporal model ([`time`]): rotation windows and the public shape of
//!   a temporal key.
//! * The workspace data model ([`workspace`]): configuration, membership and
//!   the encrypted metadata envelope.
//! * The CRDT operation model ([`operation`]): plaintext and encrypted
//!   operations exchanged between participants.
//! * Cryptographic envelope types ([`crypto`]): AEAD payloads and
//!   publishable key-existence commitments.
//! * The transport-agnostic message envelope ([`api`]) used by the protocol
//!   engine.
//!
//! None of the types in this crate perform cryptographic operations — they
//! are plain, serializable data. The operations that act on them (key
//! derivation, encryption, signing, CRDT merge) live in `ephemeral-crypto`
//! and `ephemeral-crdt`.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod api;
pub mod crypto;
pub mod operation;
pub mod time;
pub mod workspace;

/// Declares a `Copy` 128-bit identifier newtype wrapping a [`Uuid`].
macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Generates a new random `", stringify!($name), "`.")]
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Wraps an existing [`Uuid`] as a `", stringify!($name), "`.")]
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the inner [`Uuid`].
            pub fn into_inner(self) -> Uuid {
                self.0
            }

            /// Returns the big-endian bytes of the underlying UUID.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new_random()
            }
        }
    };
}

uuid_id!(WorkspaceId, "Opaque, globally-unique identifier of a workspace.");
uuid_id!(
    ParticipantId,
    "Opaque, globally-unique identifier of a participant within a workspace."
);
uuid_id!(
    OperationId,
    "Opaque, globally-unique identifier of a single CRDT operation."
);
