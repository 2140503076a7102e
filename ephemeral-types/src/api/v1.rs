//! # v1 wire envelope
//!
//! The transport-agnostic message envelope exchanged between a participant
//! and the protocol engine (§6). A [`Message`] is serialized as `Text`
//! (JSON) or `Binary` (CBOR) depending on what the peer sent first, exactly
//! mirroring the framing convention used for the CRDT operation payloads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{WorkspaceId, operation::EncryptedOperation, workspace::EncryptedWorkspaceMetadata};

/// Protocol-level error codes, surfaced both as WebSocket close codes and as
/// the `code` field of an [`ErrorPayload`] (§7).
pub mod error_codes {
    /// The proof of key possession did not verify, the protocol version was
    /// rejected, or the handshake's challenge had expired.
    pub const AUTH_FAILED: u16 = 4401;
    /// The referenced workspace does not exist.
    pub const WORKSPACE_NOT_FOUND: u16 = 4404;
    /// The referenced workspace has expired or been revoked.
    pub const WORKSPACE_EXPIRED: u16 = 4410;
    /// A malformed frame, AEAD failure, signature failure, key-id mismatch,
    /// or AAD mismatch.
    pub const INVALID_OPERATION: u16 = 4422;
    /// One of the three rate limiters rejected the request.
    pub const RATE_LIMIT_EXCEEDED: u16 = 4429;
    /// `extend_workspace` was called on a workspace whose config forbids
    /// it.
    pub const EXTENSION_NOT_ALLOWED: u16 = 4451;
    /// No temporal key is currently in its grace window.
    pub const KEY_UNAVAILABLE: u16 = 4460;
}

/// Discriminator for [`Message::payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Server → client: an authentication challenge.
    Challenge,
    /// Client → server: proof of key possession.
    Handshake,
    /// Server → client: handshake accepted.
    HandshakeAck,
    /// Either direction: an encrypted CRDT operation.
    Operation,
    /// Server → client: acknowledges a routed operation.
    OperationAck,
    /// Client → server: request buffered operations since a timestamp.
    SyncRequest,
    /// Server → client: buffered operations plus a state snapshot.
    SyncResponse,
    /// Client → server: request a fresh copy of the encrypted metadata
    /// envelope (§4.x metadata refresh).
    MetadataRequest,
    /// Server → client: the current encrypted metadata envelope.
    MetadataResponse,
    /// Either direction: liveness probe.
    Ping,
    /// Either direction: liveness probe response.
    Pong,
    /// Either direction: a typed protocol error.
    Error,
}

/// The transport-agnostic frame exchanged between a participant and the
/// protocol engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Discriminates `payload`.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// The type-specific payload, serialized as embedded JSON/CBOR value.
    pub payload: Payload,
    /// When this message was produced, in epoch milliseconds.
    pub timestamp_ms: i64,
    /// Correlates requests with responses; unique per connection.
    pub message_id: Uuid,
}

/// The union of all payload shapes a [`Message`] may carry.
///
/// Kept untagged rather than internally-tagged on `payload` itself, since
/// CBOR (unlike JSON) has no reliable representation for internal tagging —
/// variants are distinguished structurally, in declaration order, which is
/// why [`EmptyPayload`] (all-optional fields) is ordered last but one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// See [`ChallengePayload`].
    Challenge(ChallengePayload),
    /// See [`HandshakePayload`].
    Handshake(HandshakePayload),
    /// See [`HandshakeAckPayload`].
    HandshakeAck(HandshakeAckPayload),
    /// See [`OperationPayload`].
    Operation(OperationPayload),
    /// See [`OperationAckPayload`].
    OperationAck(OperationAckPayload),
    /// See [`SyncRequestPayload`].
    SyncRequest(SyncRequestPayload),
    /// See [`SyncResponsePayload`].
    SyncResponse(SyncResponsePayload),
    /// See [`MetadataResponsePayload`]; also used, with both fields absent
    /// besides a workspace id, as the `MetadataRequest` payload.
    MetadataResponse(MetadataResponsePayload),
    /// Carries no data; used for `Ping`/`Pong`/`MetadataRequest`.
    Empty(EmptyPayload),
    /// See [`ErrorPayload`].
    Error(ErrorPayload),
}

/// Payload of a `Ping`, `Pong`, or `MetadataRequest` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmptyPayload {
    /// Workspace this (empty) message concerns, if any.
    pub workspace_id: Option<WorkspaceId>,
}

/// Payload of a `Challenge` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengePayload {
    /// Correlates this challenge with the handshake that answers it.
    pub challenge_id: Uuid,
    /// 32 random bytes the client must sign over (§4.4).
    pub challenge: [u8; 32],
}

/// Payload of a `Handshake` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakePayload {
    /// Protocol version spoken by the client, e.g. `"1.0.0"`.
    pub protocol_version: String,
    /// Workspace the client wants to join.
    pub workspace_id: WorkspaceId,
    /// The client's claimed participant identity.
    pub participant_id: crate::ParticipantId,
    /// Raw Ed25519 public key bytes of the claimed identity.
    pub public_key: [u8; 32],
    /// Raw X25519 public key bytes this participant wants the metadata
    /// envelope sealed to.
    pub x25519_public_key: [u8; 32],
    /// Proof that the client holds the private key for `public_key`.
    pub proof: crate::crypto::AuthProof,
}

/// Payload of a `HandshakeAck` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeAckPayload {
    /// Always `true` — failed handshakes send an `Error` message instead.
    pub success: bool,
    /// Identifier of the temporal key currently in use.
    pub current_key_id: String,
    /// The current encrypted metadata envelope.
    pub encrypted_metadata: EncryptedWorkspaceMetadata,
    /// The server's clock at acknowledgement time, in epoch milliseconds.
    pub server_time_ms: i64,
}

/// Payload of an `Operation` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationPayload {
    /// The encrypted, signed operation.
    pub operation: EncryptedOperation,
}

/// Payload of an `OperationAck` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationAckPayload {
    /// Identifier of the acknowledged operation.
    pub operation_id: crate::OperationId,
    /// Server clock at acknowledgement time, in epoch milliseconds.
    pub server_timestamp_ms: i64,
}

/// Payload of a `SyncRequest` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequestPayload {
    /// Strict lower bound; only operations with `timestamp_ms` greater than
    /// this are returned (§4.6).
    pub from_timestamp_ms: i64,
}

/// Payload of a `SyncResponse` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponsePayload {
    /// Operations with `timestamp_ms > from_timestamp_ms`, in total order.
    ///
    /// Sufficient on its own for a joining replica to reconstruct the
    /// document: feed each one, in order, to a local
    /// `ephemeral_crdt::text::EncryptedTextCRDT`.
    pub operations: Vec<EncryptedOperation>,
    /// Reserved for a future server-side snapshot transport. The server
    /// never decrypts operation content (§4.5), so it cannot itself build
    /// an `EncryptedTextCRDT` to snapshot — this always comes back empty.
    pub current_state: Vec<u8>,
}

/// Payload of a `MetadataResponse` message (also reused, with only
/// `current_key_id` populated meaningfully, to answer `MetadataRequest`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataResponsePayload {
    /// Identifier of the temporal key currently in use.
    pub current_key_id: String,
    /// The current encrypted metadata envelope.
    pub encrypted_metadata: EncryptedWorkspaceMetadata,
    /// Server clock at response time, in epoch milliseconds.
    pub server_time_ms: i64,
}

/// Payload of an `Error` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// One of the codes in [`error_codes`].
    pub code: u16,
    /// Human-readable description. Never reveals which cryptographic
    /// sub-check failed (§4.4, §7).
    pub message: String,
    /// Optional structured detail, e.g. `retry_after_ms`.
    pub details: Option<serde_json::Value>,
}
