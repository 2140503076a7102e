//! The per-connection protocol state machine (§4.12): `Connected →
//! AwaitingHandshake → Authenticated → Closed`.
//!
//! One WebSocket connection is one task. The server speaks first (sends the
//! authentication challenge), then drives a read loop whose behavior
//! depends entirely on which state the connection is in. Outbound
//! broadcasts from other connections (routed operations, metadata
//! refreshes) arrive on an `mpsc` channel and are forwarded to the socket by
//! a second task running alongside the read loop.

use std::sync::Arc;

use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
use axum::routing::any;
use axum::Router;
use ephemeral_crypto::{operation_encryptor, participant_auth};
use ephemeral_types::api::v1::{
    ChallengePayload, EmptyPayload, HandshakeAckPayload, Message, MessageType, MetadataResponsePayload, OperationAckPayload, OperationPayload, Payload,
    SyncRequestPayload, SyncResponsePayload,
};
use ephemeral_types::workspace::ParticipantInfo;
use ephemeral_types::{ParticipantId, WorkspaceId};
use tokio::sync::mpsc;
use tracing::instrument;
use uuid::Uuid;

use crate::Engine;
use crate::api::errors::Error;
use crate::services::workspace_manager::now_ms;

/// How long a challenge remains answerable before a handshake presenting it
/// is rejected as expired (§5).
const CHALLENGE_TTL_MS: i64 = 60_000;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Framing {
    Json,
    Cbor,
}

/// Creates a router containing the `/connect` WebSocket upgrade endpoint.
pub(crate) fn routes(engine: Arc<Engine>) -> Router {
    Router::new().route(
        "/connect",
        any(move |upgrade: WebSocketUpgrade| {
            let engine = Arc::clone(&engine);
            async move {
                upgrade
                    .max_message_size(engine.config.ws_max_message_size)
                    .on_failed_upgrade(|err| {
                        tracing::warn!("could not establish websocket connection: {err:?}");
                    })
                    .on_upgrade(move |socket| serve(socket, engine))
            }
        }),
    )
}

#[instrument(level = "debug", skip_all, name = "connection")]
async fn serve(mut socket: WebSocket, engine: Arc<Engine>) {
    let close_frame = match run(&mut socket, &engine).await {
        Ok(()) => None,
        Err(err) => err.into_close_frame(),
    };
    if let Some(close_frame) = close_frame {
        let _ = socket.send(ws::Message::Close(Some(close_frame))).await;
    }
}

/// `Connected` → issues the challenge, then blocks on the handshake.
/// On success, hands off to `run_authenticated` (`Authenticated`); any
/// error along the way is the `Closed` transition.
async fn run(socket: &mut WebSocket, engine: &Arc<Engine>) -> Result<(), Error> {
    let challenge = participant_auth::generate_challenge();
    let challenge_issued_ms = now_ms();
    let challenge_message = Message {
        message_type: MessageType::Challenge,
        payload: Payload::Challenge(ChallengePayload { challenge_id: Uuid::new_v4(), challenge }),
        timestamp_ms: challenge_issued_ms,
        message_id: Uuid::new_v4(),
    };
    // The challenge is sent before we know which framing the peer prefers;
    // JSON is the safe default and the peer's handshake frame tells us what
    // to speak from here on.
    write_message(socket, &challenge_message, Framing::Json).await?;

    let (handshake, framing) = read_message(socket).await?;
    let Payload::Handshake(handshake) = handshake.payload else {
        return Err(Error::UnexpectedMessage);
    };

    if now_ms() - challenge_issued_ms > CHALLENGE_TTL_MS {
        return Err(Error::AuthFailed);
    }

    let workspace_id = handshake.workspace_id;
    if engine.workspace_manager.get_descriptor(workspace_id).is_none() {
        return Err(Error::WorkspaceNotFound);
    }
    if engine.workspace_manager.is_workspace_expired(workspace_id) {
        return Err(Error::WorkspaceExpired);
    }

    let already_member = engine
        .workspace_manager
        .get_descriptor(workspace_id)
        .is_some_and(|descriptor| descriptor.participant_count > 0 && engine.participant_manager.get_session(workspace_id, handshake.participant_id).is_some());
    if !already_member {
        let current_count = engine.workspace_manager.get_descriptor(workspace_id).map(|d| d.participant_count).unwrap_or(0);
        let decision = engine.rate_limiter.check_participant_cap(current_count);
        if !decision.allowed {
            return Err(Error::RateLimitExceeded { retry_after_ms: decision.retry_after_ms.unwrap_or(0) });
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let session = engine
        .participant_manager
        .authenticate(workspace_id, handshake.participant_id, handshake.public_key, &challenge, &handshake.proof, tx)
        .map_err(Error::from)?;

    // Past this point the session is registered in `ParticipantManager`; any
    // early return must clean it up before bubbling the error, or the
    // session leaks until the connection's remove_participant would have
    // otherwise run.
    let admission = (|| -> Result<(String, ephemeral_types::workspace::EncryptedWorkspaceMetadata), Error> {
        engine
            .workspace_manager
            .add_participant(
                workspace_id,
                ParticipantInfo {
                    id: handshake.participant_id,
                    public_key: handshake.public_key,
                    x25519_public_key: handshake.x25519_public_key,
                    is_creator: false,
                    joined_at_ms: session.connected_at_ms,
                },
            )
            .map_err(Error::from)?;
        engine.workspace_manager.current_metadata(workspace_id).map_err(Error::from)
    })();
    let (current_key_id, encrypted_metadata) = match admission {
        Ok(metadata) => metadata,
        Err(err) => {
            engine.participant_manager.remove_participant(workspace_id, handshake.participant_id);
            return Err(err);
        }
    };

    let ack = Message {
        message_type: MessageType::HandshakeAck,
        payload: Payload::HandshakeAck(HandshakeAckPayload { success: true, current_key_id, encrypted_metadata, server_time_ms: now_ms() }),
        timestamp_ms: now_ms(),
        message_id: Uuid::new_v4(),
    };
    write_message(socket, &ack, framing).await?;

    let result = run_authenticated(socket, engine, workspace_id, handshake.participant_id, framing, &mut rx).await;
    engine.participant_manager.remove_participant(workspace_id, handshake.participant_id);
    result
}

/// `Authenticated` — concurrently drains `rx` (broadcasts addressed to this
/// connection) and the socket's inbound frames, until either side closes or
/// a fatal protocol error occurs.
async fn run_authenticated(
    socket: &mut WebSocket,
    engine: &Arc<Engine>,
    workspace_id: WorkspaceId,
    participant_id: ParticipantId,
    framing: Framing,
    rx: &mut mpsc::UnboundedReceiver<Message>,
) -> Result<(), Error> {
    loop {
        tokio::select! {
            biased;

            outbound = rx.recv() => {
                match outbound {
                    Some(message) => write_message(socket, &message, framing).await?,
                    None => return Ok(()),
                }
            }
            inbound = read_message(socket) => {
                let (message, _) = inbound?;
                if let Some(reply) = handle_authenticated_message(engine, workspace_id, participant_id, message).await? {
                    write_message(socket, &reply, framing).await?;
                }
            }
        }
    }
}

async fn handle_authenticated_message(
    engine: &Arc<Engine>,
    workspace_id: WorkspaceId,
    participant_id: ParticipantId,
    message: Message,
) -> Result<Option<Message>, Error> {
    engine.participant_manager.touch(workspace_id, participant_id);

    match message.payload {
        Payload::Operation(OperationPayload { operation }) => {
            if operation.workspace_id != workspace_id || operation.participant_id != participant_id {
                return Err(Error::InvalidOperation("operation does not match this connection's identity".into()));
            }

            let decision = engine.rate_limiter.check_operation_rate(workspace_id, participant_id);
            if !decision.allowed {
                return Err(Error::RateLimitExceeded { retry_after_ms: decision.retry_after_ms.unwrap_or(0) });
            }

            let session = engine
                .participant_manager
                .get_session(workspace_id, participant_id)
                .ok_or(Error::AuthFailed)?;
            operation_encryptor::verify_signature(&operation, &session.public_key)
                .map_err(|err| Error::InvalidOperation(err.to_string()))?;

            let operation_id = operation.id;
            engine.operation_router.route(&engine.workspace_manager, &engine.participant_manager, operation, participant_id).map_err(Error::from)?;
            engine.rate_limiter.record_operation(workspace_id, participant_id);

            Ok(Some(Message {
                message_type: MessageType::OperationAck,
                payload: Payload::OperationAck(OperationAckPayload { operation_id, server_timestamp_ms: now_ms() }),
                timestamp_ms: now_ms(),
                message_id: Uuid::new_v4(),
            }))
        }
        Payload::SyncRequest(SyncRequestPayload { from_timestamp_ms }) => {
            let mut operations = engine.operation_router.get_buffered(workspace_id, participant_id);
            operations.retain(|op| op.timestamp_ms > from_timestamp_ms);
            operations.sort_by_key(|op| (op.timestamp_ms, op.id));

            // `current_state` stays empty: these operations are still
            // AEAD-sealed (the server never holds a decryption key, §4.5),
            // so there is no plaintext for the server to fold into an
            // `EncryptedTextCRDT` and snapshot. `operations` above, replayed
            // client-side in order, is what a joining replica reconstructs
            // the document from.
            Ok(Some(Message {
                message_type: MessageType::SyncResponse,
                payload: Payload::SyncResponse(SyncResponsePayload { operations, current_state: Vec::new() }),
                timestamp_ms: now_ms(),
                message_id: Uuid::new_v4(),
            }))
        }
        Payload::Empty(EmptyPayload { workspace_id: requested }) if message.message_type == MessageType::MetadataRequest => {
            let target = requested.unwrap_or(workspace_id);
            let (current_key_id, encrypted_metadata) = engine.workspace_manager.current_metadata(target).map_err(Error::from)?;
            Ok(Some(Message {
                message_type: MessageType::MetadataResponse,
                payload: Payload::MetadataResponse(MetadataResponsePayload { current_key_id, encrypted_metadata, server_time_ms: now_ms() }),
                timestamp_ms: now_ms(),
                message_id: Uuid::new_v4(),
            }))
        }
        Payload::Empty(_) if message.message_type == MessageType::Ping => Ok(Some(Message {
            message_type: MessageType::Pong,
            payload: Payload::Empty(EmptyPayload { workspace_id: None }),
            timestamp_ms: now_ms(),
            message_id: Uuid::new_v4(),
        })),
        _ => Err(Error::UnexpectedMessage),
    }
}

async fn read_message(socket: &mut WebSocket) -> Result<(Message, Framing), Error> {
    match socket.recv().await.ok_or(Error::ConnectionClosed)?? {
        ws::Message::Text(json) => Ok((serde_json::from_slice(json.as_bytes())?, Framing::Json)),
        ws::Message::Binary(cbor) => Ok((ciborium::from_reader(cbor.as_ref())?, Framing::Cbor)),
        ws::Message::Close(_) => Err(Error::ConnectionClosed),
        _ => Err(Error::UnexpectedMessage),
    }
}

async fn write_message(socket: &mut WebSocket, message: &Message, framing: Framing) -> Result<(), Error> {
    let frame = match framing {
        Framing::Json => ws::Message::text(serde_json::to_string(message).expect("Message always serializes")),
        Framing::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(message, &mut buf).expect("Message always serializes");
            ws::Message::binary(buf)
        }
    };
    socket.send(frame).await?;
    Ok(())
}
