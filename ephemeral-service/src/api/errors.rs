//! The [`Error`] type the protocol engine and HTTP surface both render from
//! — one place to keep the mapping between failure causes, WS close codes,
//! and HTTP status codes in sync (§7).

use axum::extract::ws::{CloseFrame, close_code};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use ephemeral_types::api::v1::{ErrorPayload, error_codes};
use serde_json::json;

use crate::services::operation_router::OperationRouterError;
use crate::services::participant_manager::ParticipantManagerError;
use crate::services::workspace_manager::WorkspaceManagerError;

/// Errors surfaced at the HTTP/WebSocket boundary.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// Proof invalid, protocol version mismatch, or expired challenge.
    #[error("authentication failed")]
    AuthFailed,
    /// No workspace exists with the given id.
    #[error("workspace not found")]
    WorkspaceNotFound,
    /// The workspace exists but is no longer active.
    #[error("workspace expired")]
    WorkspaceExpired,
    /// Malformed frame, AEAD tag failure, signature failure, key-id
    /// mismatch, or AAD mismatch.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// One of the three rate limiters rejected the request.
    #[error("rate limit exceeded")]
    RateLimitExceeded {
        /// Milliseconds the caller should wait before retrying.
        retry_after_ms: i64,
    },
    /// `extend_workspace` was called on a workspace whose config forbids it.
    #[error("extension not allowed")]
    ExtensionNotAllowed,
    /// No temporal key is currently in its grace window.
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),
    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,
    /// A frame was neither `Text` nor `Binary`, or did not decode into a
    /// [`ephemeral_types::api::v1::Message`].
    #[error("unexpected message")]
    UnexpectedMessage,
    #[error(transparent)]
    Axum(#[from] axum::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Cbor(#[from] ciborium::de::Error<std::io::Error>),
}

impl Error {
    /// The protocol error code (§7), shared between the WS `Error` payload
    /// and the WS close code.
    pub(crate) fn code(&self) -> u16 {
        match self {
            Error::AuthFailed => error_codes::AUTH_FAILED,
            Error::WorkspaceNotFound => error_codes::WORKSPACE_NOT_FOUND,
            Error::WorkspaceExpired => error_codes::WORKSPACE_EXPIRED,
            Error::InvalidOperation(_) | Error::UnexpectedMessage | Error::Json(_) | Error::Cbor(_) => error_codes::INVALID_OPERATION,
            Error::RateLimitExceeded { .. } => error_codes::RATE_LIMIT_EXCEEDED,
            Error::ExtensionNotAllowed => error_codes::EXTENSION_NOT_ALLOWED,
            Error::KeyUnavailable(_) => error_codes::KEY_UNAVAILABLE,
            Error::ConnectionClosed | Error::Axum(_) => close_code::ERROR,
        }
    }

    /// Renders this error as a typed WS `Error` payload. Never distinguishes
    /// *which* cryptographic sub-check failed (§4.4, §7) — the message is
    /// deliberately generic for [`Error::AuthFailed`].
    pub(crate) fn into_payload(self) -> ErrorPayload {
        let code = self.code();
        let (message, details) = match self {
            Error::RateLimitExceeded { retry_after_ms } => ("rate limit exceeded".to_string(), Some(json!({ "retry_after_ms": retry_after_ms }))),
            other => (other.to_string(), None),
        };
        ErrorPayload { code, message, details }
    }

    /// Converts a recoverable error into a `Close` frame. Returns `None` for
    /// errors that need no explicit close (the peer already went away).
    pub(crate) fn into_close_frame(self) -> Option<CloseFrame> {
        match self {
            Error::ConnectionClosed => None,
            other => {
                let code = other.code();
                Some(CloseFrame { code, reason: other.to_string().into() })
            }
        }
    }
}

impl From<WorkspaceManagerError> for Error {
    fn from(value: WorkspaceManagerError) -> Self {
        match value {
            WorkspaceManagerError::InvalidDuration(msg) => Error::InvalidOperation(msg),
            WorkspaceManagerError::NotFound => Error::WorkspaceNotFound,
            WorkspaceManagerError::Expired => Error::WorkspaceExpired,
            WorkspaceManagerError::ExtensionNotAllowed => Error::ExtensionNotAllowed,
            WorkspaceManagerError::KeyUnavailable(key_id) => Error::KeyUnavailable(key_id),
        }
    }
}

impl From<ParticipantManagerError> for Error {
    fn from(_: ParticipantManagerError) -> Self {
        Error::AuthFailed
    }
}

impl From<OperationRouterError> for Error {
    fn from(value: OperationRouterError) -> Self {
        match value {
            OperationRouterError::WorkspaceNotFound => Error::WorkspaceNotFound,
            OperationRouterError::WorkspaceExpired => Error::WorkspaceExpired,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::AuthFailed => StatusCode::UNAUTHORIZED,
            Error::WorkspaceNotFound => StatusCode::NOT_FOUND,
            Error::WorkspaceExpired => StatusCode::GONE,
            Error::InvalidOperation(_) | Error::UnexpectedMessage | Error::Json(_) | Error::Cbor(_) => StatusCode::BAD_REQUEST,
            Error::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::ExtensionNotAllowed => StatusCode::CONFLICT,
            Error::KeyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::ConnectionClosed | Error::Axum(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let payload = self.into_payload();
        (status, Json(json!({ "code": payload.code, "message": payload.message, "details": payload.details }))).into_response()
    }
}
