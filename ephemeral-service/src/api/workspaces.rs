//! Workspace lifecycle REST surface (§6):
//! `POST /workspaces`, `GET /workspaces/{id}`, `POST
//! /workspaces/{id}/extend`, `DELETE /workspaces/{id}`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use ephemeral_types::workspace::WorkspaceStatus;
use ephemeral_types::{ParticipantId, WorkspaceId};
use serde::{Deserialize, Serialize};

use crate::Engine;
use crate::api::errors::Error;
use crate::services::workspace_manager::{CreateWorkspaceInput, WorkspaceDescriptor};

#[derive(Debug, Deserialize)]
struct CreateWorkspaceConfig {
    duration_minutes: i64,
    rotation_interval_min: i64,
    grace_period_ms: i64,
    max_participants: usize,
    allow_extension: bool,
}

#[derive(Debug, Deserialize)]
struct CreateWorkspaceRequest {
    config: CreateWorkspaceConfig,
    creator_public_key: [u8; 32],
    creator_x25519_public_key: [u8; 32],
}

#[derive(Debug, Deserialize)]
struct ExtendWorkspaceRequest {
    additional_minutes: i64,
}

#[derive(Debug, Serialize)]
struct WorkspaceResponse {
    id: WorkspaceId,
    created_at_ms: i64,
    expires_at_ms: i64,
    status: WorkspaceStatus,
    participant_count: usize,
    encrypted_metadata: ephemeral_types::workspace::EncryptedWorkspaceMetadata,
}

impl From<WorkspaceDescriptor> for WorkspaceResponse {
    fn from(descriptor: WorkspaceDescriptor) -> Self {
        Self {
            id: descriptor.id,
            created_at_ms: descriptor.created_at_ms,
            expires_at_ms: descriptor.expires_at_ms,
            status: descriptor.status,
            participant_count: descriptor.participant_count,
            encrypted_metadata: descriptor.encrypted_metadata,
        }
    }
}

/// Creates a router containing the workspace lifecycle endpoints.
pub(crate) fn routes(engine: Arc<Engine>) -> Router {
    let for_create = Arc::clone(&engine);
    let for_get = Arc::clone(&engine);
    let for_extend = Arc::clone(&engine);
    let for_delete = engine;

    Router::new()
        .route("/workspaces", post(move |connect_info, body| create_workspace(Arc::clone(&for_create), connect_info, body)))
        .route("/workspaces/{id}", get(move |path| get_workspace(Arc::clone(&for_get), path)))
        .route("/workspaces/{id}/extend", post(move |path, body| extend_workspace(Arc::clone(&for_extend), path, body)))
        .route("/workspaces/{id}", delete(move |path| revoke_workspace(Arc::clone(&for_delete), path)))
}

async fn create_workspace(
    engine: Arc<Engine>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<CreateWorkspaceRequest>,
) -> axum::response::Response {
    let decision = engine.rate_limiter.check_creation_rate(addr.ip());
    if !decision.allowed {
        return Error::RateLimitExceeded { retry_after_ms: decision.retry_after_ms.unwrap_or(0) }.into_response();
    }
    if request.config.max_participants > engine.config.max_participants {
        return Error::InvalidOperation(format!(
            "max_participants may not exceed the engine-wide ceiling of {}",
            engine.config.max_participants
        ))
        .into_response();
    }

    let input = CreateWorkspaceInput {
        duration_minutes: request.config.duration_minutes,
        rotation_interval_min: request.config.rotation_interval_min,
        grace_period_ms: request.config.grace_period_ms,
        max_participants: request.config.max_participants,
        allow_extension: request.config.allow_extension,
    };

    match engine.workspace_manager.create_workspace(
        input,
        ParticipantId::new_random(),
        request.creator_public_key,
        request.creator_x25519_public_key,
    ) {
        Ok(descriptor) => {
            engine.rate_limiter.record_creation(addr.ip());
            (StatusCode::CREATED, Json(WorkspaceResponse::from(descriptor))).into_response()
        }
        Err(err) => Error::from(err).into_response(),
    }
}

async fn get_workspace(engine: Arc<Engine>, Path(id): Path<WorkspaceId>) -> axum::response::Response {
    match engine.workspace_manager.get_descriptor(id) {
        Some(descriptor) => Json(WorkspaceResponse::from(descriptor)).into_response(),
        None => Error::WorkspaceNotFound.into_response(),
    }
}

async fn extend_workspace(engine: Arc<Engine>, Path(id): Path<WorkspaceId>, Json(request): Json<ExtendWorkspaceRequest>) -> axum::response::Response {
    match engine.workspace_manager.extend_workspace(id, request.additional_minutes) {
        Ok(descriptor) => Json(WorkspaceResponse::from(descriptor)).into_response(),
        Err(err) => Error::from(err).into_response(),
    }
}

async fn revoke_workspace(engine: Arc<Engine>, Path(id): Path<WorkspaceId>) -> axum::response::Response {
    match engine.workspace_manager.revoke_workspace(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => Error::from(err).into_response(),
    }
}
