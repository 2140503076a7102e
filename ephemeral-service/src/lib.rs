#![deny(missing_docs)]
//! The stateful protocol engine for ephemeral end-to-end-encrypted
//! collaborative editing.
//!
//! This crate wires the cryptographic primitives of `ephemeral-crypto` and
//! the CRDT model of `ephemeral-crdt` to a concrete transport: workspace
//! lifecycle over REST, and the challenge/handshake/operation/sync protocol
//! over WebSocket (§4.12, §6). [`Engine`] is the composition root — it owns
//! every service and is cheaply cloned (it is always handed around as an
//! `Arc<Engine>`).
//!
//! State is process-memory only and is lost on restart, by design: nothing
//! here is meant to survive past a workspace's scheduled expiration anyway.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub(crate) mod api;
pub mod config;
pub mod metrics;
pub mod services;

use config::EngineConfig;
use services::audit_logger::AuditLogger;
use services::operation_router::OperationRouter;
use services::participant_manager::ParticipantManager;
use services::rate_limiter::RateLimiter;
use services::workspace_manager::{WorkspaceManager, now_ms};

/// Owns every stateful service the protocol engine is built from, plus the
/// configuration they were built with.
///
/// Always held as `Arc<Engine>` — handlers clone the `Arc`, never the
/// `Engine` itself.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) workspace_manager: Arc<WorkspaceManager>,
    pub(crate) participant_manager: Arc<ParticipantManager>,
    pub(crate) rate_limiter: Arc<RateLimiter>,
    pub(crate) operation_router: Arc<OperationRouter>,
    pub(crate) audit_logger: Arc<AuditLogger>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) started_at_ms: i64,
}

impl Engine {
    /// Builds a fresh [`Engine`] from `config`, spawning its background sweep
    /// task (rate-limiter counters, expired operation buffers). The sweep
    /// task stops when `shutdown` is cancelled.
    pub fn new(config: EngineConfig, shutdown: CancellationToken) -> Arc<Self> {
        let audit_logger = AuditLogger::new();
        let engine = Arc::new(Self {
            rate_limiter: Arc::new(RateLimiter::new(config.operation_rate_per_second, config.creations_per_hour, config.max_participants)),
            workspace_manager: WorkspaceManager::new(Arc::clone(&audit_logger), shutdown.child_token()),
            participant_manager: ParticipantManager::new(Arc::clone(&audit_logger)),
            operation_router: Arc::new(OperationRouter::new()),
            audit_logger,
            started_at_ms: now_ms(),
            shutdown,
            config,
        });
        engine.spawn_sweep_task();
        engine
    }

    fn spawn_sweep_task(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let sweep_interval = engine.config.sweep_interval;
        let buffer_ttl_ms = engine.config.buffer_ttl.as_millis() as i64;
        let shutdown = engine.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        engine.rate_limiter.sweep();
                        engine.operation_router.clear_expired(now_ms() - buffer_ttl_ms);
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    /// Builds the complete `axum::Router` serving this engine's HTTP and
    /// WebSocket surface (§6).
    pub fn router(self: &Arc<Self>) -> axum::Router {
        axum::Router::new()
            .merge(api::health::routes(Arc::clone(self)))
            .merge(api::workspaces::routes(Arc::clone(self)))
            .merge(api::protocol::routes(Arc::clone(self)))
            .layer(tower_http::trace::TraceLayer::new_for_http())
    }
}
