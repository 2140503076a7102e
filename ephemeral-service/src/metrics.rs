//! Metrics definitions for the ephemeral workspace engine.
//!
//! This module defines all metrics keys used by the service and provides a
//! helper [`describe_metrics`] to set metadata for each metric using the
//! `metrics` crate.

/// Metrics key for the number of active workspaces.
pub const METRICS_ID_WORKSPACES_ACTIVE: &str = "ephemeral.workspaces.active";
/// Metrics key for workspaces created.
pub const METRICS_ID_WORKSPACES_CREATED: &str = "ephemeral.workspaces.created";
/// Metrics key for workspaces expired by the background timer.
pub const METRICS_ID_WORKSPACES_EXPIRED: &str = "ephemeral.workspaces.expired";
/// Metrics key for workspaces revoked on request.
pub const METRICS_ID_WORKSPACES_REVOKED: &str = "ephemeral.workspaces.revoked";
/// Metrics key for the number of live participant sessions.
pub const METRICS_ID_PARTICIPANTS_CONNECTED: &str = "ephemeral.participants.connected";
/// Metrics key for failed authentication attempts.
pub const METRICS_ID_AUTH_FAILURES: &str = "ephemeral.auth.failures";
/// Metrics key for operations routed to a live transport.
pub const METRICS_ID_OPERATIONS_DELIVERED: &str = "ephemeral.operations.delivered";
/// Metrics key for operations buffered for an offline participant.
pub const METRICS_ID_OPERATIONS_BUFFERED: &str = "ephemeral.operations.buffered";
/// Metrics key for buffered operations dropped by the expiry sweep.
pub const METRICS_ID_OPERATIONS_BUFFER_EXPIRED: &str = "ephemeral.operations.buffer_expired";
/// Metrics key for requests rejected by a rate limiter.
pub const METRICS_ID_RATE_LIMITED: &str = "ephemeral.rate_limited";

/// Describe all metrics used by the service.
///
/// This calls the `describe_*` functions from the `metrics` crate to set
/// metadata on the different metrics.
pub fn describe_metrics() {
    metrics::describe_gauge!(
        METRICS_ID_WORKSPACES_ACTIVE,
        metrics::Unit::Count,
        "Number of workspaces currently active"
    );
    metrics::describe_counter!(
        METRICS_ID_WORKSPACES_CREATED,
        metrics::Unit::Count,
        "Number of workspaces created"
    );
    metrics::describe_counter!(
        METRICS_ID_WORKSPACES_EXPIRED,
        metrics::Unit::Count,
        "Number of workspaces expired by the background timer"
    );
    metrics::describe_counter!(
        METRICS_ID_WORKSPACES_REVOKED,
        metrics::Unit::Count,
        "Number of workspaces revoked on request"
    );
    metrics::describe_gauge!(
        METRICS_ID_PARTICIPANTS_CONNECTED,
        metrics::Unit::Count,
        "Number of currently connected participant sessions"
    );
    metrics::describe_counter!(
        METRICS_ID_AUTH_FAILURES,
        metrics::Unit::Count,
        "Number of handshake authentication failures"
    );
    metrics::describe_counter!(
        METRICS_ID_OPERATIONS_DELIVERED,
        metrics::Unit::Count,
        "Number of operations routed directly to a live transport"
    );
    metrics::describe_counter!(
        METRICS_ID_OPERATIONS_BUFFERED,
        metrics::Unit::Count,
        "Number of operations appended to an offline participant's buffer"
    );
    metrics::describe_counter!(
        METRICS_ID_OPERATIONS_BUFFER_EXPIRED,
        metrics::Unit::Count,
        "Number of buffered operations dropped by the expiry sweep"
    );
    metrics::describe_counter!(
        METRICS_ID_RATE_LIMITED,
        metrics::Unit::Count,
        "Number of requests rejected by a rate limiter"
    );
}
