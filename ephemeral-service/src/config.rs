//! Configuration types and CLI/environment parsing for the ephemeral
//! workspace engine.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// The environment the service is running in.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Environment {
    /// Production environment.
    Prod,
    /// Development environment.
    Dev,
}

/// Configuration for the ephemeral workspace engine.
///
/// Configurable via environment variables or command-line arguments using
/// `clap`.
#[derive(Parser, Debug, Clone)]
pub struct EngineConfig {
    /// The environment of the service (either `prod` or `dev`).
    #[clap(long, env = "EPHEMERAL_ENVIRONMENT", default_value = "prod")]
    pub environment: Environment,

    /// Address the HTTP/WebSocket server binds to.
    #[clap(long, env = "EPHEMERAL_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// Max message size the websocket connection accepts, in bytes.
    #[clap(long, env = "EPHEMERAL_WS_MAX_MESSAGE_SIZE", default_value = "65536")]
    pub ws_max_message_size: usize,

    /// Default rotation interval for newly created workspaces' temporal keys,
    /// in minutes.
    #[clap(long, env = "EPHEMERAL_DEFAULT_ROTATION_MINUTES", default_value = "5")]
    pub default_rotation_minutes: i64,

    /// Default grace period after a temporal key's `valid_until`, during
    /// which it is still accepted for decryption.
    #[clap(
        long,
        env = "EPHEMERAL_DEFAULT_GRACE_PERIOD",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub default_grace_period: Duration,

    /// Hard ceiling on the number of distinct participants per workspace.
    #[clap(long, env = "EPHEMERAL_MAX_PARTICIPANTS", default_value = "50")]
    pub max_participants: usize,

    /// Allowed operations per second, per `(workspace, participant)`.
    #[clap(long, env = "EPHEMERAL_OPERATION_RATE_PER_SECOND", default_value = "100")]
    pub operation_rate_per_second: u32,

    /// Allowed workspace creations per hour, per source address.
    #[clap(long, env = "EPHEMERAL_CREATIONS_PER_HOUR", default_value = "10")]
    pub creations_per_hour: u32,

    /// How long a routed operation may sit in an offline participant's
    /// buffer before the expiry sweep drops it.
    #[clap(
        long,
        env = "EPHEMERAL_BUFFER_TTL",
        default_value = "10min",
        value_parser = humantime::parse_duration
    )]
    pub buffer_ttl: Duration,

    /// Interval at which the rate-limiter and buffer sweeps run.
    #[clap(
        long,
        env = "EPHEMERAL_SWEEP_INTERVAL",
        default_value = "60s",
        value_parser = humantime::parse_duration
    )]
    pub sweep_interval: Duration,

    /// Max time to wait for background tasks to finish during shutdown.
    #[clap(
        long,
        env = "EPHEMERAL_MAX_WAIT_TIME_SHUTDOWN",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub max_wait_time_shutdown: Duration,
}
