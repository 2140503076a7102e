//! Three independent sliding-window limiters: operation rate, workspace
//! creation rate, and participant cap (§4.10).

use std::collections::HashMap;
use std::net::IpAddr;

use ephemeral_types::{ParticipantId, WorkspaceId};
use parking_lot::Mutex;

use crate::services::workspace_manager::now_ms;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// If rejected, how long the caller should wait before retrying.
    pub retry_after_ms: Option<i64>,
    /// Human-readable reason, populated only on rejection.
    pub reason: Option<String>,
}

impl LimitDecision {
    fn allow() -> Self {
        Self { allowed: true, retry_after_ms: None, reason: None }
    }

    fn deny(retry_after_ms: i64, reason: impl Into<String>) -> Self {
        Self { allowed: false, retry_after_ms: Some(retry_after_ms), reason: Some(reason.into()) }
    }
}

struct SlidingWindow {
    window_start_ms: i64,
    count: u32,
}

/// Counters for the three limiters, swept periodically to bound memory.
#[derive(Default)]
pub struct RateLimiter {
    operation_windows: Mutex<HashMap<(WorkspaceId, ParticipantId), SlidingWindow>>,
    creation_windows: Mutex<HashMap<IpAddr, SlidingWindow>>,
    operation_rate_per_second: u32,
    creations_per_hour: u32,
    max_participants: usize,
}

const OPERATION_WINDOW_MS: i64 = 1_000;
const CREATION_WINDOW_MS: i64 = 3_600_000;

impl RateLimiter {
    /// Constructs a limiter with the given per-second operation rate,
    /// per-hour creation rate, and hard participant cap.
    pub fn new(operation_rate_per_second: u32, creations_per_hour: u32, max_participants: usize) -> Self {
        Self {
            operation_windows: Mutex::new(HashMap::new()),
            creation_windows: Mutex::new(HashMap::new()),
            operation_rate_per_second,
            creations_per_hour,
            max_participants,
        }
    }

    /// Checks (without recording) whether another operation may be accepted
    /// for `(workspace_id, participant_id)` right now.
    pub fn check_operation_rate(&self, workspace_id: WorkspaceId, participant_id: ParticipantId) -> LimitDecision {
        let now = now_ms();
        let guard = self.operation_windows.lock();
        match guard.get(&(workspace_id, participant_id)) {
            Some(window) if now - window.window_start_ms < OPERATION_WINDOW_MS && window.count >= self.operation_rate_per_second => {
                let retry_after_ms = OPERATION_WINDOW_MS - (now - window.window_start_ms);
                LimitDecision::deny(retry_after_ms.max(1), "Operation rate limit exceeded")
            }
            _ => LimitDecision::allow(),
        }
    }

    /// Records an accepted operation. Must only be called after
    /// [`RateLimiter::check_operation_rate`] returned `allowed: true`.
    pub fn record_operation(&self, workspace_id: WorkspaceId, participant_id: ParticipantId) {
        let now = now_ms();
        let mut guard = self.operation_windows.lock();
        let window = guard.entry((workspace_id, participant_id)).or_insert_with(|| SlidingWindow { window_start_ms: now, count: 0 });
        if now - window.window_start_ms >= OPERATION_WINDOW_MS {
            window.window_start_ms = now;
            window.count = 0;
        }
        window.count += 1;
    }

    /// Checks whether `source` may create another workspace right now.
    pub fn check_creation_rate(&self, source: IpAddr) -> LimitDecision {
        let now = now_ms();
        let guard = self.creation_windows.lock();
        match guard.get(&source) {
            Some(window) if now - window.window_start_ms < CREATION_WINDOW_MS && window.count >= self.creations_per_hour => {
                let retry_after_ms = CREATION_WINDOW_MS - (now - window.window_start_ms);
                LimitDecision::deny(retry_after_ms.max(1), "Workspace creation rate limit exceeded")
            }
            _ => LimitDecision::allow(),
        }
    }

    /// Records an accepted workspace creation from `source`.
    pub fn record_creation(&self, source: IpAddr) {
        let now = now_ms();
        let mut guard = self.creation_windows.lock();
        let window = guard.entry(source).or_insert_with(|| SlidingWindow { window_start_ms: now, count: 0 });
        if now - window.window_start_ms >= CREATION_WINDOW_MS {
            window.window_start_ms = now;
            window.count = 0;
        }
        window.count += 1;
    }

    /// Checks whether a workspace already at `current_participant_count` may
    /// admit one more participant.
    pub fn check_participant_cap(&self, current_participant_count: usize) -> LimitDecision {
        if current_participant_count >= self.max_participants {
            LimitDecision { allowed: false, retry_after_ms: None, reason: Some("Participant limit exceeded for this workspace".into()) }
        } else {
            LimitDecision::allow()
        }
    }

    /// Drops sliding-window entries whose window has fully elapsed, bounding
    /// memory growth. Intended to run on [`super::super::config::EngineConfig::sweep_interval`].
    pub fn sweep(&self) {
        let now = now_ms();
        self.operation_windows.lock().retain(|_, window| now - window.window_start_ms < OPERATION_WINDOW_MS);
        self.creation_windows.lock().retain(|_, window| now - window.window_start_ms < CREATION_WINDOW_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_configured_rate() {
        let limiter = RateLimiter::new(3, 10, 50);
        let workspace_id = WorkspaceId::new_random();
        let participant_id = ParticipantId::new_random();
        for _ in 0..3 {
            assert!(limiter.check_operation_rate(workspace_id, participant_id).allowed);
            limiter.record_operation(workspace_id, participant_id);
        }
        let decision = limiter.check_operation_rate(workspace_id, participant_id);
        assert!(!decision.allowed);
        assert!(decision.retry_after_ms.unwrap() > 0);
    }

    #[test]
    fn participant_cap_rejects_once_reached() {
        let limiter = RateLimiter::new(100, 10, 2);
        assert!(limiter.check_participant_cap(1).allowed);
        assert!(!limiter.check_participant_cap(2).allowed);
    }

    #[test]
    fn creation_rate_is_tracked_per_source() {
        let limiter = RateLimiter::new(100, 1, 50);
        let source: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check_creation_rate(source).allowed);
        limiter.record_creation(source);
        assert!(!limiter.check_creation_rate(source).allowed);

        let other: IpAddr = "127.0.0.2".parse().unwrap();
        assert!(limiter.check_creation_rate(other).allowed);
    }

    #[test]
    fn sweep_drops_elapsed_windows() {
        let limiter = RateLimiter::new(1, 10, 50);
        let workspace_id = WorkspaceId::new_random();
        let participant_id = ParticipantId::new_random();
        limiter.record_operation(workspace_id, participant_id);
        limiter.operation_windows.lock().get_mut(&(workspace_id, participant_id)).unwrap().window_start_ms = now_ms() - OPERATION_WINDOW_MS - 1;
        limiter.sweep();
        assert!(limiter.operation_windows.lock().is_empty());
    }
}
