//! Request and schedule-result types shared by every component on the
//! admission path (C1-C4).

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

/// A priority class in `[0, L-1]`, `0` highest.
pub type PriorityClass = u8;

/// A single inbound admission request.
///
/// Owned by the caller (the out-of-scope HTTP front end); the scheduler holds
/// only a reference for the lifetime of the admission + queue wait.
#[derive(Debug)]
pub struct Request {
    /// Caller-supplied unique identifier.
    pub id: String,
    /// Priority class, resolved by C1 or forced by an `X-Priority` header.
    pub priority: PriorityClass,
    /// Estimated token cost, used by C2/C3 admission checks.
    pub estimated_tokens: u64,
    /// Tenant/account identifier.
    pub account_id: String,
    /// Optional team identifier, narrows quota matching.
    pub team_id: Option<String>,
    /// Optional environment tag (e.g. "prod", "staging"), narrows quota matching.
    pub environment: Option<String>,
    /// Model identifier, informational only to the core.
    pub model: String,
    /// When the request was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Absolute deadline; requests still queued past this are dropped as expired.
    pub deadline: DateTime<Utc>,
    /// One-shot sink the scheduler delivers exactly one `ScheduleResult` to.
    pub result_sink: Option<oneshot::Sender<ScheduleResult>>,
}

impl Request {
    /// Build a request whose deadline is `enqueued_at + queue_timeout`.
    pub fn new(
        id: impl Into<String>,
        priority: PriorityClass,
        estimated_tokens: u64,
        account_id: impl Into<String>,
        model: impl Into<String>,
        queue_timeout: chrono::Duration,
        now: DateTime<Utc>,
    ) -> (Self, oneshot::Receiver<ScheduleResult>) {
        let (tx, rx) = oneshot::channel();
        let req = Self {
            id: id.into(),
            priority,
            estimated_tokens,
            account_id: account_id.into(),
            team_id: None,
            environment: None,
            model: model.into(),
            enqueued_at: now,
            deadline: now + queue_timeout,
            result_sink: Some(tx),
        };
        (req, rx)
    }

    /// Deliver `result` to the sink exactly once. A second call is a no-op.
    pub fn deliver(&mut self, result: ScheduleResult) {
        if let Some(tx) = self.result_sink.take() {
            // The receiver may have been dropped by an impatient caller; that
            // is not this component's problem to report.
            let _ = tx.send(result);
        }
    }

    /// True if `deadline` has passed as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

/// The single, terminal outcome delivered to a request's `result_sink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleResult {
    /// Whether the request was admitted (immediately or after a wait).
    pub accepted: bool,
    /// Human/machine-readable reason; one of the `reasons` rejection codes,
    /// or an acceptance reason such as "capacity available", "queued",
    /// "scheduled".
    pub reason: String,
    /// Position in queue at admission time, `0` when not queued.
    pub queue_pos: usize,
}

impl ScheduleResult {
    /// Admitted immediately, no wait.
    pub fn capacity_available() -> Self {
        Self {
            accepted: true,
            reason: "capacity available".to_string(),
            queue_pos: 0,
        }
    }

    /// Admitted to wait in a class queue.
    pub fn queued(queue_pos: usize) -> Self {
        Self {
            accepted: true,
            reason: "queued".to_string(),
            queue_pos,
        }
    }

    /// Admitted after having waited.
    pub fn scheduled() -> Self {
        Self {
            accepted: true,
            reason: "scheduled".to_string(),
            queue_pos: 0,
        }
    }

    /// Rejected, with one of the `reasons` codes.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: reason.into(),
            queue_pos: 0,
        }
    }
}

/// Well-known rejection reason codes.
pub mod reasons {
    pub const CAPACITY_TRANSIENT: &str = "capacity_transient";
    pub const CAPACITY_FATAL: &str = "capacity_fatal";
    pub const QUOTA_EXCEEDED: &str = "quota_exceeded";
    pub const HARD_LIMIT: &str = "hard_limit";
    pub const SOFT_LIMIT_EXCEEDED: &str = "soft_limit_exceeded";
    pub const OVERRIDE_LIMIT: &str = "override_limit";
    pub const QUEUE_FULL: &str = "queue_full";
    pub const TIMEOUT: &str = "timeout";
    pub const EXPIRED: &str = "expired";
    pub const INVALID_PRIORITY: &str = "invalid_priority";
    pub const REQUEUE_OVERFLOW: &str = "requeue overflow";
}
