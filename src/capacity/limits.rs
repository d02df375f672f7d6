//! Capacity ceilings and the rolling 1-second window they are measured over.

use std::time::Instant;

/// Global ceilings across all four dimensions. A zero value disables that
/// dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapacityLimits {
    pub max_tokens_per_sec: u64,
    pub max_rps: u64,
    pub max_concurrent: u64,
    pub max_context_length: u64,
}

impl CapacityLimits {
    pub fn new(
        max_tokens_per_sec: u64,
        max_rps: u64,
        max_concurrent: u64,
        max_context_length: u64,
    ) -> Self {
        Self {
            max_tokens_per_sec,
            max_rps,
            max_concurrent,
            max_context_length,
        }
    }
}

/// Partial update to `CapacityLimits`; `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialCapacityLimits {
    pub max_tokens_per_sec: Option<u64>,
    pub max_rps: Option<u64>,
    pub max_concurrent: Option<u64>,
    pub max_context_length: Option<u64>,
}

impl CapacityLimits {
    pub fn apply(&mut self, partial: PartialCapacityLimits) {
        if let Some(v) = partial.max_tokens_per_sec {
            self.max_tokens_per_sec = v;
        }
        if let Some(v) = partial.max_rps {
            self.max_rps = v;
        }
        if let Some(v) = partial.max_concurrent {
            self.max_concurrent = v;
        }
        if let Some(v) = partial.max_context_length {
            self.max_context_length = v;
        }
    }
}

/// Process-local rolling window state.
#[derive(Debug, Clone, Copy)]
pub struct CapacityWindow {
    pub window_start: Instant,
    pub window_tokens: u64,
    pub window_requests: u64,
    pub current_concurrent: u64,
}

impl CapacityWindow {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            window_tokens: 0,
            window_requests: 0,
            current_concurrent: 0,
        }
    }

    /// Roll the window over if a full second has elapsed. Concurrency is
    /// untouched: it is only adjusted by accept/Release.
    pub fn maybe_roll(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= std::time::Duration::from_secs(1) {
            self.window_start = now;
            self.window_tokens = 0;
            self.window_requests = 0;
        }
    }
}

/// A point-in-time snapshot for `CurrentLimits`/`GetUtilization`.
#[derive(Debug, Clone, Copy)]
pub struct CapacitySnapshot {
    pub limits: CapacityLimits,
    pub window_tokens: u64,
    pub window_requests: u64,
    pub current_concurrent: u64,
}
