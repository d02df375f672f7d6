//! Injectable time source.
//!
//! The rule engine (C5) and the quota/capacity windows all need `now()` to be
//! swappable in tests so that time-window and rule-reversion scenarios can be
//! driven deterministically instead of racing the wall clock.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// A source of the current instant.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// The real, wall-clock backed clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock whose value is set explicitly, for deterministic tests.
#[derive(Clone, Default)]
pub struct FixedClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl FixedClock {
    /// Create a fixed clock starting at `at`.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(at)),
        }
    }

    /// Move the clock to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write() = at;
    }

    /// Advance the clock by `duration`.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.now.write();
        *guard = *guard + duration;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// Shared handle to a clock implementation.
pub type SharedClock = Arc<dyn Clock>;

/// Build a shared wall-clock clock.
pub fn system() -> SharedClock {
    Arc::new(SystemClock)
}
