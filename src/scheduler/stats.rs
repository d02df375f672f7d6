//! Scheduler-wide atomic counters and the `GetDetailedStats` snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::capacity::limits::CapacitySnapshot;

#[derive(Default)]
pub struct SchedulerCounters {
    pub total_scheduled: AtomicU64,
    pub total_rejected: AtomicU64,
    pub total_queued: AtomicU64,
}

impl SchedulerCounters {
    pub fn record_scheduled(&self) {
        self.total_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.total_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.total_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total_scheduled: self.total_scheduled.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            total_queued: self.total_queued.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSnapshot {
    pub total_scheduled: u64,
    pub total_rejected: u64,
    pub total_queued: u64,
}

/// Full detailed-stats snapshot for admin/observability surfaces.
#[derive(Debug, Clone)]
pub struct DetailedStats {
    pub counters: CounterSnapshot,
    pub queue_depths: Vec<usize>,
    pub weights: Vec<u64>,
    pub capacity: Option<CapacitySnapshot>,
}
