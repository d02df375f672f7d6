//! Priority Scheduler.
//!
//! `L` FIFO queues, admission-then-queue flow, and a single dispatch loop
//! implementing `strict` / `wfq` / `hybrid` policies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::capacity::guardian::{CapacityGuardian, CheckOutcome};
use crate::capacity::limits::{CapacityLimits, CapacitySnapshot, PartialCapacityLimits};
use crate::clock::SharedClock;
use crate::error::{CoreError, CoreResult};
use crate::request::{reasons, Request, ScheduleResult};
use crate::rules::engine::SchedulerHandle;
use crate::scheduler::dispatch::{default_weights, dispatch_cost, DispatchPolicy, WfqState};
use crate::scheduler::queue::ClassQueues;
use crate::scheduler::stats::{DetailedStats, SchedulerCounters};

/// Tunables fixed at construction time.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub num_priority_levels: u8,
    pub max_queue_depth: usize,
    pub policy: DispatchPolicy,
    pub tick_interval: StdDuration,
    pub stats_interval: Option<StdDuration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_priority_levels: 10,
            max_queue_depth: 1000,
            policy: DispatchPolicy::Hybrid,
            tick_interval: StdDuration::from_millis(100),
            stats_interval: None,
        }
    }
}

enum DispatchOutcome {
    Empty,
    Dispatched { cost: i64 },
    Dropped,
    Blocked,
}

/// The priority scheduler.
pub struct PriorityScheduler {
    config: SchedulerConfig,
    queues: ClassQueues,
    wfq: Mutex<WfqState>,
    capacity: CapacityGuardian,
    clock: SharedClock,
    counters: SchedulerCounters,
    shutdown: CancellationToken,
    started: AtomicUsize,
}

impl PriorityScheduler {
    pub fn new(config: SchedulerConfig, capacity: CapacityGuardian, clock: SharedClock) -> Arc<Self> {
        let queues = ClassQueues::new(config.num_priority_levels, config.max_queue_depth);
        let weights = default_weights(config.num_priority_levels);
        let wfq = Mutex::new(WfqState::new(weights, config.max_queue_depth));
        Arc::new(Self {
            config,
            queues,
            wfq,
            capacity,
            clock,
            counters: SchedulerCounters::default(),
            shutdown: CancellationToken::new(),
            started: AtomicUsize::new(0),
        })
    }

    /// Submit a request: fast-path capacity check, then either serve,
    /// queue, or reject it. Validates `priority ∈ [0, L-1]`.
    ///
    /// Returns an immediate acknowledgment (the same `ScheduleResult` the
    /// caller would see if polling synchronously); the request's own
    /// `result_sink` still receives exactly one terminal delivery — for a
    /// queued request that happens later, from the dispatch loop, not here.
    pub async fn submit(&self, mut request: Request) -> CoreResult<ScheduleResult> {
        let class = request.priority as usize;
        if class >= self.queues.len() {
            return Err(CoreError::InvalidPriority {
                priority: request.priority as u32,
                max: self.queues.len() as u32,
            });
        }

        let outcome = self.capacity.check_and_reserve(request.estimated_tokens).await;
        if outcome.accepted {
            let result = ScheduleResult::capacity_available();
            request.deliver(result.clone());
            self.counters.record_scheduled();
            return Ok(result);
        }
        if outcome.fatal {
            let result = ScheduleResult::rejected(outcome.reason);
            request.deliver(result.clone());
            self.counters.record_rejected();
            return Ok(result);
        }

        let pos = self.queues.get(class).len() + 1;
        match self.queues.get(class).try_push(request) {
            Ok(()) => {
                self.counters.record_queued();
                Ok(ScheduleResult::queued(pos))
            }
            Err(mut dropped) => {
                let result = ScheduleResult::rejected(reasons::QUEUE_FULL);
                dropped.deliver(result.clone());
                self.counters.record_rejected();
                Ok(result)
            }
        }
    }

    /// `Release`: forward to the capacity guardian.
    pub async fn release(&self, estimated_tokens: u64) {
        self.capacity.release(estimated_tokens).await;
    }

    /// `UpdateWeights`: replace weights, resetting deficit counters.
    pub fn update_weights(&self, weights: Vec<u64>) -> CoreResult<()> {
        if weights.len() != self.queues.len() {
            return Err(CoreError::InvalidWeights {
                expected: self.queues.len(),
                actual: weights.len(),
            });
        }
        self.wfq.lock().set_weights(weights);
        Ok(())
    }

    pub fn current_weights(&self) -> Vec<u64> {
        self.wfq.lock().weights()
    }

    pub async fn update_capacity(&self, partial: PartialCapacityLimits) {
        self.capacity.update_limits(partial).await;
    }

    pub async fn current_capacity(&self) -> CapacityLimits {
        self.capacity
            .snapshot()
            .await
            .map(|s| s.limits)
            .unwrap_or_default()
    }

    pub async fn get_detailed_stats(&self) -> DetailedStats {
        DetailedStats {
            counters: self.counters.snapshot(),
            queue_depths: self.queues.depths(),
            weights: self.current_weights(),
            capacity: self.capacity.snapshot().await,
        }
    }

    /// Spawn the dispatch loop (and the stats loop if configured).
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(1, Ordering::AcqRel) == 1 {
            return;
        }
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(scheduler.config.tick_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => scheduler.dispatch_tick().await,
                    _ = scheduler.shutdown.cancelled() => break,
                }
            }
        });

        if let Some(interval) = self.config.stats_interval {
            let scheduler = Arc::clone(self);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            let stats = scheduler.get_detailed_stats().await;
                            tracing::info!(
                                scheduled = stats.counters.total_scheduled,
                                rejected = stats.counters.total_rejected,
                                queued = stats.counters.total_queued,
                                depths = ?stats.queue_depths,
                                "scheduler stats"
                            );
                        }
                        _ = scheduler.shutdown.cancelled() => break,
                    }
                }
            });
        }
    }

    async fn dispatch_tick(&self) {
        match self.config.policy {
            DispatchPolicy::Strict => self.drain_strict(0).await,
            DispatchPolicy::Wfq => self.drain_wfq(0).await,
            DispatchPolicy::Hybrid => {
                self.drain_strict(0).await;
                self.drain_wfq(1).await;
            }
        }
    }

    async fn drain_strict(&self, from_class: usize) {
        loop {
            let non_empty = self.queues.non_empty_mask();
            let Some(class) = non_empty[from_class..].iter().position(|&x| x).map(|i| i + from_class) else {
                return;
            };
            match self.attempt_dispatch_one(class).await {
                DispatchOutcome::Empty | DispatchOutcome::Blocked => return,
                DispatchOutcome::Dispatched { .. } | DispatchOutcome::Dropped => continue,
            }
        }
    }

    async fn drain_wfq(&self, from_class: usize) {
        self.wfq.lock().tick(from_class);
        loop {
            let non_empty = self.queues.non_empty_mask();
            let Some(class) = self.wfq.lock().select(&non_empty, from_class) else {
                return;
            };
            match self.attempt_dispatch_one(class).await {
                DispatchOutcome::Dispatched { cost } => {
                    self.wfq.lock().charge(class, cost);
                }
                DispatchOutcome::Dropped => continue,
                DispatchOutcome::Empty | DispatchOutcome::Blocked => return,
            }
        }
    }

    async fn attempt_dispatch_one(&self, class: usize) -> DispatchOutcome {
        let Some(mut request) = self.queues.get(class).pop_front() else {
            return DispatchOutcome::Empty;
        };

        let now = self.clock.now();
        if request.is_expired(now) {
            request.deliver(crate::request::ScheduleResult::rejected(reasons::EXPIRED));
            self.counters.record_rejected();
            return DispatchOutcome::Dropped;
        }

        let outcome: CheckOutcome = self.capacity.check_and_reserve(request.estimated_tokens).await;
        if outcome.accepted {
            let cost = dispatch_cost(request.estimated_tokens);
            request.deliver(crate::request::ScheduleResult::scheduled());
            self.counters.record_scheduled();
            return DispatchOutcome::Dispatched { cost };
        }
        if outcome.fatal {
            request.deliver(crate::request::ScheduleResult::rejected(outcome.reason));
            self.counters.record_rejected();
            return DispatchOutcome::Dropped;
        }

        match self.queues.get(class).try_push(request) {
            Ok(()) => DispatchOutcome::Blocked,
            Err(mut dropped) => {
                dropped.deliver(crate::request::ScheduleResult::rejected(reasons::REQUEUE_OVERFLOW));
                self.counters.record_rejected();
                DispatchOutcome::Dropped
            }
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.capacity.shutdown();
    }
}

#[async_trait]
impl SchedulerHandle for PriorityScheduler {
    async fn current_weights(&self) -> Vec<u64> {
        PriorityScheduler::current_weights(self)
    }

    async fn update_weights(&self, weights: Vec<u64>) {
        if let Err(err) = PriorityScheduler::update_weights(self, weights) {
            tracing::warn!(error = %err, "rule engine pushed an invalid weight vector");
        }
    }

    async fn current_capacity(&self) -> CapacityLimits {
        PriorityScheduler::current_capacity(self).await
    }

    async fn update_capacity(&self, partial: PartialCapacityLimits) {
        PriorityScheduler::update_capacity(self, partial).await;
    }
}
