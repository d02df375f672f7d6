//! C2: Capacity Guardian.
//!
//! A single background task owns the rolling window and all four capacity
//! counters; callers never touch the counters directly, they round-trip
//! through channels (`CheckAndReserve`, `Release`, `UpdateLimits`,
//! `CurrentLimits`/`GetUtilization`). Single-owner-over-a-channel mirrors the
//! `PriorityResolver`'s reader-many cache in spirit, but here every operation
//! mutates shared counters, so there is exactly one writer and no lock at all.

use std::time::{Duration as StdDuration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::capacity::limits::{CapacityLimits, CapacitySnapshot, CapacityWindow, PartialCapacityLimits};
use crate::request::reasons;

/// Outcome of a single `CheckAndReserve` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub accepted: bool,
    /// `true` when the rejection can never succeed by waiting: single-request
    /// token count or context length over the ceiling.
    pub fatal: bool,
    pub reason: String,
}

impl CheckOutcome {
    fn accepted() -> Self {
        Self {
            accepted: true,
            fatal: false,
            reason: "capacity available".to_string(),
        }
    }

    fn transient(reason: &str) -> Self {
        Self {
            accepted: false,
            fatal: false,
            reason: reason.to_string(),
        }
    }

    fn fatal(reason: String) -> Self {
        Self {
            accepted: false,
            fatal: true,
            reason,
        }
    }
}

struct CheckMsg {
    estimated_tokens: u64,
    resp: oneshot::Sender<CheckOutcome>,
}

struct ReleaseMsg {
    tokens: u64,
}

enum ControlMsg {
    UpdateLimits(PartialCapacityLimits),
    Snapshot(oneshot::Sender<CapacitySnapshot>),
}

/// Handle to the background capacity worker. Cloning is cheap; every clone
/// talks to the same worker task.
#[derive(Clone)]
pub struct CapacityGuardian {
    check_tx: mpsc::Sender<CheckMsg>,
    release_tx: mpsc::Sender<ReleaseMsg>,
    control_tx: mpsc::Sender<ControlMsg>,
    shutdown: CancellationToken,
}

impl CapacityGuardian {
    /// Spawn the worker task and return a handle to it.
    pub fn spawn(limits: CapacityLimits) -> Self {
        let (check_tx, check_rx) = mpsc::channel(1024);
        let (release_tx, release_rx) = mpsc::channel(1024);
        let (control_tx, control_rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();

        let worker = Worker {
            limits,
            window: CapacityWindow::new(Instant::now()),
            check_rx,
            release_rx,
            control_rx,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(worker.run());

        Self {
            check_tx,
            release_tx,
            control_tx,
            shutdown,
        }
    }

    /// Admit or reject `estimated_tokens`, reserving a concurrency/token/RPS
    /// slot atomically on acceptance. Times out after a 5-second budget
    /// rather than hanging forever if the worker is gone.
    pub async fn check_and_reserve(&self, estimated_tokens: u64) -> CheckOutcome {
        let (resp_tx, resp_rx) = oneshot::channel();
        let msg = CheckMsg {
            estimated_tokens,
            resp: resp_tx,
        };
        let send_and_wait = async {
            if self.check_tx.send(msg).await.is_err() {
                return CheckOutcome::fatal("capacity guardian unavailable".to_string());
            }
            resp_rx
                .await
                .unwrap_or_else(|_| CheckOutcome::fatal("capacity guardian unavailable".to_string()))
        };
        match time::timeout(StdDuration::from_secs(5), send_and_wait).await {
            Ok(outcome) => outcome,
            Err(_) => CheckOutcome::transient(reasons::CAPACITY_TRANSIENT),
        }
    }

    /// `Release`: give back a previously reserved concurrency/token slot.
    pub async fn release(&self, tokens: u64) {
        let _ = self.release_tx.send(ReleaseMsg { tokens }).await;
    }

    /// `UpdateLimits`: apply a partial update to the ceilings.
    pub async fn update_limits(&self, partial: PartialCapacityLimits) {
        let _ = self.control_tx.send(ControlMsg::UpdateLimits(partial)).await;
    }

    /// `CurrentLimits`/`GetUtilization`: a point-in-time snapshot.
    pub async fn snapshot(&self) -> Option<CapacitySnapshot> {
        let (tx, rx) = oneshot::channel();
        self.control_tx.send(ControlMsg::Snapshot(tx)).await.ok()?;
        rx.await.ok()
    }

    /// Stop the worker task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

struct Worker {
    limits: CapacityLimits,
    window: CapacityWindow,
    check_rx: mpsc::Receiver<CheckMsg>,
    release_rx: mpsc::Receiver<ReleaseMsg>,
    control_rx: mpsc::Receiver<ControlMsg>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        let mut tick = time::interval(StdDuration::from_secs(1));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.window.maybe_roll(Instant::now());
                }
                maybe_msg = self.check_rx.recv() => {
                    match maybe_msg {
                        Some(msg) => {
                            let outcome = self.evaluate(msg.estimated_tokens);
                            let _ = msg.resp.send(outcome);
                        }
                        None => break,
                    }
                }
                maybe_msg = self.release_rx.recv() => {
                    match maybe_msg {
                        Some(_msg) => {
                            self.window.current_concurrent = self.window.current_concurrent.saturating_sub(1);
                        }
                        None => break,
                    }
                }
                maybe_msg = self.control_rx.recv() => {
                    match maybe_msg {
                        Some(ControlMsg::UpdateLimits(partial)) => self.limits.apply(partial),
                        Some(ControlMsg::Snapshot(resp)) => {
                            let _ = resp.send(CapacitySnapshot {
                                limits: self.limits,
                                window_tokens: self.window.window_tokens,
                                window_requests: self.window.window_requests,
                                current_concurrent: self.window.current_concurrent,
                            });
                        }
                        None => break,
                    }
                }
                _ = self.shutdown.cancelled() => break,
            }
        }
    }

    /// Ordered, short-circuiting admission check: concurrency, then context
    /// length (fatal), then tokens/sec (fatal if the single request alone
    /// exceeds the ceiling, else transient), then RPS.
    fn evaluate(&mut self, estimated_tokens: u64) -> CheckOutcome {
        let limits = self.limits;

        if limits.max_concurrent != 0 && self.window.current_concurrent >= limits.max_concurrent {
            return CheckOutcome::transient(reasons::CAPACITY_TRANSIENT);
        }

        if limits.max_context_length != 0 && estimated_tokens > limits.max_context_length {
            return CheckOutcome::fatal(format!(
                "estimated tokens {} exceed max context length {}",
                estimated_tokens, limits.max_context_length
            ));
        }

        if limits.max_tokens_per_sec != 0 {
            if estimated_tokens > limits.max_tokens_per_sec {
                return CheckOutcome::fatal(format!(
                    "estimated tokens {} exceed max tokens/sec {}",
                    estimated_tokens, limits.max_tokens_per_sec
                ));
            }
            if self.window.window_tokens + estimated_tokens > limits.max_tokens_per_sec {
                return CheckOutcome::transient(reasons::CAPACITY_TRANSIENT);
            }
        }

        if limits.max_rps != 0 && self.window.window_requests + 1 > limits.max_rps {
            return CheckOutcome::transient(reasons::CAPACITY_TRANSIENT);
        }

        self.window.current_concurrent += 1;
        self.window.window_tokens += estimated_tokens;
        self.window.window_requests += 1;
        CheckOutcome::accepted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_within_limits() {
        let guardian = CapacityGuardian::spawn(CapacityLimits::new(1000, 100, 10, 4096));
        let outcome = guardian.check_and_reserve(100).await;
        assert!(outcome.accepted);
        guardian.shutdown();
    }

    #[tokio::test]
    async fn context_length_overflow_is_fatal() {
        let guardian = CapacityGuardian::spawn(CapacityLimits::new(1_000_000, 1000, 100, 4096));
        let outcome = guardian.check_and_reserve(4097).await;
        assert!(!outcome.accepted);
        assert!(outcome.fatal);
        guardian.shutdown();
    }

    #[tokio::test]
    async fn single_request_over_tokens_per_sec_is_fatal() {
        let guardian = CapacityGuardian::spawn(CapacityLimits::new(1000, 1000, 100, 1_000_000));
        let outcome = guardian.check_and_reserve(5000).await;
        assert!(!outcome.accepted);
        assert!(outcome.fatal);
        guardian.shutdown();
    }

    #[tokio::test]
    async fn concurrency_ceiling_rejects_transiently() {
        let guardian = CapacityGuardian::spawn(CapacityLimits::new(1_000_000, 1_000_000, 1, 1_000_000));
        let first = guardian.check_and_reserve(10).await;
        assert!(first.accepted);
        let second = guardian.check_and_reserve(10).await;
        assert!(!second.accepted);
        assert!(!second.fatal);
        assert_eq!(second.reason, reasons::CAPACITY_TRANSIENT);
        guardian.shutdown();
    }

    #[tokio::test]
    async fn release_frees_a_concurrency_slot() {
        let guardian = CapacityGuardian::spawn(CapacityLimits::new(1_000_000, 1_000_000, 1, 1_000_000));
        assert!(guardian.check_and_reserve(10).await.accepted);
        assert!(!guardian.check_and_reserve(10).await.accepted);

        guardian.release(10).await;
        // Give the worker a turn to process the release before re-checking.
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        assert!(guardian.check_and_reserve(10).await.accepted);
        guardian.shutdown();
    }

    #[tokio::test]
    async fn update_limits_takes_effect() {
        let guardian = CapacityGuardian::spawn(CapacityLimits::new(1_000_000, 1_000_000, 1, 1_000_000));
        assert!(guardian.check_and_reserve(10).await.accepted);
        assert!(!guardian.check_and_reserve(10).await.accepted);

        guardian
            .update_limits(PartialCapacityLimits {
                max_concurrent: Some(2),
                ..Default::default()
            })
            .await;
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        assert!(guardian.check_and_reserve(10).await.accepted);
        guardian.shutdown();
    }
}
