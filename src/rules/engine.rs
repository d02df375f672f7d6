//! C5: Rule Engine.
//!
//! Periodically evaluates time windows and mutates C2/C3/C4 parameters
//! through narrow interfaces, per the design note that C5 must never depend
//! back on a concrete scheduler type (`SchedulerHandle` is the seam).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration as StdDuration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capacity::limits::{CapacityLimits, PartialCapacityLimits};
use crate::clock::SharedClock;
use crate::error::CoreResult;
use crate::quota::manager::{QuotaAdjustment, QuotaManager};
use crate::rules::ini;
use crate::rules::rule::{RuleKind, StoredRule};
use crate::rules::time_window::TimeWindow;
use crate::store::AuditFields;

/// Narrow interface C5 needs from C4, so the rule engine never depends on a
/// concrete scheduler type (design note 9).
#[async_trait]
pub trait SchedulerHandle: Send + Sync {
    async fn current_weights(&self) -> Vec<u64>;
    async fn update_weights(&self, weights: Vec<u64>);
    async fn current_capacity(&self) -> CapacityLimits;
    async fn update_capacity(&self, partial: PartialCapacityLimits);
}

/// C5: evaluates active time windows and pushes the resulting weights,
/// capacity, and quota overrides to its attached collaborators.
pub struct RuleEngine {
    clock: SharedClock,
    enabled: RwLock<bool>,
    rules: RwLock<Vec<StoredRule>>,
    active_rules: DashMap<Uuid, DateTime<Utc>>,
    scheduler: RwLock<Option<Arc<dyn SchedulerHandle>>>,
    quota_manager: RwLock<Option<Arc<QuotaManager>>>,
    baseline_weights: RwLock<Option<Vec<u64>>>,
    baseline_capacity: RwLock<Option<CapacityLimits>>,
    check_interval: RwLock<StdDuration>,
    config_file_path: RwLock<Option<PathBuf>>,
    file_check_interval: RwLock<StdDuration>,
    last_file_mtime: RwLock<Option<SystemTime>>,
    shutdown: CancellationToken,
}

impl RuleEngine {
    pub fn new(clock: SharedClock) -> Arc<Self> {
        Arc::new(Self {
            clock,
            enabled: RwLock::new(true),
            rules: RwLock::new(Vec::new()),
            active_rules: DashMap::new(),
            scheduler: RwLock::new(None),
            quota_manager: RwLock::new(None),
            baseline_weights: RwLock::new(None),
            baseline_capacity: RwLock::new(None),
            check_interval: RwLock::new(StdDuration::from_secs(30)),
            config_file_path: RwLock::new(None),
            file_check_interval: RwLock::new(StdDuration::from_secs(0)),
            last_file_mtime: RwLock::new(None),
            shutdown: CancellationToken::new(),
        })
    }

    /// Whether the rule engine is currently enabled (from the `enabled` key
    /// of `[time_rules]` in the most recently loaded config file, `true` by
    /// default).
    pub fn is_enabled(&self) -> bool {
        *self.enabled.read()
    }

    /// Attach the scheduler handle, snapshotting weight/capacity baselines.
    pub async fn attach_scheduler(&self, scheduler: Arc<dyn SchedulerHandle>) {
        *self.baseline_weights.write() = Some(scheduler.current_weights().await);
        *self.baseline_capacity.write() = Some(scheduler.current_capacity().await);
        *self.scheduler.write() = Some(scheduler);
    }

    pub fn attach_quota_manager(&self, quota_manager: Arc<QuotaManager>) {
        *self.quota_manager.write() = Some(quota_manager);
    }

    pub fn add_weight_rule(&self, name: impl Into<String>, description: impl Into<String>, window: TimeWindow, weights: Vec<u64>) {
        self.push_rule(name, description, window, RuleKind::WeightAdjustment { weights });
    }

    pub fn add_capacity_rule(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        window: TimeWindow,
        max_concurrent: Option<u64>,
        max_rps: Option<u64>,
        max_tokens_per_sec: Option<u64>,
    ) {
        self.push_rule(
            name,
            description,
            window,
            RuleKind::CapacityAdjustment {
                max_concurrent,
                max_rps,
                max_tokens_per_sec,
            },
        );
    }

    pub fn add_quota_rule(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        window: TimeWindow,
        adjustments: Vec<crate::rules::rule::QuotaAdjustmentSpec>,
    ) {
        self.push_rule(name, description, window, RuleKind::QuotaAdjustment { adjustments });
    }

    fn push_rule(&self, name: impl Into<String>, description: impl Into<String>, window: TimeWindow, kind: RuleKind) {
        let now = self.clock.now();
        self.rules.write().push(StoredRule {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            enabled: true,
            window,
            kind,
            audit: AuditFields::new("admin", now),
        });
    }

    pub fn get_all_rules(&self) -> Vec<StoredRule> {
        self.rules.read().clone()
    }

    pub fn get_active_rules(&self) -> Vec<StoredRule> {
        let now = self.clock.now();
        self.rules
            .read()
            .iter()
            .filter(|r| r.is_live() && r.window.is_active(now))
            .cloned()
            .collect()
    }

    pub fn set_config_file_path(&self, path: PathBuf, interval: StdDuration) {
        *self.config_file_path.write() = Some(path);
        *self.file_check_interval.write() = interval;
    }

    /// `ReloadFromFile`: re-parse the INI file; on success atomically swap
    /// rule state, on failure leave all prior state untouched.
    pub fn reload_from_file(&self) -> CoreResult<()> {
        let path = self
            .config_file_path
            .read()
            .clone()
            .ok_or_else(|| crate::error::CoreError::Config("no config file path set".to_string()))?;
        let (file_config, rules) = ini::parse(&path)?;

        // Parse succeeded: install the new state. Nothing was mutated above,
        // so a parse failure is an automatic rollback.
        *self.enabled.write() = file_config.enabled;
        *self.rules.write() = rules;
        *self.check_interval.write() = StdDuration::from_secs(file_config.check_interval_sec.max(1));
        *self.file_check_interval.write() = StdDuration::from_secs(file_config.file_check_interval_sec);
        self.active_rules.clear();
        Ok(())
    }

    /// Evaluate every live rule against `now` and push the resulting state
    /// to the attached scheduler/quota manager. A no-op while disabled.
    pub async fn apply_rules_now(&self) {
        if !self.is_enabled() {
            return;
        }
        let now = self.clock.now();
        let rules = self.rules.read().clone();
        let active: Vec<&StoredRule> = rules.iter().filter(|r| r.is_live() && r.window.is_active(now)).collect();

        if let Some(scheduler) = self.scheduler.read().clone() {
            self.apply_weight_rules(&scheduler, &active).await;
            self.apply_capacity_rules(&scheduler, &active).await;
        }

        if let Some(quota_manager) = self.quota_manager.read().clone() {
            self.apply_quota_rules(&quota_manager, &active);
        }

        for rule in &active {
            self.active_rules.insert(rule.id, now);
        }
    }

    async fn apply_weight_rules(&self, scheduler: &Arc<dyn SchedulerHandle>, active: &[&StoredRule]) {
        let weight_rules: Vec<&&StoredRule> = active
            .iter()
            .filter(|r| matches!(r.kind, RuleKind::WeightAdjustment { .. }))
            .collect();

        if self.baseline_weights.read().is_none() {
            *self.baseline_weights.write() = Some(scheduler.current_weights().await);
        }

        // No active rule: revert to baseline rather than re-snapshotting the
        // current (possibly rule-driven) value as the new baseline — that
        // would make a just-deactivated rule's weights "stick" forever.
        // `refresh_baseline_weights` exists for the operator-initiated case.
        let mut target = self.baseline_weights.read().clone().unwrap_or_default();
        for rule in weight_rules {
            if let RuleKind::WeightAdjustment { weights } = &rule.kind {
                target = weights.clone();
            }
        }
        if target != scheduler.current_weights().await {
            scheduler.update_weights(target).await;
        }
    }

    /// Snapshot the scheduler's current weights as the new baseline. Call
    /// this after an operator-initiated `UpdateWeights` made while no weight
    /// rule is active, to preserve that intent across future evaluations.
    pub async fn refresh_baseline_weights(&self) {
        if let Some(scheduler) = self.scheduler.read().clone() {
            *self.baseline_weights.write() = Some(scheduler.current_weights().await);
        }
    }

    /// Snapshot the scheduler's current capacity as the new baseline; the
    /// capacity analogue of `refresh_baseline_weights`.
    pub async fn refresh_baseline_capacity(&self) {
        if let Some(scheduler) = self.scheduler.read().clone() {
            *self.baseline_capacity.write() = Some(scheduler.current_capacity().await);
        }
    }

    async fn apply_capacity_rules(&self, scheduler: &Arc<dyn SchedulerHandle>, active: &[&StoredRule]) {
        let capacity_rules: Vec<&&StoredRule> = active
            .iter()
            .filter(|r| matches!(r.kind, RuleKind::CapacityAdjustment { .. }))
            .collect();

        if self.baseline_capacity.read().is_none() {
            *self.baseline_capacity.write() = Some(scheduler.current_capacity().await);
        }

        // No active rule: revert to baseline rather than re-snapshotting the
        // current (possibly rule-driven) value as the new baseline — mirrors
        // `apply_weight_rules`.
        let mut target = self.baseline_capacity.read().unwrap_or_default();
        for rule in capacity_rules {
            if let RuleKind::CapacityAdjustment {
                max_concurrent,
                max_rps,
                max_tokens_per_sec,
            } = &rule.kind
            {
                if let Some(v) = max_concurrent {
                    target.max_concurrent = *v;
                }
                if let Some(v) = max_rps {
                    target.max_rps = *v;
                }
                if let Some(v) = max_tokens_per_sec {
                    target.max_tokens_per_sec = *v;
                }
            }
        }

        let current = scheduler.current_capacity().await;
        if target != current {
            scheduler
                .update_capacity(PartialCapacityLimits {
                    max_tokens_per_sec: Some(target.max_tokens_per_sec),
                    max_rps: Some(target.max_rps),
                    max_concurrent: Some(target.max_concurrent),
                    max_context_length: Some(target.max_context_length),
                })
                .await;
        }
    }

    fn apply_quota_rules(&self, quota_manager: &Arc<QuotaManager>, active: &[&StoredRule]) {
        let mut adjustments = Vec::new();
        for rule in active {
            if let RuleKind::QuotaAdjustment { adjustments: specs } = &rule.kind {
                for spec in specs {
                    adjustments.push(QuotaAdjustment {
                        account_pattern: spec.account_pattern.clone(),
                        max_concurrent: spec.max_concurrent,
                        max_rps: spec.max_rps,
                        max_tokens_per_sec: spec.max_tokens_per_sec,
                    });
                }
            }
        }
        quota_manager.apply_adjustments(adjustments);
    }

    /// Spawn the evaluation loop (and the file-mtime poll loop, if a config
    /// file path has been set with a nonzero interval).
    pub fn start(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.apply_rules_now().await;
            let mut tick = tokio::time::interval(*engine.check_interval.read());
            loop {
                tokio::select! {
                    _ = tick.tick() => engine.apply_rules_now().await,
                    _ = engine.shutdown.cancelled() => break,
                }
            }
        });

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let interval = *engine.file_check_interval.read();
                if interval.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(StdDuration::from_secs(1)) => continue,
                        _ = engine.shutdown.cancelled() => break,
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if engine.file_changed() {
                            if let Err(err) = engine.reload_from_file() {
                                tracing::warn!(error = %err, "rule file reload failed, keeping prior state");
                            } else {
                                engine.apply_rules_now().await;
                            }
                        }
                    }
                    _ = engine.shutdown.cancelled() => break,
                }
            }
        });
    }

    fn file_changed(&self) -> bool {
        let Some(path) = self.config_file_path.read().clone() else {
            return false;
        };
        let Ok(metadata) = std::fs::metadata(&path) else {
            return false;
        };
        let Ok(mtime) = metadata.modified() else {
            return false;
        };
        let mut last = self.last_file_mtime.write();
        let changed = last.map(|prev| prev != mtime).unwrap_or(true);
        *last = Some(mtime);
        changed
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
