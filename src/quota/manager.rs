//! C3: Quota Manager.
//!
//! Per-account quota check/reserve across multiple dimensions and windows,
//! shadowed by in-memory, rule-driven overrides. State lives behind a
//! `parking_lot::RwLock` rather than a channel actor: contention here is
//! per-account, not a single shared counter, so lock-free fan-out buys more
//! than funneling every caller through one owning task would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capacity::limits::CapacityWindow;
use crate::clock::SharedClock;
use crate::error::CoreResult;
use crate::quota::types::{AccountQuota, QuotaCheckResult, QuotaType};
use crate::request::reasons;
use crate::store::QuotaStore;

/// A time-rule-installed override for accounts matching `account_pattern`
/// (exact, or a trailing-`*` prefix wildcard).
#[derive(Debug, Clone, Default)]
pub struct QuotaAdjustment {
    pub account_pattern: String,
    pub max_concurrent: Option<u64>,
    pub max_rps: Option<u64>,
    pub max_tokens_per_sec: Option<u64>,
}

impl QuotaAdjustment {
    fn matches(&self, account_id: &str) -> bool {
        match self.account_pattern.strip_suffix('*') {
            Some(prefix) => account_id.starts_with(prefix),
            None => self.account_pattern == account_id,
        }
    }

    fn is_active(&self) -> bool {
        self.max_concurrent.is_some() || self.max_rps.is_some() || self.max_tokens_per_sec.is_some()
    }
}

/// Tunables for the manager.
#[derive(Debug, Clone, Copy)]
pub struct QuotaManagerConfig {
    pub enabled: bool,
    pub alert_cooldown: chrono::Duration,
    pub sync_interval: StdDuration,
}

impl Default for QuotaManagerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alert_cooldown: chrono::Duration::hours(1),
            sync_interval: StdDuration::from_secs(60),
        }
    }
}

/// C3: per-account quota enforcement with time-based overrides.
pub struct QuotaManager {
    store: Arc<dyn QuotaStore>,
    clock: SharedClock,
    config: RwLock<QuotaManagerConfig>,
    quotas: RwLock<HashMap<Uuid, AccountQuota>>,
    overrides: DashMap<String, (QuotaAdjustment, CapacityWindow)>,
    alert_cb: RwLock<Option<Arc<dyn Fn(&AccountQuota) + Send + Sync>>>,
    shutdown: CancellationToken,
    sync_running: AtomicBool,
}

impl QuotaManager {
    pub fn new(store: Arc<dyn QuotaStore>, clock: SharedClock, config: QuotaManagerConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            clock,
            config: RwLock::new(config),
            quotas: RwLock::new(HashMap::new()),
            overrides: DashMap::new(),
            alert_cb: RwLock::new(None),
            shutdown: CancellationToken::new(),
            sync_running: AtomicBool::new(false),
        })
    }

    /// Install a callback invoked when a quota crosses `alertAtPct`.
    pub fn set_alert_callback(&self, cb: Arc<dyn Fn(&AccountQuota) + Send + Sync>) {
        *self.alert_cb.write() = Some(cb);
    }

    /// `Reload`: rebuild the in-memory quota map from the store, filtering
    /// soft-deleted and disabled rows.
    pub async fn reload(&self) -> CoreResult<()> {
        let rows = self.store.list().await?;
        let mut map = HashMap::new();
        for quota in rows {
            if quota.enabled && !quota.audit.is_deleted() {
                map.insert(quota.id, quota);
            }
        }
        *self.quotas.write() = map;
        Ok(())
    }

    /// `ApplyAdjustments`: install the currently active override set,
    /// resetting every override window. `None` entries clear all overrides.
    pub fn apply_adjustments(&self, adjustments: Vec<QuotaAdjustment>) {
        self.overrides.clear();
        let now = Instant::now();
        for adj in adjustments {
            if adj.is_active() {
                let key = adj.account_pattern.clone();
                self.overrides.insert(key, (adj, CapacityWindow::new(now)));
            }
        }
    }

    /// `CheckAndReserve`: evaluate overrides first, then every applicable
    /// persistent quota, in scope order. Rolls back override increments if a
    /// later persistent-quota check rejects.
    pub async fn check_and_reserve(
        &self,
        account_id: &str,
        team_id: Option<&str>,
        environment: Option<&str>,
        estimated_tokens: u64,
    ) -> QuotaCheckResult {
        if !self.config.read().enabled {
            return QuotaCheckResult::allowed(Vec::new());
        }

        let override_key = self.reserve_override(account_id, estimated_tokens);
        let override_key = match override_key {
            Ok(key) => key,
            Err(code) => return QuotaCheckResult::rejected(code),
        };

        let now = self.clock.now();
        let mut reserved_ids = Vec::new();
        {
            let mut quotas = self.quotas.write();
            let mut touched: Vec<Uuid> = Vec::new();
            let mut rejection: Option<&'static str> = None;

            for quota in quotas.values() {
                if !quota.matches_scope(account_id, team_id, environment) {
                    continue;
                }
                let ratio = quota.projected_ratio(estimated_tokens as i64);
                match quota.quota_type {
                    QuotaType::Soft => {
                        if ratio > 1.2 {
                            rejection = Some(reasons::SOFT_LIMIT_EXCEEDED);
                            break;
                        }
                        if ratio > 1.0 {
                            tracing::warn!(account_id, used_ratio = ratio, "soft quota exceeded");
                        }
                    }
                    QuotaType::Hard | QuotaType::Reserved | QuotaType::Burstable => {
                        if ratio > 1.0 {
                            rejection = Some(reasons::HARD_LIMIT);
                            break;
                        }
                    }
                }
                touched.push(quota.id);
            }

            if let Some(code) = rejection {
                if let Some(key) = override_key {
                    self.release_override(&key);
                }
                return QuotaCheckResult::rejected(code);
            }

            for id in &touched {
                if let Some(quota) = quotas.get_mut(id) {
                    quota.used_value += estimated_tokens as i64;
                    reserved_ids.push(*id);
                    self.maybe_alert(quota, now);
                }
            }
        }

        QuotaCheckResult::allowed(reserved_ids)
    }

    fn reserve_override(&self, account_id: &str, estimated_tokens: u64) -> Result<Option<String>, &'static str> {
        let Some(key) = self
            .overrides
            .iter()
            .find(|e| e.value().0.matches(account_id))
            .map(|e| e.key().clone())
        else {
            return Ok(None);
        };
        let mut guard = self.overrides.get_mut(&key).expect("key just observed present");
        let (adjustment, window) = guard.value_mut();
        window.maybe_roll(Instant::now());

        if let Some(max_concurrent) = adjustment.max_concurrent {
            if window.current_concurrent >= max_concurrent {
                return Err(reasons::OVERRIDE_LIMIT);
            }
        }
        if let Some(max_tokens) = adjustment.max_tokens_per_sec {
            if window.window_tokens + estimated_tokens > max_tokens {
                return Err(reasons::OVERRIDE_LIMIT);
            }
        }
        if let Some(max_rps) = adjustment.max_rps {
            if window.window_requests + 1 > max_rps {
                return Err(reasons::OVERRIDE_LIMIT);
            }
        }

        window.current_concurrent += 1;
        window.window_tokens += estimated_tokens;
        window.window_requests += 1;
        drop(guard);
        Ok(Some(key))
    }

    fn release_override(&self, key: &str) {
        if let Some(mut entry) = self.overrides.get_mut(key) {
            entry.value_mut().1.current_concurrent = entry.value().1.current_concurrent.saturating_sub(1);
        }
    }

    /// `Release`: give back a concurrency slot held against an override.
    pub fn release(&self, account_id: &str) {
        if let Some(key) = self
            .overrides
            .iter()
            .find(|e| e.value().0.matches(account_id))
            .map(|e| e.key().clone())
        {
            self.release_override(&key);
        }
    }

    /// `CommitUsage`: true-up in-memory usage once the actual token cost is
    /// known, by `actualTokens - estimatedTokens`.
    pub fn commit_usage(&self, reserved_quota_ids: &[Uuid], actual_tokens: u64, estimated_tokens: u64) {
        let delta = actual_tokens as i64 - estimated_tokens as i64;
        if delta == 0 {
            return;
        }
        let mut quotas = self.quotas.write();
        for id in reserved_quota_ids {
            if let Some(quota) = quotas.get_mut(id) {
                quota.used_value = (quota.used_value + delta).max(0);
            }
        }
    }

    fn maybe_alert(&self, quota: &mut AccountQuota, now: DateTime<Utc>) {
        if quota.limit_value <= 0 {
            return;
        }
        let ratio = quota.used_value as f64 / quota.limit_value as f64;
        if ratio < quota.alert_at_pct {
            return;
        }
        let cooldown = self.config.read().alert_cooldown;
        if let Some(last) = quota.last_alert_at {
            if now - last < cooldown {
                return;
            }
        }
        quota.alert_triggered = true;
        quota.last_alert_at = Some(now);
        if let Some(cb) = self.alert_cb.read().as_ref() {
            cb(quota);
        }
    }

    /// `SyncToDatabase`: batch write-back of `used_value` for every quota.
    pub async fn sync_to_database(&self) -> CoreResult<()> {
        let usage: Vec<(Uuid, i64)> = self
            .quotas
            .read()
            .values()
            .map(|q| (q.id, q.used_value))
            .collect();
        self.store.sync_usage(usage).await
    }

    /// Spawn the periodic sync loop. A final sync runs on shutdown.
    pub fn spawn_sync_loop(self: &Arc<Self>) {
        if self.sync_running.swap(true, Ordering::AcqRel) {
            return;
        }
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let interval = manager.config.read().sync_interval;
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(err) = manager.sync_to_database().await {
                            tracing::warn!(error = %err, "quota sync failed");
                        }
                    }
                    _ = manager.shutdown.cancelled() => {
                        if let Err(err) = manager.sync_to_database().await {
                            tracing::warn!(error = %err, "final quota sync failed");
                        }
                        break;
                    }
                }
            }
        });
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryQuotaStore;
    use crate::quota::types::WindowType;

    fn manager(store: Arc<InMemoryQuotaStore>) -> Arc<QuotaManager> {
        QuotaManager::new(store, crate::clock::system(), QuotaManagerConfig::default())
    }

    #[tokio::test]
    async fn hard_quota_rejects_over_limit() {
        let store = Arc::new(InMemoryQuotaStore::new());
        store.seed(
            "dept-a",
            QuotaType::Hard,
            "tokens_per_month",
            1000,
            950,
            WindowType::Monthly,
            Utc::now(),
        );
        let mgr = manager(store);
        mgr.reload().await.unwrap();

        let result = mgr.check_and_reserve("dept-a", None, None, 100).await;
        assert!(!result.allowed);
        assert_eq!(result.rejection_code, reasons::HARD_LIMIT);
    }

    #[tokio::test]
    async fn soft_quota_allows_until_120_percent() {
        let store = Arc::new(InMemoryQuotaStore::new());
        store.seed(
            "dept-b",
            QuotaType::Soft,
            "tokens_per_month",
            1000,
            1000,
            WindowType::Monthly,
            Utc::now(),
        );
        let mgr = manager(store);
        mgr.reload().await.unwrap();

        let result = mgr.check_and_reserve("dept-b", None, None, 150).await;
        assert!(result.allowed);

        let result = mgr.check_and_reserve("dept-b", None, None, 100).await;
        assert!(!result.allowed);
        assert_eq!(result.rejection_code, reasons::SOFT_LIMIT_EXCEEDED);
    }

    #[tokio::test]
    async fn disabled_manager_always_allows() {
        let store = Arc::new(InMemoryQuotaStore::new());
        store.seed(
            "dept-c",
            QuotaType::Hard,
            "tokens_per_month",
            10,
            10,
            WindowType::Monthly,
            Utc::now(),
        );
        let mgr = QuotaManager::new(
            store,
            crate::clock::system(),
            QuotaManagerConfig {
                enabled: false,
                ..QuotaManagerConfig::default()
            },
        );
        mgr.reload().await.unwrap();
        let result = mgr.check_and_reserve("dept-c", None, None, 1000).await;
        assert!(result.allowed);
    }

    #[tokio::test]
    async fn override_limit_rejects_before_persistent_quota() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let mgr = manager(store);
        mgr.reload().await.unwrap();
        mgr.apply_adjustments(vec![QuotaAdjustment {
            account_pattern: "dept-*".to_string(),
            max_concurrent: Some(1),
            max_rps: None,
            max_tokens_per_sec: None,
        }]);

        let first = mgr.check_and_reserve("dept-z", None, None, 10).await;
        assert!(first.allowed);
        let second = mgr.check_and_reserve("dept-z", None, None, 10).await;
        assert!(!second.allowed);
        assert_eq!(second.rejection_code, reasons::OVERRIDE_LIMIT);
    }
}
