//! `AccountQuota` row type and its enums.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::store::AuditFields;

/// Enforcement semantics for a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaType {
    /// Reject at `usedValue > limitValue`.
    Hard,
    /// Warn past `limitValue`, reject past `1.2 * limitValue`.
    Soft,
    /// Treated as `Hard` in this revision.
    Reserved,
    /// `allowBorrow`/`maxBorrowPct` are parsed but not yet enforced — a
    /// documented extension point for a future borrowing implementation.
    Burstable,
}

/// The accounting period a quota's usage is measured over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowType {
    Hourly,
    Daily,
    Monthly,
    Custom,
}

/// A single `account_quotas` row.
#[derive(Debug, Clone)]
pub struct AccountQuota {
    pub id: Uuid,
    pub account_id: String,
    pub team_id: Option<String>,
    pub environment: Option<String>,
    pub quota_type: QuotaType,
    pub limit_dimension: String,
    pub limit_value: i64,
    pub allow_borrow: bool,
    pub max_borrow_pct: u32,
    pub window_type: WindowType,
    pub window_start: DateTime<Utc>,
    pub window_end: Option<DateTime<Utc>>,
    pub used_value: i64,
    pub alert_at_pct: f64,
    pub enabled: bool,
    pub alert_triggered: bool,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub audit: AuditFields,
}

impl AccountQuota {
    /// Does `(account_id, team_id, environment)` match this quota's scope?
    /// `team_id`/`environment` unset on the quota match anything.
    pub fn matches_scope(&self, account_id: &str, team_id: Option<&str>, environment: Option<&str>) -> bool {
        if self.account_id != account_id {
            return false;
        }
        if let Some(quota_team) = &self.team_id {
            if team_id != Some(quota_team.as_str()) {
                return false;
            }
        }
        if let Some(quota_env) = &self.environment {
            if environment != Some(quota_env.as_str()) {
                return false;
            }
        }
        true
    }

    /// Projected usage ratio if `extra` were reserved.
    pub fn projected_ratio(&self, extra: i64) -> f64 {
        if self.limit_value <= 0 {
            return 0.0;
        }
        (self.used_value + extra) as f64 / self.limit_value as f64
    }
}

/// Outcome of the quota manager's `check_and_reserve`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaCheckResult {
    pub allowed: bool,
    /// One of `quota_exceeded`, `hard_limit`, `soft_limit_exceeded`,
    /// `override_limit`, or empty when allowed.
    pub rejection_code: String,
    /// Ids of quotas this reservation was recorded against, for `release`
    /// bookkeeping and `commit_usage` adjustment.
    pub reserved_quota_ids: Vec<Uuid>,
}

impl QuotaCheckResult {
    pub fn allowed(reserved_quota_ids: Vec<Uuid>) -> Self {
        Self {
            allowed: true,
            rejection_code: String::new(),
            reserved_quota_ids,
        }
    }

    pub fn rejected(code: impl Into<String>) -> Self {
        Self {
            allowed: false,
            rejection_code: code.into(),
            reserved_quota_ids: Vec::new(),
        }
    }
}
