//! Schema-contract store traits and an in-memory implementation.
//!
//! A real deployment backs these with a shared SQL store; that store lives
//! outside this crate's scope. These traits exist so the priority resolver,
//! quota manager, and rule engine can be exercised and tested without one,
//! and so a real Postgres/MySQL-backed implementation can be dropped in
//! later without touching any of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::priority::mapping::{PriorityMapping, TenantType};
use crate::quota::types::{AccountQuota, QuotaType, WindowType};
use crate::rules::rule::StoredRule;

/// Audit fields carried by every soft-deletable row.
#[derive(Debug, Clone)]
pub struct AuditFields {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub updated_by: String,
}

impl AuditFields {
    pub fn new(actor: impl Into<String>, now: DateTime<Utc>) -> Self {
        let actor = actor.into();
        Self {
            created_at: now,
            updated_at: now,
            deleted_at: None,
            created_by: actor.clone(),
            updated_by: actor,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// `api_key_priority_mappings` read/write contract.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// All non-deleted rows, any order (callers sort as required, e.g. by
    /// `priority asc, id asc` for the resolver's reload).
    async fn list(&self) -> CoreResult<Vec<PriorityMapping>>;
    async fn create(&self, mapping: PriorityMapping) -> CoreResult<()>;
    async fn update(&self, mapping: PriorityMapping) -> CoreResult<()>;
    /// `UPDATE ... SET deleted_at = now()`, row retained.
    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<()>;
}

/// `account_quotas` read/write contract.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn list(&self) -> CoreResult<Vec<AccountQuota>>;
    async fn create(&self, quota: AccountQuota) -> CoreResult<()>;
    async fn update(&self, quota: AccountQuota) -> CoreResult<()>;
    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<()>;
    /// Batch write-back of `used_value` for every row (the quota manager's
    /// periodic database sync).
    async fn sync_usage(&self, usage: Vec<(Uuid, i64)>) -> CoreResult<()>;
}

/// `time_based_rules` read/write contract.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list(&self) -> CoreResult<Vec<StoredRule>>;
    async fn create(&self, rule: StoredRule) -> CoreResult<()>;
    async fn update(&self, rule: StoredRule) -> CoreResult<()>;
    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<()>;
}

/// In-memory `MappingStore`, keyed by id. Used by tests and the demo binary.
#[derive(Default)]
pub struct InMemoryMappingStore {
    rows: DashMap<Uuid, PriorityMapping>,
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn list(&self) -> CoreResult<Vec<PriorityMapping>> {
        Ok(self
            .rows
            .iter()
            .filter(|entry| !entry.value().audit.is_deleted())
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn create(&self, mapping: PriorityMapping) -> CoreResult<()> {
        self.rows.insert(mapping.id, mapping);
        Ok(())
    }

    async fn update(&self, mapping: PriorityMapping) -> CoreResult<()> {
        self.rows.insert(mapping.id, mapping);
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<()> {
        if let Some(mut row) = self.rows.get_mut(&id) {
            row.audit.deleted_at = Some(now);
            row.audit.updated_at = now;
        }
        Ok(())
    }
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/demo helper: seed a mapping directly.
    pub fn seed(
        &self,
        pattern: impl Into<String>,
        match_type: crate::priority::mapping::MatchType,
        priority: PriorityClassSeed,
        tenant_id: Uuid,
        tenant_name: impl Into<String>,
        tenant_type: TenantType,
        now: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let mapping = PriorityMapping {
            id,
            pattern: pattern.into(),
            match_type,
            priority: priority.0,
            tenant_id,
            tenant_name: tenant_name.into(),
            tenant_type,
            enabled: true,
            audit: AuditFields::new("seed", now),
        };
        self.rows.insert(id, mapping);
        id
    }
}

/// Newtype to keep `seed`'s argument order self-documenting.
pub struct PriorityClassSeed(pub u8);

/// In-memory `QuotaStore`.
#[derive(Default)]
pub struct InMemoryQuotaStore {
    rows: DashMap<Uuid, AccountQuota>,
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn list(&self) -> CoreResult<Vec<AccountQuota>> {
        Ok(self
            .rows
            .iter()
            .filter(|entry| !entry.value().audit.is_deleted())
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn create(&self, quota: AccountQuota) -> CoreResult<()> {
        self.rows.insert(quota.id, quota);
        Ok(())
    }

    async fn update(&self, quota: AccountQuota) -> CoreResult<()> {
        self.rows.insert(quota.id, quota);
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<()> {
        if let Some(mut row) = self.rows.get_mut(&id) {
            row.audit.deleted_at = Some(now);
            row.audit.updated_at = now;
        }
        Ok(())
    }

    async fn sync_usage(&self, usage: Vec<(Uuid, i64)>) -> CoreResult<()> {
        for (id, used) in usage {
            if let Some(mut row) = self.rows.get_mut(&id) {
                row.used_value = used;
            }
        }
        Ok(())
    }
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn seed(
        &self,
        account_id: impl Into<String>,
        quota_type: QuotaType,
        limit_dimension: impl Into<String>,
        limit_value: i64,
        used_value: i64,
        window_type: WindowType,
        now: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let quota = AccountQuota {
            id,
            account_id: account_id.into(),
            team_id: None,
            environment: None,
            quota_type,
            limit_dimension: limit_dimension.into(),
            limit_value,
            allow_borrow: false,
            max_borrow_pct: 0,
            window_type,
            window_start: now,
            window_end: None,
            used_value,
            alert_at_pct: 0.8,
            enabled: true,
            alert_triggered: false,
            last_alert_at: None,
            audit: AuditFields::new("seed", now),
        };
        self.rows.insert(id, quota);
        id
    }
}

/// In-memory `RuleStore`.
#[derive(Default)]
pub struct InMemoryRuleStore {
    rows: DashMap<Uuid, StoredRule>,
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list(&self) -> CoreResult<Vec<StoredRule>> {
        Ok(self
            .rows
            .iter()
            .filter(|entry| !entry.value().audit.is_deleted())
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn create(&self, rule: StoredRule) -> CoreResult<()> {
        self.rows.insert(rule.id, rule);
        Ok(())
    }

    async fn update(&self, rule: StoredRule) -> CoreResult<()> {
        self.rows.insert(rule.id, rule);
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<()> {
        if let Some(mut row) = self.rows.get_mut(&id) {
            row.audit.deleted_at = Some(now);
            row.audit.updated_at = now;
        }
        Ok(())
    }
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}
