//! `Rule` variants and their persisted form.

use uuid::Uuid;

use crate::rules::time_window::TimeWindow;
use crate::store::AuditFields;

/// One `quota.<pattern>` entry inside a `QuotaAdjustment` rule.
#[derive(Debug, Clone, Default)]
pub struct QuotaAdjustmentSpec {
    pub account_pattern: String,
    pub max_concurrent: Option<u64>,
    pub max_rps: Option<u64>,
    pub max_tokens_per_sec: Option<u64>,
}

/// The type-specific payload of a rule.
#[derive(Debug, Clone)]
pub enum RuleKind {
    WeightAdjustment { weights: Vec<u64> },
    QuotaAdjustment { adjustments: Vec<QuotaAdjustmentSpec> },
    CapacityAdjustment {
        max_concurrent: Option<u64>,
        max_rps: Option<u64>,
        max_tokens_per_sec: Option<u64>,
    },
}

/// A `time_based_rules` row.
#[derive(Debug, Clone)]
pub struct StoredRule {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub window: TimeWindow,
    pub kind: RuleKind,
    pub audit: AuditFields,
}

impl StoredRule {
    pub fn is_live(&self) -> bool {
        self.enabled && !self.audit.is_deleted()
    }
}
