//! `PriorityMapping` row type and its match-type vocabulary.

use uuid::Uuid;

use crate::request::PriorityClass;
use crate::store::AuditFields;

/// How `pattern` is tested against an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchType {
    Exact,
    Prefix,
    Suffix,
    Contains,
    Regex,
}

/// Whether a tenant is first-party or an external customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantType {
    Internal,
    External,
}

/// A single `api_key_priority_mappings` row.
#[derive(Debug, Clone)]
pub struct PriorityMapping {
    pub id: Uuid,
    pub pattern: String,
    pub match_type: MatchType,
    pub priority: PriorityClass,
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub tenant_type: TenantType,
    pub enabled: bool,
    pub audit: AuditFields,
}
