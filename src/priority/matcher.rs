//! Compiled, allocation-free matchers for the hot resolve path.
//!
//! Per the design notes, "compiled matchers must be embedded in the slice
//! entries so hot-path resolution performs no allocation" — a `CompiledEntry`
//! is built once at reload time and never recompiled on the read path.

use regex::Regex;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::priority::mapping::{MatchType, PriorityMapping, TenantType};
use crate::request::PriorityClass;

/// The strategy used to test a key, with any pattern decoration
/// (leading/trailing `*`) stripped at compile time.
enum CompiledMatcher {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
    Regex(Regex),
}

impl CompiledMatcher {
    fn compile(pattern: &str, match_type: MatchType) -> CoreResult<Self> {
        Ok(match match_type {
            MatchType::Exact => CompiledMatcher::Exact(pattern.to_string()),
            MatchType::Prefix => {
                CompiledMatcher::Prefix(pattern.strip_suffix('*').unwrap_or(pattern).to_string())
            }
            MatchType::Suffix => {
                CompiledMatcher::Suffix(pattern.strip_prefix('*').unwrap_or(pattern).to_string())
            }
            MatchType::Contains => {
                let without_prefix = pattern.strip_prefix('*').unwrap_or(pattern);
                let stripped = without_prefix.strip_suffix('*').unwrap_or(without_prefix);
                CompiledMatcher::Contains(stripped.to_string())
            }
            MatchType::Regex => {
                let re = Regex::new(pattern).map_err(|source| CoreError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
                CompiledMatcher::Regex(re)
            }
        })
    }

    fn matches(&self, key: &str) -> bool {
        match self {
            CompiledMatcher::Exact(p) => key == p,
            CompiledMatcher::Prefix(p) => key.starts_with(p.as_str()),
            CompiledMatcher::Suffix(p) => key.ends_with(p.as_str()),
            CompiledMatcher::Contains(p) => key.contains(p.as_str()),
            CompiledMatcher::Regex(re) => re.is_match(key),
        }
    }
}

/// A `PriorityMapping` with its matcher pre-compiled, ready for the hot path.
pub struct CompiledEntry {
    pub id: Uuid,
    pub priority: PriorityClass,
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub tenant_type: TenantType,
    matcher: CompiledMatcher,
}

impl CompiledEntry {
    /// Compile `mapping`, or `None` with a caller-logged warning if the
    /// pattern is invalid (the only match type whose compilation can fail).
    pub fn try_from_mapping(mapping: &PriorityMapping) -> Option<Self> {
        match CompiledMatcher::compile(&mapping.pattern, mapping.match_type) {
            Ok(matcher) => Some(Self {
                id: mapping.id,
                priority: mapping.priority,
                tenant_id: mapping.tenant_id,
                tenant_name: mapping.tenant_name.clone(),
                tenant_type: mapping.tenant_type,
                matcher,
            }),
            Err(err) => {
                tracing::warn!(
                    mapping_id = %mapping.id,
                    pattern = %mapping.pattern,
                    error = %err,
                    "skipping mapping with invalid pattern at reload"
                );
                None
            }
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        self.matcher.matches(key)
    }
}
