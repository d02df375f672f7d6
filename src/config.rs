//! Ambient configuration.
//!
//! A typed struct, loaded from TOML for local/test bootstrapping, with an
//! environment-variable overlay for production deploys. This covers
//! scheduler defaults and feature toggles; `[time_rules]`/`[rule.*]` are
//! core rule-engine configuration and are parsed separately by
//! `rules::ini`, not by this module.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::scheduler::DispatchPolicy;

/// Scheduler-wide defaults mirrored from the INI surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerDefaults {
    pub num_priority_levels: u8,
    pub default_priority: u8,
    pub max_queue_depth: usize,
    pub queue_timeout_sec: u64,
    pub weights: Vec<u64>,
    pub policy: String,
    pub max_tokens_per_sec: u64,
    pub max_rps: u64,
    pub max_concurrent: u64,
    pub max_context_length: u64,
}

impl Default for SchedulerDefaults {
    fn default() -> Self {
        Self {
            num_priority_levels: 10,
            default_priority: 5,
            max_queue_depth: 1000,
            queue_timeout_sec: 30,
            weights: crate::scheduler::default_weights(10),
            policy: "hybrid".to_string(),
            max_tokens_per_sec: 0,
            max_rps: 0,
            max_concurrent: 0,
            max_context_length: 0,
        }
    }
}

impl SchedulerDefaults {
    pub fn dispatch_policy(&self) -> CoreResult<DispatchPolicy> {
        match self.policy.as_str() {
            "strict" => Ok(DispatchPolicy::Strict),
            "wfq" => Ok(DispatchPolicy::Wfq),
            "hybrid" => Ok(DispatchPolicy::Hybrid),
            other => Err(crate::error::CoreError::Config(format!(
                "unknown dispatch policy {other:?}"
            ))),
        }
    }
}

/// Feature toggles mirrored from the INI surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureToggles {
    pub api_key_priority_enabled: bool,
    pub account_quota_enabled: bool,
    pub time_rules_enabled: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            api_key_priority_enabled: true,
            account_quota_enabled: true,
            time_rules_enabled: true,
        }
    }
}

/// Top-level typed configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerDefaults,
    #[serde(default)]
    pub features: FeatureToggles,
    /// Path to the `[time_rules]`/`[rule.*]` INI file consumed by C5, if any.
    pub rules_file: Option<String>,
}

impl AppConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config.with_env_overlay())
    }

    /// Apply same-named environment-variable overrides, upper-snake-cased
    /// and prefixed `ADMISSION_CORE_`.
    pub fn with_env_overlay(mut self) -> Self {
        if let Ok(v) = std::env::var("ADMISSION_CORE_NUM_PRIORITY_LEVELS") {
            if let Ok(v) = v.parse() {
                self.scheduler.num_priority_levels = v;
            }
        }
        if let Ok(v) = std::env::var("ADMISSION_CORE_DEFAULT_PRIORITY") {
            if let Ok(v) = v.parse() {
                self.scheduler.default_priority = v;
            }
        }
        if let Ok(v) = std::env::var("ADMISSION_CORE_MAX_QUEUE_DEPTH") {
            if let Ok(v) = v.parse() {
                self.scheduler.max_queue_depth = v;
            }
        }
        if let Ok(v) = std::env::var("ADMISSION_CORE_POLICY") {
            self.scheduler.policy = v;
        }
        if let Ok(v) = std::env::var("ADMISSION_CORE_TIME_RULES_ENABLED") {
            if let Ok(v) = v.parse() {
                self.features.time_rules_enabled = v;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_parses() {
        let defaults = SchedulerDefaults::default();
        assert_eq!(defaults.dispatch_policy().unwrap(), DispatchPolicy::Hybrid);
    }

    #[test]
    fn toml_round_trip_parses_minimal_config() {
        let toml_src = r#"
            rules_file = "rules.ini"

            [scheduler]
            num_priority_levels = 10
            default_priority = 5
            max_queue_depth = 500
            queue_timeout_sec = 30
            weights = [256,128,64,32,16,8,4,2,1,1]
            policy = "wfq"
            max_tokens_per_sec = 0
            max_rps = 0
            max_concurrent = 0
            max_context_length = 0

            [features]
            api_key_priority_enabled = true
            account_quota_enabled = true
            time_rules_enabled = false
        "#;
        let config: AppConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.scheduler.policy, "wfq");
        assert!(!config.features.time_rules_enabled);
    }
}
