//! The `[time_rules]`/`[rule.*]` INI schema parser for the rule engine.
//!
//! This parses exactly the rule-engine sections and nothing else; it is not
//! a general-purpose process-bootstrap config loader.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use chrono::Weekday;
use chrono_tz::Tz;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::rules::rule::{QuotaAdjustmentSpec, RuleKind, StoredRule};
use crate::rules::time_window::TimeWindow;
use crate::store::AuditFields;

/// The `[time_rules]` section.
#[derive(Debug, Clone)]
pub struct TimeRulesFileConfig {
    pub enabled: bool,
    pub check_interval_sec: u64,
    pub default_timezone: Tz,
    pub file_check_interval_sec: u64,
}

impl Default for TimeRulesFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_sec: 30,
            default_timezone: chrono_tz::UTC,
            file_check_interval_sec: 0,
        }
    }
}

/// Parse a rules INI file into its `[time_rules]` config plus every
/// `[rule.<name>]` section.
pub fn parse(path: &Path) -> CoreResult<(TimeRulesFileConfig, Vec<StoredRule>)> {
    let conf = ini::Ini::load_from_file(path)?;
    parse_ini(&conf)
}

/// Parse already-loaded INI content (used by tests to avoid touching disk).
pub fn parse_str(contents: &str) -> CoreResult<(TimeRulesFileConfig, Vec<StoredRule>)> {
    let conf = ini::Ini::load_from_str(contents)?;
    parse_ini(&conf)
}

fn parse_ini(conf: &ini::Ini) -> CoreResult<(TimeRulesFileConfig, Vec<StoredRule>)> {
    let mut file_config = TimeRulesFileConfig::default();
    if let Some(section) = conf.section(Some("time_rules")) {
        if let Some(v) = section.get("enabled") {
            file_config.enabled = parse_bool(v)?;
        }
        if let Some(v) = section.get("check_interval_sec") {
            file_config.check_interval_sec = parse_u64(v)?;
        }
        if let Some(v) = section.get("default_timezone") {
            file_config.default_timezone = parse_tz(v)?;
        }
        if let Some(v) = section.get("file_check_interval_sec") {
            file_config.file_check_interval_sec = parse_u64(v)?;
        }
    }

    let mut rules = Vec::new();
    for (section_name, props) in conf.iter() {
        let Some(section_name) = section_name else { continue };
        let Some(rule_name) = section_name.strip_prefix("rule.") else {
            continue;
        };

        let rule_type = props
            .get("type")
            .ok_or_else(|| CoreError::Config(format!("rule.{rule_name}: missing type")))?;
        let name = props.get("name").unwrap_or(rule_name).to_string();
        let description = props.get("description").unwrap_or_default().to_string();
        let enabled = props.get("enabled").map(parse_bool).transpose()?.unwrap_or(true);

        let start = props
            .get("start_time")
            .ok_or_else(|| CoreError::Config(format!("rule.{rule_name}: missing start_time")))?;
        let end = props
            .get("end_time")
            .ok_or_else(|| CoreError::Config(format!("rule.{rule_name}: missing end_time")))?;
        let (start_hour, start_minute) = parse_hhmm(start)?;
        let (end_hour, end_minute) = parse_hhmm(end)?;

        let days_of_week = match props.get("days_of_week") {
            Some(v) => parse_days(v)?,
            None => HashSet::from([
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ]),
        };
        let timezone = match props.get("timezone") {
            Some(v) => parse_tz(v)?,
            None => file_config.default_timezone,
        };
        let window = TimeWindow::new(start_hour, start_minute, end_hour, end_minute, days_of_week, timezone);

        let kind = match rule_type {
            "weight_adjustment" => {
                let weights = props
                    .get("weights")
                    .ok_or_else(|| CoreError::Config(format!("rule.{rule_name}: missing weights")))?;
                let weights = weights
                    .split(',')
                    .map(|w| w.trim().parse::<u64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| CoreError::Config(format!("rule.{rule_name}: bad weights: {e}")))?;
                RuleKind::WeightAdjustment { weights }
            }
            "capacity_adjustment" => RuleKind::CapacityAdjustment {
                max_concurrent: props.get("max_concurrent").map(parse_u64).transpose()?,
                max_rps: props.get("max_rps").map(parse_u64).transpose()?,
                max_tokens_per_sec: props.get("max_tokens_per_sec").map(parse_u64).transpose()?,
            },
            "quota_adjustment" => {
                let mut adjustments = Vec::new();
                for (key, value) in props.iter() {
                    let Some(pattern) = key.strip_prefix("quota.") else {
                        continue;
                    };
                    adjustments.push(parse_quota_spec(pattern, value)?);
                }
                RuleKind::QuotaAdjustment { adjustments }
            }
            other => {
                return Err(CoreError::Config(format!(
                    "rule.{rule_name}: unknown type {other:?}"
                )))
            }
        };

        rules.push(StoredRule {
            id: Uuid::new_v4(),
            name,
            description,
            enabled,
            window,
            kind,
            audit: AuditFields::new("ini", chrono::Utc::now()),
        });
    }

    Ok((file_config, rules))
}

fn parse_quota_spec(pattern: &str, value: &str) -> CoreResult<QuotaAdjustmentSpec> {
    let mut spec = QuotaAdjustmentSpec {
        account_pattern: pattern.to_string(),
        ..Default::default()
    };
    for entry in value.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (dim, val) = entry
            .split_once(':')
            .ok_or_else(|| CoreError::Config(format!("quota.{pattern}: malformed entry {entry:?}")))?;
        let val = parse_u64(val.trim())?;
        match dim.trim() {
            "concurrent" => spec.max_concurrent = Some(val),
            "rps" => spec.max_rps = Some(val),
            "tokens_per_sec" => spec.max_tokens_per_sec = Some(val),
            other => return Err(CoreError::Config(format!("quota.{pattern}: unknown dimension {other:?}"))),
        }
    }
    Ok(spec)
}

fn parse_bool(v: &str) -> CoreResult<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(CoreError::Config(format!("invalid boolean {other:?}"))),
    }
}

fn parse_u64(v: &str) -> CoreResult<u64> {
    v.trim()
        .parse::<u64>()
        .map_err(|e| CoreError::Config(format!("invalid integer {v:?}: {e}")))
}

fn parse_tz(v: &str) -> CoreResult<Tz> {
    Tz::from_str(v.trim()).map_err(|e| CoreError::Config(format!("invalid timezone {v:?}: {e}")))
}

fn parse_hhmm(v: &str) -> CoreResult<(u32, u32)> {
    let (h, m) = v
        .trim()
        .split_once(':')
        .ok_or_else(|| CoreError::Config(format!("invalid HH:MM value {v:?}")))?;
    let hour = h
        .parse::<u32>()
        .map_err(|e| CoreError::Config(format!("invalid hour in {v:?}: {e}")))?;
    let minute = m
        .parse::<u32>()
        .map_err(|e| CoreError::Config(format!("invalid minute in {v:?}: {e}")))?;
    Ok((hour, minute))
}

fn parse_days(v: &str) -> CoreResult<HashSet<Weekday>> {
    v.split(',')
        .map(|d| parse_weekday(d.trim()))
        .collect::<CoreResult<HashSet<_>>>()
}

fn parse_weekday(v: &str) -> CoreResult<Weekday> {
    match v.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        other => Err(CoreError::Config(format!("invalid weekday {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_weight_adjustment_rule() {
        let ini = "\
[time_rules]
enabled = true
check_interval_sec = 30
default_timezone = Asia/Singapore

[rule.daytime]
type = weight_adjustment
name = daytime
enabled = true
start_time = 08:00
end_time = 18:00
days_of_week = Mon,Tue,Wed,Thu,Fri
weights = 256,128,64,32,16,8,4,2,1,1
";
        let (config, rules) = parse_str(ini).unwrap();
        assert!(config.enabled);
        assert_eq!(rules.len(), 1);
        match &rules[0].kind {
            RuleKind::WeightAdjustment { weights } => assert_eq!(weights[0], 256),
            _ => panic!("expected weight adjustment"),
        }
    }

    #[test]
    fn parses_quota_adjustment_rule() {
        let ini = "\
[rule.night-throttle]
type = quota_adjustment
start_time = 22:00
end_time = 06:00
quota.dept-a = concurrent:2,rps:10
";
        let (_, rules) = parse_str(ini).unwrap();
        match &rules[0].kind {
            RuleKind::QuotaAdjustment { adjustments } => {
                assert_eq!(adjustments.len(), 1);
                assert_eq!(adjustments[0].account_pattern, "dept-a");
                assert_eq!(adjustments[0].max_concurrent, Some(2));
                assert_eq!(adjustments[0].max_rps, Some(10));
            }
            _ => panic!("expected quota adjustment"),
        }
    }
}
