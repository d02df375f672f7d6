//! C5: Rule Engine.
//!
//! Evaluates time-window-scoped rules and mutates C2/C3/C4 parameters,
//! hot-reloadable from an INI file.

pub mod engine;
pub mod ini;
pub mod rule;
pub mod time_window;

pub use engine::{RuleEngine, SchedulerHandle};
pub use rule::{QuotaAdjustmentSpec, RuleKind, StoredRule};
pub use time_window::TimeWindow;
