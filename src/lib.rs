//! Multi-tenant admission and scheduling core for an LLM gateway.
//!
//! Five request-plane subsystems, leaves first:
//!
//! - [`priority`] (C1): maps an API key to a priority class via a cached,
//!   hot-reloadable pattern table.
//! - [`capacity`] (C2): a single-owner reservation manager for global
//!   concurrency/RPS/tokens-per-sec/context-length ceilings.
//! - [`quota`] (C3): per-account quota check-and-reserve, shadowed by
//!   time-rule-driven overrides.
//! - [`scheduler`] (C4): `L` FIFO class queues with strict/WFQ/hybrid
//!   dispatch and re-enqueue on transient rejection.
//! - [`rules`] (C5): evaluates time windows and mutates C2-C4's parameters
//!   at runtime, hot-reloadable from an INI file.
//!
//! The ambient modules ([`error`], [`config`], [`telemetry`], [`store`],
//! [`clock`]) carry the logging/error/config/test-tooling stack the request
//! plane needs without themselves being one of the five subsystems.

#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

pub mod capacity;
pub mod clock;
pub mod config;
pub mod error;
pub mod priority;
pub mod quota;
pub mod request;
pub mod rules;
pub mod scheduler;
pub mod store;
pub mod telemetry;

pub use clock::{Clock, SharedClock};
pub use error::{CoreError, CoreResult};
pub use request::{PriorityClass, Request, ScheduleResult};
