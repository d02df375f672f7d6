//! Priority Scheduler.
//!
//! `L` FIFO class queues, admission-then-queue flow, and selectable
//! `strict`/`wfq`/`hybrid` dispatch.

pub mod dispatch;
pub mod queue;
pub mod scheduler;
pub mod stats;

pub use dispatch::{default_weights, DispatchPolicy};
pub use scheduler::{PriorityScheduler, SchedulerConfig};
pub use stats::DetailedStats;
