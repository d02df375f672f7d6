//! C1: Priority Resolver.
//!
//! Maps an API-key string to a priority class via a cached, hot-reloadable
//! pattern table.

pub mod mapping;
pub mod matcher;
pub mod resolver;

pub use mapping::{MatchType, PriorityMapping, TenantType};
pub use resolver::{PriorityResolver, ResolverConfig};
