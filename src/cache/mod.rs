mod config;
mod core;
mod metrics;
mod policy;

pub use config::{CacheConfig, EvictionMode};
pub use core::TimestepCache;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
