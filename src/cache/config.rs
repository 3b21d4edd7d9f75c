use crate::errors::{Result, StreamError};
use serde::{Deserialize, Serialize};

/// Which entry leaves the cache when it is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionMode {
    /// Earliest inserted entry goes first; reads do not reorder.
    #[default]
    Fifo,
    /// Least recently read entry goes first. Opt-in only.
    Lru,
}

/// Configuration for the timestep cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    /// How many timesteps after a requested one are loaded in the background.
    pub prefetch_radius: usize,
    /// Upper bound on concurrently running background fetches.
    pub max_concurrent_prefetch: usize,
    pub eviction_mode: EvictionMode,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 20, prefetch_radius: 5, max_concurrent_prefetch: 4, eviction_mode: EvictionMode::Fifo }
    }
}

impl CacheConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity, ..Default::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(StreamError::Config("cache capacity must be at least 1".to_string()));
        }
        if self.max_concurrent_prefetch == 0 && self.prefetch_radius > 0 {
            return Err(StreamError::Config(
                "max_concurrent_prefetch must be at least 1 when prefetch is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
