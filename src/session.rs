//! A viewing session owns its timestep cache for exactly its own lifetime.

use crate::cache::{CacheConfig, CacheMetricsSnapshot, TimestepCache};
use crate::errors::Result;
use crate::metadata::MetadataProvider;
use crate::source::{MeshDecoder, TimestepSource};
use crate::types::{DatasetMetadata, TimestepIndex};
use log::info;
use std::sync::Arc;

pub struct ViewingSession<D: MeshDecoder> {
    cache: TimestepCache<D>,
    metadata: DatasetMetadata,
    current: TimestepIndex,
    looping: bool,
}

impl<D: MeshDecoder> ViewingSession<D> {
    /// Reads the dataset metadata and creates the session's cache.
    pub async fn start(
        config: CacheConfig,
        source: Arc<dyn TimestepSource>,
        decoder: D,
        metadata: &dyn MetadataProvider,
    ) -> Result<Self> {
        let metadata = metadata.metadata().await?;
        let cache = TimestepCache::new(config, metadata.total_timesteps, source, decoder)?;
        info!(
            "viewing session started: {} timesteps, cache capacity {}",
            metadata.total_timesteps,
            cache.capacity()
        );
        Ok(Self { cache, metadata, current: 0, looping: false })
    }

    /// Wraps playback around at either end instead of stopping.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    pub fn cache(&self) -> &TimestepCache<D> {
        &self.cache
    }

    pub fn current(&self) -> TimestepIndex {
        self.current
    }

    pub async fn get(&self, index: TimestepIndex) -> Result<Arc<D::Mesh>> {
        self.cache.get(index).await
    }

    /// Moves the cursor to `index` and loads it. The cursor only moves on success.
    pub async fn seek(&mut self, index: TimestepIndex) -> Result<Arc<D::Mesh>> {
        let mesh = self.cache.get(index).await?;
        self.current = index;
        Ok(mesh)
    }

    /// Advances one timestep; `None` at the last one unless looping.
    pub async fn step_forward(&mut self) -> Option<Result<Arc<D::Mesh>>> {
        let total = self.metadata.total_timesteps;
        let next = match self.current + 1 {
            n if n < total => n,
            _ if self.looping && total > 0 => 0,
            _ => return None,
        };
        Some(self.seek(next).await)
    }

    /// Steps back one timestep; `None` at the first one unless looping.
    pub async fn step_backward(&mut self) -> Option<Result<Arc<D::Mesh>>> {
        let total = self.metadata.total_timesteps;
        let prev = match self.current.checked_sub(1) {
            Some(p) => p,
            None if self.looping && total > 0 => total - 1,
            None => return None,
        };
        Some(self.seek(prev).await)
    }

    /// Ends the session: stops background loads, drops every entry and logs
    /// the final counters.
    pub fn end(self) -> CacheMetricsSnapshot {
        self.cache.log_metrics();
        self.cache.shutdown();
        let snapshot = self.cache.metrics_snapshot();
        info!("viewing session ended at timestep {}", self.current);
        snapshot
    }
}

impl<D: MeshDecoder> std::fmt::Debug for ViewingSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewingSession")
            .field("total_timesteps", &self.metadata.total_timesteps)
            .field("current", &self.current)
            .field("cached", &self.cache.len())
            .finish()
    }
}
