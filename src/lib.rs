//! Streaming of time-varying mesh snapshots.
//!
//! The provider side is a [`server::RangeFileServer`] that streams snapshot
//! files by byte range. The consumer side is a [`cache::TimestepCache`] that
//! fetches timesteps through a [`source::TimestepSource`], keeps a bounded
//! number of decoded payloads, and loads upcoming timesteps in the background.
//! A [`session::ViewingSession`] ties one cache to one playback.

pub mod cache;
pub mod config;
pub mod errors;
pub mod logger;
pub mod metadata;
pub mod range;
pub mod server;
pub mod session;
pub mod source;
pub mod types;

pub use cache::{CacheConfig, EvictionMode, TimestepCache};
pub use errors::{Result, StreamError};
pub use server::{Listener, RangeFileServer, ServerConfig};
pub use session::ViewingSession;
pub use types::{ByteRange, DatasetMetadata, FileNaming, TimestepIndex};

/// Initializes logging from `MESHSTREAM_LOG_*` variables. Does nothing when a
/// logger is already installed.
pub fn init() {
    logger::configure_from_env();
}
