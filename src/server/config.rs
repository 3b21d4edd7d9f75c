use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Provider-side settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Directory every `/data/<file>` request is confined to.
    pub data_root: PathBuf,
    pub content_type: String,
    /// Size of each chunk read from disk while streaming.
    pub read_buffer_bytes: usize,
    /// JSON file served at `/api/metadata`.
    pub metadata_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_root: PathBuf::from("data"),
            content_type: "application/xml".to_string(),
            read_buffer_bytes: 64 * 1024,
            metadata_file: None,
        }
    }
}

impl ServerConfig {
    pub fn for_root(data_root: impl Into<PathBuf>) -> Self {
        Self { data_root: data_root.into(), ..Default::default() }
    }
}
