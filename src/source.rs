//! Where timestep bytes come from and how they become mesh payloads.

use crate::errors::{Result, StreamError};
use crate::types::{FileNaming, TimestepIndex};
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Produces the raw bytes of one timestep.
#[async_trait]
pub trait TimestepSource: Send + Sync {
    async fn fetch(&self, index: TimestepIndex) -> Result<Bytes>;
}

/// Turns fetched bytes into the payload handed to the consumer. Runs on the
/// blocking pool, so it may be CPU heavy.
pub trait MeshDecoder: Send + Sync + 'static {
    type Mesh: Send + Sync + 'static;

    fn decode(&self, index: TimestepIndex, bytes: Bytes) -> Result<Self::Mesh>;
}

/// Undecoded snapshot bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMesh {
    pub index: TimestepIndex,
    pub bytes: Bytes,
}

/// Passes bytes through unchanged; an empty body is treated as a decode failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawMeshDecoder;

impl MeshDecoder for RawMeshDecoder {
    type Mesh = RawMesh;

    fn decode(&self, index: TimestepIndex, bytes: Bytes) -> Result<RawMesh> {
        if bytes.is_empty() {
            return Err(StreamError::Decode(format!("timestep {index}: empty payload")));
        }
        Ok(RawMesh { index, bytes })
    }
}

/// Inclusive byte span requested with every fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRequest {
    pub start: u64,
    pub end: u64,
}

impl RangeRequest {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    pub fn content_length(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }
}

/// Consumer-side HTTP settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub naming: FileNaming,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub range: Option<RangeRequest>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            naming: FileNaming::default(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            range: None,
        }
    }
}

/// Fetches `GET <base>/data/<file name>` from a range file server.
pub struct HttpSource {
    client: Client,
    base_url: String,
    naming: FileNaming,
    range: Option<RangeRequest>,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, naming: FileNaming) -> Result<Self> {
        Self::with_config(&ClientConfig { base_url: base_url.into(), naming, ..Default::default() })
    }

    pub fn with_config(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
            .user_agent(format!("meshstream/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StreamError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            naming: config.naming.clone(),
            range: config.range,
        })
    }

    /// Requests only `range` of every file.
    pub fn with_range(mut self, range: RangeRequest) -> Self {
        self.range = Some(range);
        self
    }

    pub fn url_for(&self, index: TimestepIndex) -> String {
        format!("{}/data/{}", self.base_url, self.naming.file_name(index))
    }
}

#[async_trait]
impl TimestepSource for HttpSource {
    async fn fetch(&self, index: TimestepIndex) -> Result<Bytes> {
        let url = self.url_for(index);
        let mut request = self.client.get(&url);
        if let Some(range) = &self.range {
            request = request.header(header::RANGE, range.header_value());
            debug!("GET {url} range {}-{}", range.start, range.end);
        } else {
            debug!("GET {url}");
        }

        let response = request.send().await.map_err(|e| StreamError::Transport(e.to_string()))?;
        match response.status() {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => {
                response.bytes().await.map_err(|e| StreamError::Transport(e.to_string()))
            }
            StatusCode::NOT_FOUND => Err(StreamError::NotFound(self.naming.file_name(index))),
            StatusCode::RANGE_NOT_SATISFIABLE => {
                let detail = response.text().await.unwrap_or_default();
                Err(StreamError::InvalidRange(format!("{url}: {detail}")))
            }
            status => Err(StreamError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}
