//! Dataset metadata providers. Only `total_timesteps` matters to the cache.

use crate::errors::{Result, StreamError};
use crate::types::DatasetMetadata;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn metadata(&self) -> Result<DatasetMetadata>;
}

/// Fixed metadata known up front.
#[derive(Debug, Clone)]
pub struct StaticMetadata(pub DatasetMetadata);

impl StaticMetadata {
    pub fn with_total(total_timesteps: usize) -> Self {
        Self(DatasetMetadata::with_total(total_timesteps))
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadata {
    async fn metadata(&self) -> Result<DatasetMetadata> {
        Ok(self.0.clone())
    }
}

/// Reads `GET <base>/api/metadata`.
pub struct HttpMetadata {
    client: Client,
    url: String,
}

impl HttpMetadata {
    pub fn new(base_url: &str) -> Self {
        Self { client: Client::new(), url: format!("{}/api/metadata", base_url.trim_end_matches('/')) }
    }
}

#[async_trait]
impl MetadataProvider for HttpMetadata {
    async fn metadata(&self) -> Result<DatasetMetadata> {
        debug!("GET {}", self.url);
        let response =
            self.client.get(&self.url).send().await.map_err(|e| StreamError::Transport(e.to_string()))?;
        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await.map_err(|e| StreamError::Transport(e.to_string()))?;
                Ok(serde_json::from_slice(&body)?)
            }
            StatusCode::NOT_FOUND => Err(StreamError::NotFound(self.url.clone())),
            status => Err(StreamError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}
