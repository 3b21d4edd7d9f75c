//! Application configuration.
//!
//! Precedence: CLI > env > config file > defaults. The config file is the first
//! existing one of: `--config`, `$MESHSTREAM_CONFIG`, `<config dir>/meshstream.toml`,
//! `./meshstream.toml`.

use crate::cache::CacheConfig;
use crate::errors::{Result, StreamError};
use crate::server::ServerConfig;
use crate::source::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| StreamError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| StreamError::Config(e.to_string()))
    }

    /// Config file locations, highest precedence first.
    pub fn candidate_paths(cli_path: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(p) = cli_path {
            paths.push(p.to_path_buf());
        }
        if let Ok(p) = std::env::var("MESHSTREAM_CONFIG") {
            paths.push(PathBuf::from(p));
        }
        if let Some(dir) = dirs_next::config_dir() {
            paths.push(dir.join("meshstream.toml"));
        }
        if let Ok(cur) = std::env::current_dir() {
            paths.push(cur.join("meshstream.toml"));
        }
        paths
    }

    /// Loads the first config file found, then applies environment overrides.
    ///
    /// # Errors
    /// An explicitly given `cli_path` that does not exist is an error, as is
    /// any file or variable that fails to parse.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(p) = cli_path {
            if !p.exists() {
                return Err(StreamError::Config(format!("config file {} not found", p.display())));
            }
        }
        let mut cfg = match Self::candidate_paths(cli_path).into_iter().find(|p| p.is_file()) {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)?;
                Self::from_toml_str(&raw)
                    .map_err(|e| StreamError::Config(format!("{}: {e}", path.display())))?
            }
            None => Self::default(),
        };
        cfg.apply_env_from(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Applies `MESHSTREAM_*` overrides read through `var`.
    pub fn apply_env_from(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(s) = var("MESHSTREAM_BIND") {
            self.server.bind = parse_env("MESHSTREAM_BIND", &s)?;
        }
        if let Some(s) = var("MESHSTREAM_DATA_ROOT") {
            self.server.data_root = PathBuf::from(s);
        }
        if let Some(s) = var("MESHSTREAM_METADATA_FILE") {
            self.server.metadata_file = Some(PathBuf::from(s));
        }
        if let Some(s) = var("MESHSTREAM_BASE_URL") {
            self.client.base_url = s;
        }
        if let Some(s) = var("MESHSTREAM_CACHE_CAPACITY") {
            self.cache.capacity = parse_env("MESHSTREAM_CACHE_CAPACITY", &s)?;
        }
        if let Some(s) = var("MESHSTREAM_PREFETCH_RADIUS") {
            self.cache.prefetch_radius = parse_env("MESHSTREAM_PREFETCH_RADIUS", &s)?;
        }
        if let Some(s) = var("MESHSTREAM_LOG_DIR") {
            self.logging.dir = Some(PathBuf::from(s));
        }
        if let Some(s) = var("MESHSTREAM_LOG_LEVEL") {
            self.logging.level = Some(s);
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| StreamError::Config(format!("{key}={value:?}: {e}")))
}
