use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a snapshot in playback order. Valid range is `[0, total_timesteps)`.
pub type TimestepIndex = usize;

/// An inclusive byte span of a file of `total` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ByteRange {
    /// Number of bytes covered by the span.
    pub fn len(&self) -> u64 {
        if self.is_empty() { 0 } else { self.end - self.start + 1 }
    }

    /// True for an inverted span; `range::resolve` never produces one.
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}/{}", self.start, self.end, self.total)
    }
}

/// Dataset description served at `/api/metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    pub total_timesteps: usize,
    #[serde(default)]
    pub time_step: f64,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub bounds: [f64; 6],
}

impl DatasetMetadata {
    pub fn with_total(total_timesteps: usize) -> Self {
        Self { total_timesteps, time_step: 1.0, fields: Vec::new(), bounds: [0.0; 6] }
    }

    #[inline]
    pub fn contains(&self, index: TimestepIndex) -> bool {
        index < self.total_timesteps
    }
}

/// Maps a timestep index to the file name the server publishes it under,
/// e.g. `combined_timestep_0042.vtp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileNaming {
    pub prefix: String,
    /// Zero-padding width of the index; 0 means no padding.
    pub width: usize,
    pub extension: String,
}

impl Default for FileNaming {
    fn default() -> Self {
        Self { prefix: "combined_timestep_".to_string(), width: 4, extension: "vtp".to_string() }
    }
}

impl FileNaming {
    pub fn new(prefix: impl Into<String>, width: usize, extension: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), width, extension: extension.into() }
    }

    pub fn file_name(&self, index: TimestepIndex) -> String {
        let ext = self.extension.trim_start_matches('.');
        if ext.is_empty() {
            format!("{}{:0width$}", self.prefix, index, width = self.width)
        } else {
            format!("{}{:0width$}.{}", self.prefix, index, ext, width = self.width)
        }
    }
}
