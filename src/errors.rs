use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Range not satisfiable: {0}")]
    InvalidRange(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("Timestep {index} out of bounds (total {total})")]
    OutOfBounds { index: usize, total: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task stopped: {0}")]
    Shutdown(String),
}

impl StreamError {
    /// True when a later attempt for the same timestep may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StreamError::Transport(_) => true,
            StreamError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            StreamError::Http { status: status.as_u16(), message: e.to_string() }
        } else {
            StreamError::Transport(e.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for StreamError {
    fn from(e: tokio::task::JoinError) -> Self {
        StreamError::Shutdown(e.to_string())
    }
}
