use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A rejected request parameter, naming the field and what it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PosterError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),

    #[error("browser initialization failed: {0:#}")]
    EngineLaunch(anyhow::Error),

    #[error("rendering engine not initialized, call initialize() first")]
    EngineNotReady,

    #[error("image rendering failed: {0:#}")]
    Engine(anyhow::Error),

    #[error("document did not settle within {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("invalid Base64 data format: {0}")]
    InvalidBase64(String),

    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("filesystem error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown resource URI: {0}")]
    UnknownResource(String),

    #[error("invalid catalog: {0}")]
    Catalog(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PosterError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors the transport reports itself instead of returning in-band.
    pub fn is_transport_level(&self) -> bool {
        matches!(self, Self::UnknownTool(_) | Self::UnknownResource(_))
    }
}

pub type Result<T, E = PosterError> = std::result::Result<T, E>;
