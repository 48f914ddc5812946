use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Session file not found: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TunnelError>;
