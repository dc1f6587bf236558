//! Error types for the tracking core.

use std::path::Path;
use thiserror::Error;

pub type TrackResult<T> = Result<T, TrackError>;

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("reference silhouette unavailable: {0}")]
    ReferenceUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn reference_unavailable(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self::ReferenceUnavailable(format!("{}: {reason}", path.display()))
    }
}
