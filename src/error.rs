//! Error types for configuration, validation and export.
//!
//! Clustering itself never fails: contract violations such as duplicate keys or
//! non-finite coordinates panic. These errors cover everything around it.

use thiserror::Error;

use crate::ZoomLevel;

pub type Result<T> = std::result::Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("item '{key}' has a non-finite coordinate ({x}, {y})")]
    InvalidCoordinate { key: String, x: f64, y: f64 },

    #[error("duplicate item key '{0}'")]
    DuplicateKey(String),

    #[error("zoom level {0} is outside the configured pyramid")]
    UnknownZoomLevel(ZoomLevel),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "toml")]
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
