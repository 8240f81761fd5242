//! Error types for batch image generation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a generation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Network,
    Validation,
    ReferenceImage,
    Api,
    Timeout,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::ReferenceImage => "reference_image",
            ErrorKind::Api => "api",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by providers, capability resolution and preflight.
///
/// Every variant renders text that can be shown to the user verbatim.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    ReferenceImage(String),

    /// Provider rejected the request or returned a payload that breaks its
    /// contract. `status` is `None` for the latter.
    #[error("{message}")]
    Api { status: Option<u16>, message: String },

    #[error("{0}")]
    Timeout(String),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("{0}")]
    Unknown(String),
}

impl GenerationError {
    pub fn api(message: impl Into<String>) -> Self {
        GenerationError::Api {
            status: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::Config(_) => ErrorKind::Config,
            GenerationError::Network(_) => ErrorKind::Network,
            GenerationError::Validation(_) => ErrorKind::Validation,
            GenerationError::ReferenceImage(_) => ErrorKind::ReferenceImage,
            GenerationError::Api { .. } => ErrorKind::Api,
            GenerationError::Timeout(_) => ErrorKind::Timeout,
            GenerationError::Cancelled => ErrorKind::Cancelled,
            GenerationError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerationError::Cancelled)
    }
}

/// Storage-related errors for the card store and cache files
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<StorageError> for GenerationError {
    fn from(err: StorageError) -> Self {
        GenerationError::Unknown(err.to_string())
    }
}

impl From<config::ConfigError> for GenerationError {
    fn from(err: config::ConfigError) -> Self {
        GenerationError::Config(err.to_string())
    }
}
