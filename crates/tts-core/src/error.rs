//! Unified error types for the TTS service.

use std::path::PathBuf;

/// Main error type for TTS operations.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    /// No voices are loaded at all.
    #[error("{0}")]
    ServiceUnavailable(String),

    /// The requested voice or language is not available.
    #[error("{0}")]
    NotFound(String),

    /// Request parameters failed validation.
    #[error("{0}")]
    Validation(String),

    /// The voice model failed while synthesizing.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// An external process (transcoder, model runtime) failed.
    #[error("subprocess failed: {0}")]
    Subprocess(String),

    /// Model loading error.
    #[error("model load failed for {path}: {source}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen in normal operation).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results with TtsError.
pub type TtsResult<T> = Result<T, TtsError>;

impl TtsError {
    /// Create a service-unavailable error with message.
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Create a not-found error with message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error with message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a synthesis error with message.
    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    /// Create a subprocess error with message.
    pub fn subprocess(msg: impl Into<String>) -> Self {
        Self::Subprocess(msg.into())
    }

    /// Create a config error with message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error with message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short, stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable(_) => "unavailable",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Synthesis(_) => "synthesis",
            Self::Subprocess(_) => "subprocess",
            Self::ModelLoad { .. } => "model_load",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}
