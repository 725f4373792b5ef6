//! Error types for localimp

use thiserror::Error;

/// Result type for localimp operations
pub type Result<T> = std::result::Result<T, LocalimpError>;

/// Errors that can occur while relocating imports
#[derive(Error, Debug)]
pub enum LocalimpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse Python source: {0}")]
    ParseError(String),

    #[error("Scope analysis failed: {0}")]
    AnalysisError(String),

    #[error("Unsupported statement shape: {0}")]
    StructuralError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
