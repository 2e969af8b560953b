//! Error types for PulseForge

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum PfError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Incompatible state: {0}")]
    StateCompat(String),

    #[error("State codec error: {0}")]
    Codec(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Buffer underrun")]
    BufferUnderrun,
}

/// Result type alias
pub type PfResult<T> = Result<T, PfError>;
