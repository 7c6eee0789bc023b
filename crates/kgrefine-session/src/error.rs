//! Error types for the kgrefine-session crate.

use thiserror::Error;

/// Failure reported by a generation service.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generator command failed to start: {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Generator exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("Generator output was not valid UTF-8: {0}")]
    InvalidOutput(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Operation not supported by this generator: {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GenerationError>;
