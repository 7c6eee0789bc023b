use thiserror::Error;

use crate::validate::ValidationReport;

/// Top-level error type for kgrefine.
#[derive(Error, Debug)]
pub enum RefineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The generation client could not be constructed. Fatal at startup.
    #[error("Generation service unavailable: {0}")]
    GeneratorUnavailable(String),

    #[error("Invalid graph document: {0}")]
    InvalidDocument(#[from] ValidationReport),

    #[error("Nothing to undo: no accepted change in the conversation history")]
    NothingToUndo,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a conversation turn did not commit an update.
///
/// These never escape a session as errors; they ride along in the turn
/// outcome so the caller can explain what happened.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TurnFailure {
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("No graph document could be extracted from the response")]
    Parse,

    #[error("Candidate document rejected: {0}")]
    Validation(ValidationReport),
}

impl TurnFailure {
    /// Parse and validation failures are both surfaced to the user as a
    /// rejected update with a request for clarification.
    pub fn is_apply_rejected(&self) -> bool {
        matches!(self, TurnFailure::Parse | TurnFailure::Validation(_))
    }
}
