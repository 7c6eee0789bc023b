//! kgrefine-core: Graph document model, validation, errors, and configuration.
//!
//! This crate provides the foundational pieces shared by every kgrefine
//! component:
//! - [`GraphDocument`], [`Node`], [`Relationship`] in the canonical layout
//! - Conversation [`Turn`]s and session identifiers
//! - The structural/referential validator
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod types;
pub mod validate;

pub use error::{RefineError, TurnFailure};
pub use types::{
    render_transcript, GraphDocument, Node, Properties, Relationship, Role, SessionId, Turn,
};
pub use validate::{ValidationIssue, ValidationReport};
