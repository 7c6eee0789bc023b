//! kgrefine-session: Conversational refinement of knowledge graph documents.
//!
//! A [`ConversationSession`] holds a live graph document and applies natural
//! language edit requests to it, one turn at a time. Each turn prompts a
//! [`GenerationService`], parses the free-form reply into a candidate
//! document, and commits it only if it validates.

pub mod error;
pub mod generation;
pub mod journal;
pub mod parser;
pub mod prompt;
pub mod session;
pub mod summary;

pub use error::GenerationError;
pub use generation::{Capabilities, CommandGenerator, GenerationService};
pub use parser::{parse_response, ExtractionPhase, ParsedResponse};
pub use session::{ConversationSession, SessionState, TurnOutcome, UndoReport};
pub use summary::{DocumentStats, SessionSummary};
