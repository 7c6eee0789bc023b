//! kgrefine Journal: tamper-evident capture of conversation sessions.
//!
//! A journal records everything a refinement session did: the source text
//! it started from, every user and assistant turn, and the document it
//! ended with. Each journal is content-hashed with BLAKE3 so that later
//! edits to the stored file are detectable.

pub mod hash;
pub mod recorder;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kgrefine_core::{render_transcript, GraphDocument, SessionId, Turn};

/// The complete record of one conversation session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionJournal {
    /// Session this journal was captured from.
    pub id: SessionId,
    /// Prefix of the source text the document was derived from.
    pub source_excerpt: String,
    /// The full conversation history, oldest first.
    pub turns: Vec<Turn>,
    /// Number of assistant turns that committed a change.
    pub accepted_changes: usize,
    /// Document state when the journal was captured.
    pub document: GraphDocument,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the journal was finalized.
    pub completed_at: Option<DateTime<Utc>>,
    /// BLAKE3 content hash (hex), set on finalization.
    pub content_hash: Option<String>,
}

impl SessionJournal {
    /// Compute and return the BLAKE3 hash of the journal's content.
    /// The hash covers all fields except `content_hash` itself.
    pub fn compute_hash(&self) -> String {
        hash::compute_journal_hash(self)
    }

    /// Verify that the stored content_hash matches a freshly computed hash.
    pub fn verify_integrity(&self) -> bool {
        match &self.content_hash {
            Some(stored) => stored == &self.compute_hash(),
            None => false,
        }
    }

    /// Human-readable transcript of the recorded turns.
    pub fn transcript(&self) -> String {
        render_transcript(&self.turns)
    }
}
