//! Builder-pattern recorder for session journals.
//!
//! Used by the conversation engine to capture a session as it stands:
//!
//! ```no_run
//! # use kgrefine_core::{GraphDocument, Node, SessionId, Turn};
//! # use kgrefine_journal::recorder::JournalRecorder;
//! let mut recorder = JournalRecorder::new(
//!     SessionId::new(),
//!     "Alice is a data scientist at Acme.",
//!     chrono::Utc::now(),
//! );
//! recorder.record_turn(Turn::user("Add Acme as an organization"));
//! recorder.record_turn(Turn::accepted("Added Acme.", "1 node added"));
//! recorder.set_document(GraphDocument::new(
//!     vec![Node::new("org_acme", "Acme", "Organization")],
//!     vec![],
//! ));
//! let journal = recorder.finalize();
//! assert!(journal.content_hash.is_some());
//! assert_eq!(journal.accepted_changes, 1);
//! ```

use chrono::{DateTime, Utc};

use kgrefine_core::{GraphDocument, SessionId, Turn};

use crate::SessionJournal;

/// A builder that accumulates a session's turns and final document.
pub struct JournalRecorder {
    journal: SessionJournal,
}

impl JournalRecorder {
    /// Start recording a journal for the given session.
    pub fn new(id: SessionId, source_excerpt: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            journal: SessionJournal {
                id,
                source_excerpt: source_excerpt.to_string(),
                turns: Vec::new(),
                accepted_changes: 0,
                document: GraphDocument::default(),
                started_at,
                completed_at: None,
                content_hash: None,
            },
        }
    }

    /// Append a turn to the journal.
    pub fn record_turn(&mut self, turn: Turn) {
        if turn.is_accepted_change() {
            self.journal.accepted_changes += 1;
        }
        self.journal.turns.push(turn);
    }

    /// Append turns in order.
    pub fn record_turns(&mut self, turns: impl IntoIterator<Item = Turn>) {
        for turn in turns {
            self.record_turn(turn);
        }
    }

    /// Set the document state captured by this journal.
    pub fn set_document(&mut self, document: GraphDocument) {
        self.journal.document = document;
    }

    /// The session id for this journal (available before finalization).
    pub fn id(&self) -> SessionId {
        self.journal.id
    }

    /// Finalize the journal: set completed_at and compute the content hash.
    pub fn finalize(mut self) -> SessionJournal {
        self.journal.completed_at = Some(Utc::now());
        let hash = self.journal.compute_hash();
        self.journal.content_hash = Some(hash);
        self.journal
    }
}
