//! Journal capture for conversation sessions.

use kgrefine_journal::recorder::JournalRecorder;
use kgrefine_journal::store::{FileJournalStore, JournalStore};
use kgrefine_journal::SessionJournal;

use crate::session::ConversationSession;

impl<G> ConversationSession<G> {
    /// Capture the session as it stands: source excerpt, full history and
    /// the live document, hashed for integrity.
    pub fn export_journal(&self) -> SessionJournal {
        let mut recorder = JournalRecorder::new(
            self.id(),
            &self.prompts().excerpt(self.source_text()),
            self.started_at(),
        );
        recorder.record_turns(self.history().iter().cloned());
        recorder.set_document(self.document().clone());
        recorder.finalize()
    }
}

/// Export the session journal and store it under `journal_dir`.
///
/// Storage failures are logged, not raised; the journal is returned either
/// way so the caller can still show or forward it.
pub fn export_and_store<G>(session: &ConversationSession<G>, journal_dir: &str) -> SessionJournal {
    let journal = session.export_journal();

    match FileJournalStore::new(journal_dir) {
        Ok(store) => match store.save(&journal) {
            Ok(()) => {
                tracing::info!(
                    session_id = %journal.id,
                    turns = journal.turns.len(),
                    "Journal recorded for session"
                );
            }
            Err(e) => tracing::warn!(error = %e, "Failed to store journal"),
        },
        Err(e) => tracing::warn!(error = %e, "Failed to initialize journal store"),
    }

    journal
}
