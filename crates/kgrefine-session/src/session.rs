//! The conversational refinement session.
//!
//! A session owns the live document and the conversation history. Each
//! submitted message runs one turn:
//!
//! ```text
//! Idle -> Awaiting -> Applied  -> Idle
//!                  \-> Rejected -> Idle
//! ```
//!
//! A candidate is committed only if it passes validation; anything else
//! leaves the live document untouched and records a rejected assistant
//! turn. Turns run to completion before the next is accepted, which
//! `submit(&mut self)` enforces.

use chrono::{DateTime, Utc};

use kgrefine_core::config::SessionConfig;
use kgrefine_core::{GraphDocument, RefineError, SessionId, Turn, TurnFailure};

use crate::generation::GenerationService;
use crate::parser::{self, ExtractionPhase};
use crate::prompt::PromptBuilder;

/// Where a session is in its turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Awaiting,
    Applied,
    Rejected,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Awaiting => "awaiting",
            SessionState::Applied => "applied",
            SessionState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// What one submitted message produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Assistant message, also recorded in history.
    pub message: String,
    /// The live document after the turn.
    pub document: GraphDocument,
    /// Whether the candidate was committed.
    pub valid: bool,
    pub failure: Option<TurnFailure>,
}

/// What an undo removed.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoReport {
    pub message: String,
    /// Turns dropped from the end of history.
    pub removed_turns: usize,
    /// Whether the document was rolled back to its pre-change state.
    pub document_restored: bool,
}

/// Document as it was just before an accepted turn committed.
#[derive(Debug, Clone)]
struct Snapshot {
    turn_index: usize,
    document: GraphDocument,
}

/// A conversational refinement session over one graph document.
pub struct ConversationSession<G> {
    id: SessionId,
    generator: G,
    prompts: PromptBuilder,
    document: GraphDocument,
    source_text: String,
    history: Vec<Turn>,
    snapshots: Vec<Snapshot>,
    state: SessionState,
    started_at: DateTime<Utc>,
}

impl<G: GenerationService> ConversationSession<G> {
    /// Create an idle session with an empty document. Call
    /// [`start`](Self::start) to begin a conversation.
    pub fn new(generator: G, config: &SessionConfig) -> Self {
        Self {
            id: SessionId::new(),
            generator,
            prompts: PromptBuilder::new(config),
            document: GraphDocument::default(),
            source_text: String::new(),
            history: Vec::new(),
            snapshots: Vec::new(),
            state: SessionState::Idle,
            started_at: Utc::now(),
        }
    }

    /// Begin a new conversation over `initial`, discarding any history.
    /// Returns a welcome message for the caller to display.
    pub fn start(&mut self, initial: GraphDocument, source_text: &str) -> String {
        if let Err(report) = initial.validate() {
            tracing::warn!(issues = %report, "Starting session with an invalid document");
        }

        self.id = SessionId::new();
        self.started_at = Utc::now();
        self.document = initial;
        self.source_text = source_text.to_string();
        self.history.clear();
        self.snapshots.clear();
        self.state = SessionState::Idle;

        tracing::info!(
            session_id = %self.id,
            nodes = self.document.nodes.len(),
            relationships = self.document.relationships.len(),
            "Session started"
        );

        format!(
            "Ready to refine a graph with {} nodes and {} relationships. \
             Tell me what to add, remove or correct.",
            self.document.nodes.len(),
            self.document.relationships.len()
        )
    }

    /// Start over with the current document and source text.
    pub fn reset(&mut self) -> String {
        let document = std::mem::take(&mut self.document);
        let source_text = std::mem::take(&mut self.source_text);
        self.start(document, &source_text)
    }

    /// Run one refinement turn.
    ///
    /// Never fails: generation, parse and validation problems are reported
    /// through [`TurnOutcome::failure`] and leave the document unchanged.
    pub async fn submit(&mut self, user_message: &str) -> TurnOutcome {
        self.history.push(Turn::user(user_message));
        let prior = &self.history[..self.history.len() - 1];
        let prompt = self
            .prompts
            .build(prior, &self.document, &self.source_text, user_message);

        self.transition(SessionState::Awaiting);
        let outcome = match self.generator.generate(&prompt).await {
            Ok(raw) => self.apply_response(&raw),
            Err(e) => {
                tracing::error!(session_id = %self.id, error = %e, "Generation failed");
                let message = format!(
                    "I encountered an error while generating an update: {e}. \
                     The graph is unchanged; please try again."
                );
                self.reject(message, TurnFailure::Generation(e.to_string()))
            }
        };
        self.transition(SessionState::Idle);
        outcome
    }

    /// Revert the most recent accepted change.
    ///
    /// History is truncated to just before the accepted assistant turn and
    /// the document is restored to its state before that change. Fails with
    /// [`RefineError::NothingToUndo`] when no turn has been accepted.
    pub fn undo(&mut self) -> Result<UndoReport, RefineError> {
        let index = self
            .history
            .iter()
            .rposition(Turn::is_accepted_change)
            .ok_or(RefineError::NothingToUndo)?;

        let summary = self.history[index].changes_summary.clone().unwrap_or_default();
        let removed_turns = self.history.len() - index;
        self.history.truncate(index);

        let restored = match self.snapshots.last() {
            Some(snapshot) if snapshot.turn_index == index => {
                self.snapshots.pop().map(|s| s.document)
            }
            _ => None,
        };
        let document_restored = restored.is_some();
        if let Some(document) = restored {
            self.document = document;
        }

        tracing::info!(
            session_id = %self.id,
            removed_turns,
            document_restored,
            "Undid last accepted change"
        );

        Ok(UndoReport {
            message: format!("Undid the last change: {summary}"),
            removed_turns,
            document_restored,
        })
    }

    fn apply_response(&mut self, raw: &str) -> TurnOutcome {
        let parsed = parser::parse_response(raw, &self.document);
        if parsed.phase == ExtractionPhase::Fallback {
            return self.reject(
                "I couldn't read an updated graph from that response, so nothing \
                 changed. Could you rephrase the request, naming the nodes and \
                 relationships involved?"
                    .to_string(),
                TurnFailure::Parse,
            );
        }

        let candidate = match GraphDocument::from_value(parsed.candidate) {
            Ok(document) => document,
            Err(RefineError::InvalidDocument(report)) => {
                tracing::warn!(session_id = %self.id, issues = %report, "Candidate rejected");
                let message = format!(
                    "The proposed update was rejected because it would leave the graph \
                     inconsistent ({report}). Nothing changed. Could you clarify which \
                     nodes are involved?"
                );
                return self.reject(message, TurnFailure::Validation(report));
            }
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Candidate unreadable");
                return self.reject(
                    format!("I couldn't read the proposed update ({e}). Nothing changed."),
                    TurnFailure::Parse,
                );
            }
        };

        let message = if parsed.explanation.is_empty() {
            format!("Changes made:\n{}", parsed.changes)
        } else {
            format!("{}\n\nChanges made:\n{}", parsed.explanation, parsed.changes)
        };

        let previous = std::mem::replace(&mut self.document, candidate);
        self.snapshots.push(Snapshot {
            turn_index: self.history.len(),
            document: previous,
        });
        self.history.push(Turn::accepted(&message, &parsed.changes));
        self.transition(SessionState::Applied);

        tracing::info!(
            session_id = %self.id,
            nodes = self.document.nodes.len(),
            relationships = self.document.relationships.len(),
            "Update applied"
        );

        TurnOutcome {
            message,
            document: self.document.clone(),
            valid: true,
            failure: None,
        }
    }

    fn reject(&mut self, message: String, failure: TurnFailure) -> TurnOutcome {
        self.history.push(Turn::rejected(&message));
        self.transition(SessionState::Rejected);
        TurnOutcome {
            message,
            document: self.document.clone(),
            valid: false,
            failure: Some(failure),
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(session_id = %self.id, from = %self.state, to = %next, "Session state");
        self.state = next;
    }
}

impl<G> ConversationSession<G> {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn document(&self) -> &GraphDocument {
        &self.document
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub(crate) fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GenerationError, Result};
    use kgrefine_core::{Node, Relationship};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records the prompts it was given.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn with(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::default(),
            }
        }
    }

    #[async_trait::async_trait]
    impl GenerationService for Scripted {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::Provider("script exhausted".into())))
        }
    }

    fn marked(doc: &GraphDocument, changes: &str) -> Result<String> {
        Ok(format!(
            "UNDERSTANDING:\nUpdating.\n```json\n{}\n```\nCHANGES:\n{changes}",
            doc.to_canonical_json()
        ))
    }

    fn alice() -> GraphDocument {
        GraphDocument::new(vec![Node::new("person_alice", "Alice", "Person")], vec![])
    }

    fn alice_at_acme() -> GraphDocument {
        GraphDocument::new(
            vec![
                Node::new("person_alice", "Alice", "Person"),
                Node::new("org_acme", "Acme", "Organization"),
            ],
            vec![Relationship::new("person_alice", "org_acme", "works_at")],
        )
    }

    fn session(responses: Vec<Result<String>>) -> ConversationSession<Scripted> {
        let mut s = ConversationSession::new(Scripted::with(responses), &SessionConfig::default());
        s.start(alice(), "Alice works at Acme.");
        s
    }

    #[test]
    fn start_resets_history_and_id() {
        let mut s = session(vec![]);
        let first_id = s.id();
        s.history.push(Turn::user("stale"));
        let welcome = s.reset();
        assert!(welcome.contains("1 nodes"));
        assert!(s.history().is_empty());
        assert_ne!(s.id(), first_id);
        assert_eq!(s.document(), &alice());
        assert_eq!(s.source_text(), "Alice works at Acme.");
    }

    #[tokio::test]
    async fn accepted_turn_commits_document() {
        let mut s = session(vec![marked(&alice_at_acme(), "- Added Acme")]);

        let outcome = s.submit("Add Acme").await;

        assert!(outcome.valid);
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.document, alice_at_acme());
        assert_eq!(s.document(), &alice_at_acme());
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.history()[1].changes_summary.as_deref(), Some("- Added Acme"));
        assert!(outcome.message.contains("Updating."));
    }

    #[tokio::test]
    async fn prompt_excludes_current_message_from_window() {
        let mut s = session(vec![marked(&alice(), "none")]);
        s.submit("Add Acme").await;

        let prompts = s.generator().prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(!prompts[0].contains("RECENT CONVERSATION:"));
        assert_eq!(prompts[0].matches("Add Acme").count(), 1);
    }

    #[tokio::test]
    async fn undo_restores_previous_document() {
        let mut s = session(vec![marked(&alice_at_acme(), "- Added Acme")]);
        s.submit("Add Acme").await;

        let report = s.undo().unwrap();

        assert!(report.document_restored);
        assert_eq!(report.removed_turns, 1);
        assert_eq!(s.document(), &alice());
        assert_eq!(s.history().len(), 1);
        assert!(matches!(s.undo(), Err(RefineError::NothingToUndo)));
    }

    #[tokio::test]
    async fn undo_drops_later_rejected_turns() {
        let mut s = session(vec![
            marked(&alice_at_acme(), "- Added Acme"),
            Ok("no graph here".to_string()),
        ]);
        s.submit("Add Acme").await;
        s.submit("Something vague").await;
        assert_eq!(s.history().len(), 4);

        let report = s.undo().unwrap();
        assert_eq!(report.removed_turns, 3);
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.document(), &alice());
    }

    #[tokio::test]
    async fn generation_error_is_recorded_not_raised() {
        let mut s = session(vec![Err(GenerationError::Provider("rate limited".into()))]);

        let outcome = s.submit("Add Acme").await;

        assert!(!outcome.valid);
        assert!(matches!(outcome.failure, Some(TurnFailure::Generation(_))));
        assert!(outcome.message.contains("rate limited"));
        assert_eq!(s.document(), &alice());
        assert!(s.history()[1].error);
    }
}
