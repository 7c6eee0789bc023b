//! Read-only views over a session and its document.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use kgrefine_core::{render_transcript, GraphDocument, Role, SessionId};

use crate::session::ConversationSession;

/// Counts and type inventory of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentStats {
    pub nodes: usize,
    pub relationships: usize,
    pub node_types: BTreeSet<String>,
    pub relationship_types: BTreeSet<String>,
    pub node_type_counts: BTreeMap<String, usize>,
    pub relationship_type_counts: BTreeMap<String, usize>,
}

impl DocumentStats {
    pub fn of(document: &GraphDocument) -> Self {
        Self {
            nodes: document.nodes.len(),
            relationships: document.relationships.len(),
            node_types: document.node_types(),
            relationship_types: document.relationship_types(),
            node_type_counts: document.node_type_counts(),
            relationship_type_counts: document.relationship_type_counts(),
        }
    }
}

impl fmt::Display for DocumentStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Nodes: {}", self.nodes)?;
        for (node_type, count) in &self.node_type_counts {
            writeln!(f, "  {node_type}: {count}")?;
        }
        writeln!(f, "Relationships: {}", self.relationships)?;
        for (rel_type, count) in &self.relationship_type_counts {
            writeln!(f, "  {rel_type}: {count}")?;
        }
        Ok(())
    }
}

/// Snapshot of a session's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub total_turns: usize,
    pub user_turns: usize,
    pub accepted_changes: usize,
    pub rejected_turns: usize,
    pub graph: DocumentStats,
}

impl<G> ConversationSession<G> {
    pub fn summary(&self) -> SessionSummary {
        let history = self.history();
        SessionSummary {
            session_id: self.id(),
            total_turns: history.len(),
            user_turns: history.iter().filter(|t| t.role == Role::User).count(),
            accepted_changes: history.iter().filter(|t| t.is_accepted_change()).count(),
            rejected_turns: history.iter().filter(|t| t.error).count(),
            graph: DocumentStats::of(self.document()),
        }
    }

    /// Chronological transcript of the conversation so far.
    pub fn transcript(&self) -> String {
        render_transcript(self.history())
    }
}
