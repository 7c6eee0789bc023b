//! Prompt assembly for refinement turns.
//!
//! Every prompt carries the same sections in the same order: editing rules,
//! the recent conversation, the current graph, an excerpt of the source
//! text, the user's request, and the response layout the parser expects.

use kgrefine_core::config::SessionConfig;
use kgrefine_core::{GraphDocument, Turn};

/// Opens the assistant's restatement of the request.
pub const UNDERSTANDING_MARKER: &str = "UNDERSTANDING:";
/// Opens the fenced block holding the updated document.
pub const FENCE_OPEN: &str = "```json";
/// Closes the fenced block.
pub const FENCE_CLOSE: &str = "```";
/// Opens the assistant's summary of what changed.
pub const CHANGES_MARKER: &str = "CHANGES:";

const EDITING_RULES: &str = "\
You are an expert knowledge graph editor. You refine a knowledge graph that \
was extracted from a source document, one request at a time.

Rules:
- Return the COMPLETE updated graph, not only the parts that changed.
- Keep every existing node and relationship unless the request removes it.
- Node ids must be unique. New ids use lowercase snake_case: <type>_<name>.
- Every relationship source and target must be the id of a node in the graph.
- Each node has id, name, type, description and properties.
- Each relationship has source, target, type, description and properties.
- Stay faithful to the source text; do not invent facts it does not support.";

/// Builds prompts from session state.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    history_window: usize,
    source_excerpt_chars: usize,
}

impl PromptBuilder {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            history_window: config.history_window,
            source_excerpt_chars: config.source_excerpt_chars,
        }
    }

    /// Excerpt of `source_text` as embedded in prompts and journals.
    pub fn excerpt(&self, source_text: &str) -> String {
        source_excerpt(source_text, self.source_excerpt_chars)
    }

    /// Assemble the prompt for one turn.
    ///
    /// `history` is the conversation before `user_message`; only its last
    /// `history_window` turns are rendered.
    pub fn build(
        &self,
        history: &[Turn],
        document: &GraphDocument,
        source_text: &str,
        user_message: &str,
    ) -> String {
        let mut prompt = String::with_capacity(4096);

        prompt.push_str(EDITING_RULES);
        prompt.push_str("\n\n");

        let window = &history[history.len().saturating_sub(self.history_window)..];
        if !window.is_empty() {
            prompt.push_str("RECENT CONVERSATION:\n");
            for turn in window {
                prompt.push_str(&format!("{}: {}\n", turn.role.label(), turn.content));
            }
            prompt.push('\n');
        }

        prompt.push_str("CURRENT GRAPH:\n");
        prompt.push_str(&document.to_canonical_json());
        prompt.push_str("\n\n");

        prompt.push_str("SOURCE TEXT (excerpt):\n");
        prompt.push_str(&self.excerpt(source_text));
        prompt.push_str("\n\n");

        prompt.push_str("USER REQUEST:\n");
        prompt.push_str(user_message);
        prompt.push_str("\n\n");

        prompt.push_str(&response_layout());
        prompt
    }
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn source_excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn response_layout() -> String {
    format!(
        "Respond using exactly this layout:\n\n\
         {UNDERSTANDING_MARKER}\n\
         <one or two sentences restating what you will change>\n\n\
         {FENCE_OPEN}\n\
         <the complete updated graph as JSON, same layout as CURRENT GRAPH>\n\
         {FENCE_CLOSE}\n\n\
         {CHANGES_MARKER}\n\
         <a short list of what was added, removed or modified>\n"
    )
}
