//! Extracting a candidate document from free-form generated text.
//!
//! Extraction degrades in three phases:
//! 1. **Marker**: the layout requested by the prompt (`UNDERSTANDING:`, a
//!    fenced JSON block, `CHANGES:`).
//! 2. **Scan**: the first balanced `{...}` span anywhere in the text.
//! 3. **Fallback**: the current document, unchanged.
//!
//! Parsing never fails; a caller that needs to know whether anything was
//! extracted checks [`ParsedResponse::phase`]. The candidate is not
//! validated here.

use serde_json::Value;

use kgrefine_core::GraphDocument;

use crate::prompt::{CHANGES_MARKER, FENCE_CLOSE, FENCE_OPEN, UNDERSTANDING_MARKER};

/// Change summary used when the response carries none.
pub const DEFAULT_CHANGES_SUMMARY: &str = "Graph updated (no change summary provided)";

/// Change summary attached to a fallback result.
pub const PARSE_FAILURE_SUMMARY: &str = "No changes applied: no graph could be read from the response";

/// Which extraction phase produced the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPhase {
    Marker,
    Scan,
    Fallback,
}

/// Result of parsing one generated response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub explanation: String,
    /// Unvalidated candidate document.
    pub candidate: Value,
    pub changes: String,
    pub phase: ExtractionPhase,
}

impl ParsedResponse {
    pub fn is_fallback(&self) -> bool {
        self.phase == ExtractionPhase::Fallback
    }
}

/// Parse generated text into explanation, candidate document and change
/// summary. `current` is returned as the candidate when nothing parses.
pub fn parse_response(raw: &str, current: &GraphDocument) -> ParsedResponse {
    let understanding_end = raw
        .find(UNDERSTANDING_MARKER)
        .map(|i| i + UNDERSTANDING_MARKER.len());

    if let Some(parsed) = parse_marked(raw, understanding_end) {
        tracing::debug!(phase = "marker", "Candidate extracted");
        return parsed;
    }

    if let Some(parsed) = parse_scanned(raw, understanding_end) {
        tracing::debug!(phase = "scan", "Candidate extracted");
        return parsed;
    }

    tracing::warn!(
        response_chars = raw.len(),
        "No candidate document found in response"
    );
    ParsedResponse {
        explanation: raw.to_string(),
        candidate: current.to_value(),
        changes: PARSE_FAILURE_SUMMARY.to_string(),
        phase: ExtractionPhase::Fallback,
    }
}

fn parse_marked(raw: &str, understanding_end: Option<usize>) -> Option<ParsedResponse> {
    let search_from = understanding_end.unwrap_or(0);
    let open = search_from + raw[search_from..].find(FENCE_OPEN)?;
    let body_start = open + FENCE_OPEN.len();
    let close = body_start + raw[body_start..].find(FENCE_CLOSE)?;

    let candidate = parse_object(&raw[body_start..close])?;
    let explanation = raw[search_from..open].trim().to_string();
    let changes = changes_after(raw, close + FENCE_CLOSE.len());

    Some(ParsedResponse {
        explanation,
        candidate,
        changes,
        phase: ExtractionPhase::Marker,
    })
}

fn parse_scanned(raw: &str, understanding_end: Option<usize>) -> Option<ParsedResponse> {
    let (start, end) = first_brace_span(raw)?;
    let candidate = parse_object(&raw[start..end])?;

    let explanation = match understanding_end {
        Some(from) if from <= start => raw[from..start].trim(),
        _ => raw[..start].trim(),
    };
    let explanation = explanation.trim_end_matches(FENCE_OPEN).trim().to_string();

    Some(ParsedResponse {
        explanation,
        candidate,
        changes: changes_after(raw, end),
        phase: ExtractionPhase::Scan,
    })
}

fn changes_after(raw: &str, from: usize) -> String {
    raw[from..]
        .find(CHANGES_MARKER)
        .map(|i| raw[from + i + CHANGES_MARKER.len()..].trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_CHANGES_SUMMARY)
        .to_string()
}

fn parse_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text.trim())
        .ok()
        .filter(Value::is_object)
}

/// Byte range of the first balanced top-level brace span.
///
/// Braces inside JSON string literals (including escaped quotes) do not
/// count toward the balance.
fn first_brace_span(text: &str) -> Option<(usize, usize)> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, start + offset + 1));
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgrefine_core::{Node, Relationship};
    use serde_json::json;

    fn current() -> GraphDocument {
        GraphDocument::new(vec![Node::new("person_alice", "Alice", "Person")], vec![])
    }

    fn updated() -> GraphDocument {
        GraphDocument::new(
            vec![
                Node::new("person_alice", "Alice", "Person"),
                Node::new("org_acme", "Acme", "Organization"),
            ],
            vec![Relationship::new("person_alice", "org_acme", "works_at")],
        )
    }

    #[test]
    fn marker_layout_is_parsed() {
        let raw = format!(
            "UNDERSTANDING:\nAdd Acme and link Alice to it.\n\n```json\n{}\n```\n\nCHANGES:\n- Added org_acme\n- Added works_at",
            updated().to_canonical_json()
        );

        let parsed = parse_response(&raw, &current());
        assert_eq!(parsed.phase, ExtractionPhase::Marker);
        assert_eq!(parsed.explanation, "Add Acme and link Alice to it.");
        assert_eq!(parsed.changes, "- Added org_acme\n- Added works_at");
        assert_eq!(GraphDocument::from_value(parsed.candidate).unwrap(), updated());
    }

    #[test]
    fn fence_without_understanding_marker() {
        let raw = "Sure.\n```json\n{\"nodes\": [], \"relationships\": []}\n```";
        let parsed = parse_response(raw, &current());
        assert_eq!(parsed.phase, ExtractionPhase::Marker);
        assert_eq!(parsed.explanation, "Sure.");
        assert_eq!(parsed.changes, DEFAULT_CHANGES_SUMMARY);
    }

    #[test]
    fn bare_json_is_found_by_scan() {
        let raw = "Here you go: {\"nodes\": [], \"relationships\": []} hope that helps";
        let parsed = parse_response(raw, &current());
        assert_eq!(parsed.phase, ExtractionPhase::Scan);
        assert_eq!(parsed.explanation, "Here you go:");
        assert_eq!(parsed.candidate, json!({"nodes": [], "relationships": []}));
        assert_eq!(parsed.changes, DEFAULT_CHANGES_SUMMARY);
    }

    #[test]
    fn scan_keeps_explanation_and_changes() {
        let raw = "UNDERSTANDING: drop everything\n{\"nodes\": [], \"relationships\": []}\nCHANGES: removed Alice";
        let parsed = parse_response(raw, &current());
        assert_eq!(parsed.phase, ExtractionPhase::Scan);
        assert_eq!(parsed.explanation, "drop everything");
        assert_eq!(parsed.changes, "removed Alice");
    }

    #[test]
    fn unterminated_fence_falls_through_to_scan() {
        let raw = "UNDERSTANDING: x\n```json\n{\"nodes\": [], \"relationships\": []}";
        let parsed = parse_response(raw, &current());
        assert_eq!(parsed.phase, ExtractionPhase::Scan);
    }

    #[test]
    fn braces_inside_strings_do_not_unbalance_scan() {
        let raw = r#"Result {"nodes": [{"id": "a", "name": "curly } \" {", "type": "T"}], "relationships": []} trailing }"#;
        let parsed = parse_response(raw, &current());
        assert_eq!(parsed.phase, ExtractionPhase::Scan);
        assert_eq!(parsed.candidate["nodes"][0]["name"], json!("curly } \" {"));
    }

    #[test]
    fn malformed_input_returns_current_document() {
        for raw in ["", "no json here", "{ not json }", "{\"unbalanced\": [", "[1, 2, 3]"] {
            let parsed = parse_response(raw, &current());
            assert!(parsed.is_fallback(), "{raw:?}");
            assert_eq!(parsed.explanation, raw);
            assert_eq!(parsed.candidate, current().to_value());
            assert_eq!(parsed.changes, PARSE_FAILURE_SUMMARY);
        }
    }

    #[test]
    fn non_object_fence_is_not_a_candidate() {
        let raw = "```json\n[\"not\", \"a\", \"graph\"]\n```";
        assert!(parse_response(raw, &current()).is_fallback());
    }

    #[test]
    fn candidate_is_not_validated() {
        let raw = "```json\n{\"nodes\": \"oops\"}\n```";
        let parsed = parse_response(raw, &current());
        assert_eq!(parsed.phase, ExtractionPhase::Marker);
        assert_eq!(parsed.candidate, json!({"nodes": "oops"}));
    }
}
