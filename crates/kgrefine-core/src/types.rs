//! Core domain types for the refinement engine.
//!
//! A [`GraphDocument`] is the node/relationship structure being refined.
//! Its serde layout is the canonical interchange schema: the same JSON is
//! embedded in generation prompts, written to the graph database, and
//! captured in session journals.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::RefineError;
use crate::validate::{self, ValidationReport};

/// Free-form attributes attached to nodes and relationships.
pub type Properties = Map<String, Value>;

// ── Session ───────────────────────────────────────────────────────

/// Unique identifier for a conversation session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Graph Document ────────────────────────────────────────────────

/// An entity in the graph document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Document-local identifier, unique and never empty.
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: Properties,
}

impl Node {
    pub fn new(id: &str, name: &str, node_type: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            node_type: node_type.to_string(),
            description: String::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// A typed, directed relationship between two nodes of the same document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    /// Id of the source node.
    pub source: String,
    /// Id of the target node.
    pub target: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: Properties,
}

impl Relationship {
    pub fn new(source: &str, target: &str, rel_type: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            rel_type: rel_type.to_string(),
            description: String::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// The node/relationship structure under refinement.
///
/// A pure value: commits replace the whole document rather than patching
/// it, so a rejected update can never leave it half-applied. Node order is
/// significant for display only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphDocument {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

impl GraphDocument {
    pub fn new(nodes: Vec<Node>, relationships: Vec<Relationship>) -> Self {
        Self {
            nodes,
            relationships,
        }
    }

    /// Build a typed document from loosely-typed JSON.
    ///
    /// The candidate is validated first; a document that fails structural
    /// or referential checks is never constructed.
    pub fn from_value(value: Value) -> Result<Self, RefineError> {
        validate::validate(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Parse a document from JSON text, validating it.
    pub fn from_json_str(json: &str) -> Result<Self, RefineError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// The document as a JSON value in the canonical field layout.
    pub fn to_value(&self) -> Value {
        // String keys and JSON values only; serialization cannot fail.
        serde_json::to_value(self).expect("GraphDocument serialization should not fail")
    }

    /// Pretty-printed canonical JSON.
    pub fn to_canonical_json(&self) -> String {
        // Same as `to_value`: cannot fail.
        serde_json::to_string_pretty(self).expect("GraphDocument serialization should not fail")
    }

    /// Run the structural and referential validator over this document.
    pub fn validate(&self) -> Result<(), ValidationReport> {
        validate::validate(&self.to_value())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_ids(&self) -> HashSet<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    /// Distinct node types, sorted.
    pub fn node_types(&self) -> BTreeSet<String> {
        self.nodes.iter().map(|n| n.node_type.clone()).collect()
    }

    /// Distinct relationship types, sorted.
    pub fn relationship_types(&self) -> BTreeSet<String> {
        self.relationships
            .iter()
            .map(|r| r.rel_type.clone())
            .collect()
    }

    pub fn node_type_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for node in &self.nodes {
            *counts.entry(node.node_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn relationship_type_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for rel in &self.relationships {
            *counts.entry(rel.rel_type.clone()).or_insert(0) += 1;
        }
        counts
    }
}

// ── Conversation Turns ────────────────────────────────────────────

/// Who produced a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when rendering turns into prompts and transcripts.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One exchange in a conversation. Turns are append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Set on assistant turns whose update was committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes_summary: Option<String>,
    /// Set on assistant turns whose update was rejected or failed.
    #[serde(default)]
    pub error: bool,
}

impl Turn {
    pub fn user(content: &str) -> Self {
        Self::build(Role::User, content, None, false)
    }

    /// An assistant turn that committed a change.
    pub fn accepted(content: &str, changes_summary: &str) -> Self {
        Self::build(
            Role::Assistant,
            content,
            Some(changes_summary.to_string()),
            false,
        )
    }

    /// An assistant turn that reports a failure or rejection.
    pub fn rejected(content: &str) -> Self {
        Self::build(Role::Assistant, content, None, true)
    }

    /// Whether this turn resulted in an accepted change to the document.
    pub fn is_accepted_change(&self) -> bool {
        self.role == Role::Assistant && self.changes_summary.is_some()
    }

    fn build(role: Role, content: &str, changes_summary: Option<String>, error: bool) -> Self {
        Self {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            changes_summary,
            error,
        }
    }
}

/// Render turns as a chronological, human-readable transcript.
///
/// One line per turn, prefixed with its UTC timestamp; accepted changes and
/// rejections are annotated on an indented follow-up line.
pub fn render_transcript(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        out.push_str(&format!(
            "[{}] {}: {}\n",
            turn.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            turn.role.label(),
            turn.content
        ));
        if let Some(summary) = &turn.changes_summary {
            out.push_str(&format!("    changes: {summary}\n"));
        }
        if turn.error {
            out.push_str("    (update not applied)\n");
        }
    }
    out
}

/// Treat an explicit JSON `null` the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> GraphDocument {
        GraphDocument::new(
            vec![
                Node::new("person_alice", "Alice", "Person"),
                Node::new("org_acme", "Acme", "Organization"),
                Node::new("person_bob", "Bob", "Person"),
            ],
            vec![
                Relationship::new("person_alice", "org_acme", "works_at"),
                Relationship::new("person_bob", "org_acme", "works_at"),
                Relationship::new("person_alice", "person_bob", "knows"),
            ],
        )
    }

    #[test]
    fn canonical_field_names() {
        let value = sample().to_value();
        let node = &value["nodes"][0];
        assert_eq!(node["id"], "person_alice");
        assert_eq!(node["type"], "Person");
        assert_eq!(node["description"], "");
        assert!(node["properties"].is_object());

        let rel = &value["relationships"][0];
        assert_eq!(rel["source"], "person_alice");
        assert_eq!(rel["target"], "org_acme");
        assert_eq!(rel["type"], "works_at");
    }

    #[test]
    fn from_value_fills_optional_fields() {
        let doc = GraphDocument::from_value(json!({
            "nodes": [
                {"id": "a", "name": "A", "type": "T", "description": null},
                {"id": "b", "name": "B", "type": "T", "extra": 7}
            ],
            "relationships": [
                {"source": "a", "target": "b", "type": "r", "properties": null}
            ]
        }))
        .unwrap();

        assert_eq!(doc.nodes[0].description, "");
        assert!(doc.nodes[1].properties.is_empty());
        assert!(doc.relationships[0].properties.is_empty());
    }

    #[test]
    fn from_value_rejects_dangling_reference() {
        let result = GraphDocument::from_value(json!({
            "nodes": [{"id": "a", "name": "A", "type": "T"}],
            "relationships": [{"source": "a", "target": "ghost", "type": "r"}]
        }));
        assert!(matches!(result, Err(RefineError::InvalidDocument(_))));
    }

    #[test]
    fn type_sets_and_counts() {
        let doc = sample();
        let node_types: Vec<_> = doc.node_types().into_iter().collect();
        assert_eq!(node_types, vec!["Organization", "Person"]);
        assert_eq!(doc.node_type_counts()["Person"], 2);
        assert_eq!(doc.relationship_type_counts()["works_at"], 2);
        assert_eq!(doc.relationship_types().len(), 2);
    }

    #[test]
    fn arbitrary_properties_serialize() {
        let mut node = Node::new("a", "A", "T");
        node.properties.insert(
            "nested".to_string(),
            json!({"list": [1, 2.5, null, "x"], "deep": {"flag": true}}),
        );
        let doc = GraphDocument::new(vec![node], vec![]);

        let value = doc.to_value();
        assert_eq!(value["nodes"][0]["properties"]["nested"]["deep"]["flag"], json!(true));
        assert!(doc.to_canonical_json().contains("\"nested\""));
    }

    #[test]
    fn json_roundtrip_preserves_document() {
        let doc = sample();
        let parsed = GraphDocument::from_json_str(&doc.to_canonical_json()).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn accepted_turn_flags() {
        let accepted = Turn::accepted("done", "added X");
        assert!(accepted.is_accepted_change());
        assert!(!accepted.error);

        let rejected = Turn::rejected("could not apply");
        assert!(!rejected.is_accepted_change());
        assert!(rejected.error);

        assert!(!Turn::user("hello").is_accepted_change());
    }

    #[test]
    fn transcript_is_chronological_and_annotated() {
        let turns = vec![
            Turn::user("add X"),
            Turn::accepted("Added X.", "1 node added"),
            Turn::user("remove everything"),
            Turn::rejected("Please clarify."),
        ];
        let transcript = render_transcript(&turns);
        let lines: Vec<&str> = transcript.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].ends_with("User: add X"));
        assert!(lines[1].ends_with("Assistant: Added X."));
        assert_eq!(lines[2], "    changes: 1 node added");
        assert!(lines[3].ends_with("User: remove everything"));
        assert_eq!(lines[5], "    (update not applied)");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
