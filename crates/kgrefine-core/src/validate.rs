//! Structural and referential validation of candidate graph documents.
//!
//! Candidates arrive as loosely-typed JSON extracted from generated text, so
//! validation runs on [`serde_json::Value`] before any typed conversion.
//! There is no partial acceptance: one bad node or relationship rejects the
//! whole candidate. Every issue is collected so the rejection can be
//! explained in full.

use std::collections::HashSet;

use serde_json::{Map, Value};

/// Which collection an offending item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Node,
    Relationship,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::Node => f.write_str("node"),
            ItemKind::Relationship => f.write_str("relationship"),
        }
    }
}

/// A single reason a candidate document is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationIssue {
    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("missing '{0}' array")]
    MissingSection(&'static str),

    #[error("{kind} {index} is not an object")]
    ItemNotObject { kind: ItemKind, index: usize },

    #[error("{kind} {index} missing required '{field}' field")]
    MissingField {
        kind: ItemKind,
        index: usize,
        field: &'static str,
    },

    #[error("{kind} {index} field '{field}' must be {expected}")]
    WrongType {
        kind: ItemKind,
        index: usize,
        field: &'static str,
        expected: &'static str,
    },

    #[error("node {index} has an empty id")]
    EmptyId { index: usize },

    #[error("duplicate node id '{id}'")]
    DuplicateId { id: String },

    #[error("relationship {index} {endpoint} '{id}' not found in nodes")]
    DanglingEndpoint {
        index: usize,
        endpoint: &'static str,
        id: String,
    },
}

/// All issues found in a rejected candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

const NODE_REQUIRED: [&str; 3] = ["id", "name", "type"];
const RELATIONSHIP_REQUIRED: [&str; 3] = ["source", "target", "type"];

/// Whether the candidate passes every structural and referential check.
pub fn is_valid(candidate: &Value) -> bool {
    validate(candidate).is_ok()
}

/// Validate a candidate document, collecting every issue.
///
/// Checks, in order:
/// 1. the candidate is an object with `nodes` and `relationships` arrays
/// 2. every node is an object with string `id`, `name`, `type`
/// 3. every relationship is an object with string `source`, `target`, `type`
/// 4. node ids are non-empty and unique
/// 5. every relationship endpoint names a node id in the same document
pub fn validate(candidate: &Value) -> Result<(), ValidationReport> {
    let mut issues = Vec::new();

    let Some(doc) = candidate.as_object() else {
        return Err(ValidationReport {
            issues: vec![ValidationIssue::NotAnObject],
        });
    };

    let nodes = doc.get("nodes").and_then(Value::as_array);
    let relationships = doc.get("relationships").and_then(Value::as_array);
    if nodes.is_none() {
        issues.push(ValidationIssue::MissingSection("nodes"));
    }
    if relationships.is_none() {
        issues.push(ValidationIssue::MissingSection("relationships"));
    }

    let mut node_ids: HashSet<&str> = HashSet::new();
    for (index, node) in nodes.into_iter().flatten().enumerate() {
        let Some(node) = node.as_object() else {
            issues.push(ValidationIssue::ItemNotObject {
                kind: ItemKind::Node,
                index,
            });
            continue;
        };
        check_fields(node, ItemKind::Node, index, &NODE_REQUIRED, &mut issues);

        if let Some(id) = node.get("id").and_then(Value::as_str) {
            if id.is_empty() {
                issues.push(ValidationIssue::EmptyId { index });
            } else if !node_ids.insert(id) {
                issues.push(ValidationIssue::DuplicateId { id: id.to_string() });
            }
        }
    }

    for (index, rel) in relationships.into_iter().flatten().enumerate() {
        let Some(rel) = rel.as_object() else {
            issues.push(ValidationIssue::ItemNotObject {
                kind: ItemKind::Relationship,
                index,
            });
            continue;
        };
        check_fields(
            rel,
            ItemKind::Relationship,
            index,
            &RELATIONSHIP_REQUIRED,
            &mut issues,
        );

        // Without a nodes array every endpoint would dangle; that is
        // already reported as a missing section.
        if nodes.is_none() {
            continue;
        }
        for endpoint in ["source", "target"] {
            if let Some(id) = rel.get(endpoint).and_then(Value::as_str) {
                if !node_ids.contains(id) {
                    issues.push(ValidationIssue::DanglingEndpoint {
                        index,
                        endpoint,
                        id: id.to_string(),
                    });
                }
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        tracing::debug!(issue_count = issues.len(), "Candidate document failed validation");
        Err(ValidationReport { issues })
    }
}

/// Check required string fields and the shape of the optional ones.
fn check_fields(
    item: &Map<String, Value>,
    kind: ItemKind,
    index: usize,
    required: &[&'static str],
    issues: &mut Vec<ValidationIssue>,
) {
    for &field in required {
        match item.get(field) {
            None => issues.push(ValidationIssue::MissingField { kind, index, field }),
            Some(Value::String(_)) => {}
            Some(_) => issues.push(ValidationIssue::WrongType {
                kind,
                index,
                field,
                expected: "a string",
            }),
        }
    }

    match item.get("description") {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(_) => issues.push(ValidationIssue::WrongType {
            kind,
            index,
            field: "description",
            expected: "a string or null",
        }),
    }

    match item.get("properties") {
        None | Some(Value::Null) | Some(Value::Object(_)) => {}
        Some(_) => issues.push(ValidationIssue::WrongType {
            kind,
            index,
            field: "properties",
            expected: "an object or null",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alice_and_x() -> Value {
        json!({
            "nodes": [
                {"id": "person_alice", "name": "Alice", "type": "Person", "description": ""},
                {"id": "tech_x", "name": "X", "type": "Technology", "description": ""}
            ],
            "relationships": [
                {"source": "person_alice", "target": "tech_x", "type": "uses", "description": ""}
            ]
        })
    }

    #[test]
    fn accepts_well_formed_document() {
        assert!(is_valid(&alice_and_x()));
    }

    #[test]
    fn accepts_empty_document() {
        assert!(is_valid(&json!({"nodes": [], "relationships": []})));
    }

    #[test]
    fn rejects_non_object() {
        let err = validate(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.issues, vec![ValidationIssue::NotAnObject]);
    }

    #[test]
    fn rejects_missing_sections() {
        let err = validate(&json!({"nodes": []})).unwrap_err();
        assert_eq!(
            err.issues,
            vec![ValidationIssue::MissingSection("relationships")]
        );

        let err = validate(&json!({"nodes": {}, "relationships": []})).unwrap_err();
        assert_eq!(err.issues, vec![ValidationIssue::MissingSection("nodes")]);
    }

    #[test]
    fn rejects_node_missing_required_field() {
        let err = validate(&json!({
            "nodes": [{"id": "a", "type": "T"}],
            "relationships": []
        }))
        .unwrap_err();
        assert_eq!(
            err.issues,
            vec![ValidationIssue::MissingField {
                kind: ItemKind::Node,
                index: 0,
                field: "name"
            }]
        );
    }

    #[test]
    fn rejects_dangling_target() {
        let mut doc = alice_and_x();
        doc["relationships"][0]["target"] = json!("tech_missing");
        let err = validate(&doc).unwrap_err();
        assert_eq!(
            err.issues,
            vec![ValidationIssue::DanglingEndpoint {
                index: 0,
                endpoint: "target",
                id: "tech_missing".to_string()
            }]
        );
    }

    #[test]
    fn one_bad_item_rejects_everything() {
        let mut doc = alice_and_x();
        doc["relationships"]
            .as_array_mut()
            .unwrap()
            .push(json!({"source": "person_alice", "type": "knows"}));
        assert!(!is_valid(&doc));
    }

    #[test]
    fn rejects_duplicate_and_empty_ids() {
        let err = validate(&json!({
            "nodes": [
                {"id": "a", "name": "A", "type": "T"},
                {"id": "a", "name": "A2", "type": "T"},
                {"id": "", "name": "Blank", "type": "T"}
            ],
            "relationships": []
        }))
        .unwrap_err();
        assert!(err
            .issues
            .contains(&ValidationIssue::DuplicateId { id: "a".to_string() }));
        assert!(err.issues.contains(&ValidationIssue::EmptyId { index: 2 }));
    }

    #[test]
    fn rejects_wrong_field_shapes() {
        let err = validate(&json!({
            "nodes": [{"id": 5, "name": "A", "type": "T", "properties": "none"}],
            "relationships": ["not an object"]
        }))
        .unwrap_err();
        assert_eq!(err.issues.len(), 3);
        assert!(err.issues.contains(&ValidationIssue::ItemNotObject {
            kind: ItemKind::Relationship,
            index: 0
        }));
    }

    #[test]
    fn valid_documents_have_resolved_endpoints() {
        let doc = alice_and_x();
        assert!(is_valid(&doc));
        let ids: HashSet<&str> = doc["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|n| n["id"].as_str())
            .collect();
        for rel in doc["relationships"].as_array().unwrap() {
            assert!(ids.contains(rel["source"].as_str().unwrap()));
            assert!(ids.contains(rel["target"].as_str().unwrap()));
        }
    }

    #[test]
    fn report_lists_every_issue() {
        let err = validate(&json!({"foo": 1})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing 'nodes' array; missing 'relationships' array"
        );
    }
}
