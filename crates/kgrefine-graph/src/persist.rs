//! Writing committed documents into a graph database.
//!
//! The refinement engine only hands over a full, validated document. Id
//! re-mapping and ordering (every node before any relationship) happen
//! here, against the narrow [`GraphDatabase`] interface.

use std::collections::HashMap;

use async_trait::async_trait;
use neo4rs::query;
use serde_json::{Map, Value};

use kgrefine_core::{GraphDocument, Node, Properties};

use crate::client::{GraphClient, GraphError};

/// The two write operations a graph database must offer.
///
/// Implementations assign their own identifiers to created nodes; the
/// document-local ids are never assumed to be valid database ids.
#[async_trait]
pub trait GraphDatabase: Send + Sync {
    /// Create a node labelled `node_type` and return its external id.
    async fn create_node(&self, node_type: &str, attributes: &Node) -> Result<String, GraphError>;

    /// Create a relationship between two previously created nodes.
    async fn create_relationship(
        &self,
        source_external_id: &str,
        target_external_id: &str,
        rel_type: &str,
        properties: &Properties,
    ) -> Result<(), GraphError>;
}

/// Outcome of persisting one document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub nodes_created: usize,
    pub relationships_created: usize,
    /// Relationships skipped because an endpoint had no external id.
    pub relationships_skipped: usize,
    /// Document node id → external id.
    pub id_map: HashMap<String, String>,
}

/// Persist a full document: all nodes first, then every relationship whose
/// endpoints both resolved to external ids.
///
/// Writes are not transactional. If a write fails, the nodes and
/// relationships created before it stay in the database and the error is
/// returned without the id map; the failure is logged with the counts
/// written so far. For [`GraphClient`], `clear_scope` removes the partial
/// write.
pub async fn persist_document<D: GraphDatabase>(
    db: &D,
    document: &GraphDocument,
) -> Result<PersistReport, GraphError> {
    let mut report = PersistReport::default();

    match write_document(db, document, &mut report).await {
        Ok(()) => {
            tracing::info!(
                nodes = report.nodes_created,
                relationships = report.relationships_created,
                skipped = report.relationships_skipped,
                "Document persisted"
            );
            Ok(report)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                nodes_written = report.nodes_created,
                relationships_written = report.relationships_created,
                "Persist failed part way; earlier writes remain"
            );
            Err(e)
        }
    }
}

async fn write_document<D: GraphDatabase>(
    db: &D,
    document: &GraphDocument,
    report: &mut PersistReport,
) -> Result<(), GraphError> {
    for node in &document.nodes {
        let external_id = db.create_node(&node.node_type, node).await?;
        report.id_map.insert(node.id.clone(), external_id);
        report.nodes_created += 1;
    }

    for rel in &document.relationships {
        let (Some(source), Some(target)) = (
            report.id_map.get(&rel.source),
            report.id_map.get(&rel.target),
        ) else {
            tracing::warn!(
                source = %rel.source,
                target = %rel.target,
                rel_type = %rel.rel_type,
                "Skipping relationship with unresolved endpoint"
            );
            report.relationships_skipped += 1;
            continue;
        };

        db.create_relationship(source, target, &rel.rel_type, &rel.properties)
            .await?;
        report.relationships_created += 1;
    }

    Ok(())
}

#[async_trait]
impl GraphDatabase for GraphClient {
    async fn create_node(&self, node_type: &str, attributes: &Node) -> Result<String, GraphError> {
        let label = cypher_identifier(node_type, "Unknown");
        let mut props = flatten_properties(&attributes.properties);
        props.insert("doc_id".to_string(), Value::String(attributes.id.clone()));
        props.insert("name".to_string(), Value::String(attributes.name.clone()));
        props.insert(
            "description".to_string(),
            Value::String(attributes.description.clone()),
        );
        props.insert("kg_scope".to_string(), Value::String(self.scope().to_string()));

        let cypher = format!(
            "CREATE (n:`{label}`)
             SET n += apoc.convert.fromJsonMap($props)
             RETURN elementId(n) AS eid"
        );
        let q = query(&cypher).param("props", to_json_string(&props)?);

        let row = self
            .query_one(q)
            .await?
            .ok_or(GraphError::MissingResult("node id"))?;
        row.get::<String>("eid")
            .map_err(|e| GraphError::Serialization(format!("Failed to read node id: {e}")))
    }

    async fn create_relationship(
        &self,
        source_external_id: &str,
        target_external_id: &str,
        rel_type: &str,
        properties: &Properties,
    ) -> Result<(), GraphError> {
        let rel = cypher_identifier(rel_type, "RELATED");
        let cypher = format!(
            "MATCH (a) WHERE elementId(a) = $source
             MATCH (b) WHERE elementId(b) = $target
             CREATE (a)-[r:`{rel}`]->(b)
             SET r += apoc.convert.fromJsonMap($props)"
        );
        let q = query(&cypher)
            .param("source", source_external_id.to_string())
            .param("target", target_external_id.to_string())
            .param("props", to_json_string(&flatten_properties(properties))?);

        self.run(q).await
    }
}

impl GraphClient {
    /// Delete every node written under this client's scope.
    /// Returns the count of deleted nodes.
    pub async fn clear_scope(&self) -> Result<i64, GraphError> {
        let q = query(
            "MATCH (n {kg_scope: $scope})
             DETACH DELETE n
             RETURN count(n) AS cnt",
        )
        .param("scope", self.scope().to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0)),
            None => Ok(0),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Make a label or relationship type safe to splice into Cypher.
///
/// Labels cannot be query parameters, so anything outside
/// `[A-Za-z0-9_]` becomes `_`.
fn cypher_identifier(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

/// Neo4j properties must be scalars or lists of scalars; nested objects and
/// mixed arrays are stored as JSON strings.
fn flatten_properties(properties: &Properties) -> Map<String, Value> {
    properties
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let flat = match v {
                Value::Object(_) => Value::String(v.to_string()),
                Value::Array(items) if !items.iter().all(is_scalar) => {
                    Value::String(v.to_string())
                }
                _ => v.clone(),
            };
            (k.clone(), flat)
        })
        .collect()
}

fn is_scalar(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn to_json_string(props: &Map<String, Value>) -> Result<String, GraphError> {
    serde_json::to_string(props).map_err(|e| GraphError::Serialization(e.to_string()))
}
