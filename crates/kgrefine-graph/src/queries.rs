//! Read operations over persisted documents.
//!
//! Reads are scoped the same way writes are: only nodes tagged with the
//! client's scope are visible.

use neo4rs::query;

use crate::client::{GraphClient, GraphError};

/// A lightweight record returned from node queries.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NodeRecord {
    /// Database-assigned element id.
    pub external_id: String,
    /// Document-local id the node was created from.
    pub doc_id: String,
    pub label: String,
    pub name: String,
    pub description: String,
}

impl GraphClient {
    /// Find a persisted node by its document-local id.
    pub async fn find_node(&self, doc_id: &str) -> Result<Option<NodeRecord>, GraphError> {
        let q = query(
            "MATCH (n {kg_scope: $scope, doc_id: $doc_id})
             RETURN n, elementId(n) AS eid, labels(n) AS labels
             LIMIT 1",
        )
        .param("scope", self.scope().to_string())
        .param("doc_id", doc_id.to_string());

        match self.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row.get("n").map_err(|e| {
                    GraphError::Serialization(format!("Failed to deserialize node: {e}"))
                })?;
                let external_id: String = row.get("eid").unwrap_or_default();
                let labels: Vec<String> = row.get("labels").unwrap_or_default();
                Ok(Some(NodeRecord {
                    external_id,
                    doc_id: node.get("doc_id").unwrap_or_default(),
                    label: labels.first().cloned().unwrap_or_default(),
                    name: node.get("name").unwrap_or_default(),
                    description: node.get("description").unwrap_or_default(),
                }))
            }
            None => Ok(None),
        }
    }

    /// Count nodes written under this client's scope.
    pub async fn count_nodes(&self) -> Result<i64, GraphError> {
        let q = query(
            "MATCH (n {kg_scope: $scope})
             RETURN count(n) AS cnt",
        )
        .param("scope", self.scope().to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0)),
            None => Ok(0),
        }
    }

    /// Count relationships between nodes of this client's scope.
    pub async fn count_relationships(&self) -> Result<i64, GraphError> {
        let q = query(
            "MATCH (a {kg_scope: $scope})-[r]->(b {kg_scope: $scope})
             RETURN count(r) AS cnt",
        )
        .param("scope", self.scope().to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0)),
            None => Ok(0),
        }
    }
}
