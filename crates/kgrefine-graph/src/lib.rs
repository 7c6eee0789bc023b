//! kgrefine Graph: graph database persistence for committed documents.
//!
//! The refinement engine hands over whole, validated documents; this crate
//! owns everything after that point: the [`GraphDatabase`] write interface,
//! id re-mapping, and the Neo4j implementation.

pub mod client;
pub mod persist;
pub mod queries;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use persist::{persist_document, GraphDatabase, PersistReport};
