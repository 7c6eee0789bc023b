//! BLAKE3 content hashing for tamper evidence.
//!
//! Computes a deterministic hash of all journal fields (excluding the
//! content_hash itself) so that any modification is detectable.

use chrono::{DateTime, Utc};
use serde::Serialize;

use kgrefine_core::{GraphDocument, SessionId, Turn};

use crate::SessionJournal;

/// Hashable representation of a journal (excludes content_hash).
#[derive(Serialize)]
struct HashableJournal<'a> {
    id: &'a SessionId,
    source_excerpt: &'a str,
    turns: &'a [Turn],
    accepted_changes: usize,
    document: &'a GraphDocument,
    started_at: &'a DateTime<Utc>,
    completed_at: &'a Option<DateTime<Utc>>,
}

/// Compute the BLAKE3 hash of a journal's content.
///
/// Serializes all fields except `content_hash` to JSON, then hashes the
/// bytes with BLAKE3. Returns the hex-encoded hash.
pub fn compute_journal_hash(journal: &SessionJournal) -> String {
    let hashable = HashableJournal {
        id: &journal.id,
        source_excerpt: &journal.source_excerpt,
        turns: &journal.turns,
        accepted_changes: journal.accepted_changes,
        document: &journal.document,
        started_at: &journal.started_at,
        completed_at: &journal.completed_at,
    };

    // Strings, JSON maps and timestamps only; serialization cannot fail.
    let json = serde_json::to_vec(&hashable).expect("Journal serialization should not fail");
    blake3::hash(&json).to_hex().to_string()
}
