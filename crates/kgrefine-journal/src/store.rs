//! Journal storage.
//!
//! A store holds at most one journal per session, keyed by [`SessionId`].
//! Every read path re-checks the content hash: `get` refuses a tampered
//! journal outright, `list` sets it aside in [`JournalListing::skipped`]
//! so one bad file cannot hide the others.

use std::fs;
use std::path::{Path, PathBuf};

use kgrefine_core::SessionId;

use crate::SessionJournal;

const JOURNAL_EXT: &str = "json";
const PARTIAL_EXT: &str = "partial";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No journal stored for session {0}")]
    NotFound(SessionId),

    #[error("Journal for session {0} was modified after it was finalized")]
    IntegrityViolation(SessionId),

    #[error("Journal for session {0} has no content hash; finalize it before saving")]
    NotFinalized(SessionId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Filter for [`JournalStore::list`].
#[derive(Debug, Default, Clone, Copy)]
pub struct JournalQuery {
    /// Only include sessions with at least one accepted change.
    pub with_changes_only: bool,
}

/// Why a stored file was left out of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The file is not a journal (or is truncated).
    Unreadable(String),
    /// The journal's content no longer matches its hash.
    Tampered(SessionId),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Unreadable(e) => write!(f, "unreadable: {e}"),
            SkipReason::Tampered(id) => write!(f, "integrity check failed for session {id}"),
        }
    }
}

/// Verified journals plus the files that were set aside.
#[derive(Debug, Default)]
pub struct JournalListing {
    /// Newest session first.
    pub journals: Vec<SessionJournal>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
}

pub trait JournalStore {
    /// Store a finalized journal, replacing any earlier capture of the same session.
    fn save(&self, journal: &SessionJournal) -> Result<(), StoreError>;

    /// Load one session's journal, verifying its hash.
    fn get(&self, id: SessionId) -> Result<SessionJournal, StoreError>;

    fn list(&self, query: &JournalQuery) -> Result<JournalListing, StoreError>;
}

/// Journals as `{root}/{session_id}.json`.
///
/// Writes go to a `.partial` sibling first and are renamed into place, so a
/// crash mid-write never leaves a half-written journal under its real name.
pub struct FileJournalStore {
    root: PathBuf,
}

impl FileJournalStore {
    /// Open a store, creating `root` if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: SessionId) -> PathBuf {
        self.root.join(format!("{id}.{JOURNAL_EXT}"))
    }

    fn read_verified(path: &Path) -> Result<SessionJournal, SkipReason> {
        let json = fs::read_to_string(path).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
        let journal: SessionJournal =
            serde_json::from_str(&json).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
        if journal.verify_integrity() {
            Ok(journal)
        } else {
            Err(SkipReason::Tampered(journal.id))
        }
    }
}

impl JournalStore for FileJournalStore {
    fn save(&self, journal: &SessionJournal) -> Result<(), StoreError> {
        if journal.content_hash.is_none() {
            return Err(StoreError::NotFinalized(journal.id));
        }

        let path = self.path_for(journal.id);
        let partial = path.with_extension(PARTIAL_EXT);
        fs::write(&partial, serde_json::to_vec_pretty(journal)?)?;
        fs::rename(&partial, &path)?;

        tracing::debug!(session_id = %journal.id, path = %path.display(), "Journal saved");
        Ok(())
    }

    fn get(&self, id: SessionId) -> Result<SessionJournal, StoreError> {
        let json = match fs::read_to_string(self.path_for(id)) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id))
            }
            Err(e) => return Err(e.into()),
        };

        let journal: SessionJournal = serde_json::from_str(&json)?;
        if journal.id != id || !journal.verify_integrity() {
            return Err(StoreError::IntegrityViolation(id));
        }
        Ok(journal)
    }

    fn list(&self, query: &JournalQuery) -> Result<JournalListing, StoreError> {
        let mut listing = JournalListing::default();

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(JOURNAL_EXT) {
                continue;
            }

            match Self::read_verified(&path) {
                Ok(journal) => {
                    if !query.with_changes_only || journal.accepted_changes > 0 {
                        listing.journals.push(journal);
                    }
                }
                Err(reason) => {
                    tracing::warn!(path = %path.display(), %reason, "Skipping stored journal");
                    listing.skipped.push((path, reason));
                }
            }
        }

        listing
            .journals
            .sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(listing)
    }
}
