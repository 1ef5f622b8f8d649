//! Session persistence across a universe's storage slots
//!
//! Each slot holds a [`SavedSession`]. The source-of-truth slot is read
//! first; backups fill in when it is empty and are compared by content hash.

mod slots;

pub use slots::{open_slots, CacheSlot, LocalFileSlot};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::graph::{GraphState, SessionDocument};
use crate::universe::SlotType;

/// Errors that can occur while loading or saving sessions
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid session data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache database error: {0}")]
    Cache(#[from] redb::Error),

    #[error("Session in {slot} slot is corrupt (hash mismatch)")]
    HashMismatch { slot: SlotType },

    #[error("Universe has no {0} slot available locally")]
    SlotUnavailable(SlotType),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// A session document stamped with save time and content hash
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedSession {
    pub saved_at: DateTime<Utc>,
    /// Hex SHA-256 of the document's canonical JSON
    pub content_hash: String,
    pub document: SessionDocument,
}

impl SavedSession {
    pub fn seal(document: SessionDocument) -> PersistenceResult<Self> {
        Ok(Self {
            saved_at: Utc::now(),
            content_hash: content_hash(&document)?,
            document,
        })
    }

    pub fn from_state(state: &GraphState) -> PersistenceResult<Self> {
        Self::seal(SessionDocument::from_state(state))
    }

    /// Recompute the hash and compare with the stored one
    pub fn verify(&self) -> PersistenceResult<bool> {
        Ok(content_hash(&self.document)? == self.content_hash)
    }
}

pub fn content_hash(document: &SessionDocument) -> PersistenceResult<String> {
    let bytes = serde_json::to_vec(document)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

/// One storage location for a universe's session
pub trait SlotStore: Send {
    fn slot_type(&self) -> SlotType;

    /// `None` when the slot has never been written
    fn load(&self) -> PersistenceResult<Option<SavedSession>>;

    fn save(&self, session: &SavedSession) -> PersistenceResult<()>;

    /// Human-readable location, for logs and CLI output
    fn location(&self) -> String;
}

/// Outcome of loading across slots
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// Slot the session came from
    pub loaded_from: Option<SlotType>,
    pub session: Option<SavedSession>,
    /// Slots holding a session whose hash differs from the loaded one
    pub divergent: Vec<SlotType>,
}

fn load_checked(slot: &dyn SlotStore) -> PersistenceResult<Option<SavedSession>> {
    match slot.load()? {
        Some(session) if !session.verify()? => Err(PersistenceError::HashMismatch {
            slot: slot.slot_type(),
        }),
        other => Ok(other),
    }
}

/// Load from the source-of-truth slot, falling back to the first backup
/// with data, and report slots that disagree.
///
/// A slot that fails to load is logged and treated as empty.
pub fn reconcile(source_of_truth: SlotType, slots: &[Box<dyn SlotStore>]) -> Reconciled {
    let ordered = ordered_slots(source_of_truth, slots);

    let mut loaded: Vec<(SlotType, SavedSession)> = Vec::new();
    for slot in &ordered {
        match load_checked(slot.as_ref()) {
            Ok(Some(session)) => loaded.push((slot.slot_type(), session)),
            Ok(None) => tracing::debug!("{} slot at {} is empty", slot.slot_type(), slot.location()),
            Err(e) => tracing::warn!("Failed to load {} slot at {}: {}", slot.slot_type(), slot.location(), e),
        }
    }

    let Some((loaded_from, session)) = loaded.first().cloned() else {
        return Reconciled {
            loaded_from: None,
            session: None,
            divergent: Vec::new(),
        };
    };

    if loaded_from != source_of_truth {
        tracing::warn!(
            "Source of truth ({}) had no session; loaded from {} instead",
            source_of_truth,
            loaded_from
        );
    }

    let divergent = loaded
        .iter()
        .skip(1)
        .filter(|(_, s)| s.content_hash != session.content_hash)
        .map(|(slot, _)| *slot)
        .collect();

    Reconciled {
        loaded_from: Some(loaded_from),
        session: Some(session),
        divergent,
    }
}

/// Write a session to every slot, source of truth first.
///
/// A failing source of truth aborts and returns the error. Backup failures
/// are logged. Returns the slots written.
pub fn save_all(
    source_of_truth: SlotType,
    slots: &[Box<dyn SlotStore>],
    session: &SavedSession,
) -> PersistenceResult<Vec<SlotType>> {
    let mut written = Vec::new();
    for slot in ordered_slots(source_of_truth, slots) {
        match slot.save(session) {
            Ok(()) => {
                tracing::debug!("Saved session to {} ({})", slot.slot_type(), slot.location());
                written.push(slot.slot_type());
            }
            Err(e) if slot.slot_type() == source_of_truth => return Err(e),
            Err(e) => tracing::warn!("Backup save to {} failed: {}", slot.slot_type(), e),
        }
    }
    Ok(written)
}

fn ordered_slots(source_of_truth: SlotType, slots: &[Box<dyn SlotStore>]) -> Vec<&Box<dyn SlotStore>> {
    let mut ordered: Vec<_> = slots.iter().collect();
    ordered.sort_by_key(|s| s.slot_type() != source_of_truth);
    ordered
}
