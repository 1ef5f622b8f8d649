//! Universe -> display projection, and pure slot transitions

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use super::{BrowserStorageConfig, GitRepoConfig, SlotType, SyncStatus, Universe, UniverseError, UniverseResult};

/// Sync banner state. Variant order is display order, not precedence.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No Git slot to sync with
    Disconnected,
    /// Git slot configured, engine not reporting yet
    Standby,
    Idle,
    Saving,
    Paused,
    Unsaved,
    Error,
}

impl SyncState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "No Git repository linked",
            Self::Standby => "Sync engine not started",
            Self::Idle => "All changes synced",
            Self::Saving => "Saving to Git",
            Self::Paused => "Sync paused",
            Self::Unsaved => "Unsaved changes",
            Self::Error => "Sync error",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    pub state: SyncState,
    pub label: String,
    pub has_changes: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Derive the sync banner for a universe.
///
/// Precedence: error (backoff or unhealthy) > saving > paused > unsaved > idle.
pub fn build_sync_info(universe: &Universe, status: Option<&SyncStatus>) -> SyncInfo {
    let Some(status) = status.filter(|_| universe.has_slot(SlotType::Git)) else {
        let state = if universe.has_slot(SlotType::Git) {
            SyncState::Standby
        } else {
            SyncState::Disconnected
        };
        return SyncInfo {
            state,
            label: state.label().to_string(),
            has_changes: false,
            last_sync: None,
            last_error: None,
        };
    };

    let state = if status.is_in_error_backoff || !status.is_healthy {
        SyncState::Error
    } else if status.is_running {
        SyncState::Saving
    } else if status.is_paused {
        SyncState::Paused
    } else if status.has_changes {
        SyncState::Unsaved
    } else {
        SyncState::Idle
    };

    let label = match (&state, &status.last_error) {
        (SyncState::Error, Some(err)) => format!("{}: {}", state.label(), err),
        _ => state.label().to_string(),
    };

    SyncInfo {
        state,
        label,
        has_changes: status.has_changes,
        last_sync: status.last_sync,
        last_error: status.last_error.clone(),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub slot: SlotType,
    pub label: String,
    /// Repository, file path or cache key
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageProjection {
    pub primary: Option<SlotView>,
    pub backups: Vec<SlotView>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UniverseView {
    pub slug: String,
    pub name: String,
    pub is_active: bool,
    pub source_of_truth: SlotType,
    pub storage: StorageProjection,
    pub sync: SyncInfo,
    pub node_count: Option<usize>,
}

fn slot_view(universe: &Universe, slot: SlotType) -> SlotView {
    let (label, detail) = match slot {
        SlotType::Git => (
            "Git repository",
            universe
                .git_repo
                .as_ref()
                .map(|g| format!("{}@{}/{}", g.linked_repo, g.branch, g.universe_folder))
                .unwrap_or_default(),
        ),
        SlotType::Local => (
            "Local file",
            universe
                .local_file
                .as_ref()
                .and_then(|l| l.path.clone())
                .unwrap_or_else(|| "(no file chosen)".to_string()),
        ),
        SlotType::Browser => (
            "Local cache",
            universe
                .browser_storage
                .as_ref()
                .map(|b| b.key.clone())
                .unwrap_or_default(),
        ),
    };
    SlotView {
        slot,
        label: label.to_string(),
        detail,
    }
}

/// Project a backend universe record for display.
///
/// The primary slot is the one matching `source_of_truth`; if that slot is
/// not configured the first discovered slot stands in.
pub fn map_universe(
    universe: &Universe,
    active_slug: Option<&str>,
    sync_status: &HashMap<String, SyncStatus>,
) -> UniverseView {
    let slots = universe.slots();
    let primary_slot = slots
        .iter()
        .copied()
        .find(|s| *s == universe.source_of_truth)
        .or_else(|| slots.first().copied());

    if primary_slot.is_some() && primary_slot != Some(universe.source_of_truth) {
        tracing::debug!(
            "Universe {} source of truth {} is not configured; showing {:?} as primary",
            universe.slug,
            universe.source_of_truth,
            primary_slot
        );
    }

    let storage = StorageProjection {
        primary: primary_slot.map(|s| slot_view(universe, s)),
        backups: slots
            .iter()
            .copied()
            .filter(|s| Some(*s) != primary_slot)
            .map(|s| slot_view(universe, s))
            .collect(),
    };

    UniverseView {
        slug: universe.slug.clone(),
        name: universe.name.clone(),
        is_active: active_slug == Some(universe.slug.as_str()),
        source_of_truth: universe.source_of_truth,
        storage,
        sync: build_sync_info(universe, sync_status.get(&universe.slug)),
        node_count: universe.node_count,
    }
}

/// Link a Git repository. The source of truth is left as it was, so a new
/// backup slot never silently takes over from the slot holding local edits.
pub fn attach_git_repository(universe: &Universe, repo: GitRepoConfig) -> Universe {
    let mut next = universe.clone();
    next.git_repo = Some(repo);
    next
}

/// Unlink the Git repository. If Git was the source of truth, the local file
/// takes over when a file handle is held, otherwise the cache slot (created
/// if missing).
pub fn detach_git_repository(universe: &Universe) -> UniverseResult<Universe> {
    if universe.git_repo.is_none() {
        return Err(UniverseError::SlotMissing {
            slug: universe.slug.clone(),
            slot: SlotType::Git,
        });
    }
    let mut next = universe.clone();
    next.git_repo = None;

    if next.source_of_truth == SlotType::Git {
        let has_handle = next
            .local_file
            .as_ref()
            .is_some_and(|l| l.enabled && l.has_file_handle);
        next.source_of_truth = if has_handle {
            SlotType::Local
        } else {
            SlotType::Browser
        };
        if next.source_of_truth == SlotType::Browser && !next.has_slot(SlotType::Browser) {
            next.browser_storage = Some(BrowserStorageConfig {
                enabled: true,
                key: format!("universe_{}", next.slug),
            });
        }
        tracing::info!(
            "Universe {} source of truth demoted from git to {}",
            next.slug,
            next.source_of_truth
        );
    }
    Ok(next)
}

/// Make a configured slot the source of truth
pub fn set_source_of_truth(universe: &Universe, slot: SlotType) -> UniverseResult<Universe> {
    if !universe.has_slot(slot) {
        return Err(UniverseError::SlotMissing {
            slug: universe.slug.clone(),
            slot,
        });
    }
    let mut next = universe.clone();
    next.source_of_truth = slot;
    Ok(next)
}
