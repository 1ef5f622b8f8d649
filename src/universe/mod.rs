//! Universes and their storage slots
//!
//! A universe is a named collection of graphs stored in up to three slots
//! (Git repository, local file, browser-style cache), one of which is the
//! source of truth. The backend process owns universe records; this module
//! maps them into a display projection and computes requested transitions.

mod mapper;
mod registry;

pub use mapper::{
    attach_git_repository, build_sync_info, detach_git_repository, map_universe,
    set_source_of_truth, SlotView, StorageProjection, SyncInfo, SyncState, UniverseView,
};
pub use registry::{FederationService, InMemoryBackend, JsonRegistry, UniverseBackend};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Storage slot kinds, in discovery order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SlotType {
    Git,
    Local,
    Browser,
}

impl SlotType {
    pub const ALL: [SlotType; 3] = [SlotType::Git, SlotType::Local, SlotType::Browser];
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Git => write!(f, "git"),
            Self::Local => write!(f, "local"),
            Self::Browser => write!(f, "browser"),
        }
    }
}

impl std::str::FromStr for SlotType {
    type Err = UniverseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "git" => Ok(Self::Git),
            "local" | "file" => Ok(Self::Local),
            "browser" | "cache" => Ok(Self::Browser),
            other => Err(UniverseError::UnknownSlot(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitRepoConfig {
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// `owner/repo`
    pub linked_repo: String,
    #[serde(default = "default_universe_folder")]
    pub universe_folder: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl GitRepoConfig {
    pub fn new(linked_repo: &str) -> Self {
        Self {
            enabled: true,
            linked_repo: linked_repo.to_string(),
            universe_folder: default_universe_folder(),
            branch: default_branch(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalFileConfig {
    #[serde(default = "enabled")]
    pub enabled: bool,
    pub path: Option<String>,
    /// Whether a writable handle to the file is currently held
    #[serde(default)]
    pub has_file_handle: bool,
    pub last_saved: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrowserStorageConfig {
    #[serde(default = "enabled")]
    pub enabled: bool,
    pub key: String,
}

fn enabled() -> bool {
    true
}

fn default_universe_folder() -> String {
    "universes".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

/// Backend record for one universe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Universe {
    pub slug: String,
    pub name: String,
    pub source_of_truth: SlotType,
    #[serde(default)]
    pub git_repo: Option<GitRepoConfig>,
    #[serde(default)]
    pub local_file: Option<LocalFileConfig>,
    #[serde(default)]
    pub browser_storage: Option<BrowserStorageConfig>,
    #[serde(default)]
    pub node_count: Option<usize>,
}

impl Universe {
    /// A universe backed only by the browser-style cache
    pub fn new(slug: &str, name: &str) -> Self {
        Self {
            slug: slug.to_string(),
            name: name.to_string(),
            source_of_truth: SlotType::Browser,
            git_repo: None,
            local_file: None,
            browser_storage: Some(BrowserStorageConfig {
                enabled: true,
                key: format!("universe_{}", slug),
            }),
            node_count: None,
        }
    }

    pub fn with_local_file(mut self, path: &str, has_file_handle: bool) -> Self {
        self.local_file = Some(LocalFileConfig {
            enabled: true,
            path: Some(path.to_string()),
            has_file_handle,
            last_saved: None,
        });
        self
    }

    pub fn with_git_repo(mut self, linked_repo: &str) -> Self {
        self.git_repo = Some(GitRepoConfig::new(linked_repo));
        self
    }

    pub fn with_source_of_truth(mut self, slot: SlotType) -> Self {
        self.source_of_truth = slot;
        self
    }

    /// Whether a slot is configured and enabled
    pub fn has_slot(&self, slot: SlotType) -> bool {
        match slot {
            SlotType::Git => self.git_repo.as_ref().is_some_and(|g| g.enabled),
            SlotType::Local => self.local_file.as_ref().is_some_and(|l| l.enabled),
            SlotType::Browser => self.browser_storage.as_ref().is_some_and(|b| b.enabled),
        }
    }

    /// Enabled slots in discovery order
    pub fn slots(&self) -> Vec<SlotType> {
        SlotType::ALL
            .into_iter()
            .filter(|s| self.has_slot(*s))
            .collect()
    }
}

/// Health of a universe's Git sync engine, as reported by the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub has_changes: bool,
    #[serde(default)]
    pub is_in_error_backoff: bool,
    #[serde(default = "enabled")]
    pub is_healthy: bool,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub consecutive_errors: u32,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            is_paused: false,
            has_changes: false,
            is_in_error_backoff: false,
            is_healthy: true,
            last_sync: None,
            last_error: None,
            consecutive_errors: 0,
        }
    }
}

/// Errors that can occur in universe handling
#[derive(Error, Debug)]
pub enum UniverseError {
    #[error("Universe '{0}' not found")]
    NotFound(String),

    #[error("Universe '{0}' already exists")]
    AlreadyExists(String),

    #[error("Universe '{slug}' has no {slot} storage slot")]
    SlotMissing { slug: String, slot: SlotType },

    #[error("Unknown storage slot: {0} (expected git, local or browser)")]
    UnknownSlot(String),

    #[error("Failed to parse universe registry: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type UniverseResult<T> = Result<T, UniverseError>;
