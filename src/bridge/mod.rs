//! Bridge between the graph store and an external agent process
//!
//! The store owner pushes bounded snapshots out and replays whitelisted
//! actions the external process queues. Network work happens on worker
//! threads connected to the owner by bounded channels; see [`BridgeService`].
//!
//! HTTP surface (all under `/api/bridge`):
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET  | `/health` | liveness |
//! | POST | `/register-store` | advertise callable actions |
//! | POST | `/state` | push snapshot |
//! | GET  | `/pending-actions` | pull queued actions |
//! | POST | `/action-completed` | ack success or failure |
//! | POST | `/action-feedback` | progress message for an action |
//! | GET  | `/check-save-trigger` | ask whether to persist now |

mod actions;
mod backoff;
mod client;
mod service;
mod snapshot;

pub use actions::{parse_action, whitelist, ActionSpec};
pub use backoff::ReconnectPolicy;
pub use client::{
    ActionCompleted, ActionFeedback, BridgeClient, BridgeTransport, HealthStatus, PendingAction,
};
pub use service::{BridgeHandle, BridgeService, BridgeSettings, BridgeStats, SaveTarget};
pub use snapshot::{build_snapshot, ActiveGraphSnapshot, BridgeSnapshot, GraphSummary};

use thiserror::Error;

use crate::graph::StoreError;
use crate::persistence::PersistenceError;

/// Errors that can occur talking to the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge unreachable after {attempts} attempts: {last_error}")]
    Unreachable { attempts: u32, last_error: String },

    #[error("Bridge request failed: {0}")]
    Transport(String),

    #[error("Bridge error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("Failed to parse bridge response: {0}")]
    Parse(String),

    #[error("Action '{0}' is not exposed to the bridge")]
    UnknownAction(String),

    #[error("Invalid parameters for '{action}': {message}")]
    InvalidParams { action: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Save requested by bridge failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl BridgeError {
    /// Network-level failures worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Transport(_) => true,
            BridgeError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
