//! Knowledge-graph data layer
//!
//! Prototypes, instances, edges and graphs held in a normalized
//! copy-on-write store, plus the tab projections the editor derives from them.

pub mod convert;
pub mod selectors;
pub mod store;
pub mod store_models;
pub mod tabs;
pub mod traits;

pub use convert::{GraphDocument, SessionDocument};
pub use store::{Action, GraphState, GraphStore, NewGraph};
pub use store_models::{
    Directionality, Edge, EntityKind, Graph, NodeInstance, NodePrototype,
};
pub use tabs::{GraphTabs, RightPanelTab, RightPanelTabKind, RightPanelTabs};
pub use traits::GraphQuery;

use thiserror::Error;

/// Errors raised by store actions. A failed action leaves the state untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: EntityKind, id: String },

    #[error("{kind} '{id}' references missing {missing_kind} '{missing_id}'")]
    DanglingReference {
        kind: EntityKind,
        id: String,
        missing_kind: EntityKind,
        missing_id: String,
    },

    #[error("{kind} '{id}' is still referenced by {referenced_by}")]
    InUse {
        kind: EntityKind,
        id: String,
        referenced_by: String,
    },

    #[error("the home tab cannot be closed or moved")]
    HomeTabLocked,

    #[error("edge '{edge_id}' cannot point toward '{endpoint_id}', which is not one of its endpoints")]
    InvalidDirectionality { edge_id: String, endpoint_id: String },
}

impl StoreError {
    pub fn not_found(kind: EntityKind, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn already_exists(kind: EntityKind, id: &str) -> Self {
        Self::AlreadyExists {
            kind,
            id: id.to_string(),
        }
    }

    pub fn dangling(kind: EntityKind, id: &str, missing_kind: EntityKind, missing_id: &str) -> Self {
        Self::DanglingReference {
            kind,
            id: id.to_string(),
            missing_kind,
            missing_id: missing_id.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
