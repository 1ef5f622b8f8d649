//! Bounded state snapshot pushed to the bridge

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::graph::{Edge, GraphState, NodeInstance, NodePrototype};

pub const DEFAULT_PROTOTYPE_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub id: String,
    pub name: String,
    pub instance_count: usize,
    pub edge_count: usize,
    pub is_open: bool,
}

/// Full contents of the active graph
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGraphSnapshot {
    pub id: String,
    pub name: String,
    pub defining_node_id: Option<String>,
    pub instances: Vec<NodeInstance>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSnapshot {
    pub prototypes: Vec<NodePrototype>,
    pub graphs: Vec<GraphSummary>,
    pub active_graph: Option<ActiveGraphSnapshot>,
    pub total_prototypes: usize,
    pub total_graphs: usize,
    pub total_edges: usize,
    /// More prototypes exist than were sent
    pub prototypes_truncated: bool,
}

impl BridgeSnapshot {
    /// Hex SHA-256 of the serialized snapshot, for skipping unchanged pushes
    pub fn content_hash(&self) -> String {
        // Serializing plain data cannot fail
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        Sha256::digest(&bytes)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

/// Project `state` into a snapshot holding at most `prototype_limit`
/// prototypes and only the active graph's instances and edges.
pub fn build_snapshot(state: &GraphState, prototype_limit: usize) -> BridgeSnapshot {
    let tabs = state.tabs();
    let graphs = state
        .graphs()
        .values()
        .map(|g| GraphSummary {
            id: g.id.clone(),
            name: g.name.clone(),
            instance_count: g.instances.len(),
            edge_count: g.edge_ids.len(),
            is_open: tabs.is_open(&g.id),
        })
        .collect();

    let active_graph = state
        .active_graph_id()
        .and_then(|id| state.graphs().get(id))
        .map(|g| ActiveGraphSnapshot {
            id: g.id.clone(),
            name: g.name.clone(),
            defining_node_id: state.active_definition_node_id().map(str::to_string),
            instances: g.instances.values().cloned().collect(),
            edges: g
                .edge_ids
                .iter()
                .filter_map(|e| state.edges().get(e).cloned())
                .collect(),
        });

    BridgeSnapshot {
        prototypes: state
            .prototypes()
            .values()
            .take(prototype_limit)
            .cloned()
            .collect(),
        graphs,
        active_graph,
        total_prototypes: state.prototypes().len(),
        total_graphs: state.graphs().len(),
        total_edges: state.edges().len(),
        prototypes_truncated: state.prototypes().len() > prototype_limit,
    }
}
