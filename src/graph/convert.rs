//! Data-conversion helpers between the store and self-contained documents
//!
//! `GraphDocument` carries one graph with everything it references, for
//! copying graphs between sessions. `SessionDocument` is the whole store and
//! is what local `.redstring` files hold.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::store::GraphState;
use super::store_models::{Edge, EntityKind, Graph, NodePrototype};
use super::tabs::{GraphTabs, RightPanelTabs};
use super::{StoreError, StoreResult};

pub const SESSION_FORMAT_VERSION: u32 = 1;

/// One graph plus the prototypes and edges it needs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    pub graph: Graph,
    pub edges: Vec<Edge>,
    /// Prototypes placed in the graph, edge types and defining prototypes
    pub prototypes: Vec<NodePrototype>,
}

impl GraphDocument {
    /// Export a graph from a state
    pub fn export(state: &GraphState, graph_id: &str) -> StoreResult<Self> {
        let graph = state
            .graphs()
            .get(graph_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Graph, graph_id))?;

        let edges: Vec<Edge> = graph
            .edge_ids
            .iter()
            .filter_map(|id| state.edges().get(id).cloned())
            .collect();

        let mut wanted: BTreeSet<&str> = graph
            .instances
            .values()
            .map(|i| i.prototype_id.as_str())
            .collect();
        wanted.extend(graph.defining_node_ids.iter().map(String::as_str));
        for edge in &edges {
            wanted.extend(edge.type_node_id.as_deref());
            wanted.extend(edge.definition_node_ids.iter().map(String::as_str));
        }

        let prototypes = wanted
            .into_iter()
            .filter_map(|id| state.prototypes().get(id).cloned())
            .collect();

        Ok(Self {
            graph,
            edges,
            prototypes,
        })
    }

    /// Merge this graph into a state.
    ///
    /// Prototypes already present (same id) are kept as they are. The graph
    /// and edge ids must be new. References from imported prototypes to
    /// graphs outside the document are dropped, since they would point at
    /// unrelated graphs of the target state.
    pub fn import_into(self, state: &mut GraphState) -> StoreResult<String> {
        if state.graphs.contains_key(&self.graph.id) {
            return Err(StoreError::already_exists(EntityKind::Graph, &self.graph.id));
        }
        if let Some(edge) = self.edges.iter().find(|e| state.edges.contains_key(&e.id)) {
            return Err(StoreError::already_exists(EntityKind::Edge, &edge.id));
        }
        if let Some(inst) = self
            .graph
            .instances
            .keys()
            .find(|id| state.graph_of_instance(id).is_some())
        {
            return Err(StoreError::already_exists(EntityKind::Instance, inst));
        }

        let mut draft = state.clone();
        let graph_id = self.graph.id.clone();
        for mut proto in self.prototypes {
            if draft.node_prototypes.contains_key(&proto.id) {
                continue;
            }
            proto.definition_graph_ids.retain(|g| g == &graph_id);
            draft.node_prototypes.insert(proto.id.clone(), proto);
        }

        let mut graph = self.graph;
        graph.defining_node_ids.retain(|p| draft.node_prototypes.contains_key(p));
        for proto in draft.node_prototypes.values() {
            if proto.definition_graph_ids.contains(&graph_id)
                && !graph.defining_node_ids.contains(&proto.id)
            {
                graph.defining_node_ids.push(proto.id.clone());
            }
        }
        for def in &graph.defining_node_ids {
            if let Some(proto) = draft.node_prototypes.get_mut(def) {
                if !proto.definition_graph_ids.contains(&graph_id) {
                    proto.definition_graph_ids.push(graph_id.clone());
                }
            }
        }
        draft.graphs.insert(graph_id.clone(), graph);
        for edge in self.edges {
            draft.edges.insert(edge.id.clone(), edge);
        }

        // Re-index instances through the normal constructor
        *state = GraphState::from_parts(
            draft.node_prototypes,
            draft.graphs,
            draft.edges,
            draft.tabs,
            draft.right_panel,
        );
        Ok(graph_id)
    }
}

/// The whole store, as written to a `.redstring` file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    pub format_version: u32,
    pub prototypes: Vec<NodePrototype>,
    pub graphs: Vec<Graph>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub tabs: GraphTabs,
    #[serde(default)]
    pub right_panel: RightPanelTabs,
}

impl SessionDocument {
    pub fn from_state(state: &GraphState) -> Self {
        Self {
            format_version: SESSION_FORMAT_VERSION,
            prototypes: state.prototypes().values().cloned().collect(),
            graphs: state.graphs().values().cloned().collect(),
            edges: state.edges().values().cloned().collect(),
            tabs: state.tabs().clone(),
            right_panel: state.right_panel().clone(),
        }
    }

    /// Rebuild a state. Tabs pointing at missing graphs are dropped.
    pub fn into_state(self) -> GraphState {
        let prototypes: BTreeMap<_, _> = self
            .prototypes
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        let graphs: BTreeMap<_, _> = self.graphs.into_iter().map(|g| (g.id.clone(), g)).collect();
        let edges: BTreeMap<_, _> = self.edges.into_iter().map(|e| (e.id.clone(), e)).collect();

        let mut tabs = self.tabs;
        tabs.open_graph_ids.retain(|id| graphs.contains_key(id));
        tabs.expanded_graph_ids.retain(|id| graphs.contains_key(id));
        if tabs
            .active_graph_id
            .as_ref()
            .is_some_and(|id| !tabs.open_graph_ids.contains(id))
        {
            tabs.active_graph_id = tabs.open_graph_ids.first().cloned();
            tabs.active_definition_node_id = None;
        }

        GraphState::from_parts(prototypes, graphs, edges, tabs, self.right_panel)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::store::NewGraph;
    use crate::graph::NodeInstance;

    fn kitchen() -> GraphState {
        let mut state = GraphState::new();
        state
            .create_new_graph(NewGraph::named("Kitchen").with_ids("g", "kitchen"))
            .unwrap();
        state.add_node_prototype(NodePrototype::new("pan", "Pan")).unwrap();
        state.add_node_prototype(NodePrototype::new("on", "Sits On")).unwrap();
        state.add_node("g", NodeInstance::new("i1", "pan")).unwrap();
        state.add_node("g", NodeInstance::new("i2", "kitchen")).unwrap();
        state
            .add_edge("g", Edge::directed("e1", "i1", "i2").with_type("on"))
            .unwrap();
        state
    }

    #[test]
    fn test_graph_document_round_trip_membership() {
        let source = kitchen();
        let doc = GraphDocument::export(&source, "g").unwrap();
        let json = serde_json::to_string(&doc).unwrap();
        let doc: GraphDocument = serde_json::from_str(&json).unwrap();

        let mut target = GraphState::new();
        doc.import_into(&mut target).unwrap();

        let original = &source.graphs()["g"];
        let rebuilt = &target.graphs()["g"];
        let ids = |g: &Graph| g.instance_ids().map(str::to_string).collect::<BTreeSet<_>>();
        let edges = |g: &Graph| g.edge_ids.iter().cloned().collect::<BTreeSet<_>>();
        assert_eq!(ids(original), ids(rebuilt));
        assert_eq!(edges(original), edges(rebuilt));
        assert_eq!(target.prototypes().len(), 3);
        assert_eq!(target.graph_of_instance("i1"), Some("g"));
        assert!(crate::graph::selectors::integrity_report(&target).is_empty());
    }

    #[test]
    fn test_import_keeps_definition_links_paired() {
        let mut source = kitchen();
        source
            .create_new_graph(NewGraph::named("Pantry").with_ids("g-pantry", "pantry"))
            .unwrap();
        source
            .update_node("kitchen", |p| p.definition_graph_ids.push("g-pantry".to_string()))
            .unwrap();
        let doc = GraphDocument::export(&source, "g").unwrap();

        // The target has an unrelated graph under the same id
        let mut target = GraphState::new();
        target
            .create_new_graph(NewGraph::named("Garage").with_ids("g-pantry", "garage"))
            .unwrap();
        doc.import_into(&mut target).unwrap();

        assert_eq!(target.prototypes()["kitchen"].definition_graph_ids, vec!["g"]);
        assert_eq!(target.graphs()["g-pantry"].defining_node_ids, vec!["garage"]);
        assert!(crate::graph::selectors::integrity_report(&target).is_empty());
    }

    #[test]
    fn test_import_refuses_existing_graph() {
        let mut state = kitchen();
        let doc = GraphDocument::export(&state, "g").unwrap();
        assert!(matches!(
            doc.import_into(&mut state),
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_session_document_round_trip() {
        let state = kitchen();
        let json = SessionDocument::from_state(&state).to_json().unwrap();
        let restored = SessionDocument::from_json(&json).unwrap().into_state();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_session_drops_tabs_for_missing_graphs() {
        let mut doc = SessionDocument::from_state(&kitchen());
        doc.tabs.open_graph_ids.push("gone".to_string());
        doc.tabs.active_graph_id = Some("gone".to_string());
        let state = doc.into_state();
        assert_eq!(state.tabs().open_graph_ids, vec!["g"]);
        assert_eq!(state.active_graph_id(), Some("g"));
    }
}
