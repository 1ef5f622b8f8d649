//! Normalized graph store with copy-on-write transactions
//!
//! `GraphState` is plain cloneable data. Every mutation runs against a
//! draft clone and the draft replaces the shared state only if the whole
//! action succeeded, so a failed action never leaves partial changes and
//! readers holding a `snapshot()` never observe a half-applied cascade.
//!
//! `reduce` is the pure `(state, action) -> state` form; `GraphStore` is
//! the injectable handle the rest of the crate shares.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use super::store_models::{
    EntityKind, Graph, NodeInstance, NodePrototype, DEFAULT_GRAPH_NAME, DEFAULT_NODE_COLOR,
};
use super::tabs::{GraphTabs, RightPanelTabs};
use super::{StoreError, StoreResult};

pub use super::store_models::{Directionality, Edge};

/// Generate a fresh entity id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Input for `create_new_graph`: a graph plus its companion prototype
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewGraph {
    pub graph_id: String,
    pub prototype_id: String,
    #[serde(default = "default_graph_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_node_color")]
    pub color: String,
}

fn default_graph_name() -> String {
    DEFAULT_GRAPH_NAME.to_string()
}

fn default_node_color() -> String {
    DEFAULT_NODE_COLOR.to_string()
}

impl NewGraph {
    pub fn named(name: &str) -> Self {
        Self {
            graph_id: new_id(),
            prototype_id: new_id(),
            name: name.to_string(),
            description: String::new(),
            color: DEFAULT_NODE_COLOR.to_string(),
        }
    }

    pub fn with_ids(mut self, graph_id: &str, prototype_id: &str) -> Self {
        self.graph_id = graph_id.to_string();
        self.prototype_id = prototype_id.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = color.to_string();
        self
    }
}

impl Default for NewGraph {
    fn default() -> Self {
        Self::named(DEFAULT_GRAPH_NAME)
    }
}

/// Field-level changes for a prototype (wire-friendly form of `update_node`)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrototypePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub type_node_id: Option<String>,
}

impl PrototypePatch {
    fn apply_to(self, proto: &mut NodePrototype) {
        if let Some(name) = self.name {
            proto.name = name;
        }
        if let Some(description) = self.description {
            proto.description = description;
        }
        if let Some(color) = self.color {
            proto.color = color;
        }
        if let Some(type_node_id) = self.type_node_id {
            proto.type_node_id = Some(type_node_id);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

/// Every store mutation as data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", content = "params", rename_all = "camelCase")]
pub enum Action {
    AddNodePrototype(NodePrototype),
    #[serde(rename_all = "camelCase")]
    UpdateNodePrototype { prototype_id: String, patch: PrototypePatch },
    #[serde(rename_all = "camelCase")]
    RemoveNodePrototype { prototype_id: String },
    #[serde(rename_all = "camelCase")]
    AddNode { graph_id: String, instance: NodeInstance },
    #[serde(rename_all = "camelCase")]
    MoveNode { instance_id: String, x: f64, y: f64 },
    #[serde(rename_all = "camelCase")]
    RemoveNode { instance_id: String },
    #[serde(rename_all = "camelCase")]
    AddEdge { graph_id: String, edge: Edge },
    #[serde(rename_all = "camelCase")]
    RemoveEdge { edge_id: String },
    #[serde(rename_all = "camelCase")]
    ToggleEdgeArrow { edge_id: String, endpoint_id: String },
    CreateNewGraph(NewGraph),
    #[serde(rename_all = "camelCase")]
    CreateAndAssignGraphDefinition { prototype_id: String, graph_id: String },
    #[serde(rename_all = "camelCase")]
    UpdateGraph { graph_id: String, patch: GraphPatch },
    #[serde(rename_all = "camelCase")]
    DeleteGraph { graph_id: String },
    #[serde(rename_all = "camelCase")]
    OpenGraphTab {
        graph_id: String,
        #[serde(default)]
        definition_node_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    CloseGraphTab { graph_id: String },
    #[serde(rename_all = "camelCase")]
    SetActiveGraphTab { graph_id: String },
    #[serde(rename_all = "camelCase")]
    ToggleGraphExpanded { graph_id: String },
    #[serde(rename_all = "camelCase")]
    OpenRightPanelNodeTab { node_id: String },
    CloseRightPanelTab { index: usize },
    MoveRightPanelTab { from: usize, to: usize },
    ActivateRightPanelTab { index: usize },
}

impl Action {
    /// Wire name of the action
    pub fn name(&self) -> &'static str {
        match self {
            Action::AddNodePrototype(_) => "addNodePrototype",
            Action::UpdateNodePrototype { .. } => "updateNodePrototype",
            Action::RemoveNodePrototype { .. } => "removeNodePrototype",
            Action::AddNode { .. } => "addNode",
            Action::MoveNode { .. } => "moveNode",
            Action::RemoveNode { .. } => "removeNode",
            Action::AddEdge { .. } => "addEdge",
            Action::RemoveEdge { .. } => "removeEdge",
            Action::ToggleEdgeArrow { .. } => "toggleEdgeArrow",
            Action::CreateNewGraph(_) => "createNewGraph",
            Action::CreateAndAssignGraphDefinition { .. } => "createAndAssignGraphDefinition",
            Action::UpdateGraph { .. } => "updateGraph",
            Action::DeleteGraph { .. } => "deleteGraph",
            Action::OpenGraphTab { .. } => "openGraphTab",
            Action::CloseGraphTab { .. } => "closeGraphTab",
            Action::SetActiveGraphTab { .. } => "setActiveGraphTab",
            Action::ToggleGraphExpanded { .. } => "toggleGraphExpanded",
            Action::OpenRightPanelNodeTab { .. } => "openRightPanelNodeTab",
            Action::CloseRightPanelTab { .. } => "closeRightPanelTab",
            Action::MoveRightPanelTab { .. } => "moveRightPanelTab",
            Action::ActivateRightPanelTab { .. } => "activateRightPanelTab",
        }
    }
}

/// What an applied action produced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Outcome {
    Done,
    Created {
        id: String,
    },
    #[serde(rename_all = "camelCase")]
    CreatedGraph {
        graph_id: String,
        prototype_id: String,
    },
    /// Ids of edges removed by a cascade
    #[serde(rename_all = "camelCase")]
    Removed {
        edge_ids: Vec<String>,
    },
    Toggled {
        on: bool,
    },
}

/// All entities plus UI projection state for one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphState {
    pub(crate) node_prototypes: BTreeMap<String, NodePrototype>,
    pub(crate) graphs: BTreeMap<String, Graph>,
    pub(crate) edges: BTreeMap<String, Edge>,
    pub(crate) tabs: GraphTabs,
    pub(crate) right_panel: RightPanelTabs,
    /// instance id -> owning graph id
    instance_graph: HashMap<String, String>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a state from stored parts, rebuilding the instance index
    pub fn from_parts(
        node_prototypes: BTreeMap<String, NodePrototype>,
        graphs: BTreeMap<String, Graph>,
        edges: BTreeMap<String, Edge>,
        tabs: GraphTabs,
        right_panel: RightPanelTabs,
    ) -> Self {
        let mut instance_graph = HashMap::new();
        for graph in graphs.values() {
            for instance_id in graph.instances.keys() {
                instance_graph.insert(instance_id.clone(), graph.id.clone());
            }
        }
        Self {
            node_prototypes,
            graphs,
            edges,
            tabs,
            right_panel,
            instance_graph,
        }
    }

    pub fn prototypes(&self) -> &BTreeMap<String, NodePrototype> {
        &self.node_prototypes
    }

    pub fn graphs(&self) -> &BTreeMap<String, Graph> {
        &self.graphs
    }

    pub fn edges(&self) -> &BTreeMap<String, Edge> {
        &self.edges
    }

    pub fn tabs(&self) -> &GraphTabs {
        &self.tabs
    }

    pub fn right_panel(&self) -> &RightPanelTabs {
        &self.right_panel
    }

    pub fn active_graph_id(&self) -> Option<&str> {
        self.tabs.active_graph_id.as_deref()
    }

    pub fn active_definition_node_id(&self) -> Option<&str> {
        self.tabs.active_definition_node_id.as_deref()
    }

    pub fn graph_of_instance(&self, instance_id: &str) -> Option<&str> {
        self.instance_graph.get(instance_id).map(String::as_str)
    }

    pub fn instance(&self, instance_id: &str) -> Option<&NodeInstance> {
        let graph_id = self.instance_graph.get(instance_id)?;
        self.graphs.get(graph_id)?.instances.get(instance_id)
    }

    // ==================== Dispatch ====================

    /// Apply one action to this (draft) state
    pub fn apply(&mut self, action: Action) -> StoreResult<Outcome> {
        match action {
            Action::AddNodePrototype(proto) => {
                self.add_node_prototype(proto).map(|id| Outcome::Created { id })
            }
            Action::UpdateNodePrototype {
                prototype_id,
                patch,
            } => self
                .update_node(&prototype_id, |p| patch.apply_to(p))
                .map(|_| Outcome::Done),
            Action::RemoveNodePrototype { prototype_id } => self
                .remove_node_prototype(&prototype_id)
                .map(|_| Outcome::Done),
            Action::AddNode { graph_id, instance } => self
                .add_node(&graph_id, instance)
                .map(|id| Outcome::Created { id }),
            Action::MoveNode { instance_id, x, y } => self
                .update_node_instance(&instance_id, |n| {
                    n.x = x;
                    n.y = y;
                })
                .map(|_| Outcome::Done),
            Action::RemoveNode { instance_id } => self
                .remove_node(&instance_id)
                .map(|edge_ids| Outcome::Removed { edge_ids }),
            Action::AddEdge { graph_id, edge } => self
                .add_edge(&graph_id, edge)
                .map(|id| Outcome::Created { id }),
            Action::RemoveEdge { edge_id } => self.remove_edge(&edge_id).map(|_| Outcome::Removed {
                edge_ids: vec![edge_id],
            }),
            Action::ToggleEdgeArrow {
                edge_id,
                endpoint_id,
            } => self
                .toggle_edge_arrow(&edge_id, &endpoint_id)
                .map(|on| Outcome::Toggled { on }),
            Action::CreateNewGraph(new_graph) => {
                let prototype_id = new_graph.prototype_id.clone();
                self.create_new_graph(new_graph)
                    .map(|graph_id| Outcome::CreatedGraph {
                        graph_id,
                        prototype_id,
                    })
            }
            Action::CreateAndAssignGraphDefinition {
                prototype_id,
                graph_id,
            } => self
                .create_and_assign_graph_definition(&prototype_id, &graph_id)
                .map(|graph_id| Outcome::CreatedGraph {
                    graph_id,
                    prototype_id,
                }),
            Action::UpdateGraph { graph_id, patch } => self
                .update_graph(&graph_id, |g| {
                    if let Some(name) = patch.name {
                        g.name = name;
                    }
                    if let Some(description) = patch.description {
                        g.description = description;
                    }
                    if let Some(color) = patch.color {
                        g.color = color;
                    }
                })
                .map(|_| Outcome::Done),
            Action::DeleteGraph { graph_id } => self
                .delete_graph(&graph_id)
                .map(|edge_ids| Outcome::Removed { edge_ids }),
            Action::OpenGraphTab {
                graph_id,
                definition_node_id,
            } => self
                .open_graph_tab(&graph_id, definition_node_id)
                .map(|_| Outcome::Done),
            Action::CloseGraphTab { graph_id } => {
                self.close_graph_tab(&graph_id).map(|_| Outcome::Done)
            }
            Action::SetActiveGraphTab { graph_id } => {
                self.set_active_graph_tab(&graph_id).map(|_| Outcome::Done)
            }
            Action::ToggleGraphExpanded { graph_id } => self
                .toggle_graph_expanded(&graph_id)
                .map(|on| Outcome::Toggled { on }),
            Action::OpenRightPanelNodeTab { node_id } => self
                .open_right_panel_node_tab(&node_id)
                .map(|_| Outcome::Done),
            Action::CloseRightPanelTab { index } => {
                self.right_panel.close(index).map(|_| Outcome::Done)
            }
            Action::MoveRightPanelTab { from, to } => {
                self.right_panel.move_tab(from, to).map(|_| Outcome::Done)
            }
            Action::ActivateRightPanelTab { index } => {
                self.right_panel.activate(index).map(|_| Outcome::Done)
            }
        }
    }

    // ==================== Prototype Operations ====================

    pub fn add_node_prototype(&mut self, proto: NodePrototype) -> StoreResult<String> {
        if self.node_prototypes.contains_key(&proto.id) {
            return Err(StoreError::already_exists(EntityKind::Prototype, &proto.id));
        }
        self.check_prototype_refs(&proto)?;
        let id = proto.id.clone();
        self.link_definitions(&id, &[], &proto.definition_graph_ids);
        self.node_prototypes.insert(id.clone(), proto);
        Ok(id)
    }

    /// Run `f` over the prototype's draft. The id cannot change.
    ///
    /// Keeps denormalized copies in step: the right-panel tab title/subtitle,
    /// and the names of definition graphs that carried the old name.
    pub fn update_node<F>(&mut self, prototype_id: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut NodePrototype),
    {
        let mut draft = self
            .node_prototypes
            .get(prototype_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Prototype, prototype_id))?;
        let old_name = draft.name.clone();
        let old_definitions = draft.definition_graph_ids.clone();
        f(&mut draft);
        draft.id = prototype_id.to_string();
        self.check_prototype_refs(&draft)?;
        self.link_definitions(prototype_id, &old_definitions, &draft.definition_graph_ids);

        if draft.name != old_name {
            for graph_id in &draft.definition_graph_ids {
                if let Some(graph) = self.graphs.get_mut(graph_id) {
                    if graph.name == old_name {
                        graph.name = draft.name.clone();
                    }
                }
            }
        }
        self.right_panel
            .resync(prototype_id, &draft.name, &draft.description);
        self.node_prototypes.insert(prototype_id.to_string(), draft);
        Ok(())
    }

    /// Delete a prototype. Refused while anything still references it.
    pub fn remove_node_prototype(&mut self, prototype_id: &str) -> StoreResult<NodePrototype> {
        if !self.node_prototypes.contains_key(prototype_id) {
            return Err(StoreError::not_found(EntityKind::Prototype, prototype_id));
        }
        if let Some(referenced_by) = self.prototype_referrer(prototype_id) {
            return Err(StoreError::InUse {
                kind: EntityKind::Prototype,
                id: prototype_id.to_string(),
                referenced_by,
            });
        }

        for graph in self.graphs.values_mut() {
            graph.defining_node_ids.retain(|id| id != prototype_id);
        }
        self.right_panel.forget_node(prototype_id);
        if self.tabs.active_definition_node_id.as_deref() == Some(prototype_id) {
            self.tabs.active_definition_node_id = None;
        }
        self.node_prototypes
            .remove(prototype_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Prototype, prototype_id))
    }

    fn prototype_referrer(&self, prototype_id: &str) -> Option<String> {
        for graph in self.graphs.values() {
            if let Some(inst) = graph
                .instances
                .values()
                .find(|i| i.prototype_id == prototype_id)
            {
                return Some(format!("{} '{}'", EntityKind::Instance, inst.id));
            }
        }
        if let Some(proto) = self
            .node_prototypes
            .values()
            .find(|p| p.id != prototype_id && p.type_node_id.as_deref() == Some(prototype_id))
        {
            return Some(format!("{} '{}'", EntityKind::Prototype, proto.id));
        }
        self.edges
            .values()
            .find(|e| {
                e.type_node_id.as_deref() == Some(prototype_id)
                    || e.definition_node_ids.iter().any(|d| d == prototype_id)
            })
            .map(|e| format!("{} '{}'", EntityKind::Edge, e.id))
    }

    /// Mirror a prototype's definition list into each graph's defining nodes
    fn link_definitions(&mut self, prototype_id: &str, before: &[String], after: &[String]) {
        for graph_id in before.iter().filter(|g| !after.contains(g)) {
            if let Some(graph) = self.graphs.get_mut(graph_id) {
                graph.defining_node_ids.retain(|id| id != prototype_id);
            }
        }
        for graph_id in after {
            if let Some(graph) = self.graphs.get_mut(graph_id) {
                if !graph.defining_node_ids.iter().any(|id| id == prototype_id) {
                    graph.defining_node_ids.push(prototype_id.to_string());
                }
            }
        }
    }

    fn check_prototype_refs(&self, proto: &NodePrototype) -> StoreResult<()> {
        if let Some(type_id) = &proto.type_node_id {
            if type_id != &proto.id && !self.node_prototypes.contains_key(type_id) {
                return Err(StoreError::dangling(
                    EntityKind::Prototype,
                    &proto.id,
                    EntityKind::Prototype,
                    type_id,
                ));
            }
        }
        if let Some(missing) = proto
            .definition_graph_ids
            .iter()
            .find(|g| !self.graphs.contains_key(*g))
        {
            return Err(StoreError::dangling(
                EntityKind::Prototype,
                &proto.id,
                EntityKind::Graph,
                missing,
            ));
        }
        Ok(())
    }

    // ==================== Instance Operations ====================

    /// Place a new instance in a graph
    pub fn add_node(&mut self, graph_id: &str, mut instance: NodeInstance) -> StoreResult<String> {
        if !self.graphs.contains_key(graph_id) {
            return Err(StoreError::not_found(EntityKind::Graph, graph_id));
        }
        if self.instance_graph.contains_key(&instance.id) {
            return Err(StoreError::already_exists(EntityKind::Instance, &instance.id));
        }
        if !self.node_prototypes.contains_key(&instance.prototype_id) {
            return Err(StoreError::dangling(
                EntityKind::Instance,
                &instance.id,
                EntityKind::Prototype,
                &instance.prototype_id,
            ));
        }

        // Edges are attached through add_edge only
        instance.edge_ids.clear();
        let id = instance.id.clone();
        if let Some(graph) = self.graphs.get_mut(graph_id) {
            graph.instances.insert(id.clone(), instance);
        }
        self.instance_graph.insert(id.clone(), graph_id.to_string());
        Ok(id)
    }

    /// Run `f` over the instance's draft (position, scale, prototype)
    pub fn update_node_instance<F>(&mut self, instance_id: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut NodeInstance),
    {
        let graph_id = self
            .instance_graph
            .get(instance_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Instance, instance_id))?;
        let current = self
            .graphs
            .get(&graph_id)
            .and_then(|g| g.instances.get(instance_id))
            .ok_or_else(|| StoreError::not_found(EntityKind::Instance, instance_id))?;

        let mut draft = current.clone();
        f(&mut draft);
        draft.id = current.id.clone();
        draft.edge_ids = current.edge_ids.clone();
        if !self.node_prototypes.contains_key(&draft.prototype_id) {
            return Err(StoreError::dangling(
                EntityKind::Instance,
                instance_id,
                EntityKind::Prototype,
                &draft.prototype_id,
            ));
        }

        if let Some(graph) = self.graphs.get_mut(&graph_id) {
            graph.instances.insert(instance_id.to_string(), draft);
        }
        Ok(())
    }

    /// Remove an instance and cascade to its incident edges.
    ///
    /// Returns the ids of the removed edges. The edges leave the global pool,
    /// every graph's edge list and every remaining instance's edge list.
    pub fn remove_node(&mut self, instance_id: &str) -> StoreResult<Vec<String>> {
        let graph_id = self
            .instance_graph
            .remove(instance_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Instance, instance_id))?;
        let instance = self
            .graphs
            .get_mut(&graph_id)
            .and_then(|g| g.instances.remove(instance_id))
            .ok_or_else(|| StoreError::not_found(EntityKind::Instance, instance_id))?;

        let incident: BTreeSet<String> = instance
            .edge_ids
            .iter()
            .cloned()
            .chain(
                self.edges
                    .values()
                    .filter(|e| e.touches(instance_id))
                    .map(|e| e.id.clone()),
            )
            .collect();

        for edge_id in &incident {
            self.edges.remove(edge_id);
        }
        self.scrub_edges(&incident);

        tracing::debug!(
            "Removed instance {} and {} incident edges",
            instance_id,
            incident.len()
        );
        Ok(incident.into_iter().collect())
    }

    fn scrub_edges(&mut self, edge_ids: &BTreeSet<String>) {
        if edge_ids.is_empty() {
            return;
        }
        for graph in self.graphs.values_mut() {
            graph.edge_ids.retain(|e| !edge_ids.contains(e));
            for inst in graph.instances.values_mut() {
                inst.edge_ids.retain(|e| !edge_ids.contains(e));
            }
        }
    }

    // ==================== Edge Operations ====================

    /// Connect two instances of the same graph
    pub fn add_edge(&mut self, graph_id: &str, edge: Edge) -> StoreResult<String> {
        let graph = self
            .graphs
            .get(graph_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Graph, graph_id))?;
        if self.edges.contains_key(&edge.id) {
            return Err(StoreError::already_exists(EntityKind::Edge, &edge.id));
        }
        for endpoint in [&edge.source_id, &edge.destination_id] {
            if !graph.contains_instance(endpoint) {
                return Err(StoreError::dangling(
                    EntityKind::Edge,
                    &edge.id,
                    EntityKind::Instance,
                    endpoint,
                ));
            }
        }
        self.check_edge_refs(&edge)?;

        let id = edge.id.clone();
        let endpoints: BTreeSet<String> =
            [edge.source_id.clone(), edge.destination_id.clone()].into();
        if let Some(graph) = self.graphs.get_mut(graph_id) {
            graph.edge_ids.push(id.clone());
            for endpoint in &endpoints {
                if let Some(inst) = graph.instances.get_mut(endpoint) {
                    inst.edge_ids.push(id.clone());
                }
            }
        }
        self.edges.insert(id.clone(), edge);
        Ok(id)
    }

    /// Run `f` over the edge's draft. Id and endpoints cannot change.
    pub fn update_edge<F>(&mut self, edge_id: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Edge),
    {
        let current = self
            .edges
            .get(edge_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Edge, edge_id))?;
        let mut draft = current.clone();
        f(&mut draft);
        draft.id = current.id.clone();
        draft.source_id = current.source_id.clone();
        draft.destination_id = current.destination_id.clone();
        self.check_edge_refs(&draft)?;
        self.edges.insert(edge_id.to_string(), draft);
        Ok(())
    }

    /// Flip the arrowhead at one endpoint; returns whether it is now shown
    pub fn toggle_edge_arrow(&mut self, edge_id: &str, endpoint_id: &str) -> StoreResult<bool> {
        let edge = self
            .edges
            .get_mut(edge_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Edge, edge_id))?;
        if !edge.touches(endpoint_id) {
            return Err(StoreError::InvalidDirectionality {
                edge_id: edge_id.to_string(),
                endpoint_id: endpoint_id.to_string(),
            });
        }
        Ok(edge.directionality.toggle(endpoint_id))
    }

    pub fn remove_edge(&mut self, edge_id: &str) -> StoreResult<Edge> {
        let edge = self
            .edges
            .remove(edge_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Edge, edge_id))?;
        let removed: BTreeSet<String> = [edge_id.to_string()].into();
        self.scrub_edges(&removed);
        Ok(edge)
    }

    fn check_edge_refs(&self, edge: &Edge) -> StoreResult<()> {
        let prototype_refs = edge
            .type_node_id
            .iter()
            .chain(edge.definition_node_ids.iter());
        for proto_id in prototype_refs {
            if !self.node_prototypes.contains_key(proto_id) {
                return Err(StoreError::dangling(
                    EntityKind::Edge,
                    &edge.id,
                    EntityKind::Prototype,
                    proto_id,
                ));
            }
        }
        if let Some(stray) = edge
            .directionality
            .arrows_toward
            .iter()
            .find(|id| !edge.touches(id))
        {
            return Err(StoreError::InvalidDirectionality {
                edge_id: edge.id.clone(),
                endpoint_id: stray.clone(),
            });
        }
        Ok(())
    }

    // ==================== Graph Operations ====================

    /// Create a graph together with the prototype that names it, then open it
    pub fn create_new_graph(&mut self, new_graph: NewGraph) -> StoreResult<String> {
        if self.graphs.contains_key(&new_graph.graph_id) {
            return Err(StoreError::already_exists(
                EntityKind::Graph,
                &new_graph.graph_id,
            ));
        }
        if self.node_prototypes.contains_key(&new_graph.prototype_id) {
            return Err(StoreError::already_exists(
                EntityKind::Prototype,
                &new_graph.prototype_id,
            ));
        }

        let mut graph = Graph::new(&new_graph.graph_id, &new_graph.name)
            .with_description(&new_graph.description)
            .with_color(&new_graph.color);
        graph.defining_node_ids.push(new_graph.prototype_id.clone());

        let proto = NodePrototype::new(&new_graph.prototype_id, &new_graph.name)
            .with_description(&new_graph.description)
            .with_color(&new_graph.color)
            .with_definition_graph(&new_graph.graph_id);

        let graph_id = graph.id.clone();
        self.graphs.insert(graph_id.clone(), graph);
        self.node_prototypes.insert(proto.id.clone(), proto);
        self.tabs
            .open(&graph_id, Some(new_graph.prototype_id.clone()));
        Ok(graph_id)
    }

    /// Give an existing prototype one more definition graph and activate it
    pub fn create_and_assign_graph_definition(
        &mut self,
        prototype_id: &str,
        graph_id: &str,
    ) -> StoreResult<String> {
        if self.graphs.contains_key(graph_id) {
            return Err(StoreError::already_exists(EntityKind::Graph, graph_id));
        }
        let proto = self
            .node_prototypes
            .get_mut(prototype_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Prototype, prototype_id))?;

        let mut graph = Graph::new(graph_id, &proto.name)
            .with_description(&proto.description)
            .with_color(&proto.color);
        graph.defining_node_ids.push(prototype_id.to_string());
        proto.definition_graph_ids.push(graph_id.to_string());

        self.graphs.insert(graph_id.to_string(), graph);
        self.tabs.open(graph_id, Some(prototype_id.to_string()));
        Ok(graph_id.to_string())
    }

    /// Run `f` over the graph's metadata (name, description, color).
    ///
    /// Membership is owned by node/edge actions; changes `f` makes to
    /// instances, edges or defining nodes are not kept. A rename carries over
    /// to defining prototypes that shared the old name.
    pub fn update_graph<F>(&mut self, graph_id: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Graph),
    {
        let graph = self
            .graphs
            .get_mut(graph_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Graph, graph_id))?;
        let mut draft = graph.clone();
        f(&mut draft);

        let old_name = std::mem::replace(&mut graph.name, draft.name);
        graph.description = draft.description;
        graph.color = draft.color;

        if graph.name != old_name {
            let new_name = graph.name.clone();
            let defining = graph.defining_node_ids.clone();
            for proto_id in defining {
                let renamed = match self.node_prototypes.get_mut(&proto_id) {
                    Some(proto) if proto.name == old_name => {
                        proto.name = new_name.clone();
                        Some(proto.description.clone())
                    }
                    _ => None,
                };
                if let Some(description) = renamed {
                    self.right_panel.resync(&proto_id, &new_name, &description);
                }
            }
        }
        Ok(())
    }

    /// Delete a graph with its instances and edges. Returns removed edge ids.
    pub fn delete_graph(&mut self, graph_id: &str) -> StoreResult<Vec<String>> {
        let graph = self
            .graphs
            .remove(graph_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Graph, graph_id))?;

        for instance_id in graph.instances.keys() {
            self.instance_graph.remove(instance_id);
        }
        let doomed: BTreeSet<String> = graph.edge_ids.iter().cloned().collect();
        for edge_id in &doomed {
            self.edges.remove(edge_id);
        }
        self.scrub_edges(&doomed);

        for proto in self.node_prototypes.values_mut() {
            proto.definition_graph_ids.retain(|g| g != graph_id);
        }
        if self.tabs.is_open(graph_id) {
            self.close_graph_tab(graph_id)?;
        }
        self.tabs.expanded_graph_ids.remove(graph_id);
        Ok(doomed.into_iter().collect())
    }

    // ==================== Tab Operations ====================

    pub fn open_graph_tab(
        &mut self,
        graph_id: &str,
        definition_node_id: Option<String>,
    ) -> StoreResult<()> {
        let graph = self
            .graphs
            .get(graph_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Graph, graph_id))?;
        if let Some(def) = &definition_node_id {
            if !self.node_prototypes.contains_key(def) {
                return Err(StoreError::dangling(
                    EntityKind::GraphTab,
                    graph_id,
                    EntityKind::Prototype,
                    def,
                ));
            }
        }
        let definition_node_id =
            definition_node_id.or_else(|| graph.defining_node_ids.first().cloned());
        self.tabs.open(graph_id, definition_node_id);
        Ok(())
    }

    pub fn close_graph_tab(&mut self, graph_id: &str) -> StoreResult<()> {
        if self.tabs.close(graph_id)? {
            self.tabs.active_definition_node_id = self
                .tabs
                .active_graph_id
                .as_ref()
                .and_then(|id| self.graphs.get(id))
                .and_then(|g| g.defining_node_ids.first().cloned());
        }
        Ok(())
    }

    pub fn set_active_graph_tab(&mut self, graph_id: &str) -> StoreResult<()> {
        let definition = self
            .graphs
            .get(graph_id)
            .and_then(|g| g.defining_node_ids.first().cloned());
        self.tabs.activate(graph_id, definition)
    }

    pub fn toggle_graph_expanded(&mut self, graph_id: &str) -> StoreResult<bool> {
        if !self.graphs.contains_key(graph_id) {
            return Err(StoreError::not_found(EntityKind::Graph, graph_id));
        }
        Ok(self.tabs.toggle_expanded(graph_id))
    }

    pub fn open_right_panel_node_tab(&mut self, node_id: &str) -> StoreResult<usize> {
        let proto = self
            .node_prototypes
            .get(node_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Prototype, node_id))?;
        Ok(self
            .right_panel
            .open_node(node_id, &proto.name, &proto.description))
    }
}

/// Pure reducer: the next state, or the error that left `state` as it was
pub fn reduce(state: &GraphState, action: Action) -> StoreResult<(GraphState, Outcome)> {
    let mut draft = state.clone();
    let outcome = draft.apply(action)?;
    Ok((draft, outcome))
}

/// Shared handle over the current `GraphState`.
///
/// Passed explicitly (usually as `Arc<GraphStore>`) to every consumer.
pub struct GraphStore {
    state: RwLock<Arc<GraphState>>,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self::from_state(GraphState::new())
    }

    pub fn from_state(state: GraphState) -> Self {
        Self {
            state: RwLock::new(Arc::new(state)),
        }
    }

    // ==================== Lock Helpers ====================
    //
    // A poisoned lock means a thread panicked mid-swap; the Arc it guards is
    // still a complete state, but we treat poisoning as unrecoverable.

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, Arc<GraphState>> {
        self.state
            .read()
            .expect("state lock poisoned: a thread panicked while holding this lock")
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, Arc<GraphState>> {
        self.state
            .write()
            .expect("state lock poisoned: a thread panicked while holding this lock")
    }

    /// Immutable view of the current state
    pub fn snapshot(&self) -> Arc<GraphState> {
        Arc::clone(&self.read_state())
    }

    /// Replace the whole state (e.g. after loading a document)
    pub fn replace(&self, state: GraphState) {
        *self.write_state() = Arc::new(state);
    }

    /// Run `f` against a draft and publish it if `f` succeeds
    fn commit<T, F>(&self, label: &str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut GraphState) -> StoreResult<T>,
    {
        let mut guard = self.write_state();
        let mut draft = GraphState::clone(&guard);
        match f(&mut draft) {
            Ok(value) => {
                *guard = Arc::new(draft);
                tracing::debug!("{} applied", label);
                Ok(value)
            }
            Err(e) => {
                tracing::warn!("{} rejected: {}", label, e);
                Err(e)
            }
        }
    }

    pub fn dispatch(&self, action: Action) -> StoreResult<Outcome> {
        let label = action.name();
        self.commit(label, |draft| draft.apply(action))
    }

    pub fn add_node_prototype(&self, proto: NodePrototype) -> StoreResult<String> {
        self.commit("addNodePrototype", |s| s.add_node_prototype(proto))
    }

    pub fn update_node<F>(&self, prototype_id: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut NodePrototype),
    {
        self.commit("updateNode", |s| s.update_node(prototype_id, f))
    }

    pub fn remove_node_prototype(&self, prototype_id: &str) -> StoreResult<NodePrototype> {
        self.commit("removeNodePrototype", |s| s.remove_node_prototype(prototype_id))
    }

    pub fn add_node(&self, graph_id: &str, instance: NodeInstance) -> StoreResult<String> {
        self.commit("addNode", |s| s.add_node(graph_id, instance))
    }

    pub fn update_node_instance<F>(&self, instance_id: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut NodeInstance),
    {
        self.commit("updateNodeInstance", |s| s.update_node_instance(instance_id, f))
    }

    pub fn remove_node(&self, instance_id: &str) -> StoreResult<Vec<String>> {
        self.commit("removeNode", |s| s.remove_node(instance_id))
    }

    pub fn add_edge(&self, graph_id: &str, edge: Edge) -> StoreResult<String> {
        self.commit("addEdge", |s| s.add_edge(graph_id, edge))
    }

    pub fn update_edge<F>(&self, edge_id: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Edge),
    {
        self.commit("updateEdge", |s| s.update_edge(edge_id, f))
    }

    pub fn toggle_edge_arrow(&self, edge_id: &str, endpoint_id: &str) -> StoreResult<bool> {
        self.commit("toggleEdgeArrow", |s| s.toggle_edge_arrow(edge_id, endpoint_id))
    }

    pub fn remove_edge(&self, edge_id: &str) -> StoreResult<Edge> {
        self.commit("removeEdge", |s| s.remove_edge(edge_id))
    }

    /// Returns `(graph_id, prototype_id)`
    pub fn create_new_graph(&self, new_graph: NewGraph) -> StoreResult<(String, String)> {
        let prototype_id = new_graph.prototype_id.clone();
        self.commit("createNewGraph", |s| s.create_new_graph(new_graph))
            .map(|graph_id| (graph_id, prototype_id))
    }

    /// Returns the new graph's id
    pub fn create_and_assign_graph_definition(&self, prototype_id: &str) -> StoreResult<String> {
        let graph_id = new_id();
        self.commit("createAndAssignGraphDefinition", |s| {
            s.create_and_assign_graph_definition(prototype_id, &graph_id)
        })
    }

    pub fn update_graph<F>(&self, graph_id: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Graph),
    {
        self.commit("updateGraph", |s| s.update_graph(graph_id, f))
    }

    pub fn delete_graph(&self, graph_id: &str) -> StoreResult<Vec<String>> {
        self.commit("deleteGraph", |s| s.delete_graph(graph_id))
    }

    pub fn open_graph_tab(&self, graph_id: &str, definition_node_id: Option<&str>) -> StoreResult<()> {
        let definition_node_id = definition_node_id.map(str::to_string);
        self.commit("openGraphTab", |s| s.open_graph_tab(graph_id, definition_node_id))
    }

    pub fn close_graph_tab(&self, graph_id: &str) -> StoreResult<()> {
        self.commit("closeGraphTab", |s| s.close_graph_tab(graph_id))
    }

    pub fn set_active_graph_tab(&self, graph_id: &str) -> StoreResult<()> {
        self.commit("setActiveGraphTab", |s| s.set_active_graph_tab(graph_id))
    }

    pub fn toggle_graph_expanded(&self, graph_id: &str) -> StoreResult<bool> {
        self.commit("toggleGraphExpanded", |s| s.toggle_graph_expanded(graph_id))
    }

    pub fn open_right_panel_node_tab(&self, node_id: &str) -> StoreResult<usize> {
        self.commit("openRightPanelNodeTab", |s| s.open_right_panel_node_tab(node_id))
    }

    pub fn close_right_panel_tab(&self, index: usize) -> StoreResult<()> {
        self.commit("closeRightPanelTab", |s| s.right_panel.close(index))
    }

    pub fn move_right_panel_tab(&self, from: usize, to: usize) -> StoreResult<()> {
        self.commit("moveRightPanelTab", |s| s.right_panel.move_tab(from, to))
    }

    pub fn activate_right_panel_tab(&self, index: usize) -> StoreResult<()> {
        self.commit("activateRightPanelTab", |s| s.right_panel.activate(index))
    }
}
