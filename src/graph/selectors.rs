//! Derived projections over a `GraphState`
//!
//! Nothing here mutates; every selector recomputes from a snapshot.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::store::GraphState;
use super::store_models::EntityKind;
use super::StoreError;

/// One entry of the open-graph strip
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenGraphView {
    pub id: String,
    pub name: String,
    pub color: String,
    pub is_active: bool,
    pub is_expanded: bool,
    pub defining_node_id: Option<String>,
    pub instance_count: usize,
}

pub fn open_graph_views(state: &GraphState) -> Vec<OpenGraphView> {
    let tabs = state.tabs();
    tabs.open_graph_ids
        .iter()
        .filter_map(|id| state.graphs().get(id))
        .map(|g| OpenGraphView {
            id: g.id.clone(),
            name: g.name.clone(),
            color: g.color.clone(),
            is_active: tabs.active_graph_id.as_deref() == Some(g.id.as_str()),
            is_expanded: tabs.expanded_graph_ids.contains(&g.id),
            defining_node_id: g.defining_node_ids.first().cloned(),
            instance_count: g.instances.len(),
        })
        .collect()
}

/// The prototype followed by its ancestors via `type_node_id`.
///
/// Stops at the first repeated id, so a malformed chain still terminates.
pub fn type_chain(state: &GraphState, prototype_id: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = state.prototypes().get(prototype_id);
    while let Some(proto) = current {
        if !seen.insert(proto.id.clone()) {
            break;
        }
        chain.push(proto.id.clone());
        current = proto
            .type_node_id
            .as_ref()
            .and_then(|t| state.prototypes().get(t));
    }
    chain
}

/// Prototypes directly placed inside any of a prototype's definition graphs
fn definition_children(state: &GraphState, prototype_id: &str) -> BTreeSet<String> {
    state
        .prototypes()
        .get(prototype_id)
        .map(|p| {
            p.definition_graph_ids
                .iter()
                .filter_map(|g| state.graphs().get(g))
                .flat_map(|g| g.instances.values().map(|i| i.prototype_id.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// A prototype's decomposition, expanded to a bounded depth
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionTree {
    pub prototype_id: String,
    pub name: String,
    /// Already expanded higher up this branch; not expanded again
    pub recursive: bool,
    /// Has children that were cut off by the depth bound
    pub truncated: bool,
    pub children: Vec<DefinitionTree>,
}

/// Expand definition graphs from `prototype_id` down to `max_depth` levels.
///
/// Self-containing definitions are legal; a prototype reappearing on its own
/// branch is reported with `recursive = true` and not expanded again.
pub fn definition_tree(
    state: &GraphState,
    prototype_id: &str,
    max_depth: usize,
) -> Result<DefinitionTree, StoreError> {
    if !state.prototypes().contains_key(prototype_id) {
        return Err(StoreError::not_found(EntityKind::Prototype, prototype_id));
    }
    let mut path = Vec::new();
    Ok(expand(state, prototype_id, max_depth, &mut path))
}

fn expand(
    state: &GraphState,
    prototype_id: &str,
    remaining: usize,
    path: &mut Vec<String>,
) -> DefinitionTree {
    let name = state
        .prototypes()
        .get(prototype_id)
        .map(|p| p.name.clone())
        .unwrap_or_default();
    let mut node = DefinitionTree {
        prototype_id: prototype_id.to_string(),
        name,
        recursive: path.iter().any(|p| p == prototype_id),
        truncated: false,
        children: Vec::new(),
    };
    if node.recursive {
        return node;
    }

    let children = definition_children(state, prototype_id);
    if remaining == 0 {
        node.truncated = !children.is_empty();
        return node;
    }

    path.push(prototype_id.to_string());
    node.children = children
        .iter()
        .map(|child| expand(state, child, remaining - 1, path))
        .collect();
    path.pop();
    node
}

/// Find prototypes whose definitions contain themselves, directly or not.
///
/// Runs Tarjan's SCC over the prototype -> (definition graph) -> placed
/// prototype relation. Each cycle is sorted; cycles are sorted largest first.
pub fn definition_cycles(state: &GraphState) -> Vec<Vec<String>> {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for id in state.prototypes().keys() {
        index.insert(id.as_str(), graph.add_node(id.clone()));
    }

    let mut self_loops = HashSet::new();
    for id in state.prototypes().keys() {
        for child in definition_children(state, id) {
            if let (Some(&from), Some(&to)) = (index.get(id.as_str()), index.get(child.as_str())) {
                if from == to {
                    self_loops.insert(from);
                }
                graph.add_edge(from, to, ());
            }
        }
    }

    let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || self_loops.contains(&scc[0]))
        .map(|scc| {
            let mut ids: Vec<String> = scc
                .iter()
                .filter_map(|&idx| graph.node_weight(idx).cloned())
                .collect();
            ids.sort();
            ids
        })
        .collect();

    cycles.sort();
    cycles.sort_by_key(|c| std::cmp::Reverse(c.len()));
    cycles
}

/// One broken invariant found by `integrity_report`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityIssue {
    pub kind: EntityKind,
    pub id: String,
    pub problem: String,
}

impl IntegrityIssue {
    fn new(kind: EntityKind, id: &str, problem: String) -> Self {
        Self {
            kind,
            id: id.to_string(),
            problem,
        }
    }
}

/// Scan every cross-entity reference. Empty means the state is consistent.
///
/// Store actions keep these invariants; this exists for states assembled
/// from documents written by other tools.
pub fn integrity_report(state: &GraphState) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();
    let protos = state.prototypes();
    let graphs = state.graphs();

    for proto in protos.values() {
        if let Some(t) = &proto.type_node_id {
            if !protos.contains_key(t) {
                issues.push(IntegrityIssue::new(
                    EntityKind::Prototype,
                    &proto.id,
                    format!("type '{}' does not exist", t),
                ));
            }
        }
        for g in &proto.definition_graph_ids {
            match graphs.get(g) {
                None => issues.push(IntegrityIssue::new(
                    EntityKind::Prototype,
                    &proto.id,
                    format!("definition graph '{}' does not exist", g),
                )),
                Some(graph) if !graph.defining_node_ids.contains(&proto.id) => {
                    issues.push(IntegrityIssue::new(
                        EntityKind::Prototype,
                        &proto.id,
                        format!("definition graph '{}' does not list it as defining", g),
                    ))
                }
                Some(_) => {}
            }
        }
    }

    for graph in graphs.values() {
        for inst in graph.instances.values() {
            if !protos.contains_key(&inst.prototype_id) {
                issues.push(IntegrityIssue::new(
                    EntityKind::Instance,
                    &inst.id,
                    format!("prototype '{}' does not exist", inst.prototype_id),
                ));
            }
            for e in &inst.edge_ids {
                if !state.edges().get(e).is_some_and(|edge| edge.touches(&inst.id)) {
                    issues.push(IntegrityIssue::new(
                        EntityKind::Instance,
                        &inst.id,
                        format!("lists edge '{}' which does not touch it", e),
                    ));
                }
            }
        }
        for e in &graph.edge_ids {
            if !state.edges().contains_key(e) {
                issues.push(IntegrityIssue::new(
                    EntityKind::Graph,
                    &graph.id,
                    format!("lists missing edge '{}'", e),
                ));
            }
        }
        for p in &graph.defining_node_ids {
            match protos.get(p) {
                None => issues.push(IntegrityIssue::new(
                    EntityKind::Graph,
                    &graph.id,
                    format!("defining prototype '{}' does not exist", p),
                )),
                Some(proto) if !proto.definition_graph_ids.contains(&graph.id) => {
                    issues.push(IntegrityIssue::new(
                        EntityKind::Graph,
                        &graph.id,
                        format!("defining prototype '{}' does not list it as a definition", p),
                    ))
                }
                Some(_) => {}
            }
        }
    }

    for edge in state.edges().values() {
        let owner = graphs.values().find(|g| g.contains_edge(&edge.id));
        match owner {
            None => issues.push(IntegrityIssue::new(
                EntityKind::Edge,
                &edge.id,
                "belongs to no graph".to_string(),
            )),
            Some(graph) => {
                for endpoint in [&edge.source_id, &edge.destination_id] {
                    if !graph.contains_instance(endpoint) {
                        issues.push(IntegrityIssue::new(
                            EntityKind::Edge,
                            &edge.id,
                            format!("endpoint '{}' is not in graph '{}'", endpoint, graph.id),
                        ));
                    }
                }
            }
        }
    }

    issues
}
