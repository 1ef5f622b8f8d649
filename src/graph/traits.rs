//! Read-side interface shared by the store, snapshots and selectors

use super::store::GraphState;
use super::store_models::{Edge, Graph, NodeInstance, NodePrototype};
use std::collections::HashMap;

/// Common interface for reading graph entities
pub trait GraphQuery: Send + Sync {
    fn get_prototype(&self, id: &str) -> Option<&NodePrototype>;

    fn get_graph(&self, id: &str) -> Option<&Graph>;

    fn get_instance(&self, id: &str) -> Option<&NodeInstance>;

    fn get_edge(&self, id: &str) -> Option<&Edge>;

    fn all_prototypes(&self) -> Vec<&NodePrototype>;

    fn all_graphs(&self) -> Vec<&Graph>;

    /// Every placement of a prototype, across graphs
    fn instances_of(&self, prototype_id: &str) -> Vec<&NodeInstance> {
        self.all_graphs()
            .into_iter()
            .flat_map(|g| g.instances.values())
            .filter(|i| i.prototype_id == prototype_id)
            .collect()
    }

    /// Edges incident to an instance
    fn edges_of(&self, instance_id: &str) -> Vec<&Edge> {
        self.get_instance(instance_id)
            .map(|i| i.edge_ids.iter().filter_map(|e| self.get_edge(e)).collect())
            .unwrap_or_default()
    }

    /// Instances adjacent to an instance, in edge order
    fn neighbors(&self, instance_id: &str) -> Vec<&NodeInstance> {
        self.edges_of(instance_id)
            .into_iter()
            .filter_map(|e| e.other_end(instance_id))
            .filter_map(|id| self.get_instance(id))
            .collect()
    }

    fn stats(&self) -> HashMap<String, i64> {
        let graphs = self.all_graphs();
        let instances: usize = graphs.iter().map(|g| g.instances.len()).sum();
        let edges: usize = graphs.iter().map(|g| g.edge_ids.len()).sum();
        let defined = self
            .all_prototypes()
            .iter()
            .filter(|p| p.has_definitions())
            .count();

        let mut stats = HashMap::new();
        stats.insert("total_prototypes".to_string(), self.all_prototypes().len() as i64);
        stats.insert("total_graphs".to_string(), graphs.len() as i64);
        stats.insert("total_instances".to_string(), instances as i64);
        stats.insert("total_edges".to_string(), edges as i64);
        stats.insert("prototypes_with_definitions".to_string(), defined as i64);
        stats
    }
}

impl GraphQuery for GraphState {
    fn get_prototype(&self, id: &str) -> Option<&NodePrototype> {
        self.prototypes().get(id)
    }

    fn get_graph(&self, id: &str) -> Option<&Graph> {
        self.graphs().get(id)
    }

    fn get_instance(&self, id: &str) -> Option<&NodeInstance> {
        self.instance(id)
    }

    fn get_edge(&self, id: &str) -> Option<&Edge> {
        self.edges().get(id)
    }

    fn all_prototypes(&self) -> Vec<&NodePrototype> {
        self.prototypes().values().collect()
    }

    fn all_graphs(&self) -> Vec<&Graph> {
        self.graphs().values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::store::NewGraph;

    #[test]
    fn test_neighbors_and_stats() {
        let mut state = GraphState::new();
        state
            .create_new_graph(NewGraph::named("Farm").with_ids("g", "farm"))
            .unwrap();
        state.add_node_prototype(NodePrototype::new("cow", "Cow")).unwrap();
        state.add_node("g", NodeInstance::new("c1", "cow")).unwrap();
        state.add_node("g", NodeInstance::new("c2", "cow")).unwrap();
        state.add_edge("g", Edge::new("e", "c1", "c2")).unwrap();

        let ids: Vec<_> = state.neighbors("c1").iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c2"]);
        assert_eq!(state.instances_of("cow").len(), 2);

        let stats = state.stats();
        assert_eq!(stats["total_prototypes"], 2);
        assert_eq!(stats["total_edges"], 1);
        assert_eq!(stats["prototypes_with_definitions"], 1);
    }
}
