use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const DEFAULT_NODE_COLOR: &str = "#800000";
pub const DEFAULT_GRAPH_NAME: &str = "New Thing";

/// Entity families held by the graph store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Prototype,
    Instance,
    Edge,
    Graph,
    GraphTab,
    RightPanelTab,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prototype => write!(f, "node prototype"),
            Self::Instance => write!(f, "node instance"),
            Self::Edge => write!(f, "edge"),
            Self::Graph => write!(f, "graph"),
            Self::GraphTab => write!(f, "graph tab"),
            Self::RightPanelTab => write!(f, "right panel tab"),
        }
    }
}

/// A reusable "type" of thing; instances reference it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePrototype {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_color")]
    pub color: String,
    /// Parent type (single-inheritance chain)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_node_id: Option<String>,
    /// Graphs that decompose this prototype, in order
    #[serde(default)]
    pub definition_graph_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub equivalent_classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_links: Vec<String>,
}

impl NodePrototype {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            color: DEFAULT_NODE_COLOR.to_string(),
            type_node_id: None,
            definition_graph_ids: Vec::new(),
            equivalent_classes: Vec::new(),
            external_links: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = color.to_string();
        self
    }

    pub fn with_type(mut self, type_node_id: &str) -> Self {
        self.type_node_id = Some(type_node_id.to_string());
        self
    }

    pub fn with_definition_graph(mut self, graph_id: &str) -> Self {
        self.definition_graph_ids.push(graph_id.to_string());
        self
    }

    pub fn with_equivalent_class(mut self, iri: &str) -> Self {
        self.equivalent_classes.push(iri.to_string());
        self
    }

    pub fn with_external_link(mut self, url: &str) -> Self {
        self.external_links.push(url.to_string());
        self
    }

    pub fn has_definitions(&self) -> bool {
        !self.definition_graph_ids.is_empty()
    }
}

fn default_color() -> String {
    DEFAULT_NODE_COLOR.to_string()
}

fn default_scale() -> f64 {
    1.0
}

/// A placed occurrence of a prototype inside one graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeInstance {
    pub id: String,
    pub prototype_id: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Incident edges, kept in sync by the store
    #[serde(default)]
    pub edge_ids: Vec<String>,
}

impl NodeInstance {
    pub fn new(id: &str, prototype_id: &str) -> Self {
        Self {
            id: id.to_string(),
            prototype_id: prototype_id.to_string(),
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            edge_ids: Vec::new(),
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

/// Which endpoints render an arrowhead. Membership only; order is irrelevant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Directionality {
    #[serde(default)]
    pub arrows_toward: BTreeSet<String>,
}

impl Directionality {
    pub fn toward(endpoint_id: &str) -> Self {
        let mut arrows_toward = BTreeSet::new();
        arrows_toward.insert(endpoint_id.to_string());
        Self { arrows_toward }
    }

    pub fn points_to(&self, endpoint_id: &str) -> bool {
        self.arrows_toward.contains(endpoint_id)
    }

    /// Flip the arrowhead at one endpoint; returns whether it is now present
    pub fn toggle(&mut self, endpoint_id: &str) -> bool {
        if self.arrows_toward.remove(endpoint_id) {
            false
        } else {
            self.arrows_toward.insert(endpoint_id.to_string());
            true
        }
    }
}

/// A relation between two node instances of the same graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub destination_id: String,
    #[serde(default)]
    pub name: String,
    /// The edge's own type, itself a prototype
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub definition_node_ids: Vec<String>,
    #[serde(default)]
    pub directionality: Directionality,
}

impl Edge {
    pub fn new(id: &str, source_id: &str, destination_id: &str) -> Self {
        Self {
            id: id.to_string(),
            source_id: source_id.to_string(),
            destination_id: destination_id.to_string(),
            name: String::new(),
            type_node_id: None,
            definition_node_ids: Vec::new(),
            directionality: Directionality::default(),
        }
    }

    /// Edge with a single arrowhead at the destination
    pub fn directed(id: &str, source_id: &str, destination_id: &str) -> Self {
        Self::new(id, source_id, destination_id).with_arrow_toward(destination_id)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_type(mut self, type_node_id: &str) -> Self {
        self.type_node_id = Some(type_node_id.to_string());
        self
    }

    pub fn with_definition_node(mut self, prototype_id: &str) -> Self {
        self.definition_node_ids.push(prototype_id.to_string());
        self
    }

    pub fn with_arrow_toward(mut self, endpoint_id: &str) -> Self {
        self.directionality
            .arrows_toward
            .insert(endpoint_id.to_string());
        self
    }

    pub fn touches(&self, instance_id: &str) -> bool {
        self.source_id == instance_id || self.destination_id == instance_id
    }

    /// The endpoint on the other side of `instance_id`
    pub fn other_end(&self, instance_id: &str) -> Option<&str> {
        if self.source_id == instance_id {
            Some(&self.destination_id)
        } else if self.destination_id == instance_id {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

/// A named collection of node instances and the edges between them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub color: String,
    /// Owned instances, keyed by instance id
    #[serde(default)]
    pub instances: BTreeMap<String, NodeInstance>,
    #[serde(default)]
    pub edge_ids: Vec<String>,
    /// Prototypes this graph is a definition of
    #[serde(default)]
    pub defining_node_ids: Vec<String>,
}

impl Graph {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            color: DEFAULT_NODE_COLOR.to_string(),
            instances: BTreeMap::new(),
            edge_ids: Vec::new(),
            defining_node_ids: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = color.to_string();
        self
    }

    pub fn instance_ids(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    pub fn contains_instance(&self, instance_id: &str) -> bool {
        self.instances.contains_key(instance_id)
    }

    pub fn contains_edge(&self, edge_id: &str) -> bool {
        self.edge_ids.iter().any(|e| e == edge_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directionality_is_membership_only() {
        let mut a = Directionality::default();
        a.toggle("n2");
        a.toggle("n1");
        let mut b = Directionality::toward("n1");
        b.toggle("n2");
        assert_eq!(a, b);

        assert!(!b.toggle("n1"));
        assert!(!b.points_to("n1"));
        assert!(b.points_to("n2"));
    }

    #[test]
    fn test_edge_other_end() {
        let edge = Edge::directed("e1", "a", "b");
        assert_eq!(edge.other_end("a"), Some("b"));
        assert_eq!(edge.other_end("b"), Some("a"));
        assert_eq!(edge.other_end("c"), None);
        assert!(edge.directionality.points_to("b"));
    }

    #[test]
    fn test_prototype_wire_names_are_camel_case() {
        let proto = NodePrototype::new("p1", "Dog").with_definition_graph("g1");
        let json = serde_json::to_value(&proto).unwrap();
        assert_eq!(json["definitionGraphIds"][0], "g1");
        assert!(json.get("typeNodeId").is_none());
    }
}
