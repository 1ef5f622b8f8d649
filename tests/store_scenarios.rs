//! Store behaviour through the public API: definition graphs, cascades,
//! atomic failure, and concurrent dispatch on a shared store.

use std::sync::Arc;
use std::thread;

use redstring::graph::selectors::integrity_report;
use redstring::graph::store::Outcome;
use redstring::graph::{
    Action, Edge, GraphQuery, GraphStore, NewGraph, NodeInstance, NodePrototype, StoreError,
};

#[test]
fn test_create_and_assign_definition_activates_new_graph() {
    let store = GraphStore::new();
    store
        .add_node_prototype(NodePrototype::new("p1", "Dog"))
        .unwrap();

    let graph_id = store.create_and_assign_graph_definition("p1").unwrap();

    let state = store.snapshot();
    let proto = state.get_prototype("p1").unwrap();
    assert_eq!(proto.definition_graph_ids, vec![graph_id.clone()]);
    assert_eq!(state.active_graph_id(), Some(graph_id.as_str()));
    assert_eq!(state.active_definition_node_id(), Some("p1"));
    assert_eq!(state.get_graph(&graph_id).unwrap().name, "Dog");
}

#[test]
fn test_remove_node_drops_its_edges_everywhere() {
    let store = GraphStore::new();
    store
        .create_new_graph(NewGraph::named("Pets").with_ids("g1", "pets"))
        .unwrap();
    store
        .add_node_prototype(NodePrototype::new("p1", "Dog"))
        .unwrap();
    store.add_node("g1", NodeInstance::new("a", "p1")).unwrap();
    store.add_node("g1", NodeInstance::new("b", "p1")).unwrap();
    store.add_edge("g1", Edge::directed("e", "a", "b")).unwrap();

    let removed = store.remove_node("a").unwrap();
    assert_eq!(removed, vec!["e"]);

    let state = store.snapshot();
    assert!(state.get_edge("e").is_none());
    assert!(state.get_instance("b").unwrap().edge_ids.is_empty());
    assert!(!state.get_graph("g1").unwrap().contains_instance("a"));
}

#[test]
fn test_failed_dispatch_leaves_snapshot_identical() {
    let store = GraphStore::new();
    store
        .create_new_graph(NewGraph::named("Pets").with_ids("g1", "pets"))
        .unwrap();
    let before = store.snapshot();

    let err = store
        .dispatch(Action::AddEdge {
            graph_id: "g1".to_string(),
            edge: Edge::new("e", "ghost", "also-ghost"),
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::DanglingReference { .. }));

    let after = store.snapshot();
    assert!(Arc::ptr_eq(&before, &after));
}

#[test]
fn test_snapshot_is_unaffected_by_later_writes() {
    let store = GraphStore::new();
    store
        .add_node_prototype(NodePrototype::new("p1", "Dog"))
        .unwrap();
    let held = store.snapshot();

    store
        .update_node("p1", |p| p.name = "Wolf".to_string())
        .unwrap();

    assert_eq!(held.get_prototype("p1").unwrap().name, "Dog");
    assert_eq!(store.snapshot().get_prototype("p1").unwrap().name, "Wolf");
}

#[test]
fn test_dispatch_reports_created_graph() {
    let store = GraphStore::new();
    let outcome = store
        .dispatch(Action::CreateNewGraph(
            NewGraph::named("Solar System").with_ids("g-sol", "p-sol"),
        ))
        .unwrap();

    assert_eq!(
        outcome,
        Outcome::CreatedGraph {
            graph_id: "g-sol".to_string(),
            prototype_id: "p-sol".to_string(),
        }
    );
    assert_eq!(store.snapshot().active_graph_id(), Some("g-sol"));
}

#[test]
fn test_concurrent_writers_all_land() {
    let store = Arc::new(GraphStore::new());
    store
        .create_new_graph(NewGraph::named("Crowd").with_ids("g1", "crowd"))
        .unwrap();
    store
        .add_node_prototype(NodePrototype::new("person", "Person"))
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..25 {
                    let id = format!("n-{}-{}", t, i);
                    store
                        .add_node("g1", NodeInstance::new(&id, "person"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let state = store.snapshot();
    assert_eq!(state.get_graph("g1").unwrap().instances.len(), 100);
    assert_eq!(state.instances_of("person").len(), 100);
}

#[test]
fn test_prototype_and_graph_agree_on_definitions() {
    let store = GraphStore::new();
    store
        .create_new_graph(NewGraph::named("Engine").with_ids("g-engine", "engine"))
        .unwrap();

    // A second prototype claims the same graph as its definition
    store
        .dispatch(
            serde_json::from_value(serde_json::json!({
                "action": "addNodePrototype",
                "params": {"id": "motor", "name": "Motor", "definitionGraphIds": ["g-engine"]}
            }))
            .unwrap(),
        )
        .unwrap();
    let state = store.snapshot();
    assert_eq!(
        state.get_graph("g-engine").unwrap().defining_node_ids,
        vec!["engine", "motor"]
    );

    store
        .update_node("engine", |p| p.definition_graph_ids.clear())
        .unwrap();
    let state = store.snapshot();
    assert_eq!(
        state.get_graph("g-engine").unwrap().defining_node_ids,
        vec!["motor"]
    );
    assert!(integrity_report(&state).is_empty());
}
