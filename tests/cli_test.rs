//! CLI contract tests
//!
//! Runs the binary against session files written through the library.
//! Config and data directories are pointed at a temp dir so nothing
//! touches the real user profile.

use std::path::Path;
use std::process::{Command, Output};

use redstring::graph::{Edge, GraphStore, NewGraph, NodeInstance, NodePrototype};
use redstring::persistence::{LocalFileSlot, SavedSession, SlotStore};

fn redstring(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_redstring"))
        .args(args)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("XDG_CACHE_HOME", home.join("cache"))
        .env_remove("RUST_LOG")
        .env_remove("REDSTRING_BRIDGE_URL")
        .output()
        .expect("failed to run redstring")
}

fn write_session(path: &Path) {
    let store = GraphStore::new();
    store
        .create_new_graph(NewGraph::named("Solar System").with_ids("g-sol", "p-sol"))
        .unwrap();
    store
        .add_node_prototype(NodePrototype::new("planet", "Planet"))
        .unwrap();
    store
        .add_node("g-sol", NodeInstance::new("earth", "planet"))
        .unwrap();
    store
        .add_node("g-sol", NodeInstance::new("mars", "planet"))
        .unwrap();
    store
        .add_edge("g-sol", Edge::new("e1", "earth", "mars"))
        .unwrap();

    let session = SavedSession::from_state(&store.snapshot()).unwrap();
    LocalFileSlot::new(path).save(&session).unwrap();
}

#[test]
fn test_check_passes_on_clean_session() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("space.redstring");
    write_session(&file);

    let out = redstring(dir.path(), &["check", file.to_str().unwrap()]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("No broken references"));
}

#[test]
fn test_inspect_json_reports_counts() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("space.redstring");
    write_session(&file);

    let out = redstring(
        dir.path(),
        &["inspect", file.to_str().unwrap(), "--format", "json"],
    );
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["stats"]["total_instances"], 2);
    assert_eq!(json["stats"]["total_edges"], 1);
    assert_eq!(json["openGraphs"][0]["id"], "g-sol");
}

#[test]
fn test_export_writes_graph_document() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("space.redstring");
    let output = dir.path().join("solar.json");
    write_session(&file);

    let out = redstring(
        dir.path(),
        &[
            "export",
            file.to_str().unwrap(),
            "g-sol",
            "-o",
            output.to_str().unwrap(),
        ],
    );
    assert!(out.status.success());
    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(doc["graph"]["name"], "Solar System");
    assert_eq!(doc["edges"].as_array().unwrap().len(), 1);
}

#[test]
fn test_inspect_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = redstring(dir.path(), &["inspect", "nope.redstring"]);
    assert!(!out.status.success());
}

#[test]
fn test_universe_create_then_list() {
    let dir = tempfile::tempdir().unwrap();

    let out = redstring(dir.path(), &["universe", "create", "space", "Space"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let out = redstring(dir.path(), &["universes", "--format", "json"]);
    assert!(out.status.success());
    let views: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(views[0]["slug"], "space");
    assert_eq!(views[0]["isActive"], true);
    assert_eq!(views[0]["sourceOfTruth"], "browser");
}

#[test]
fn test_set_source_to_missing_slot_fails() {
    let dir = tempfile::tempdir().unwrap();
    redstring(dir.path(), &["universe", "create", "space", "Space"]);

    let out = redstring(dir.path(), &["universe", "set-source", "space", "git"]);
    assert!(!out.status.success());
}

#[test]
fn test_universe_create_twice_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = redstring(dir.path(), &["universe", "create", "space", "Space"]);
    assert!(out.status.success());

    let out = redstring(dir.path(), &["universe", "create", "space", "Other"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("already exists"));
}
