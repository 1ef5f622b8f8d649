//! Store actions callable from the bridge

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{BridgeError, BridgeResult, PendingAction};
use crate::graph::store::{new_id, Action};

/// One callable action as advertised by `register-store`
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    pub name: &'static str,
    pub params: &'static [&'static str],
    /// Id fields filled in when the caller omits them (dotted paths)
    #[serde(skip)]
    pub generated_ids: &'static [&'static str],
}

const fn spec(
    name: &'static str,
    params: &'static [&'static str],
    generated_ids: &'static [&'static str],
) -> ActionSpec {
    ActionSpec {
        name,
        params,
        generated_ids,
    }
}

/// Exposed actions. Right-panel tab reordering stays UI-only.
const WHITELIST: &[ActionSpec] = &[
    spec("addNodePrototype", &["id", "name", "description", "color", "typeNodeId"], &["id"]),
    spec("updateNodePrototype", &["prototypeId", "patch"], &[]),
    spec("removeNodePrototype", &["prototypeId"], &[]),
    spec("addNode", &["graphId", "instance"], &["instance.id"]),
    spec("moveNode", &["instanceId", "x", "y"], &[]),
    spec("removeNode", &["instanceId"], &[]),
    spec("addEdge", &["graphId", "edge"], &["edge.id"]),
    spec("removeEdge", &["edgeId"], &[]),
    spec("toggleEdgeArrow", &["edgeId", "endpointId"], &[]),
    spec(
        "createNewGraph",
        &["graphId", "prototypeId", "name", "description", "color"],
        &["graphId", "prototypeId"],
    ),
    spec("createAndAssignGraphDefinition", &["prototypeId", "graphId"], &["graphId"]),
    spec("updateGraph", &["graphId", "patch"], &[]),
    spec("deleteGraph", &["graphId"], &[]),
    spec("openGraphTab", &["graphId", "definitionNodeId"], &[]),
    spec("closeGraphTab", &["graphId"], &[]),
    spec("setActiveGraphTab", &["graphId"], &[]),
    spec("toggleGraphExpanded", &["graphId"], &[]),
    spec("openRightPanelNodeTab", &["nodeId"], &[]),
];

pub fn whitelist() -> &'static [ActionSpec] {
    WHITELIST
}

fn lookup(name: &str) -> Option<&'static ActionSpec> {
    WHITELIST.iter().find(|s| s.name == name)
}

/// Insert a fresh id at a dotted path if nothing is there
fn fill_id(params: &mut Map<String, Value>, path: &str) {
    let mut target = params;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            let missing = target.get(part).map_or(true, |v| v.is_null());
            if missing {
                target.insert(part.to_string(), Value::String(new_id()));
            }
            return;
        }
        match target.get_mut(part).and_then(Value::as_object_mut) {
            Some(next) => target = next,
            None => return,
        }
    }
}

/// Turn a queued bridge action into a store action
pub fn parse_action(pending: &PendingAction) -> BridgeResult<Action> {
    let spec = lookup(&pending.action)
        .ok_or_else(|| BridgeError::UnknownAction(pending.action.clone()))?;

    let mut params = match &pending.params {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(BridgeError::InvalidParams {
                action: spec.name.to_string(),
                message: format!("expected an object, got {}", other),
            })
        }
    };
    for path in spec.generated_ids {
        fill_id(&mut params, path);
    }

    serde_json::from_value(json!({ "action": spec.name, "params": params })).map_err(|e| {
        BridgeError::InvalidParams {
            action: spec.name.to_string(),
            message: e.to_string(),
        }
    })
}
