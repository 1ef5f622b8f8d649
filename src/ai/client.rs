//! Client for the `/api/ai/chat` and `/api/ai/agent` endpoints
//!
//! Uses ureq (sync HTTP); no async runtime needed.

use crossbeam_channel::{bounded, select, Receiver};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::ai::{AiError, AiResult};
use crate::graph::GraphState;

/// Which endpoint to talk to. `Agent` may call tools and run long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentMode {
    #[default]
    Chat,
    Agent,
}

impl AgentMode {
    fn path(&self) -> &'static str {
        match self {
            AgentMode::Chat => "/api/ai/chat",
            AgentMode::Agent => "/api/ai/agent",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub context: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub response: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub is_complete: bool,
}

/// Something that can answer agent requests
pub trait AgentBackend {
    fn send(&self, mode: AgentMode, request: &AgentRequest) -> AiResult<AgentResponse>;
}

/// Compact description of the session sent along with each message
pub fn graph_context(state: &GraphState) -> Value {
    let active = state
        .active_graph_id()
        .and_then(|id| state.graphs().get(id));
    let open_graphs: Vec<&str> = state
        .tabs()
        .open_graph_ids
        .iter()
        .filter_map(|id| state.graphs().get(id))
        .map(|g| g.name.as_str())
        .collect();

    json!({
        "activeGraph": active.map(|g| json!({
            "id": g.id,
            "name": g.name,
            "nodeCount": g.instances.len(),
            "edgeCount": g.edge_ids.len(),
        })),
        "openGraphs": open_graphs,
        "graphCount": state.graphs().len(),
        "prototypeCount": state.prototypes().len(),
    })
}

#[derive(Clone)]
pub struct AgentClient {
    base_url: String,
    agent: ureq::Agent,
}

fn make_agent(timeout: Duration) -> ureq::Agent {
    ureq::config::Config::builder()
        .http_status_as_error(false)
        .timeout_global(Some(timeout))
        .build()
        .new_agent()
}

impl AgentClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: make_agent(timeout),
        }
    }

    pub fn chat(&self, request: &AgentRequest) -> AiResult<AgentResponse> {
        self.send(AgentMode::Chat, request)
    }

    pub fn agent(&self, request: &AgentRequest) -> AiResult<AgentResponse> {
        self.send(AgentMode::Agent, request)
    }

    /// Run an agent request on a helper thread, returning early with
    /// `AiError::Cancelled` if `cancel` fires (a message or disconnect).
    /// The abandoned request finishes in the background and is discarded.
    pub fn agent_cancellable(
        &self,
        request: AgentRequest,
        cancel: &Receiver<()>,
    ) -> AiResult<AgentResponse> {
        let (tx, rx) = bounded(1);
        let client = self.clone();
        std::thread::Builder::new()
            .name("ai-agent".into())
            .spawn(move || {
                let _ = tx.send(client.agent(&request));
            })
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        select! {
            recv(rx) -> result => result.unwrap_or_else(|_| Err(AiError::RequestFailed("agent thread exited".into()))),
            recv(cancel) -> _ => {
                tracing::info!("Agent request cancelled");
                Err(AiError::Cancelled)
            }
        }
    }
}

impl AgentBackend for AgentClient {
    fn send(&self, mode: AgentMode, request: &AgentRequest) -> AiResult<AgentResponse> {
        let url = format!("{}{}", self.base_url, mode.path());
        tracing::debug!("POST {} ({} chars)", url, request.message.len());

        let response = self
            .agent
            .post(url)
            .header("Content-Type", "application/json")
            .send_json(request)
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let error_text = response.into_body().read_to_string().unwrap_or_default();
            return Err(AiError::ApiError {
                status,
                message: error_text,
            });
        }

        response
            .into_body()
            .read_json()
            .map_err(|e| AiError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NewGraph;

    #[test]
    fn test_request_wire_format() {
        let req = AgentRequest {
            message: "hi".into(),
            system_prompt: Some("be brief".into()),
            context: json!({}),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["systemPrompt"], "be brief");
        assert_eq!(value["message"], "hi");
    }

    #[test]
    fn test_response_defaults() {
        let resp: AgentResponse = serde_json::from_value(json!({"response": "ok"})).unwrap();
        assert!(resp.tool_calls.is_empty());
        assert!(!resp.is_complete);

        let resp: AgentResponse = serde_json::from_value(json!({
            "response": "added",
            "toolCalls": [{"name": "addNode", "args": {"graphId": "g"}}],
            "isComplete": true
        }))
        .unwrap();
        assert_eq!(resp.tool_calls[0].name, "addNode");
        assert!(resp.is_complete);
    }

    #[test]
    fn test_graph_context_describes_active_graph() {
        let mut state = GraphState::new();
        state.create_new_graph(NewGraph::named("Moons").with_ids("g", "p")).unwrap();
        let ctx = graph_context(&state);
        assert_eq!(ctx["activeGraph"]["name"], "Moons");
        assert_eq!(ctx["openGraphs"], json!(["Moons"]));
        assert_eq!(ctx["prototypeCount"], 1);

        let empty = graph_context(&GraphState::new());
        assert!(empty["activeGraph"].is_null());
    }

    #[test]
    fn test_cancel_returns_immediately() {
        // Unroutable address keeps the request pending until cancelled
        let client = AgentClient::new("http://10.255.255.1:9", Duration::from_secs(30));
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        cancel_tx.send(()).unwrap();
        let req = AgentRequest {
            message: "long task".into(),
            system_prompt: None,
            context: json!({}),
        };
        let result = client.agent_cancellable(req, &cancel_rx);
        assert!(matches!(result, Err(AiError::Cancelled) | Err(AiError::RequestFailed(_))));
    }
}
