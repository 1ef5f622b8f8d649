//! HTTP client for the bridge API
//!
//! Uses ureq (sync HTTP) on worker threads; no async runtime needed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{ActionSpec, BridgeError, BridgeResult, BridgeSnapshot};

/// An action queued by the external process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

/// Acknowledgement for one replayed action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionCompleted {
    pub action_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionFeedback {
    pub action_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub has_store: bool,
}

#[derive(Debug, Deserialize)]
struct PendingActionsResponse {
    #[serde(default)]
    actions: Vec<PendingAction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveTriggerResponse {
    #[serde(default)]
    should_save: bool,
}

#[derive(Serialize)]
struct RegisterStoreRequest<'a> {
    actions: &'a [ActionSpec],
}

/// The bridge operations the service needs. Implemented over HTTP by
/// [`BridgeClient`]; tests substitute an in-memory fake.
pub trait BridgeTransport: Send + Sync {
    fn health(&self) -> BridgeResult<HealthStatus>;

    fn register_store(&self, actions: &[ActionSpec]) -> BridgeResult<()>;

    fn push_state(&self, snapshot: &BridgeSnapshot) -> BridgeResult<()>;

    fn pending_actions(&self) -> BridgeResult<Vec<PendingAction>>;

    fn action_completed(&self, ack: &ActionCompleted) -> BridgeResult<()>;

    fn action_feedback(&self, feedback: &ActionFeedback) -> BridgeResult<()>;

    fn check_save_trigger(&self) -> BridgeResult<bool>;
}

pub struct BridgeClient {
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

impl BridgeClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: make_agent(timeout),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/bridge/{}", self.base_url, path)
    }

    fn check(response: ureq::http::Response<ureq::Body>) -> BridgeResult<ureq::http::Response<ureq::Body>> {
        let status = response.status().as_u16();
        if status >= 400 {
            let message = response.into_body().read_to_string().unwrap_or_default();
            return Err(BridgeError::Http { status, message });
        }
        Ok(response)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> BridgeResult<T> {
        let response = self
            .agent
            .get(self.url(path))
            .call()
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        Self::check(response)?
            .into_body()
            .read_json()
            .map_err(|e| BridgeError::Parse(e.to_string()))
    }

    fn post_json<B: Serialize>(&self, path: &str, body: &B) -> BridgeResult<()> {
        let response = self
            .agent
            .post(self.url(path))
            .header("Content-Type", "application/json")
            .send_json(body)
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        Self::check(response)?;
        Ok(())
    }
}

impl BridgeTransport for BridgeClient {
    fn health(&self) -> BridgeResult<HealthStatus> {
        self.get_json("health")
    }

    fn register_store(&self, actions: &[ActionSpec]) -> BridgeResult<()> {
        self.post_json("register-store", &RegisterStoreRequest { actions })
    }

    fn push_state(&self, snapshot: &BridgeSnapshot) -> BridgeResult<()> {
        self.post_json("state", snapshot)
    }

    fn pending_actions(&self) -> BridgeResult<Vec<PendingAction>> {
        let resp: PendingActionsResponse = self.get_json("pending-actions")?;
        Ok(resp.actions)
    }

    fn action_completed(&self, ack: &ActionCompleted) -> BridgeResult<()> {
        self.post_json("action-completed", ack)
    }

    fn action_feedback(&self, feedback: &ActionFeedback) -> BridgeResult<()> {
        self.post_json("action-feedback", feedback)
    }

    fn check_save_trigger(&self) -> BridgeResult<bool> {
        let resp: SaveTriggerResponse = self.get_json("check-save-trigger")?;
        Ok(resp.should_save)
    }
}
