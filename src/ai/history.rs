//! Persistent chat history and the send loop around it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::client::{graph_context, AgentBackend, AgentMode, AgentRequest, ToolCall};
use super::AiResult;
use crate::graph::GraphState;

pub const DEFAULT_HISTORY_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
        }
    }
}

/// Most recent chat messages, optionally backed by a JSON file
#[derive(Debug, Clone)]
pub struct ChatHistory {
    path: Option<PathBuf>,
    messages: Vec<ChatMessage>,
    limit: usize,
}

impl ChatHistory {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            messages: Vec::new(),
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Load from `path`; a missing file is an empty history
    pub fn load(path: &Path) -> AiResult<Self> {
        let messages = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(path)?)?
        } else {
            Vec::new()
        };
        let mut history = Self {
            path: Some(path.to_path_buf()),
            messages,
            limit: DEFAULT_HISTORY_LIMIT,
        };
        history.trim();
        Ok(history)
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self.trim();
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.trim();
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn trim(&mut self) {
        if self.messages.len() > self.limit {
            let excess = self.messages.len() - self.limit;
            self.messages.drain(..excess);
        }
    }

    pub fn save(&self) -> AiResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self.messages)?)?;
        Ok(())
    }
}

/// A conversation with the agent. Failures become `system` messages in the
/// history rather than errors.
pub struct ChatSession<B: AgentBackend> {
    backend: B,
    history: ChatHistory,
    mode: AgentMode,
    system_prompt: Option<String>,
}

impl<B: AgentBackend> ChatSession<B> {
    pub fn new(backend: B, history: ChatHistory, mode: AgentMode) -> Self {
        Self {
            backend,
            history,
            mode,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: Option<&str>) -> Self {
        self.system_prompt = prompt.map(str::to_string);
        self
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// Send a user message with context from `state`; returns the reply
    /// (assistant message, or a system message describing the failure).
    pub fn send(&mut self, message: &str, state: &GraphState) -> ChatMessage {
        self.history.push(ChatMessage::new(Role::User, message));

        let request = AgentRequest {
            message: message.to_string(),
            system_prompt: self.system_prompt.clone(),
            context: graph_context(state),
        };

        let reply = match self.backend.send(self.mode, &request) {
            Ok(resp) => {
                if !resp.is_complete && self.mode == AgentMode::Agent {
                    tracing::debug!("Agent reported an incomplete run");
                }
                ChatMessage {
                    tool_calls: resp.tool_calls,
                    ..ChatMessage::new(Role::Assistant, resp.response)
                }
            }
            Err(e) => {
                tracing::warn!("AI request failed: {}", e);
                ChatMessage::new(Role::System, format!("Error: {}", e))
            }
        };

        self.history.push(reply.clone());
        if let Err(e) = self.history.save() {
            tracing::warn!("Failed to save chat history: {}", e);
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AgentResponse, AiError};
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct ScriptedBackend {
        replies: RefCell<Vec<AiResult<AgentResponse>>>,
        seen: RefCell<Vec<AgentRequest>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<AiResult<AgentResponse>>) -> Self {
            Self {
                replies: RefCell::new(replies),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl AgentBackend for ScriptedBackend {
        fn send(&self, _mode: AgentMode, request: &AgentRequest) -> AiResult<AgentResponse> {
            self.seen.borrow_mut().push(request.clone());
            self.replies.borrow_mut().remove(0)
        }
    }

    fn ok(text: &str) -> AiResult<AgentResponse> {
        Ok(AgentResponse {
            response: text.to_string(),
            tool_calls: Vec::new(),
            is_complete: true,
        })
    }

    #[test]
    fn test_send_records_both_sides() {
        let backend = ScriptedBackend::new(vec![ok("Hello")]);
        let mut session = ChatSession::new(backend, ChatHistory::in_memory(), AgentMode::Chat)
            .with_system_prompt(Some("be kind"));
        let reply = session.send("hi", &GraphState::new());

        assert_eq!(reply.role, Role::Assistant);
        let roles: Vec<_> = session.history().messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(
            session.backend.seen.borrow()[0].system_prompt.as_deref(),
            Some("be kind")
        );
    }

    #[test]
    fn test_failure_becomes_system_message() {
        let backend = ScriptedBackend::new(vec![Err(AiError::ApiError {
            status: 502,
            message: "bridge down".into(),
        })]);
        let mut session = ChatSession::new(backend, ChatHistory::in_memory(), AgentMode::Agent);
        let reply = session.send("do it", &GraphState::new());
        assert_eq!(reply.role, Role::System);
        assert!(reply.content.contains("bridge down"));
        assert_eq!(session.history().messages().len(), 2);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = ChatHistory::in_memory().with_limit(3);
        for i in 0..5 {
            history.push(ChatMessage::new(Role::User, format!("m{}", i)));
        }
        let contents: Vec<_> = history.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_history_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chat").join("history.json");

        let backend = ScriptedBackend::new(vec![ok("Saved reply")]);
        let mut session = ChatSession::new(backend, ChatHistory::load(&path).unwrap(), AgentMode::Chat);
        session.send("remember me", &GraphState::new());

        let reloaded = ChatHistory::load(&path).unwrap();
        assert_eq!(reloaded.messages().len(), 2);
        assert_eq!(reloaded.messages()[1].content, "Saved reply");
    }
}
