//! Chat with the graph-aware AI agent
//!
//! The agent runs behind the local bridge process; this module posts
//! messages with a compact graph context and keeps a bounded chat history.
//!
//! # Example
//!
//! ```rust,ignore
//! use redstring::ai::{AgentClient, AgentMode, ChatHistory, ChatSession};
//!
//! let client = AgentClient::new("http://localhost:3001", Duration::from_secs(120));
//! let mut session = ChatSession::new(client, ChatHistory::load(&path)?, AgentMode::Agent);
//! let reply = session.send("Add a Moon to the Solar System graph", &store.snapshot());
//! ```

mod client;
mod history;

pub use client::{graph_context, AgentBackend, AgentClient, AgentMode, AgentRequest, AgentResponse, ToolCall};
pub use history::{ChatHistory, ChatMessage, ChatSession, Role, DEFAULT_HISTORY_LIMIT};

use thiserror::Error;

/// Errors that can occur in the AI module
#[derive(Error, Debug)]
pub enum AiError {
    #[error("AI request failed: {0}")]
    RequestFailed(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("AI request cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid chat history: {0}")]
    HistoryError(#[from] serde_json::Error),
}

pub type AiResult<T> = Result<T, AiError>;
