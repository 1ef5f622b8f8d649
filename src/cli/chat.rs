//! Chat command - one message to the graph agent

use anyhow::Result;
use console::style;
use std::path::Path;

use redstring::ai::{AgentClient, AgentMode, ChatHistory, ChatSession, Role};
use redstring::config::UserConfig;
use redstring::graph::GraphState;

use super::load_session;

/// Run the chat command
pub fn run(message: &str, agent: bool, file: Option<&Path>, reset: bool) -> Result<()> {
    let config = UserConfig::load()?;

    let state = match file {
        Some(path) => load_session(path)?,
        None => GraphState::new(),
    };

    let mut history = ChatHistory::load(&config.chat_history_path())?;
    if reset {
        history.clear();
    }

    let mode = if agent { AgentMode::Agent } else { AgentMode::Chat };
    let client = AgentClient::new(config.ai_url(), config.ai_timeout());
    let mut session =
        ChatSession::new(client, history, mode).with_system_prompt(config.system_prompt());

    let reply = session.send(message, &state);
    match reply.role {
        Role::System => println!("{} {}", style("[system]").red(), reply.content),
        _ => println!("{}", reply.content),
    }
    for call in &reply.tool_calls {
        println!(
            "  {} {} {}",
            style("tool").dim(),
            style(&call.name).cyan(),
            style(call.status.as_deref().unwrap_or("")).dim()
        );
    }
    Ok(())
}
