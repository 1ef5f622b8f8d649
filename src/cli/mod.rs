//! CLI command definitions and handlers

mod bridge;
mod chat;
mod init;
mod inspect;
mod universe;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use redstring::graph::GraphState;
use redstring::persistence::{LocalFileSlot, SlotStore};

/// Redstring - knowledge-graph data layer
#[derive(Parser, Debug)]
#[command(name = "redstring")]
#[command(
    version,
    about = "Inspect Redstring sessions, manage universes, and bridge the graph store to external agents",
    after_help = "\
Examples:
  redstring init                                  Write an example user config
  redstring inspect space.redstring               Summarise a session file
  redstring check space.redstring                 Report dangling references and definition cycles
  redstring universes                             List universes and their sync state
  redstring universe attach-git space alice/graphs   Link a Git repository as a backup slot
  redstring bridge --file space.redstring         Serve the session to the local bridge
  redstring chat \"What is in this graph?\"         Ask the graph agent"
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example ~/.config/redstring/config.toml
    Init,

    /// Summarise a .redstring session file
    #[command(after_help = "\
Examples:
  redstring inspect space.redstring                 Graphs, tabs and counts
  redstring inspect space.redstring --format json   Machine-readable stats
  redstring inspect space.redstring --tree planet   Definition tree of a prototype")]
    Inspect {
        /// Session file
        file: PathBuf,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Show the definition tree rooted at this prototype id
        #[arg(long)]
        tree: Option<String>,

        /// Maximum definition tree depth
        #[arg(long, default_value = "4")]
        depth: usize,
    },

    /// Check a session file for broken references and definition cycles
    Check {
        /// Session file
        file: PathBuf,
    },

    /// Export one graph (with the prototypes it uses) as JSON
    Export {
        /// Session file
        file: PathBuf,

        /// Graph id
        graph_id: String,

        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// List universes with their storage slots and sync state
    Universes {
        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Change a universe's storage slots
    #[command(subcommand)]
    Universe(UniverseCommand),

    /// Push the session to the local bridge and replay actions it queues
    #[command(after_help = "\
Examples:
  redstring bridge --file space.redstring    Serve a session file
  redstring bridge --universe space          Serve a universe (saves go to its slots)
  REDSTRING_BRIDGE_URL=http://127.0.0.1:4000 redstring bridge --file space.redstring")]
    Bridge {
        /// Session file to serve
        #[arg(long, conflicts_with = "universe")]
        file: Option<PathBuf>,

        /// Universe slug to serve
        #[arg(long)]
        universe: Option<String>,

        /// Bridge URL (overrides config)
        #[arg(long, env = "REDSTRING_BRIDGE_URL")]
        url: Option<String>,
    },

    /// Send one message to the graph agent
    Chat {
        /// Message text
        message: String,

        /// Use the tool-calling agent endpoint instead of plain chat
        #[arg(long)]
        agent: bool,

        /// Session file used as context
        #[arg(long)]
        file: Option<PathBuf>,

        /// Clear the saved chat history first
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum UniverseCommand {
    /// Register a new universe (cache slot only, optionally a local file)
    Create {
        slug: String,
        name: String,
        /// Local .redstring file; becomes the source of truth
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Link a Git repository (source of truth is unchanged)
    AttachGit {
        slug: String,
        /// Repository as owner/repo
        repo: String,
        #[arg(long, default_value = "main")]
        branch: String,
        #[arg(long, default_value = "universes")]
        folder: String,
    },

    /// Unlink the Git repository
    DetachGit { slug: String },

    /// Make a slot (git, local, browser) the source of truth
    SetSource { slug: String, slot: String },

    /// Make a universe the active one
    Switch { slug: String },
}

/// Read a session file into a state
pub(crate) fn load_session(path: &Path) -> Result<GraphState> {
    let slot = LocalFileSlot::new(path);
    let saved = slot
        .load()
        .with_context(|| format!("Failed to read session {}", path.display()))?
        .ok_or_else(|| anyhow::anyhow!("Session file not found: {}", path.display()))?;
    if !saved.verify()? {
        tracing::warn!("{} content hash does not match; file was edited by hand?", path.display());
    }
    Ok(saved.document.into_state())
}

/// Run the CLI
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init => init::run(),
        Commands::Inspect {
            file,
            format,
            tree,
            depth,
        } => inspect::run(&file, &format, tree.as_deref(), depth),
        Commands::Check { file } => inspect::check(&file),
        Commands::Export {
            file,
            graph_id,
            output,
        } => inspect::export(&file, &graph_id, output.as_deref()),
        Commands::Universes { format } => universe::list(&format),
        Commands::Universe(cmd) => universe::run(cmd),
        Commands::Bridge {
            file,
            universe,
            url,
        } => bridge::run(file.as_deref(), universe.as_deref(), url),
        Commands::Chat {
            message,
            agent,
            file,
            reset,
        } => chat::run(&message, agent, file.as_deref(), reset),
    }
}
