//! Bridge command - serve a session to the local bridge process

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;

use redstring::bridge::{BridgeClient, BridgeService, SaveTarget};
use redstring::config::UserConfig;
use redstring::graph::{GraphState, GraphStore};
use redstring::persistence::{open_slots, reconcile, CacheSlot, LocalFileSlot};
use redstring::universe::{JsonRegistry, SlotType, UniverseBackend};

use super::load_session;

fn from_file(file: &Path) -> Result<(GraphState, SaveTarget)> {
    let state = if file.exists() {
        load_session(file)?
    } else {
        tracing::info!("{} does not exist yet; starting empty", file.display());
        GraphState::new()
    };
    let target = SaveTarget {
        source_of_truth: SlotType::Local,
        slots: vec![Box::new(LocalFileSlot::new(file))],
    };
    Ok((state, target))
}

fn from_universe(config: &UserConfig, slug: &str) -> Result<(GraphState, SaveTarget)> {
    let registry = JsonRegistry::new(config.universe_registry_path());
    let universe = registry.get_universe(slug)?;
    let cache = CacheSlot::open_database(&config.cache_db_path())
        .map_err(|e| tracing::warn!("Session cache unavailable: {}", e))
        .ok();
    let slots = open_slots(&universe, cache);

    let reconciled = reconcile(universe.source_of_truth, &slots);
    if !reconciled.divergent.is_empty() {
        let names: Vec<String> = reconciled.divergent.iter().map(|s| s.to_string()).collect();
        println!(
            "{} Slots out of date with {}: {} (next save overwrites them)",
            style("[WARN]").yellow(),
            universe.source_of_truth,
            names.join(", ")
        );
    }
    let state = reconciled
        .session
        .map(|s| s.document.into_state())
        .unwrap_or_default();

    let target = SaveTarget {
        source_of_truth: universe.source_of_truth,
        slots,
    };
    Ok((state, target))
}

/// Run the bridge command. Returns only when the bridge gives up.
pub fn run(file: Option<&Path>, universe: Option<&str>, url: Option<String>) -> Result<()> {
    let config = UserConfig::load()?;
    let url = url.unwrap_or_else(|| config.bridge_url().to_string());

    let (state, target) = match (file, universe) {
        (Some(file), _) => from_file(file)?,
        (None, Some(slug)) => from_universe(&config, slug)?,
        (None, None) => anyhow::bail!("Pass --file <session> or --universe <slug>"),
    };

    let store = Arc::new(GraphStore::from_state(state));
    let client = Arc::new(BridgeClient::new(&url, config.bridge_timeout()));
    let settings = config.bridge_settings();

    println!("Connecting to bridge at {}", style(&url).cyan());
    let handle = BridgeService::new(store, client, settings.clone())
        .with_save_target(target)
        .spawn()
        .with_context(|| format!("Could not reach the bridge at {}", url))?;

    println!(
        "{} Bridge running (push every {:?}, poll every {:?}). Ctrl+C to stop.",
        style("[OK]").green(),
        settings.push_interval,
        settings.poll_interval
    );

    let stats = handle.wait()?;
    println!(
        "Bridge stopped: {} actions applied, {} failed, {} snapshots sent",
        stats.actions_applied, stats.actions_failed, stats.snapshots_sent
    );
    Ok(())
}
