//! Universe listing and slot transition commands

use anyhow::{Context, Result};
use console::style;

use redstring::config::UserConfig;
use redstring::universe::{
    FederationService, GitRepoConfig, JsonRegistry, SlotType, SyncState, Universe, UniverseView,
};

use super::UniverseCommand;

fn service(config: &UserConfig) -> FederationService<JsonRegistry> {
    FederationService::new(JsonRegistry::new(config.universe_registry_path()))
}

/// List universes
pub fn list(format: &str) -> Result<()> {
    let config = UserConfig::load()?;
    let views = service(&config)
        .universes()
        .context("Failed to read universe registry")?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if views.is_empty() {
        println!(
            "No universes yet. Create one with {}",
            style("redstring universe create <slug> <name>").cyan()
        );
        return Ok(());
    }
    for view in &views {
        print_view(view);
    }
    Ok(())
}

fn print_view(view: &UniverseView) {
    let active = if view.is_active {
        style("*").green().bold().to_string()
    } else {
        " ".to_string()
    };
    println!(
        "\n{} {} {}",
        active,
        style(&view.name).bold(),
        style(format!("({})", view.slug)).dim()
    );

    match &view.storage.primary {
        Some(primary) => println!(
            "    {} {} {}",
            style("primary").cyan(),
            primary.label,
            style(&primary.detail).dim()
        ),
        None => println!("    {} no storage slots", style("[--]").dim()),
    }
    for backup in &view.storage.backups {
        println!("    {}  {} {}", style("backup").dim(), backup.label, style(&backup.detail).dim());
    }

    let sync = match view.sync.state {
        SyncState::Error => style(&view.sync.label).red(),
        SyncState::Unsaved | SyncState::Paused => style(&view.sync.label).yellow(),
        SyncState::Idle | SyncState::Saving => style(&view.sync.label).green(),
        SyncState::Disconnected | SyncState::Standby => style(&view.sync.label).dim(),
    };
    println!("    {}   {}", style("sync").dim(), sync);
}

/// Run a universe subcommand
pub fn run(cmd: UniverseCommand) -> Result<()> {
    let config = UserConfig::load()?;
    let mut service = service(&config);

    let view = match cmd {
        UniverseCommand::Create { slug, name, file } => {
            let mut universe = Universe::new(&slug, &name);
            if let Some(file) = file {
                let path = file.to_string_lossy();
                universe = universe
                    .with_local_file(&path, true)
                    .with_source_of_truth(SlotType::Local);
            }
            service.create_universe(universe)?
        }
        UniverseCommand::AttachGit {
            slug,
            repo,
            branch,
            folder,
        } => {
            let repo = GitRepoConfig {
                branch,
                universe_folder: folder,
                ..GitRepoConfig::new(&repo)
            };
            service.attach_git_repository(&slug, repo)?
        }
        UniverseCommand::DetachGit { slug } => service.detach_git_repository(&slug)?,
        UniverseCommand::SetSource { slug, slot } => {
            let slot: SlotType = slot.parse()?;
            service.set_source_of_truth(&slug, slot)?
        }
        UniverseCommand::Switch { slug } => {
            service.switch_active(&slug)?;
            service.view(&slug)?
        }
    };

    println!("{} Updated universe", style("✓").green());
    print_view(&view);
    Ok(())
}
