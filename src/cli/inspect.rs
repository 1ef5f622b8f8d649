//! Inspect, check and export commands for session files

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use redstring::graph::selectors::{
    definition_cycles, definition_tree, integrity_report, open_graph_views, DefinitionTree,
};
use redstring::graph::{GraphDocument, GraphQuery};

use super::load_session;

/// Run the inspect command
pub fn run(file: &Path, format: &str, tree: Option<&str>, depth: usize) -> Result<()> {
    let state = load_session(file)?;

    if format == "json" {
        let mut out = serde_json::json!({
            "stats": state.stats(),
            "openGraphs": open_graph_views(&state),
        });
        if let Some(root) = tree {
            out["definitionTree"] = serde_json::to_value(definition_tree(&state, root, depth)?)?;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let stats = state.stats();
    println!("\n{} {}\n", style("Session").bold(), style(file.display()).cyan());
    println!(
        "  {} prototypes, {} graphs, {} nodes, {} edges",
        style(stats["total_prototypes"]).cyan(),
        style(stats["total_graphs"]).cyan(),
        style(stats["total_instances"]).cyan(),
        style(stats["total_edges"]).cyan()
    );

    let views = open_graph_views(&state);
    if views.is_empty() {
        println!("\n  {} No open graph tabs", style("[--]").dim());
    } else {
        println!("\n  Open graphs:");
        for view in views {
            let marker = if view.is_active {
                style("*").green().bold()
            } else {
                style(" ").dim()
            };
            println!(
                "  {} {} {} ({} nodes)",
                marker,
                view.name,
                style(&view.id).dim(),
                view.instance_count
            );
        }
    }

    if let Some(root) = tree {
        println!("\n  Definition tree:");
        print_tree(&definition_tree(&state, root, depth)?, 2);
    }
    println!();
    Ok(())
}

fn print_tree(node: &DefinitionTree, indent: usize) {
    let suffix = if node.recursive {
        style(" (recursive)").yellow().to_string()
    } else if node.truncated {
        style(" ...").dim().to_string()
    } else {
        String::new()
    };
    println!("{:indent$}{}{}", "", node.name, suffix, indent = indent * 2);
    for child in &node.children {
        print_tree(child, indent + 1);
    }
}

/// Run the check command. Fails if the session has broken references.
pub fn check(file: &Path) -> Result<()> {
    let state = load_session(file)?;
    let issues = integrity_report(&state);
    let cycles = definition_cycles(&state);

    if issues.is_empty() {
        println!("{} No broken references", style("[OK]").green());
    } else {
        for issue in &issues {
            println!(
                "{} {} '{}': {}",
                style("[ERR]").red(),
                issue.kind,
                issue.id,
                issue.problem
            );
        }
    }

    // Self-containing definitions are allowed; report them for information
    for cycle in &cycles {
        let names: Vec<&str> = cycle
            .iter()
            .map(|id| state.get_prototype(id).map_or(id.as_str(), |p| p.name.as_str()))
            .collect();
        println!("{} Definition cycle: {}", style("[INFO]").cyan(), names.join(" -> "));
    }

    if !issues.is_empty() {
        anyhow::bail!("{} integrity issue(s) in {}", issues.len(), file.display());
    }
    Ok(())
}

/// Run the export command
pub fn export(file: &Path, graph_id: &str, output: Option<&Path>) -> Result<()> {
    let state = load_session(file)?;
    let doc = GraphDocument::export(&state, graph_id)?;
    let json = serde_json::to_string_pretty(&doc)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{} Exported {} ({} prototypes, {} edges) to {}",
                style("✓").green(),
                style(&doc.graph.name).bold(),
                doc.prototypes.len(),
                doc.edges.len(),
                style(path.display()).cyan()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}
