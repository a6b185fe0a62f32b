//! Overlap reporting: conflicts, check, merge-order.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use branchwatch_core::conflict::{ConflictEdge, RefinedEdge};

use super::{print_json, Workspace};
use crate::style;

pub fn conflicts(ws: &Workspace, raw: bool) -> Result<()> {
    let store = ws.store()?;
    let analysis = ws
        .coordinator(store.as_ref())
        .analyze(ws.version_source(raw))
        .context("failed to analyse conflicts")?;

    if ws.json {
        return print_json(&analysis);
    }

    let mode = if analysis.is_refined() { "declaration-level" } else { "file-level" };
    match &analysis.refined {
        Some(refined) if !refined.is_empty() => print_refined(refined),
        _ if analysis.edges.is_empty() => {
            println!("{}", style::success(&format!("No {mode} conflicts")));
        }
        _ => print_edges(&analysis.edges),
    }
    println!(
        "{}",
        style::dim(&format!("{} conflict(s), {mode}", analysis.edges.len()))
    );
    Ok(())
}

pub fn check(ws: &Workspace, branch: Option<String>, raw: bool) -> Result<()> {
    let branch = ws.branch_or_current(branch)?;
    let store = ws.store()?;
    let edges = ws
        .coordinator(store.as_ref())
        .check(&branch, ws.version_source(raw))
        .with_context(|| format!("failed to check {branch}"))?;

    if ws.json {
        return print_json(&serde_json::json!({ "branch": branch, "conflicts": edges }));
    }
    if edges.is_empty() {
        println!("{}", style::success(&format!("{branch} conflicts with no active branch")));
        return Ok(());
    }

    println!(
        "{}",
        style::warn(&format!("{branch} overlaps {} branch(es)", edges.len()))
    );
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Branch", "Shared files"]);
    for edge in &edges {
        table.add_row(vec![
            Cell::new(edge.other(&branch).unwrap_or_default()),
            Cell::new(join_files(edge)),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn merge_order(ws: &Workspace, raw: bool) -> Result<()> {
    let store = ws.store()?;
    let order = ws
        .coordinator(store.as_ref())
        .merge_order(ws.version_source(raw))
        .context("failed to compute merge order")?;

    if ws.json {
        return print_json(&order);
    }
    if order.is_empty() {
        println!("{}", style::dim("No active branches."));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "Branch", "Conflicts", "Registered", "Rebase after merge"]);
    for entry in &order {
        let rebase = if entry.rebase_after.is_empty() {
            "—".to_string()
        } else {
            entry.rebase_after.join(", ")
        };
        table.add_row(vec![
            Cell::new(entry.rank),
            Cell::new(&entry.record.name),
            Cell::new(entry.degree),
            Cell::new(entry.record.registered_at.format("%Y-%m-%d %H:%M")),
            Cell::new(rebase),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn print_edges(edges: &[ConflictEdge]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Branch", "Branch", "Shared files"]);
    for edge in edges {
        table.add_row(vec![
            Cell::new(&edge.a),
            Cell::new(&edge.b),
            Cell::new(join_files(edge)),
        ]);
    }
    println!("{table}");
}

/// One row per shared file, including the overlaps refinement dropped.
fn print_refined(refined: &[RefinedEdge]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Branch", "Branch", "File", "Severity"]);
    for edge in refined {
        for verdict in &edge.verdicts {
            table.add_row(vec![
                Cell::new(&edge.edge.a),
                Cell::new(&edge.edge.b),
                Cell::new(&verdict.path),
                Cell::new(style::severity(verdict.severity)),
            ]);
        }
    }
    println!("{table}");
}

fn join_files(edge: &ConflictEdge) -> String {
    edge.files.iter().cloned().collect::<Vec<_>>().join("\n")
}
