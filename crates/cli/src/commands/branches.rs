//! Registry management: register, update, unregister, show, list.

use std::collections::BTreeSet;

use anyhow::{bail, Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use branchwatch_core::{BranchRecord, BranchStatus, BranchUpdate, NewBranch};

use super::{print_json, truncate, Workspace};
use crate::style;

/// Register a branch.
pub fn register(
    ws: &Workspace,
    name: Option<String>,
    files: Vec<String>,
    from_git: bool,
    agent: Option<String>,
    description: Option<String>,
) -> Result<()> {
    let name = ws.branch_or_current(name)?;
    let mut all: BTreeSet<String> = files.into_iter().collect();
    if from_git {
        all.extend(git_files(ws, &name)?);
    }

    let store = ws.store()?;
    let record = store
        .register(NewBranch {
            name,
            files: all.into_iter().collect(),
            agent,
            description,
        })
        .context("failed to register branch")?;

    if ws.json {
        return print_json(&record);
    }
    println!(
        "{}",
        style::success(&format!(
            "Registered {} ({} file(s))",
            record.name,
            record.files.len()
        ))
    );
    Ok(())
}

/// Update fields of a registered branch.
pub fn update(
    ws: &Workspace,
    name: &str,
    status: Option<String>,
    files: Vec<String>,
    from_git: bool,
    agent: Option<String>,
    description: Option<String>,
) -> Result<()> {
    let status = status.as_deref().map(parse_status).transpose()?;
    let files = if from_git {
        Some(git_files(ws, name)?)
    } else if files.is_empty() {
        None
    } else {
        Some(files.into_iter().collect())
    };

    let update = BranchUpdate {
        status,
        files,
        agent: agent.map(|a| Some(a).filter(|a| !a.is_empty())),
        description: description.map(|d| Some(d).filter(|d| !d.is_empty())),
    };
    if update.is_empty() {
        bail!("nothing to update: pass --status, --file, --from-git, --agent or --description");
    }

    let store = ws.store()?;
    let record = store
        .update(name, update)
        .with_context(|| format!("failed to update {name}"))?;

    if ws.json {
        return print_json(&record);
    }
    println!("{}", style::success(&format!("Updated {}", record.name)));
    Ok(())
}

pub fn unregister(ws: &Workspace, name: &str) -> Result<()> {
    let store = ws.store()?;
    let existed = store
        .unregister(name)
        .with_context(|| format!("failed to unregister {name}"))?;

    if ws.json {
        return print_json(&serde_json::json!({ "name": name, "removed": existed }));
    }
    if existed {
        println!("{}", style::success(&format!("Unregistered {name}")));
    } else {
        println!("{}", style::warn(&format!("{name} was not registered")));
    }
    Ok(())
}

pub fn show(ws: &Workspace, name: &str) -> Result<()> {
    let store = ws.store()?;
    let record = store.get(name)?;
    if ws.json {
        return print_json(&record);
    }

    println!();
    println!("{}", style::header(&record.name));
    println!("{}", "═".repeat(record.name.chars().count()));
    println!();
    println!("  Status      {}", style::status(record.status));
    println!("  Registered  {}", record.registered_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Agent       {}", record.agent.as_deref().unwrap_or("—"));
    if let Some(description) = &record.description {
        println!("  Description {description}");
    }
    println!();
    if record.files.is_empty() {
        println!("  {}", style::dim("No files registered."));
    } else {
        println!("  {}", style::header(&format!("Files ({})", record.files.len())));
        for file in &record.files {
            println!("    {file}");
        }
    }
    println!();
    Ok(())
}

pub fn list(ws: &Workspace, status: Option<&str>) -> Result<()> {
    let filter = status.map(parse_status).transpose()?;
    let store = ws.store()?;
    let records: Vec<BranchRecord> = store
        .list()?
        .into_iter()
        .filter(|r| filter.map_or(true, |s| r.status == s))
        .collect();

    if ws.json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("{}", style::dim("No branches registered."));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Branch", "Status", "Files", "Agent", "Registered", "Description"]);
    for r in &records {
        table.add_row(vec![
            Cell::new(&r.name),
            Cell::new(style::status(r.status)),
            Cell::new(r.files.len()),
            Cell::new(r.agent.as_deref().unwrap_or("—")),
            Cell::new(r.registered_at.format("%Y-%m-%d")),
            Cell::new(truncate(r.description.as_deref().unwrap_or(""), 40)),
        ]);
    }
    println!("{table}");
    println!("{} branch(es)", records.len());
    Ok(())
}

fn parse_status(s: &str) -> Result<BranchStatus> {
    BranchStatus::from_str_val(s)
        .with_context(|| format!("unknown status '{s}': use active, completed or abandoned"))
}

fn git_files(ws: &Workspace, branch: &str) -> Result<BTreeSet<String>> {
    let against = &ws.config.git.default_branch;
    ws.git("--from-git")?
        .changed_files(branch, against)
        .with_context(|| format!("failed to diff {branch} against {against}"))
}
