//! Setup and housekeeping: init, validate, stale, sync.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use branchwatch_core::config::AppConfig;
use branchwatch_core::errors::ConfigError;
use branchwatch_core::staleness;

use super::{print_json, Workspace};
use crate::style;

/// Write the default configuration to the workspace config path.
pub fn init(ws: &Workspace, force: bool) -> Result<()> {
    let path = &ws.config_path;
    if path.exists() && !force {
        bail!(
            "file already exists: {}. Pass --force to overwrite it.",
            path.display()
        );
    }

    let mut config = AppConfig::default();
    config.registry.project_id = ws
        .root
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string);
    let body = config.to_toml().context("failed to render configuration")?;
    let contents = format!("# branchwatch configuration\n\n{body}");
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!("{}", style::success(&format!("Wrote {}", path.display())));
    println!();
    println!("Next steps:");
    println!("  1. Register your branch: branchwatch register --from-git");
    println!("  2. See who you overlap:  branchwatch check");
    Ok(())
}

pub fn validate(ws: &Workspace) -> Result<()> {
    let path = &ws.config_path;
    println!("Validating configuration: {}", path.display());
    println!();

    let config = match AppConfig::load_from_file(path) {
        Ok(config) => {
            println!("  {}", style::success("TOML structure is valid"));
            config
        }
        Err(ConfigError::FileNotFound(_)) => {
            println!("  {}", style::warn("No config file; built-in defaults apply"));
            AppConfig::default()
        }
        Err(e) => {
            println!("  {}", style::error(&e.to_string()));
            bail!("configuration validation failed");
        }
    };

    if let Err(e) = config.validate() {
        println!("  {}", style::error(&e.to_string()));
        bail!("configuration validation failed");
    }
    println!("  {}", style::success("All fields are valid"));

    println!();
    println!("Configuration summary:");
    println!("  Registry backend : {}", config.registry.backend);
    println!(
        "  Registry path    : {}",
        config.registry.resolve_path(&ws.root).display()
    );
    println!(
        "  Project id       : {}",
        config.registry.project_id.as_deref().unwrap_or("—")
    );
    println!(
        "  Semantic refine  : {}",
        if config.semantic.enabled { "enabled" } else { "disabled" }
    );
    println!("  Stale after      : {} day(s)", config.staleness.days);
    println!("  Default branch   : {}", config.git.default_branch);
    println!(
        "  Git repository   : {}",
        if ws.git.is_some() { "found" } else { "not found" }
    );
    Ok(())
}

/// List stale registrations; remove them with `clean`.
pub fn stale(ws: &Workspace, days: Option<u32>, clean: bool) -> Result<()> {
    let days = days.unwrap_or(ws.config.staleness.days);
    if days == 0 {
        bail!("--days must be > 0");
    }
    let store = ws.store()?;
    let now = Utc::now();

    if clean {
        let removed = staleness::purge(store.as_ref(), days, now)
            .context("failed to remove stale branches")?;
        if ws.json {
            return print_json(&serde_json::json!({ "removed": removed }));
        }
        if removed.is_empty() {
            println!("{}", style::success("Nothing to clean"));
        } else {
            for name in &removed {
                println!("  {}", style::dim(name));
            }
            println!(
                "{}",
                style::success(&format!("Removed {} stale branch(es)", removed.len()))
            );
        }
        return Ok(());
    }

    let stale = staleness::preview(store.as_ref(), days, now)?;
    if ws.json {
        return print_json(&stale);
    }
    if stale.is_empty() {
        println!(
            "{}",
            style::success(&format!("No branch registered more than {days} day(s) ago"))
        );
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Branch", "Registered", "Age (days)"]);
    for s in &stale {
        table.add_row(vec![
            Cell::new(&s.name),
            Cell::new(s.registered_at.format("%Y-%m-%d")),
            Cell::new(s.age_days),
        ]);
    }
    println!("{table}");
    println!(
        "{}",
        style::dim(&format!(
            "{} stale branch(es); run with --clean to remove them",
            stale.len()
        ))
    );
    Ok(())
}

/// Abandon registrations whose branch was deleted from git.
pub fn sync(ws: &Workspace) -> Result<()> {
    let existing = ws
        .git("sync")?
        .local_branches()
        .context("failed to list git branches")?;
    let store = ws.store()?;
    let abandoned = ws
        .coordinator(store.as_ref())
        .sync_with_vcs(&existing)
        .context("failed to update registry")?;

    if ws.json {
        return print_json(&serde_json::json!({ "abandoned": abandoned }));
    }
    if abandoned.is_empty() {
        println!("{}", style::success("Registry matches local branches"));
    } else {
        for name in &abandoned {
            println!("  {} {}", style::dim("abandoned"), name);
        }
        println!(
            "{}",
            style::warn(&format!("{} branch(es) no longer exist", abandoned.len()))
        );
    }
    Ok(())
}
