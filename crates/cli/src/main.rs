//! branchwatch command-line tool.
//!
//! Provides subcommands for registering in-flight branches, inspecting
//! file and declaration overlaps between them, recommending a merge order,
//! and pruning stale or orphaned registry entries.

mod commands;
mod style;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::Workspace;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Conflict prediction and merge sequencing for parallel branches.
#[derive(Parser, Debug)]
#[command(name = "branchwatch", version, about)]
struct Cli {
    /// Path to the TOML configuration file [default: <repo>/.branchwatch.toml].
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Repository to operate on.
    #[arg(short, long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Emit JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration file.
    Validate,

    /// Register a branch and the files it touches.
    Register {
        /// Branch name [default: current git branch].
        name: Option<String>,

        /// A file the branch touches (repeatable).
        #[arg(short, long = "file")]
        files: Vec<String>,

        /// Add the files changed since the branch left the default branch.
        #[arg(long)]
        from_git: bool,

        /// Agent working on the branch.
        #[arg(long)]
        agent: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Update a registered branch.
    Update {
        name: String,

        /// New status: active, completed, abandoned.
        #[arg(long)]
        status: Option<String>,

        /// Replace the file list (repeatable).
        #[arg(short, long = "file")]
        files: Vec<String>,

        /// Refresh the file list from git.
        #[arg(long, conflicts_with = "files")]
        from_git: bool,

        /// New agent; an empty string clears it.
        #[arg(long)]
        agent: Option<String>,

        /// New description; an empty string clears it.
        #[arg(long)]
        description: Option<String>,
    },

    /// Remove a branch from the registry.
    Unregister { name: String },

    /// Show one registered branch.
    Show { name: String },

    /// List registered branches.
    List {
        /// Filter by status: active, completed, abandoned.
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show overlaps between active branches.
    Conflicts {
        /// Skip declaration-level refinement.
        #[arg(long)]
        raw: bool,
    },

    /// Show overlaps involving one branch.
    Check {
        /// Branch to check [default: current git branch].
        branch: Option<String>,

        #[arg(long)]
        raw: bool,
    },

    /// Recommend an order for merging the active branches.
    MergeOrder {
        #[arg(long)]
        raw: bool,
    },

    /// List (and optionally remove) stale registrations.
    Stale {
        /// Age threshold in days [default: staleness.days from config].
        #[arg(long)]
        days: Option<u32>,

        /// Remove the stale entries.
        #[arg(long)]
        clean: bool,
    },

    /// Mark registrations whose git branch no longer exists as abandoned.
    Sync,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    let workspace = Workspace::open(&cli.repo, cli.config.as_deref(), cli.json);

    let level = match &workspace {
        _ if cli.verbose => "debug".to_string(),
        Ok(ws) => ws.config.log.level.clone(),
        Err(_) => "warn".to_string(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = workspace.and_then(|ws| run(cli.command, &ws));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{e:#}")));
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, ws: &Workspace) -> Result<()> {
    match command {
        Commands::Init { force } => commands::maintenance::init(ws, force),
        Commands::Validate => commands::maintenance::validate(ws),
        Commands::Register {
            name,
            files,
            from_git,
            agent,
            description,
        } => commands::branches::register(ws, name, files, from_git, agent, description),
        Commands::Update {
            name,
            status,
            files,
            from_git,
            agent,
            description,
        } => commands::branches::update(ws, &name, status, files, from_git, agent, description),
        Commands::Unregister { name } => commands::branches::unregister(ws, &name),
        Commands::Show { name } => commands::branches::show(ws, &name),
        Commands::List { status } => commands::branches::list(ws, status.as_deref()),
        Commands::Conflicts { raw } => commands::conflicts::conflicts(ws, raw),
        Commands::Check { branch, raw } => commands::conflicts::check(ws, branch, raw),
        Commands::MergeOrder { raw } => commands::conflicts::merge_order(ws, raw),
        Commands::Stale { days, clean } => commands::maintenance::stale(ws, days, clean),
        Commands::Sync => commands::maintenance::sync(ws),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_register() {
        let cli = Cli::try_parse_from([
            "branchwatch",
            "--json",
            "register",
            "feat/login",
            "-f",
            "src/a.ts",
            "--file",
            "src/b.ts",
            "--agent",
            "bot-1",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Register {
                name, files, agent, ..
            } => {
                assert_eq!(name.as_deref(), Some("feat/login"));
                assert_eq!(files, vec!["src/a.ts", "src/b.ts"]);
                assert_eq!(agent.as_deref(), Some("bot-1"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_update_files_conflict_with_from_git() {
        let result = Cli::try_parse_from([
            "branchwatch",
            "update",
            "x",
            "--file",
            "a",
            "--from-git",
        ]);
        assert!(result.is_err());
    }
}
