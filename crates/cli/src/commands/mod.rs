//! Subcommand implementations.
//!
//! Every command receives a [`Workspace`]: the resolved repository root,
//! configuration, and (when available) the git repository.

pub mod branches;
pub mod conflicts;
pub mod maintenance;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use branchwatch_core::config::{AppConfig, BackendKind, CONFIG_FILE_NAME};
use branchwatch_core::conflict::VersionSource;
use branchwatch_core::{Coordinator, GitRepo, JsonFileStore, RegistryStore, SqliteStore};

/// Everything a command needs to locate and open the registry.
pub struct Workspace {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub config: AppConfig,
    pub git: Option<GitRepo>,
    pub json: bool,
}

impl Workspace {
    /// Resolve the repository root and load its configuration.
    ///
    /// A directory outside any git repository is still usable; git-backed
    /// features report an error when invoked.
    pub fn open(repo: &Path, config: Option<&Path>, json: bool) -> Result<Self> {
        let git = match GitRepo::discover(repo) {
            Ok(git) => Some(git),
            Err(e) => {
                debug!(error = %e, "no git repository");
                None
            }
        };
        let root = git
            .as_ref()
            .map(|g| g.root().to_path_buf())
            .unwrap_or_else(|| repo.to_path_buf());
        let config_path = config
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.join(CONFIG_FILE_NAME));
        let config = AppConfig::load_or_default(&config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?;

        Ok(Self {
            root,
            config_path,
            config,
            git,
            json,
        })
    }

    /// Open the configured registry backend.
    pub fn store(&self) -> Result<Box<dyn RegistryStore>> {
        let registry = &self.config.registry;
        let path = registry.resolve_path(&self.root);
        debug!(backend = %registry.backend, path = %path.display(), "opening registry");
        let store: Box<dyn RegistryStore> = match registry.backend {
            BackendKind::Json => Box::new(JsonFileStore::new(&path, registry.project_id.clone())),
            BackendKind::Sqlite => Box::new(
                SqliteStore::open(&path, registry.project_id.clone())
                    .with_context(|| format!("failed to open {}", path.display()))?,
            ),
        };
        Ok(store)
    }

    pub fn coordinator<'s>(&self, store: &'s dyn RegistryStore) -> Coordinator<'s> {
        Coordinator::new(store, self.config.semantic.clone())
    }

    /// The git repository, or an error naming the command that needed it.
    pub fn git(&self, what: &str) -> Result<&GitRepo> {
        self.git.as_ref().with_context(|| {
            format!("{what} requires a git repository at {}", self.root.display())
        })
    }

    /// Where refinement reads file versions from, unless `raw` is set or no
    /// repository is available.
    pub fn version_source(&self, raw: bool) -> Option<&dyn VersionSource> {
        if raw {
            return None;
        }
        self.git.as_ref().map(|g| g as &dyn VersionSource)
    }

    /// `name`, or the checked-out branch when absent.
    pub fn branch_or_current(&self, name: Option<String>) -> Result<String> {
        match name {
            Some(name) => Ok(name),
            None => self
                .git("defaulting to the current branch")?
                .current_branch()
                .context("cannot determine the current branch"),
        }
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to encode JSON")?
    );
    Ok(())
}

/// Shorten `s` to at most `max` characters.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
