//! TOML-based configuration for branchwatch.
//!
//! The file lives at `.branchwatch.toml` in the repository root. Every
//! section is optional; a missing file yields [`AppConfig::default`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Default config file name, relative to the repository root.
pub const CONFIG_FILE_NAME: &str = ".branchwatch.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Registry backend and location.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Declaration-level conflict refinement.
    #[serde(default)]
    pub semantic: SemanticConfig,

    /// Stale-entry thresholds.
    #[serde(default)]
    pub staleness: StalenessConfig,

    #[serde(default)]
    pub git: GitConfig,

    #[serde(default)]
    pub log: LogConfig,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Which [`RegistryStore`](crate::registry::RegistryStore) backs the registry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// A single JSON document, rewritten atomically.
    #[default]
    Json,
    /// A SQLite database.
    Sqlite,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Registry location, relative to the repository root unless absolute.
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,

    /// Identifier stamped into new registries.
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_registry_path() -> PathBuf {
    PathBuf::from(".branchwatch/registry.json")
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            path: default_registry_path(),
            project_id: None,
        }
    }
}

impl RegistryConfig {
    /// Absolute registry location for a repository rooted at `root`.
    pub fn resolve_path(&self, root: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            root.join(&self.path)
        }
    }
}

// ---------------------------------------------------------------------------
// Semantic refinement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticConfig {
    /// Refine file overlaps down to declarations (default true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Glob patterns of paths eligible for refinement. Empty admits every
    /// path with a supported extension.
    #[serde(default = "default_include")]
    pub include: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_include() -> Vec<String> {
    ["js", "jsx", "mjs", "cjs", "ts", "tsx", "mts", "cts"]
        .iter()
        .map(|ext| format!("**/*.{ext}"))
        .collect()
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include: default_include(),
        }
    }
}

// ---------------------------------------------------------------------------
// Staleness
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StalenessConfig {
    /// Entries registered more than this many days ago are stale.
    #[serde(default = "default_stale_days")]
    pub days: u32,
}

fn default_stale_days() -> u32 {
    14
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            days: default_stale_days(),
        }
    }
}

// ---------------------------------------------------------------------------
// Git / logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitConfig {
    /// Branch that `register --from-git` diffs against (default `main`).
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "main".into()
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Like [`load_from_file`](Self::load_from_file), but a missing file
    /// yields the defaults. The result is validated either way.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::FileNotFound(_)) => {
                debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "registry.path".into(),
                detail: "registry path must not be empty".into(),
            });
        }
        if self.staleness.days == 0 {
            return Err(ConfigError::InvalidValue {
                field: "staleness.days".into(),
                detail: "staleness threshold must be > 0".into(),
            });
        }
        if self.git.default_branch.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "git.default_branch".into(),
                detail: "default branch must not be empty".into(),
            });
        }
        if !LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "log.level".into(),
                detail: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }
        Ok(())
    }

    /// Render as TOML, used by `branchwatch init`.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
