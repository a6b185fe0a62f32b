//! Error types for the branchwatch core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. The CLI
//! wraps them in `anyhow` with context at the call site.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

/// Errors surfaced by every [`RegistryStore`](crate::registry::RegistryStore)
/// implementation.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The referenced branch is not registered.
    #[error("branch '{0}' is not registered")]
    NotFound(String),

    /// A branch with this name is already registered.
    #[error("branch '{0}' is already registered")]
    DuplicateBranch(String),

    /// Input was rejected before any mutation was attempted.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The persistence layer failed; fatal for the current invocation.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Malformed branch names or file paths.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid branch name '{name}': {reason}")]
    InvalidBranchName { name: String, reason: String },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from the persistence backends (JSON file, SQLite).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Generic I/O error (e.g. file permissions).
    #[error("registry I/O error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The registry document could not be (de)serialized.
    #[error("registry document error: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying rusqlite error.
    #[error("registry database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("registry migration failed (version {version}): {detail}")]
    Migration { version: u32, detail: String },

    /// The temp file could not be renamed over the registry.
    #[error("failed to replace registry at '{path}': {detail}")]
    Persist { path: String, detail: String },

    /// The registry was written with a schema this build does not know.
    #[error("registry '{path}' has schema version '{found}', expected '{expected}'")]
    UnsupportedVersion {
        path: String,
        found: String,
        expected: String,
    },

    /// A stored row could not be decoded.
    #[error("corrupt registry entry '{name}': {detail}")]
    Corrupt { name: String, detail: String },
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Errors from declaration extraction. Callers recover from these by falling
/// back to file-level conflict detection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No grammar is available for this file.
    #[error("no parser available for '{0}'")]
    UnsupportedLanguage(String),

    /// The grammar could not be loaded into the parser.
    #[error("failed to load grammar: {0}")]
    Language(String),

    /// The parser produced no tree at all.
    #[error("parser returned no syntax tree")]
    NoTree,

    /// The source contains syntax errors.
    #[error("syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// HEAD does not point at a local branch.
    #[error("HEAD is detached; pass a branch name explicitly")]
    DetachedHead,
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Convenience conversions
// ---------------------------------------------------------------------------

impl From<rusqlite::Error> for RegistryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Sqlite(e))
    }
}
