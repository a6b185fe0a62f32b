//! branchwatch core library.
//!
//! This crate provides the building blocks for coordinating concurrent
//! branches: the branch registry and its storage backends, the file-overlap
//! conflict graph, declaration-level refinement, merge-order planning,
//! staleness tracking, git facts, and configuration.

pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod errors;
pub mod git;
pub mod models;
pub mod planner;
pub mod registry;
pub mod semantic;
pub mod staleness;
pub mod validation;

// Re-exports for convenience.
pub use config::AppConfig;
pub use coordinator::Coordinator;
pub use git::GitRepo;
pub use models::{BranchRecord, BranchStatus, BranchUpdate, NewBranch};
pub use registry::{JsonFileStore, MemoryStore, RegistryStore, SqliteStore};
