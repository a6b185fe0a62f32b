//! Conflict detection between in-flight branches.
//!
//! The conflict subsystem is responsible for:
//! 1. **Overlap** -- building the file-level conflict graph from the registry.
//! 2. **Refinement** -- narrowing overlaps to branches that changed the same
//!    declaration, using the semantic layer.

pub mod graph;
pub mod refine;

pub use graph::{ConflictEdge, ConflictGraph};
pub use refine::{refine_file, FileVerdict, RefinedEdge, Refiner, Severity, VersionSource};
