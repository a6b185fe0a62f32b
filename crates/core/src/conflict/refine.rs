//! Declaration-level refinement of file overlaps.
//!
//! A raw edge says two branches registered the same file. Refinement loads
//! each branch's version of that file (plus the merge-base version), extracts
//! declarations, and keeps the edge only if both branches touched the same
//! declaration differently. Anything that cannot be analysed degrades to
//! [`Severity::Unknown`], which keeps the edge.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::graph::{ConflictEdge, ConflictGraph};
use crate::errors::{GitError, ParseError};
use crate::semantic::extract::{DeclarationKey, DeclarationSet};
use crate::semantic::{declarations_for, Language};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Refined verdict for one overlapping file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The branches touched disjoint declarations.
    None,
    /// Both branches changed the same declaration differently.
    Conflict,
    /// The file could not be analysed; treated as a conflict.
    Unknown,
}

impl Severity {
    /// `true` for every verdict that keeps an edge.
    pub fn is_conflict(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Conflict => write!(f, "conflict"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Where file contents come from.
///
/// `Ok(None)` means the file does not exist at that revision, which is
/// analysed as an empty file.
pub trait VersionSource {
    /// Contents of `path` at the tip of `branch`.
    fn branch_file(&self, branch: &str, path: &str) -> Result<Option<String>, GitError>;

    /// Contents of `path` at the merge base of branches `a` and `b`.
    fn base_file(&self, a: &str, b: &str, path: &str) -> Result<Option<String>, GitError>;
}

/// Verdict for one path of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVerdict {
    pub path: String,
    pub severity: Severity,
}

/// An edge together with the per-file verdicts that decided it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinedEdge {
    #[serde(flatten)]
    pub edge: ConflictEdge,
    pub verdicts: Vec<FileVerdict>,
}

impl RefinedEdge {
    /// `true` if at least one file still conflicts.
    pub fn is_conflict(&self) -> bool {
        self.verdicts.iter().any(|v| v.severity.is_conflict())
    }

    /// Worst verdict across the edge's files.
    pub fn severity(&self) -> Severity {
        if self.verdicts.iter().any(|v| v.severity == Severity::Conflict) {
            Severity::Conflict
        } else if self.verdicts.iter().any(|v| v.severity == Severity::Unknown) {
            Severity::Unknown
        } else {
            Severity::None
        }
    }
}

// ---------------------------------------------------------------------------
// Per-file comparison
// ---------------------------------------------------------------------------

/// Compare two branches' declarations for one file.
///
/// With a `base`, a side touched every key whose fingerprint differs from the
/// base (added, removed, or modified). Without one, both sides are taken to
/// have touched every key on which they disagree. The file conflicts when a
/// key touched on both sides ends up with different fingerprints.
pub fn refine_file(
    base: Option<&DeclarationSet>,
    left: Result<&DeclarationSet, &ParseError>,
    right: Result<&DeclarationSet, &ParseError>,
) -> Severity {
    let (left, right) = match (left, right) {
        (Ok(l), Ok(r)) => (l, r),
        _ => return Severity::Unknown,
    };

    let (touched_left, touched_right) = match base {
        Some(base) => (touched(base, left), touched(base, right)),
        None => {
            let diff = touched(left, right);
            (diff.clone(), diff)
        }
    };

    let clash = touched_left
        .intersection(&touched_right)
        .any(|key| left.fingerprint_of(key) != right.fingerprint_of(key));

    if clash {
        Severity::Conflict
    } else {
        Severity::None
    }
}

/// Keys whose fingerprint differs between `from` and `to`.
fn touched<'a>(from: &'a DeclarationSet, to: &'a DeclarationSet) -> BTreeSet<&'a DeclarationKey> {
    from.keys()
        .chain(to.keys())
        .filter(|key| from.fingerprint_of(key) != to.fingerprint_of(key))
        .collect()
}

// ---------------------------------------------------------------------------
// Refiner
// ---------------------------------------------------------------------------

/// Applies [`refine_file`] to edges using file contents from a
/// [`VersionSource`].
pub struct Refiner<'a> {
    source: &'a dyn VersionSource,
    include: &'a [String],
}

impl<'a> Refiner<'a> {
    /// `include` holds glob patterns selecting analysable paths; an empty list
    /// admits every path with a supported extension.
    pub fn new(source: &'a dyn VersionSource, include: &'a [String]) -> Self {
        Self { source, include }
    }

    /// `true` if `path` is in scope for declaration analysis.
    pub fn is_analysable(&self, path: &str) -> bool {
        Language::from_path(path).is_some()
            && (self.include.is_empty() || self.include.iter().any(|p| glob_matches(p, path)))
    }

    /// Verdict for `path` shared by branches `a` and `b`.
    pub fn refine_path(&self, a: &str, b: &str, path: &str) -> Severity {
        if !self.is_analysable(path) {
            debug!(path, "not analysable, keeping overlap");
            return Severity::Unknown;
        }

        let base = match self.source.base_file(a, b, path) {
            Ok(text) => self.load(path, text),
            Err(e) => {
                warn!(a, b, path, error = %e, "cannot read merge-base version");
                return Severity::Unknown;
            }
        };
        let left = match self.source.branch_file(a, path) {
            Ok(text) => self.load(path, text),
            Err(e) => {
                warn!(branch = a, path, error = %e, "cannot read branch version");
                return Severity::Unknown;
            }
        };
        let right = match self.source.branch_file(b, path) {
            Ok(text) => self.load(path, text),
            Err(e) => {
                warn!(branch = b, path, error = %e, "cannot read branch version");
                return Severity::Unknown;
            }
        };

        if let Err(e) = &base {
            warn!(path, error = %e, "merge-base version does not parse");
            return Severity::Unknown;
        }
        for (branch, side) in [(a, &left), (b, &right)] {
            if let Err(e) = side {
                warn!(branch, path, error = %e, "branch version does not parse");
            }
        }

        let severity = refine_file(base.as_ref().ok(), left.as_ref(), right.as_ref());
        debug!(a, b, path, %severity, "refined file");
        severity
    }

    /// Refine every path of `edge`.
    pub fn refine_edge(&self, edge: &ConflictEdge) -> RefinedEdge {
        let verdicts = edge
            .files
            .iter()
            .map(|path| FileVerdict {
                path: path.clone(),
                severity: self.refine_path(&edge.a, &edge.b, path),
            })
            .collect();
        RefinedEdge {
            edge: edge.clone(),
            verdicts,
        }
    }

    /// Refine every edge of `graph`, returning the narrowed graph and the
    /// per-edge verdicts (dropped edges included).
    pub fn refine_graph(&self, graph: &ConflictGraph) -> (ConflictGraph, Vec<RefinedEdge>) {
        let refined: Vec<RefinedEdge> =
            graph.edges().iter().map(|e| self.refine_edge(e)).collect();
        let kept: BTreeSet<(&str, &str)> = refined
            .iter()
            .filter(|r| r.is_conflict())
            .map(|r| (r.edge.a.as_str(), r.edge.b.as_str()))
            .collect();

        let mut narrowed = graph.clone();
        narrowed.retain_edges(|e| kept.contains(&(e.a.as_str(), e.b.as_str())));
        info!(
            raw = graph.edge_count(),
            refined = narrowed.edge_count(),
            "semantic refinement complete"
        );
        (narrowed, refined)
    }

    fn load(&self, path: &str, text: Option<String>) -> Result<DeclarationSet, ParseError> {
        match text {
            Some(text) => declarations_for(path, &text),
            None => Ok(DeclarationSet::empty()),
        }
    }
}

/// Glob match where a leading `**/` may also match zero directories.
fn glob_matches(pattern: &str, path: &str) -> bool {
    glob_match::glob_match(pattern, path)
        || pattern
            .strip_prefix("**/")
            .is_some_and(|rest| glob_match::glob_match(rest, path))
}
