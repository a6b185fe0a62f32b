//! File-overlap conflict graph.
//!
//! Two active branches conflict when their registered file sets intersect.
//! The graph is built in one pass over an inverted index (path → branches)
//! and is symmetric by construction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::BranchRecord;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An undirected overlap between two branches. `a < b` always holds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConflictEdge {
    pub a: String,
    pub b: String,
    /// Paths registered by both branches.
    pub files: BTreeSet<String>,
}

impl ConflictEdge {
    /// `true` if `name` is one of the edge's endpoints.
    pub fn touches(&self, name: &str) -> bool {
        self.a == name || self.b == name
    }

    /// The endpoint opposite `name`, if `name` is an endpoint.
    pub fn other(&self, name: &str) -> Option<&str> {
        if self.a == name {
            Some(&self.b)
        } else if self.b == name {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// Adjacency view over a set of branches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictGraph {
    neighbors: BTreeMap<String, Vec<String>>,
    edges: Vec<ConflictEdge>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

impl ConflictGraph {
    /// Build the overlap graph for `records`.
    ///
    /// Every input branch gets a neighbour entry, empty when it overlaps
    /// nothing. Callers pass only the records they want considered
    /// (normally the active ones).
    pub fn build(records: &[BranchRecord]) -> Self {
        let mut by_path: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for record in records {
            for path in &record.files {
                by_path.entry(path).or_default().push(&record.name);
            }
        }

        let mut shared: BTreeMap<(&str, &str), BTreeSet<String>> = BTreeMap::new();
        for (path, branches) in &by_path {
            if branches.len() < 2 {
                continue;
            }
            for (i, first) in branches.iter().enumerate() {
                for second in &branches[i + 1..] {
                    let key = if first < second {
                        (*first, *second)
                    } else {
                        (*second, *first)
                    };
                    shared.entry(key).or_default().insert((*path).to_string());
                }
            }
        }

        let edges: Vec<ConflictEdge> = shared
            .into_iter()
            .map(|((a, b), files)| {
                debug!(a, b, files = files.len(), "overlap");
                ConflictEdge {
                    a: a.to_string(),
                    b: b.to_string(),
                    files,
                }
            })
            .collect();

        let graph = Self::from_parts(records.iter().map(|r| r.name.clone()), edges);
        info!(
            branches = graph.neighbors.len(),
            edges = graph.edges.len(),
            "built conflict graph"
        );
        graph
    }

    fn from_parts(names: impl IntoIterator<Item = String>, edges: Vec<ConflictEdge>) -> Self {
        let mut neighbors: BTreeMap<String, Vec<String>> =
            names.into_iter().map(|n| (n, Vec::new())).collect();
        for edge in &edges {
            neighbors.entry(edge.a.clone()).or_default().push(edge.b.clone());
            neighbors.entry(edge.b.clone()).or_default().push(edge.a.clone());
        }
        for list in neighbors.values_mut() {
            list.sort();
            list.dedup();
        }
        Self { neighbors, edges }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Branches overlapping `name`, sorted. Empty for unknown names.
    pub fn neighbors(&self, name: &str) -> &[String] {
        self.neighbors.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn degree(&self, name: &str) -> usize {
        self.neighbors(name).len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.neighbors.contains_key(name)
    }

    /// All edges, sorted by `(a, b)`.
    pub fn edges(&self) -> &[ConflictEdge] {
        &self.edges
    }

    /// Edges with `name` as an endpoint.
    pub fn edges_of<'g>(&'g self, name: &'g str) -> impl Iterator<Item = &'g ConflictEdge> + 'g {
        self.edges.iter().filter(move |e| e.touches(name))
    }

    /// Branch names in the graph, sorted.
    pub fn branches(&self) -> impl Iterator<Item = &str> {
        self.neighbors.keys().map(String::as_str)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Keep only the edges for which `keep` returns `true`. Neighbour lists
    /// are rebuilt; branches stay in the graph even if they lose every edge.
    pub fn retain_edges(&mut self, mut keep: impl FnMut(&ConflictEdge) -> bool) {
        let before = self.edges.len();
        let edges: Vec<ConflictEdge> = std::mem::take(&mut self.edges)
            .into_iter()
            .filter(|e| keep(e))
            .collect();
        let names: Vec<String> = self.neighbors.keys().cloned().collect();
        *self = Self::from_parts(names, edges);
        debug!(before, after = self.edges.len(), "retained edges");
    }
}
