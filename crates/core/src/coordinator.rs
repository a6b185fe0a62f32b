//! Query orchestration over a registry.
//!
//! Each call loads the registry once, derives everything it reports from
//! that snapshot, and persists only through the store. Nothing is cached
//! between calls.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use crate::config::SemanticConfig;
use crate::conflict::{ConflictEdge, ConflictGraph, RefinedEdge, Refiner, VersionSource};
use crate::errors::RegistryError;
use crate::models::{BranchRecord, BranchStatus, BranchUpdate};
use crate::planner::{self, MergeOrderEntry};
use crate::registry::RegistryStore;
use crate::staleness;

/// Conflict picture for the active branches.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// Overlaps after refinement (or the raw overlaps when not refined).
    pub edges: Vec<ConflictEdge>,
    /// Per-file verdicts, present only when refinement ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refined: Option<Vec<RefinedEdge>>,
    #[serde(skip)]
    pub graph: ConflictGraph,
}

impl Analysis {
    pub fn is_refined(&self) -> bool {
        self.refined.is_some()
    }
}

/// Coordinates the registry, conflict graph, refiner, and planner.
pub struct Coordinator<'a> {
    store: &'a dyn RegistryStore,
    semantic: SemanticConfig,
}

impl<'a> Coordinator<'a> {
    pub fn new(store: &'a dyn RegistryStore, semantic: SemanticConfig) -> Self {
        Self { store, semantic }
    }

    pub fn store(&self) -> &dyn RegistryStore {
        self.store
    }

    /// File-overlap graph over the active branches.
    pub fn conflict_graph(&self) -> Result<ConflictGraph, RegistryError> {
        Ok(ConflictGraph::build(&self.store.list_active()?))
    }

    /// Overlap graph narrowed to declaration-level conflicts.
    pub fn refined_graph(
        &self,
        source: &dyn VersionSource,
    ) -> Result<(ConflictGraph, Vec<RefinedEdge>), RegistryError> {
        let raw = self.conflict_graph()?;
        Ok(Refiner::new(source, &self.semantic.include).refine_graph(&raw))
    }

    /// Refined graph when a source is given and refinement is enabled, raw
    /// graph otherwise.
    pub fn analyze(&self, source: Option<&dyn VersionSource>) -> Result<Analysis, RegistryError> {
        Ok(self.analyze_records(&self.store.list_active()?, source))
    }

    /// [`analyze`](Self::analyze) over an already loaded set of records.
    pub fn analyze_records(
        &self,
        records: &[BranchRecord],
        source: Option<&dyn VersionSource>,
    ) -> Analysis {
        let raw = ConflictGraph::build(records);
        match source {
            Some(source) if self.semantic.enabled => {
                let (graph, refined) =
                    Refiner::new(source, &self.semantic.include).refine_graph(&raw);
                Analysis {
                    edges: graph.edges().to_vec(),
                    refined: Some(refined),
                    graph,
                }
            }
            _ => Analysis {
                edges: raw.edges().to_vec(),
                refined: None,
                graph: raw,
            },
        }
    }

    /// Recommended merge order for the active branches.
    ///
    /// Degrees come from the same graph [`analyze`](Self::analyze) returns,
    /// built from the one registry snapshot the plan is made of.
    pub fn merge_order(
        &self,
        source: Option<&dyn VersionSource>,
    ) -> Result<Vec<MergeOrderEntry>, RegistryError> {
        let records = self.store.list_active()?;
        let analysis = self.analyze_records(&records, source);
        Ok(planner::plan(&records, &analysis.graph))
    }

    /// Overlaps involving `branch`.
    ///
    /// The branch must be registered; its overlaps are computed against the
    /// active branches even if it is not active itself.
    pub fn check(
        &self,
        branch: &str,
        source: Option<&dyn VersionSource>,
    ) -> Result<Vec<ConflictEdge>, RegistryError> {
        let all = self.store.list()?;
        if !all.iter().any(|r| r.name == branch) {
            return Err(RegistryError::NotFound(branch.to_string()));
        }
        let records: Vec<BranchRecord> = all
            .into_iter()
            .filter(|r| r.is_active() || r.name == branch)
            .collect();
        let analysis = self.analyze_records(&records, source);
        Ok(analysis.graph.edges_of(branch).cloned().collect())
    }

    /// Mark active branches missing from `existing` as abandoned. Returns
    /// their names.
    pub fn sync_with_vcs(&self, existing: &BTreeSet<String>) -> Result<Vec<String>, RegistryError> {
        let orphans = staleness::find_orphans(&self.store.list()?, existing);
        for name in &orphans {
            self.store
                .update(name, BranchUpdate::status(BranchStatus::Abandoned))?;
        }
        info!(abandoned = orphans.len(), "synchronised registry with VCS");
        Ok(orphans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;

    use chrono::{DateTime, Utc};

    use crate::errors::GitError;
    use crate::models::NewBranch;
    use crate::registry::MemoryStore;

    struct Files(HashMap<(String, String), String>, HashMap<String, String>);

    impl VersionSource for Files {
        fn branch_file(&self, branch: &str, path: &str) -> Result<Option<String>, GitError> {
            Ok(self.0.get(&(branch.to_string(), path.to_string())).cloned())
        }
        fn base_file(&self, _a: &str, _b: &str, path: &str) -> Result<Option<String>, GitError> {
            Ok(self.1.get(path).cloned())
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new(Some("demo".into()));
        store
            .register(NewBranch::new("A").with_files(["x.js", "y.js"]))
            .unwrap();
        store
            .register(NewBranch::new("B").with_files(["y.js", "z.js"]))
            .unwrap();
        store.register(NewBranch::new("C").with_files(["w.js"])).unwrap();
        store
    }

    fn disjoint_source() -> Files {
        let base = "function f() { return 0; }\nfunction g() { return 0; }\n";
        let mut tips = HashMap::new();
        tips.insert(
            ("A".to_string(), "y.js".to_string()),
            "function f() { return 1; }\nfunction g() { return 0; }\n".to_string(),
        );
        tips.insert(
            ("B".to_string(), "y.js".to_string()),
            "function f() { return 0; }\nfunction g() { return 1; }\n".to_string(),
        );
        Files(tips, HashMap::from([("y.js".to_string(), base.to_string())]))
    }

    /// Drops `X` right after the first snapshot, the way another process
    /// unregistering it mid-command would.
    struct RacingStore {
        inner: MemoryStore,
        lists: Cell<usize>,
    }

    impl RegistryStore for RacingStore {
        fn register(&self, branch: NewBranch) -> Result<BranchRecord, RegistryError> {
            self.inner.register(branch)
        }
        fn get(&self, name: &str) -> Result<BranchRecord, RegistryError> {
            self.inner.get(name)
        }
        fn list(&self) -> Result<Vec<BranchRecord>, RegistryError> {
            let snapshot = self.inner.list()?;
            self.lists.set(self.lists.get() + 1);
            self.inner.unregister("X")?;
            Ok(snapshot)
        }
        fn update(&self, name: &str, update: BranchUpdate) -> Result<BranchRecord, RegistryError> {
            self.inner.update(name, update)
        }
        fn unregister(&self, name: &str) -> Result<bool, RegistryError> {
            self.inner.unregister(name)
        }
        fn cleanup(&self, older_than: DateTime<Utc>) -> Result<Vec<String>, RegistryError> {
            self.inner.cleanup(older_than)
        }
        fn restore(&self, record: BranchRecord) -> Result<(), RegistryError> {
            self.inner.restore(record)
        }
        fn project_id(&self) -> Result<Option<String>, RegistryError> {
            self.inner.project_id()
        }
    }

    fn racing() -> RacingStore {
        let inner = seeded();
        inner.register(NewBranch::new("X").with_files(["x.js"])).unwrap();
        RacingStore {
            inner,
            lists: Cell::new(0),
        }
    }

    #[test]
    fn test_merge_order_uses_one_snapshot() {
        let store = racing();
        let coordinator = Coordinator::new(&store, SemanticConfig::default());
        let order = coordinator.merge_order(None).unwrap();
        assert_eq!(store.lists.get(), 1);

        // X was in the snapshot, so it is both ranked and counted.
        let x = order.iter().find(|e| e.record.name == "X").unwrap();
        assert_eq!(x.degree, 1);
        let a = order.iter().find(|e| e.record.name == "A").unwrap();
        assert_eq!(a.degree, 2);

        // Every edge is reported once, by whichever end merges first.
        let degrees: usize = order.iter().map(|e| e.degree).sum();
        let rebases: usize = order.iter().map(|e| e.rebase_after.len()).sum();
        assert_eq!(degrees, 2 * rebases);
    }

    #[test]
    fn test_check_uses_one_snapshot() {
        let store = racing();
        store
            .inner
            .update("B", BranchUpdate::status(BranchStatus::Completed))
            .unwrap();
        let coordinator = Coordinator::new(&store, SemanticConfig::default());
        let edges = coordinator.check("B", None).unwrap();
        assert_eq!(store.lists.get(), 1);
        assert_eq!(edges.len(), 1);
        assert!(edges[0].touches("A"));
    }

    #[test]
    fn test_raw_analysis() {
        let store = seeded();
        let coordinator = Coordinator::new(&store, SemanticConfig::default());
        let analysis = coordinator.analyze(None).unwrap();
        assert!(!analysis.is_refined());
        assert_eq!(analysis.edges.len(), 1);
        assert_eq!(analysis.graph.degree("C"), 0);

        let order: Vec<String> = coordinator
            .merge_order(None)
            .unwrap()
            .into_iter()
            .map(|e| e.record.name)
            .collect();
        assert_eq!(order, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_refined_analysis_drops_disjoint_edge() {
        let store = seeded();
        let source = disjoint_source();
        let coordinator = Coordinator::new(&store, SemanticConfig::default());
        let analysis = coordinator.analyze(Some(&source)).unwrap();
        assert!(analysis.is_refined());
        assert!(analysis.edges.is_empty());
        assert!(coordinator.check("A", Some(&source)).unwrap().is_empty());
        assert_eq!(coordinator.check("A", None).unwrap().len(), 1);
    }

    #[test]
    fn test_disabled_semantic_ignores_source() {
        let store = seeded();
        let source = disjoint_source();
        let semantic = SemanticConfig {
            enabled: false,
            ..SemanticConfig::default()
        };
        let coordinator = Coordinator::new(&store, semantic);
        let analysis = coordinator.analyze(Some(&source)).unwrap();
        assert!(!analysis.is_refined());
        assert_eq!(analysis.edges.len(), 1);
    }

    #[test]
    fn test_inactive_branches_leave_the_graph() {
        let store = seeded();
        store
            .update("B", BranchUpdate::status(BranchStatus::Completed))
            .unwrap();
        let coordinator = Coordinator::new(&store, SemanticConfig::default());
        assert_eq!(coordinator.conflict_graph().unwrap().edge_count(), 0);
        // Checking the completed branch still reports what it would hit.
        let edges = coordinator.check("B", None).unwrap();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].touches("A"));
    }

    #[test]
    fn test_check_unknown_branch() {
        let store = seeded();
        let coordinator = Coordinator::new(&store, SemanticConfig::default());
        assert!(matches!(
            coordinator.check("nope", None),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_sync_marks_orphans_abandoned() {
        let store = seeded();
        let coordinator = Coordinator::new(&store, SemanticConfig::default());
        let existing: BTreeSet<String> = ["A".to_string(), "C".to_string()].into();
        assert_eq!(coordinator.sync_with_vcs(&existing).unwrap(), vec!["B".to_string()]);
        assert_eq!(store.get("B").unwrap().status, BranchStatus::Abandoned);
        // A second pass finds nothing new.
        assert!(coordinator.sync_with_vcs(&existing).unwrap().is_empty());
    }
}
