//! Merge-order recommendation.
//!
//! Branches with the fewest overlaps merge first, ties broken by
//! registration time and then name. This is a stable sort rather than a
//! topological one: overlaps are undirected and may form cycles.

use serde::Serialize;
use tracing::{debug, info};

use crate::conflict::ConflictGraph;
use crate::models::BranchRecord;

/// One position in the recommended merge order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOrderEntry {
    /// 1-based position.
    pub rank: usize,
    pub degree: usize,
    pub record: BranchRecord,
    /// Overlapping branches that come later and will need a rebase once this
    /// one lands.
    pub rebase_after: Vec<String>,
}

/// Order `records` for merging using the degrees in `graph`.
///
/// The output is a permutation of the input. Branches missing from `graph`
/// are treated as having no overlaps.
pub fn plan(records: &[BranchRecord], graph: &ConflictGraph) -> Vec<MergeOrderEntry> {
    let mut ordered: Vec<(usize, &BranchRecord)> =
        records.iter().map(|r| (graph.degree(&r.name), r)).collect();
    ordered.sort_by(|(da, a), (db, b)| {
        da.cmp(db)
            .then_with(|| a.registered_at.cmp(&b.registered_at))
            .then_with(|| a.name.cmp(&b.name))
    });

    let position: std::collections::HashMap<&str, usize> = ordered
        .iter()
        .enumerate()
        .map(|(i, (_, r))| (r.name.as_str(), i))
        .collect();

    let entries: Vec<MergeOrderEntry> = ordered
        .iter()
        .enumerate()
        .map(|(i, (degree, record))| {
            let rebase_after: Vec<String> = graph
                .neighbors(&record.name)
                .iter()
                .filter(|n| position.get(n.as_str()).is_some_and(|&p| p > i))
                .cloned()
                .collect();
            debug!(
                rank = i + 1,
                branch = %record.name,
                degree,
                rebase = rebase_after.len(),
                "planned"
            );
            MergeOrderEntry {
                rank: i + 1,
                degree: *degree,
                record: (*record).clone(),
                rebase_after,
            }
        })
        .collect();

    info!(branches = entries.len(), "computed merge order");
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record(name: &str, files: &[&str], t: i64) -> BranchRecord {
        BranchRecord {
            name: name.to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
            registered_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(t),
            agent: None,
            status: Default::default(),
            description: None,
        }
    }

    fn names(entries: &[MergeOrderEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.record.name.as_str()).collect()
    }

    #[test]
    fn test_degree_then_age() {
        let records = vec![
            record("A", &["x", "y"], 0),
            record("B", &["y", "z"], 1),
            record("C", &["w"], 2),
        ];
        let graph = ConflictGraph::build(&records);
        let order = plan(&records, &graph);

        assert_eq!(names(&order), vec!["C", "A", "B"]);
        assert_eq!(order.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(order[0].degree, 0);
        assert_eq!(order[1].rebase_after, vec!["B".to_string()]);
        assert!(order[2].rebase_after.is_empty());
    }

    #[test]
    fn test_name_breaks_full_ties() {
        let records = vec![record("zeta", &[], 5), record("alpha", &[], 5)];
        let graph = ConflictGraph::build(&records);
        assert_eq!(names(&plan(&records, &graph)), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_output_is_permutation_and_sorted() {
        let records = vec![
            record("a", &["1", "2"], 3),
            record("b", &["2", "3"], 1),
            record("c", &["3", "1"], 2),
            record("d", &["4"], 9),
            record("e", &["1"], 0),
        ];
        let graph = ConflictGraph::build(&records);
        let order = plan(&records, &graph);

        let mut got: Vec<&str> = names(&order);
        got.sort();
        assert_eq!(got, vec!["a", "b", "c", "d", "e"]);

        for pair in order.windows(2) {
            let (x, y) = (&pair[0], &pair[1]);
            assert!(
                x.degree < y.degree
                    || (x.degree == y.degree
                        && x.record.registered_at <= y.record.registered_at)
            );
        }
    }

    #[test]
    fn test_cycle_rebase_guidance() {
        let records = vec![
            record("A", &["f"], 0),
            record("B", &["f"], 1),
            record("C", &["f"], 2),
        ];
        let graph = ConflictGraph::build(&records);
        let order = plan(&records, &graph);
        assert_eq!(names(&order), vec!["A", "B", "C"]);
        assert_eq!(order[0].rebase_after, vec!["B".to_string(), "C".to_string()]);
        assert_eq!(order[1].rebase_after, vec!["C".to_string()]);
        assert!(order[2].rebase_after.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(plan(&[], &ConflictGraph::default()).is_empty());
    }
}
