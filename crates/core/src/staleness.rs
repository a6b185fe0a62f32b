//! Stale-entry detection and purging.
//!
//! A record is stale once it was registered more than `days` days before
//! `now`. Classification is a pure function of `registered_at` and `now`;
//! purging issues exactly one bulk [`RegistryStore::cleanup`] call.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::RegistryError;
use crate::models::BranchRecord;
use crate::registry::RegistryStore;

/// A record past the staleness threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleBranch {
    pub name: String,
    pub registered_at: DateTime<Utc>,
    /// Whole days since registration.
    pub age_days: i64,
}

/// Cut-off instant: records registered strictly before it are stale.
///
/// A window reaching past the earliest representable instant saturates to
/// it, so nothing is stale.
pub fn threshold(days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    Duration::try_days(i64::from(days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Stale records among `records`, oldest first.
pub fn classify(records: &[BranchRecord], days: u32, now: DateTime<Utc>) -> Vec<StaleBranch> {
    let cutoff = threshold(days, now);
    let mut stale: Vec<StaleBranch> = records
        .iter()
        .filter(|r| r.registered_at < cutoff)
        .map(|r| StaleBranch {
            name: r.name.clone(),
            registered_at: r.registered_at,
            age_days: (now - r.registered_at).num_days(),
        })
        .collect();
    stale.sort_by(|a, b| {
        a.registered_at
            .cmp(&b.registered_at)
            .then_with(|| a.name.cmp(&b.name))
    });
    debug!(total = records.len(), stale = stale.len(), days, "classified staleness");
    stale
}

/// What [`purge`] would remove, without touching the store.
pub fn preview(
    store: &dyn RegistryStore,
    days: u32,
    now: DateTime<Utc>,
) -> Result<Vec<StaleBranch>, RegistryError> {
    Ok(classify(&store.list()?, days, now))
}

/// Remove every stale record in one bulk call. Returns the removed names.
pub fn purge(
    store: &dyn RegistryStore,
    days: u32,
    now: DateTime<Utc>,
) -> Result<Vec<String>, RegistryError> {
    let removed = store.cleanup(threshold(days, now))?;
    info!(removed = removed.len(), days, "purged stale branches");
    Ok(removed)
}

/// Active records whose branch is not in `existing` (deleted from the VCS).
pub fn find_orphans(records: &[BranchRecord], existing: &BTreeSet<String>) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.is_active() && !existing.contains(&r.name))
        .map(|r| r.name.clone())
        .collect()
}
