//! The branch registry: durable store of [`BranchRecord`]s.
//!
//! All backends implement [`RegistryStore`]. Callers are written against the
//! trait and never inspect which backend is active:
//!
//! | Backend | Module | Atomicity |
//! |---------|--------|-----------|
//! | JSON document | [`json`] | temp file + atomic rename |
//! | SQLite | [`sqlite`] | one transaction per mutation |
//! | In-memory | [`memory`] | mutex-guarded document |
//!
//! No backend caches state between calls: each operation starts from the
//! latest persisted registry.

pub mod json;
pub mod memory;
pub mod schema;
pub mod sqlite;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::{RegistryError, ValidationError};
use crate::models::{BranchRecord, BranchStatus, BranchUpdate, NewBranch, RegistryDocument};
use crate::validation::{normalize_paths, validate_branch_name};

pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// The registry contract shared by every persistence backend.
pub trait RegistryStore {
    /// Store a new record stamped with the current time.
    ///
    /// Fails with [`RegistryError::DuplicateBranch`] if the name is taken.
    fn register(&self, branch: NewBranch) -> Result<BranchRecord, RegistryError>;

    /// Fetch one record.
    fn get(&self, name: &str) -> Result<BranchRecord, RegistryError>;

    /// Snapshot of every record, sorted by name.
    fn list(&self) -> Result<Vec<BranchRecord>, RegistryError>;

    /// Merge the provided fields into an existing record.
    fn update(&self, name: &str, update: BranchUpdate) -> Result<BranchRecord, RegistryError>;

    /// Remove a record. Returns whether it existed.
    fn unregister(&self, name: &str) -> Result<bool, RegistryError>;

    /// Remove every record registered before `older_than` in one atomic step
    /// and return the removed names, sorted.
    fn cleanup(&self, older_than: DateTime<Utc>) -> Result<Vec<String>, RegistryError>;

    /// Insert a fully-formed record verbatim, keeping its timestamp.
    ///
    /// Used when copying a registry between backends.
    fn restore(&self, record: BranchRecord) -> Result<(), RegistryError>;

    /// Project identifier stored alongside the registry, if any.
    fn project_id(&self) -> Result<Option<String>, RegistryError>;

    /// Every record whose files intersect `paths`.
    fn find_by_files(&self, paths: &[String]) -> Result<Vec<BranchRecord>, RegistryError> {
        let wanted = normalize_paths(paths)?;
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.touches_any(&wanted))
            .collect())
    }

    /// Records with `status == active`.
    fn list_active(&self) -> Result<Vec<BranchRecord>, RegistryError> {
        Ok(self.list()?.into_iter().filter(BranchRecord::is_active).collect())
    }
}

/// Copy every record of `from` into `to`. Returns the number copied.
pub fn copy_registry(
    from: &dyn RegistryStore,
    to: &dyn RegistryStore,
) -> Result<usize, RegistryError> {
    let records = from.list()?;
    let count = records.len();
    for record in records {
        to.restore(record)?;
    }
    Ok(count)
}

// ---------------------------------------------------------------------------
// Shared validation
// ---------------------------------------------------------------------------

/// Validate a registration request and build the record it describes.
pub(crate) fn prepare_record(
    branch: NewBranch,
    now: DateTime<Utc>,
) -> Result<BranchRecord, ValidationError> {
    validate_branch_name(&branch.name)?;
    let files = normalize_paths(&branch.files)?;
    Ok(BranchRecord {
        name: branch.name,
        files,
        registered_at: now,
        agent: branch.agent.filter(|a| !a.is_empty()),
        status: BranchStatus::Active,
        description: branch.description.filter(|d| !d.is_empty()),
    })
}

/// Normalize the file list of an update, if one is present.
pub(crate) fn prepare_update(mut update: BranchUpdate) -> Result<BranchUpdate, ValidationError> {
    if let Some(files) = update.files.take() {
        update.files = Some(normalize_paths(&files)?);
    }
    Ok(update)
}

/// Validate a record passed to `restore`.
pub(crate) fn prepare_restore(mut record: BranchRecord) -> Result<BranchRecord, ValidationError> {
    validate_branch_name(&record.name)?;
    record.files = normalize_paths(&record.files)?;
    Ok(record)
}

// ---------------------------------------------------------------------------
// Document operations (shared by the JSON and in-memory backends)
// ---------------------------------------------------------------------------

impl RegistryDocument {
    pub(crate) fn insert_new(&mut self, record: BranchRecord) -> Result<(), RegistryError> {
        if self.branches.contains_key(&record.name) {
            return Err(RegistryError::DuplicateBranch(record.name));
        }
        self.branches.insert(record.name.clone(), record);
        Ok(())
    }

    pub(crate) fn get_record(&self, name: &str) -> Result<BranchRecord, RegistryError> {
        self.branches
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub(crate) fn update_record(
        &mut self,
        name: &str,
        update: BranchUpdate,
    ) -> Result<BranchRecord, RegistryError> {
        let record = self
            .branches
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        record.apply(update);
        Ok(record.clone())
    }

    /// Remove all records older than `threshold`; returns their names.
    pub(crate) fn remove_older_than(&mut self, threshold: DateTime<Utc>) -> Vec<String> {
        let stale: Vec<String> = self
            .branches
            .values()
            .filter(|r| r.registered_at < threshold)
            .map(|r| r.name.clone())
            .collect();
        for name in &stale {
            self.branches.remove(name);
        }
        debug!(removed = stale.len(), %threshold, "removed stale records from document");
        stale
    }

    pub(crate) fn records(&self) -> Vec<BranchRecord> {
        self.branches.values().cloned().collect()
    }
}

#[cfg(test)]
use std::collections::BTreeSet;

#[cfg(test)]
pub(crate) fn names(records: &[BranchRecord]) -> BTreeSet<String> {
    records.iter().map(|r| r.name.clone()).collect()
}

#[cfg(test)]
pub(crate) fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_registry_between_backends() {
        let from = MemoryStore::new(None);
        from.register(NewBranch::new("a").with_files(["x.js"])).unwrap();
        from.register(NewBranch::new("b")).unwrap();

        let to = SqliteStore::in_memory().unwrap();
        assert_eq!(copy_registry(&from, &to).unwrap(), 2);
        assert_eq!(to.list().unwrap(), from.list().unwrap());
    }

    #[test]
    fn test_prepare_record_drops_empty_optionals() {
        let branch = NewBranch {
            name: "feat/x".into(),
            files: vec![],
            agent: Some(String::new()),
            description: Some(String::new()),
        };
        let rec = prepare_record(branch, Utc::now()).unwrap();
        assert!(rec.agent.is_none());
        assert!(rec.description.is_none());
    }
}
