//! In-process registry backend, used by tests and as a scratch registry.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{prepare_record, prepare_restore, prepare_update, RegistryStore};
use crate::errors::RegistryError;
use crate::models::{BranchRecord, BranchUpdate, NewBranch, RegistryDocument};

/// A registry held entirely in memory behind a mutex.
#[derive(Debug)]
pub struct MemoryStore {
    doc: Mutex<RegistryDocument>,
}

impl MemoryStore {
    pub fn new(project_id: Option<String>) -> Self {
        Self {
            doc: Mutex::new(RegistryDocument::new(project_id)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryDocument> {
        self.doc.lock().unwrap_or_else(|poisoned| {
            warn!("registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl RegistryStore for MemoryStore {
    fn register(&self, branch: NewBranch) -> Result<BranchRecord, RegistryError> {
        let record = prepare_record(branch, Utc::now())?;
        self.lock().insert_new(record.clone())?;
        info!(branch = %record.name, files = record.files.len(), "registered branch");
        Ok(record)
    }

    fn get(&self, name: &str) -> Result<BranchRecord, RegistryError> {
        self.lock().get_record(name)
    }

    fn list(&self) -> Result<Vec<BranchRecord>, RegistryError> {
        Ok(self.lock().records())
    }

    fn update(&self, name: &str, update: BranchUpdate) -> Result<BranchRecord, RegistryError> {
        let update = prepare_update(update)?;
        self.lock().update_record(name, update)
    }

    fn unregister(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.lock().branches.remove(name).is_some())
    }

    fn cleanup(&self, older_than: DateTime<Utc>) -> Result<Vec<String>, RegistryError> {
        Ok(self.lock().remove_older_than(older_than))
    }

    fn restore(&self, record: BranchRecord) -> Result<(), RegistryError> {
        let record = prepare_restore(record)?;
        self.lock().insert_new(record)
    }

    fn project_id(&self) -> Result<Option<String>, RegistryError> {
        Ok(self.lock().project_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::contract;

    #[test]
    fn test_memory_store_contract() {
        contract::run_all(|| MemoryStore::new(None));
    }

    #[test]
    fn test_project_id() {
        let store = MemoryStore::new(Some("acme".into()));
        assert_eq!(store.project_id().unwrap().as_deref(), Some("acme"));
    }
}
