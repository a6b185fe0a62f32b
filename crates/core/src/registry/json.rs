//! JSON-document registry backend.
//!
//! The whole registry lives in one pretty-printed JSON file. Every operation
//! reads the file fresh; every mutation is applied in memory and then written
//! to a temp file in the same directory which is atomically renamed over the
//! registry. Concurrent readers therefore see either the previous or the next
//! document, never a partial one. Writers take an advisory lock on a sibling
//! `.lock` file for the duration of their read-modify-write.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{prepare_record, prepare_restore, prepare_update, RegistryStore};
use crate::errors::{RegistryError, StorageError};
use crate::models::{BranchRecord, BranchUpdate, NewBranch, RegistryDocument, SCHEMA_VERSION};

/// Registry stored as a single JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    project_id: Option<String>,
}

impl JsonFileStore {
    /// Create a store for the document at `path`. The file is created lazily
    /// on the first mutation.
    pub fn new<P: AsRef<Path>>(path: P, project_id: Option<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            project_id,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Advisory lock file held while a mutation runs.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.dir().join(name)
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Read the current document. A missing file is an empty registry.
    ///
    /// Documents written with a different schema version are rejected so
    /// they are never rewritten in a format they were not written in.
    pub fn load(&self) -> Result<RegistryDocument, StorageError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "registry file absent, starting empty");
                return Ok(RegistryDocument::new(self.project_id.clone()));
            }
            Err(source) => return Err(self.io_err(source)),
        };
        let doc: RegistryDocument = serde_json::from_str(&contents)?;
        if doc.version != SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion {
                path: self.path.display().to_string(),
                found: doc.version,
                expected: SCHEMA_VERSION.to_string(),
            });
        }
        debug!(branches = doc.branches.len(), version = %doc.version, "loaded registry");
        Ok(doc)
    }

    /// Atomically replace the on-disk document with `doc`.
    pub fn save(&self, doc: &RegistryDocument) -> Result<(), StorageError> {
        let dir = self.dir();
        std::fs::create_dir_all(&dir).map_err(|e| self.io_err(e))?;

        let mut body = serde_json::to_string_pretty(doc)?;
        body.push('\n');

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.io_err(e))?;
        tmp.write_all(body.as_bytes()).map_err(|e| self.io_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_err(e))?;
        tmp.persist(&self.path).map_err(|e| StorageError::Persist {
            path: self.path.display().to_string(),
            detail: e.error.to_string(),
        })?;

        debug!(path = %self.path.display(), branches = doc.branches.len(), "registry saved");
        Ok(())
    }

    /// Load, apply `f`, and save if `f` succeeds and reports a change.
    ///
    /// The whole read-modify-write runs under an exclusive lock on
    /// [`lock_path`](Self::lock_path), so concurrent writers in other
    /// processes are serialised instead of overwriting each other.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut RegistryDocument) -> Result<(T, bool), RegistryError>,
    ) -> Result<T, RegistryError> {
        std::fs::create_dir_all(self.dir()).map_err(|e| self.io_err(e))?;
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(self.lock_path())
            .map_err(|e| self.io_err(e))?;
        lock.lock_exclusive().map_err(|e| self.io_err(e))?;

        let mut doc = self.load()?;
        let (out, changed) = f(&mut doc)?;
        if changed {
            self.save(&doc)?;
        }
        // Dropping `lock` closes the handle and releases the lock.
        Ok(out)
    }
}

impl RegistryStore for JsonFileStore {
    fn register(&self, branch: NewBranch) -> Result<BranchRecord, RegistryError> {
        let record = prepare_record(branch, Utc::now())?;
        self.mutate(|doc| doc.insert_new(record.clone()).map(|()| ((), true)))?;
        info!(branch = %record.name, files = record.files.len(), "registered branch");
        Ok(record)
    }

    fn get(&self, name: &str) -> Result<BranchRecord, RegistryError> {
        self.load()?.get_record(name)
    }

    fn list(&self) -> Result<Vec<BranchRecord>, RegistryError> {
        Ok(self.load()?.records())
    }

    fn update(&self, name: &str, update: BranchUpdate) -> Result<BranchRecord, RegistryError> {
        let update = prepare_update(update)?;
        let record = self.mutate(|doc| doc.update_record(name, update).map(|r| (r, true)))?;
        info!(branch = name, status = %record.status, "updated branch");
        Ok(record)
    }

    fn unregister(&self, name: &str) -> Result<bool, RegistryError> {
        let existed = self.mutate(|doc| {
            let existed = doc.branches.remove(name).is_some();
            Ok((existed, existed))
        })?;
        if existed {
            info!(branch = name, "unregistered branch");
        }
        Ok(existed)
    }

    fn cleanup(&self, older_than: DateTime<Utc>) -> Result<Vec<String>, RegistryError> {
        let removed = self.mutate(|doc| {
            let removed = doc.remove_older_than(older_than);
            let changed = !removed.is_empty();
            Ok((removed, changed))
        })?;
        info!(removed = removed.len(), %older_than, "registry cleanup complete");
        Ok(removed)
    }

    fn restore(&self, record: BranchRecord) -> Result<(), RegistryError> {
        let record = prepare_restore(record)?;
        self.mutate(|doc| doc.insert_new(record).map(|()| ((), true)))
    }

    fn project_id(&self) -> Result<Option<String>, RegistryError> {
        Ok(self.load()?.project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::contract;

    fn store_in(dir: &tempfile::TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("state").join("registry.json"), None)
    }

    #[test]
    fn test_json_store_contract() {
        // Each contract check gets its own directory.
        let dirs: Vec<_> = (0..6).map(|_| tempfile::tempdir().unwrap()).collect();
        contract::register_get_list(&store_in(&dirs[0]));
        contract::duplicate_rejected(&store_in(&dirs[1]));
        contract::validation_leaves_registry_unchanged(&store_in(&dirs[2]));
        contract::update_and_unregister(&store_in(&dirs[3]));
        contract::cleanup_removes_exactly_stale(&store_in(&dirs[4]));
        contract::find_by_files(&store_in(&dirs[5]));
    }

    #[test]
    fn test_missing_file_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("none.json"), Some("proj".into()));
        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.project_id().unwrap().as_deref(), Some("proj"));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .register(NewBranch::new("feat/a").with_files(["b.js", "a.js"]).with_agent("x"))
            .unwrap();
        store.register(NewBranch::new("feat/b")).unwrap();

        let before = std::fs::read(store.path()).unwrap();
        let doc = store.load().unwrap();
        store.save(&doc).unwrap();
        let after = std::fs::read(store.path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_each_operation_rereads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let first = store_in(&dir);
        let second = store_in(&dir);
        first.register(NewBranch::new("a")).unwrap();
        assert!(second.get("a").is_ok());
        second.unregister("a").unwrap();
        assert!(matches!(first.get("a"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.register(NewBranch::new("a")).unwrap();
        store.register(NewBranch::new("b")).unwrap();
        let entries: std::collections::BTreeSet<_> =
            std::fs::read_dir(store.path().parent().unwrap())
                .unwrap()
                .map(|e| e.unwrap().file_name().into_string().unwrap())
                .collect();
        let expected: std::collections::BTreeSet<_> =
            ["registry.json".to_string(), "registry.json.lock".to_string()].into();
        assert_eq!(entries, expected);
    }

    #[test]
    fn test_concurrent_writers_do_not_lose_registrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::thread::scope(|scope| {
            for i in 0..8 {
                let store = JsonFileStore::new(&path, None);
                scope.spawn(move || {
                    store
                        .register(NewBranch::new(format!("agent/{i}")))
                        .unwrap();
                });
            }
        });
        let names: Vec<String> = JsonFileStore::new(&path, None)
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        let expected: Vec<String> = (0..8).map(|i| format!("agent/{i}")).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_newer_schema_is_rejected_and_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let body = r#"{
  "version": "2",
  "branches": {}
}
"#;
        std::fs::write(&path, body).unwrap();
        let store = JsonFileStore::new(&path, None);

        assert!(matches!(
            store.list(),
            Err(RegistryError::Storage(StorageError::UnsupportedVersion { ref found, .. })) if found == "2"
        ));
        assert!(store.register(NewBranch::new("feat/a")).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), body);
    }

    #[test]
    fn test_unregister_missing_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(!store.unregister("ghost").unwrap());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_corrupt_document_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(
            store.list(),
            Err(RegistryError::Storage(StorageError::Json(_)))
        ));
    }
}
