//! SQLite registry backend.
//!
//! Provides a [`SqliteStore`] with WAL-mode journaling and automatic schema
//! migrations. Every mutation runs inside a single `IMMEDIATE` transaction, so
//! a bulk [`cleanup`](RegistryStore::cleanup) is all-or-nothing for any other
//! connection reading the same file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use super::{prepare_record, prepare_restore, prepare_update, schema, RegistryStore};
use crate::errors::{RegistryError, StorageError};
use crate::models::{BranchRecord, BranchStatus, BranchUpdate, NewBranch};

const PROJECT_ID_KEY: &str = "project_id";

/// Registry handle wrapping a SQLite connection.
///
/// The inner connection is wrapped in a `Mutex` so that the store is
/// `Send + Sync`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// A `branches` row before its timestamp and status are decoded.
struct RawBranch {
    name: String,
    registered_at: String,
    agent: Option<String>,
    status: String,
    description: Option<String>,
}

impl SqliteStore {
    /// Open (or create) the registry database at `path` and migrate it.
    pub fn open<P: AsRef<Path>>(path: P, project_id: Option<String>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening registry database");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;

        Self::initialize(conn, project_id)
    }

    /// Open an in-memory registry (useful for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::initialize(conn, None)
    }

    fn initialize(conn: Connection, project_id: Option<String>) -> Result<Self, StorageError> {
        schema::run_migrations(&conn)?;
        if let Some(id) = project_id {
            conn.execute(
                "INSERT OR IGNORE INTO registry_meta (key, value) VALUES (?1, ?2)",
                params![PROJECT_ID_KEY, id],
            )?;
        }
        debug!("registry database ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// If the Mutex is poisoned (a previous holder panicked), the lock is
    /// recovered rather than propagating a panic.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Execute a closure inside an immediate transaction. If the closure
    /// returns `Ok`, the transaction is committed; otherwise it is rolled back.
    fn transaction<F, T>(&self, f: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&Connection) -> Result<T, RegistryError>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn insert_record(conn: &Connection, record: &BranchRecord) -> Result<(), RegistryError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM branches WHERE name = ?1",
            params![record.name],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if exists {
        return Err(RegistryError::DuplicateBranch(record.name.clone()));
    }

    conn.execute(
        "INSERT INTO branches (name, registered_at, agent, status, description)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.name,
            encode_time(record.registered_at),
            record.agent,
            record.status.as_str(),
            record.description,
        ],
    )?;
    write_files(conn, &record.name, &record.files)?;
    Ok(())
}

fn write_files(conn: &Connection, name: &str, files: &BTreeSet<String>) -> Result<(), RegistryError> {
    conn.execute("DELETE FROM branch_files WHERE branch = ?1", params![name])?;
    let mut stmt = conn.prepare("INSERT INTO branch_files (branch, path) VALUES (?1, ?2)")?;
    for path in files {
        stmt.execute(params![name, path])?;
    }
    Ok(())
}

fn load_raw(conn: &Connection, name: Option<&str>) -> Result<Vec<RawBranch>, RegistryError> {
    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RawBranch> {
        Ok(RawBranch {
            name: row.get(0)?,
            registered_at: row.get(1)?,
            agent: row.get(2)?,
            status: row.get(3)?,
            description: row.get(4)?,
        })
    };
    let columns = "SELECT name, registered_at, agent, status, description FROM branches";
    let rows = match name {
        Some(n) => {
            let mut stmt = conn.prepare(&format!("{columns} WHERE name = ?1"))?;
            let rows = stmt
                .query_map(params![n], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!("{columns} ORDER BY name"))?;
            let rows = stmt
                .query_map([], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

fn load_files(conn: &Connection) -> Result<BTreeMap<String, BTreeSet<String>>, RegistryError> {
    let mut stmt = conn.prepare("SELECT branch, path FROM branch_files")?;
    let pairs = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    let mut files: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for pair in pairs {
        let (branch, path) = pair?;
        files.entry(branch).or_default().insert(path);
    }
    Ok(files)
}

fn decode(raw: RawBranch, files: BTreeSet<String>) -> Result<BranchRecord, StorageError> {
    let registered_at = DateTime::parse_from_rfc3339(&raw.registered_at)
        .map_err(|e| StorageError::Corrupt {
            name: raw.name.clone(),
            detail: format!("bad timestamp '{}': {e}", raw.registered_at),
        })?
        .with_timezone(&Utc);
    let status = BranchStatus::from_str_val(&raw.status).ok_or_else(|| StorageError::Corrupt {
        name: raw.name.clone(),
        detail: format!("unknown status '{}'", raw.status),
    })?;
    Ok(BranchRecord {
        name: raw.name,
        files,
        registered_at,
        agent: raw.agent,
        status,
        description: raw.description,
    })
}

fn load_records(conn: &Connection) -> Result<Vec<BranchRecord>, RegistryError> {
    let mut files = load_files(conn)?;
    let mut records = Vec::new();
    for raw in load_raw(conn, None)? {
        let branch_files = files.remove(&raw.name).unwrap_or_default();
        records.push(decode(raw, branch_files)?);
    }
    Ok(records)
}

/// RFC 3339 with as many fractional digits as needed, so decoding is lossless.
fn encode_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

// ---------------------------------------------------------------------------
// RegistryStore
// ---------------------------------------------------------------------------

impl RegistryStore for SqliteStore {
    fn register(&self, branch: NewBranch) -> Result<BranchRecord, RegistryError> {
        let record = prepare_record(branch, Utc::now())?;
        self.transaction(|conn| insert_record(conn, &record))?;
        info!(branch = %record.name, files = record.files.len(), "registered branch");
        Ok(record)
    }

    fn get(&self, name: &str) -> Result<BranchRecord, RegistryError> {
        let conn = self.conn();
        let raw = load_raw(&conn, Some(name))?
            .into_iter()
            .next()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let mut stmt = conn.prepare("SELECT path FROM branch_files WHERE branch = ?1")?;
        let files = stmt
            .query_map(params![name], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(decode(raw, files)?)
    }

    fn list(&self) -> Result<Vec<BranchRecord>, RegistryError> {
        let conn = self.conn();
        load_records(&conn)
    }

    fn update(&self, name: &str, update: BranchUpdate) -> Result<BranchRecord, RegistryError> {
        let update = prepare_update(update)?;
        self.transaction(|conn| {
            let changed = conn.execute(
                "UPDATE branches SET
                    status = COALESCE(?2, status),
                    agent = CASE WHEN ?3 THEN ?4 ELSE agent END,
                    description = CASE WHEN ?5 THEN ?6 ELSE description END
                 WHERE name = ?1",
                params![
                    name,
                    update.status.map(|s| s.as_str()),
                    update.agent.is_some(),
                    update.agent.clone().flatten(),
                    update.description.is_some(),
                    update.description.clone().flatten(),
                ],
            )?;
            if changed == 0 {
                return Err(RegistryError::NotFound(name.to_string()));
            }
            if let Some(files) = &update.files {
                write_files(conn, name, files)?;
            }
            Ok(())
        })?;
        let record = self.get(name)?;
        info!(branch = name, status = %record.status, "updated branch");
        Ok(record)
    }

    fn unregister(&self, name: &str) -> Result<bool, RegistryError> {
        let removed = self.transaction(|conn| {
            Ok(conn.execute("DELETE FROM branches WHERE name = ?1", params![name])?)
        })?;
        if removed > 0 {
            info!(branch = name, "unregistered branch");
        }
        Ok(removed > 0)
    }

    fn cleanup(&self, older_than: DateTime<Utc>) -> Result<Vec<String>, RegistryError> {
        let removed = self.transaction(|conn| {
            let stale: Vec<String> = load_records(conn)?
                .into_iter()
                .filter(|r| r.registered_at < older_than)
                .map(|r| r.name)
                .collect();
            let mut stmt = conn.prepare("DELETE FROM branches WHERE name = ?1")?;
            for name in &stale {
                stmt.execute(params![name])?;
            }
            Ok(stale)
        })?;
        info!(removed = removed.len(), %older_than, "registry cleanup complete");
        Ok(removed)
    }

    fn restore(&self, record: BranchRecord) -> Result<(), RegistryError> {
        let record = prepare_restore(record)?;
        self.transaction(|conn| insert_record(conn, &record))
    }

    fn project_id(&self) -> Result<Option<String>, RegistryError> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                "SELECT value FROM registry_meta WHERE key = ?1",
                params![PROJECT_ID_KEY],
                |row| row.get(0),
            )
            .optional()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::contract;

    #[test]
    fn test_sqlite_store_contract() {
        contract::run_all(|| SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_file_database_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("registry.db");
        {
            let store = SqliteStore::open(&path, Some("acme".into())).unwrap();
            store
                .register(NewBranch::new("feat/a").with_files(["x.js"]))
                .unwrap();
        }
        let store = SqliteStore::open(&path, None).unwrap();
        assert_eq!(store.get("feat/a").unwrap().files.len(), 1);
        assert_eq!(store.project_id().unwrap().as_deref(), Some("acme"));
    }

    #[test]
    fn test_timestamps_round_trip_losslessly() {
        let store = SqliteStore::in_memory().unwrap();
        let rec = store.register(NewBranch::new("t")).unwrap();
        assert_eq!(store.get("t").unwrap().registered_at, rec.registered_at);
    }

    #[test]
    fn test_unregister_cascades_files() {
        let store = SqliteStore::in_memory().unwrap();
        store.register(NewBranch::new("a").with_files(["x.js"])).unwrap();
        assert!(store.unregister("a").unwrap());
        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM branch_files", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
