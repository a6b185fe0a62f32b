//! SQLite schema definitions and migration runner for the registry backend.
//!
//! Migrations are simple SQL strings applied in order. The SQLite
//! `user_version` pragma tracks which migrations have already been applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::StorageError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "branch registry",
        r#"
        CREATE TABLE IF NOT EXISTS branches (
            name            TEXT PRIMARY KEY,
            registered_at   TEXT NOT NULL,
            agent           TEXT,
            status          TEXT NOT NULL DEFAULT 'active'
                            CHECK (status IN ('active', 'completed', 'abandoned')),
            description     TEXT
        );

        CREATE TABLE IF NOT EXISTS branch_files (
            branch  TEXT NOT NULL REFERENCES branches (name) ON DELETE CASCADE,
            path    TEXT NOT NULL,
            PRIMARY KEY (branch, path)
        );

        CREATE INDEX IF NOT EXISTS idx_branch_files_path ON branch_files (path);

        CREATE TABLE IF NOT EXISTS registry_meta (
            key     TEXT PRIMARY KEY,
            value   TEXT NOT NULL
        );
        "#,
    ),
    (
        2,
        "status index for active-branch queries",
        r#"
        CREATE INDEX IF NOT EXISTS idx_branches_status ON branches (status);
        "#,
    ),
];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking registry migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| StorageError::Migration {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

/// Read the current schema version from the SQLite `user_version` pragma.
pub fn get_schema_version(conn: &Connection) -> Result<u32, StorageError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<(), StorageError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_idempotently() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };

        assert!(tables.contains(&"branches".to_string()));
        assert!(tables.contains(&"branch_files".to_string()));
        assert!(tables.contains(&"registry_meta".to_string()));
    }
}
