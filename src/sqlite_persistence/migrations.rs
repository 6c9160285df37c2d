use super::table::{SchemaError, Table};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

pub const MIGRATIONS_TABLE: &str = "schema_migrations";

/// One additive schema step. Versions are compared as strings and applied in
/// slice order, so they should be zero padded ("001", "002", ...).
pub struct Migration {
    pub version: &'static str,
    pub description: &'static str,
    pub tables: &'static [Table],
    /// Extra DDL (virtual tables, triggers, indices). Must be idempotent.
    pub statements: &'static [&'static str],
    pub backfill: Option<fn(&Connection) -> rusqlite::Result<()>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: String,
    pub description: String,
    pub applied_at: i64,
}

#[derive(Debug, Error)]
#[error("Migration {version} failed: {source}")]
pub struct MigrationError {
    pub version: String,
    #[source]
    pub source: SchemaError,
}

impl MigrationError {
    fn new(version: &str, source: impl Into<SchemaError>) -> Self {
        Self {
            version: version.to_string(),
            source: source.into(),
        }
    }
}

fn ensure_ledger(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            version TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        );",
        MIGRATIONS_TABLE
    ))
}

pub fn applied_migrations(conn: &Connection) -> rusqlite::Result<Vec<AppliedMigration>> {
    ensure_ledger(conn)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT version, description, applied_at FROM {} ORDER BY version",
        MIGRATIONS_TABLE
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(AppliedMigration {
                version: row.get(0)?,
                description: row.get(1)?,
                applied_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Highest applied version, if any migration ran.
pub fn current_version(conn: &Connection) -> rusqlite::Result<Option<String>> {
    ensure_ledger(conn)?;
    conn.query_row(
        &format!("SELECT MAX(version) FROM {}", MIGRATIONS_TABLE),
        [],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()
    .map(Option::flatten)
}

/// Applies every migration missing from the ledger.
///
/// Each migration runs in its own transaction and its ledger row is written in
/// that same transaction, so the ledger never records a step that did not land.
/// Returns the versions applied by this call.
pub fn apply_migrations(
    conn: &mut Connection,
    migrations: &[Migration],
    now_ms: i64,
) -> Result<Vec<String>, MigrationError> {
    ensure_ledger(conn).map_err(|e| MigrationError::new("ledger", e))?;

    let applied: HashSet<String> = applied_migrations(conn)
        .map_err(|e| MigrationError::new("ledger", e))?
        .into_iter()
        .map(|m| m.version)
        .collect();

    let mut newly_applied = Vec::new();
    for migration in migrations {
        if applied.contains(migration.version) {
            debug!("Migration {} already applied", migration.version);
            continue;
        }
        info!(
            "Applying migration {}: {}",
            migration.version, migration.description
        );

        let tx = conn
            .transaction()
            .map_err(|e| MigrationError::new(migration.version, e))?;
        for table in migration.tables {
            table
                .create(&tx)
                .map_err(|e| MigrationError::new(migration.version, e))?;
        }
        for statement in migration.statements {
            tx.execute_batch(statement)
                .map_err(|e| MigrationError::new(migration.version, e))?;
        }
        if let Some(backfill) = migration.backfill {
            backfill(&tx).map_err(|e| MigrationError::new(migration.version, e))?;
        }
        tx.execute(
            &format!(
                "INSERT INTO {} (version, description, applied_at) VALUES (?1, ?2, ?3)",
                MIGRATIONS_TABLE
            ),
            params![migration.version, migration.description, now_ms],
        )
        .map_err(|e| MigrationError::new(migration.version, e))?;
        tx.commit()
            .map_err(|e| MigrationError::new(migration.version, e))?;

        newly_applied.push(migration.version.to_string());
    }
    Ok(newly_applied)
}

/// Checks every plain table declared by the migrations against the live database.
pub fn validate_tables(conn: &Connection, migrations: &[Migration]) -> Result<(), MigrationError> {
    for migration in migrations {
        for table in migration.tables {
            table
                .validate(conn)
                .map_err(|e| MigrationError::new(migration.version, e))?;
        }
    }
    Ok(())
}
