mod migrations;
mod table;

pub use migrations::{
    applied_migrations, apply_migrations, current_version, validate_tables, AppliedMigration,
    Migration, MigrationError, MIGRATIONS_TABLE,
};
pub use table::{Column, SchemaError, SqlType, Table, DEFAULT_TIMESTAMP_MS};
