use rusqlite::{params, Connection};
use thiserror::Error;

pub const DEFAULT_TIMESTAMP_MS: &str = "(cast(strftime('%s','now') as int) * 1000)";

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            #[allow(unused_mut)]
            let mut column = $crate::sqlite_persistence::Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                is_unique: false,
                default_value: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Table {table} has columns [{actual}], expected [{expected}]")]
    ColumnSetMismatch {
        table: &'static str,
        actual: String,
        expected: String,
    },

    #[error("Table {table} column {column} mismatch: {detail}")]
    ColumnMismatch {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("Table {table} is missing index '{index}'")]
    MissingIndex {
        table: &'static str,
        index: &'static str,
    },

    #[error("Table {table} is missing unique constraint on columns ({columns})")]
    MissingUniqueConstraint { table: &'static str, columns: String },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }

    fn from_sql(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(SqlType::Text),
            "INTEGER" => Some(SqlType::Integer),
            "REAL" => Some(SqlType::Real),
            "BLOB" => Some(SqlType::Blob),
            _ => None,
        }
    }
}

pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub is_unique: bool,
    pub default_value: Option<&'static str>,
}

/// Declarative description of a plain (non-virtual) table.
///
/// `indices` entries are `(index_name, column_list)`; the column list is pasted
/// verbatim so composite indices like `"album, artist"` work.
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    /// Statements needed to bring this table into existence. All of them are
    /// `IF NOT EXISTS` so re-running against an up to date database is a no-op.
    pub fn create_statements(&self) -> Vec<String> {
        let mut column_defs: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let mut def = format!("{} {}", column.name, column.sql_type.as_sql());
                if column.is_primary_key {
                    def.push_str(" PRIMARY KEY");
                }
                if column.non_null {
                    def.push_str(" NOT NULL");
                }
                if column.is_unique {
                    def.push_str(" UNIQUE");
                }
                if let Some(default_value) = column.default_value {
                    def.push_str(&format!(" DEFAULT {}", default_value));
                }
                def
            })
            .collect();
        for unique_constraint in self.unique_constraints {
            column_defs.push(format!("UNIQUE ({})", unique_constraint.join(", ")));
        }

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            self.name,
            column_defs.join(", ")
        )];
        for (index_name, columns) in self.indices {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}({});",
                index_name, self.name, columns
            ));
        }
        statements
    }

    pub fn create(&self, conn: &Connection) -> Result<(), SchemaError> {
        for statement in self.create_statements() {
            conn.execute(&statement, params![])?;
        }
        Ok(())
    }

    /// Compares the live table definition with this description.
    pub fn validate(&self, conn: &Connection) -> Result<(), SchemaError> {
        struct LiveColumn {
            name: String,
            sql_type: Option<SqlType>,
            non_null: bool,
            default_value: Option<String>,
            is_primary_key: bool,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let live_columns = stmt
            .query_map(params![], |row| {
                Ok(LiveColumn {
                    name: row.get(1)?,
                    sql_type: SqlType::from_sql(&row.get::<_, String>(2)?),
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if live_columns.len() != self.columns.len()
            || live_columns
                .iter()
                .zip(self.columns.iter())
                .any(|(live, expected)| live.name != expected.name)
        {
            return Err(SchemaError::ColumnSetMismatch {
                table: self.name,
                actual: live_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                expected: self
                    .columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        for (live, expected) in live_columns.iter().zip(self.columns.iter()) {
            let mismatch = |detail: String| SchemaError::ColumnMismatch {
                table: self.name,
                column: expected.name,
                detail,
            };
            if live.sql_type != Some(expected.sql_type) {
                return Err(mismatch(format!(
                    "type {:?}, expected {:?}",
                    live.sql_type, expected.sql_type
                )));
            }
            if live.non_null != expected.non_null {
                return Err(mismatch(format!(
                    "non-null {}, expected {}",
                    live.non_null, expected.non_null
                )));
            }
            if live.is_primary_key != expected.is_primary_key {
                return Err(mismatch(format!(
                    "primary key {}, expected {}",
                    live.is_primary_key, expected.is_primary_key
                )));
            }
            // SQLite may report defaults wrapped in parentheses.
            let live_default = live.default_value.as_deref().map(strip_parentheses);
            let expected_default = expected.default_value.map(strip_parentheses);
            if live_default != expected_default {
                return Err(mismatch(format!(
                    "default {:?}, expected {:?}",
                    live.default_value, expected.default_value
                )));
            }
        }

        for (index_name, _) in self.indices {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, self.name],
                    |_| Ok(()),
                )
                .is_ok();
            if !exists {
                return Err(SchemaError::MissingIndex {
                    table: self.name,
                    index: index_name,
                });
            }
        }

        if !self.unique_constraints.is_empty() {
            let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", self.name))?;
            let unique_indices: Vec<String> = stmt
                .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i32>(2)?)))?
                .filter_map(|r| r.ok())
                .filter(|(_, unique)| *unique == 1)
                .map(|(name, _)| name)
                .collect();

            let mut unique_column_sets = Vec::with_capacity(unique_indices.len());
            for index_name in &unique_indices {
                let mut idx_stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
                let mut cols: Vec<String> = idx_stmt
                    .query_map([], |row| row.get::<_, String>(2))?
                    .filter_map(|r| r.ok())
                    .collect();
                cols.sort();
                unique_column_sets.push(cols);
            }

            for expected in self.unique_constraints {
                let mut expected_sorted: Vec<&str> = expected.to_vec();
                expected_sorted.sort();
                let found = unique_column_sets.iter().any(|cols| {
                    cols.iter().map(String::as_str).collect::<Vec<_>>() == expected_sorted
                });
                if !found {
                    return Err(SchemaError::MissingUniqueConstraint {
                        table: self.name,
                        columns: expected.join(", "),
                    });
                }
            }
        }
        Ok(())
    }
}

fn strip_parentheses(s: &str) -> &str {
    s.strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(s)
}
