//! SQLite storage bootstrap, framework migrations and record-table sync.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the record store.
//! - Apply framework migrations in deterministic order.
//! - Derive record tables from composed type descriptors.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Record tables are only created or widened, never narrowed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
pub mod schema;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// A composed field cannot be added to an existing table.
    IncompatibleColumn {
        table: String,
        column: String,
        reason: &'static str,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::IncompatibleColumn {
                table,
                column,
                reason,
            } => write!(f, "cannot add column `{column}` to `{table}`: {reason}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::IncompatibleColumn { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
