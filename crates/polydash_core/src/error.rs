//! Error taxonomy shared by the record store, the polymorphic link and the
//! dashboard layer.
//!
//! # Invariants
//! - Core components never swallow these errors; they propagate to the
//!   request layer unchanged.
//! - SQLite constraint failures are always `ConstraintViolation`; any other
//!   SQLite failure is `StorageFailure`.

use crate::db::DbError;
use crate::extension::ExtensionError;
use crate::model::aggregate::Statistic;
use crate::model::record::TypeKey;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug)]
pub enum CoreError {
    /// Input values violate the target type's field constraints.
    ConstraintViolation(String),
    /// Transport or transaction failure in the storage engine.
    StorageFailure(DbError),
    /// Type tag is not registered in the catalog.
    UnresolvableType(TypeKey),
    /// Base row exists but the concrete row it names does not.
    DanglingLink { derivative: TypeKey, identity: i64 },
    UnknownStatistic(String),
    UnknownField { type_key: TypeKey, field: String },
    /// Numeric-only aggregate requested over a non-numeric field.
    TypeMismatch {
        type_key: TypeKey,
        field: String,
        statistic: Statistic,
    },
    NotFound { type_key: TypeKey, id: i64 },
    DuplicateType(TypeKey),
    InvalidDeclaration { type_key: TypeKey, reason: String },
    /// Persisted data cannot be converted into a valid read model.
    InvalidData(String),
    Extension(ExtensionError),
}

impl CoreError {
    /// Stable snake_case code for logs and request-layer envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::StorageFailure(_) => "storage_failure",
            Self::UnresolvableType(_) => "unresolvable_type",
            Self::DanglingLink { .. } => "dangling_link",
            Self::UnknownStatistic(_) => "unknown_statistic",
            Self::UnknownField { .. } => "unknown_field",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::NotFound { .. } => "not_found",
            Self::DuplicateType(_) => "duplicate_type",
            Self::InvalidDeclaration { .. } => "invalid_declaration",
            Self::InvalidData(_) => "invalid_data",
            Self::Extension(_) => "extension_error",
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConstraintViolation(message) => write!(f, "constraint violation: {message}"),
            Self::StorageFailure(err) => write!(f, "storage failure: {err}"),
            Self::UnresolvableType(key) => write!(f, "type is not registered: {key}"),
            Self::DanglingLink {
                derivative,
                identity,
            } => write!(
                f,
                "base row {identity} points at {derivative} but no such row exists"
            ),
            Self::UnknownStatistic(value) => write!(f, "unknown statistic: {value}"),
            Self::UnknownField { type_key, field } => {
                write!(f, "{type_key} has no field `{field}`")
            }
            Self::TypeMismatch {
                type_key,
                field,
                statistic,
            } => write!(
                f,
                "{} requires a numeric field, but {type_key}.{field} is not numeric",
                statistic.as_str()
            ),
            Self::NotFound { type_key, id } => write!(f, "{type_key} not found: {id}"),
            Self::DuplicateType(key) => write!(f, "type registered twice: {key}"),
            Self::InvalidDeclaration { type_key, reason } => {
                write!(f, "invalid declaration of {type_key}: {reason}")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Extension(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageFailure(err) => Some(err),
            Self::Extension(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(value: rusqlite::Error) -> Self {
        if value.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
            return Self::ConstraintViolation(value.to_string());
        }
        Self::StorageFailure(DbError::Sqlite(value))
    }
}

impl From<DbError> for CoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::StorageFailure(other),
        }
    }
}

impl From<ExtensionError> for CoreError {
    fn from(value: ExtensionError) -> Self {
        Self::Extension(value)
    }
}

#[cfg(test)]
mod tests {
    use super::CoreError;
    use rusqlite::Connection;

    #[test]
    fn maps_sqlite_constraint_failures_to_constraint_violation() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT NOT NULL UNIQUE);")
            .unwrap();
        conn.execute("INSERT INTO t (name) VALUES ('a');", []).unwrap();
        let err: CoreError = conn
            .execute("INSERT INTO t (name) VALUES ('a');", [])
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "constraint_violation");
    }

    #[test]
    fn maps_other_sqlite_failures_to_storage_failure() {
        let conn = Connection::open_in_memory().unwrap();
        let err: CoreError = conn
            .execute("INSERT INTO missing (name) VALUES ('a');", [])
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "storage_failure");
    }
}
