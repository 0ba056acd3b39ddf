//! Identity issuing for polymorphic bases.
//!
//! One counter row per base type lives in `identity_sequences`. The bump is a
//! single upsert statement, so callers holding a write transaction get a
//! value no concurrent writer can observe.

use crate::error::CoreResult;
use crate::model::record::TypeKey;
use rusqlite::{Connection, OptionalExtension};

/// Issues the next identity for `base`. Must run inside a write transaction.
pub fn issue_identity(conn: &Connection, base: &TypeKey) -> CoreResult<i64> {
    let identity = conn.query_row(
        "INSERT INTO identity_sequences (base_type, last_identity)
         VALUES (?1, 1)
         ON CONFLICT(base_type) DO UPDATE SET last_identity = last_identity + 1
         RETURNING last_identity;",
        [base.to_string()],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(identity)
}

/// Last identity issued for `base`, if any.
pub fn last_issued(conn: &Connection, base: &TypeKey) -> CoreResult<Option<i64>> {
    let identity = conn
        .query_row(
            "SELECT last_identity FROM identity_sequences WHERE base_type = ?1;",
            [base.to_string()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(identity)
}
