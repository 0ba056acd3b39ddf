//! Record-type descriptors and typed field values.
//!
//! # Responsibility
//! - Define the descriptor shapes shared by the catalog, the composer and
//!   the storage adapter.
//! - Keep identifier validation in one place so generated SQL never sees an
//!   unchecked name.
//!
//! # Invariants
//! - Every namespace, type, table and field name matches
//!   `^[A-Za-z_][A-Za-z0-9_]*$`.
//! - A `RecordType` is immutable once registered in the catalog.

pub mod aggregate;
pub mod record;
pub mod value;

use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Returns whether `value` is usable as a namespace, type, table or field name.
pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// Quotes one validated identifier for SQL text.
pub(crate) fn quote_identifier(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
