//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the record-store contract every higher layer talks to.
//! - Isolate SQLite query details from polymorphic and dashboard logic.
//!
//! # Invariants
//! - Repository writes validate values against the record type before SQL.
//! - Repository APIs return semantic errors (`UnknownField`, `TypeMismatch`)
//!   in addition to storage failures.

pub mod record_repo;
