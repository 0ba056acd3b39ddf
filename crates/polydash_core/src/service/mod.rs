//! Use-case services exposed to the request layer.
//!
//! # Invariants
//! - Services never bypass the record store or the polymorphic link.
//! - Services remain storage-agnostic beyond holding a connection.

pub mod contact_service;
pub mod dashboard_service;
