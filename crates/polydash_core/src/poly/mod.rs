//! Polymorphic base/derivative linkage.
//!
//! A polymorphic base table holds the fields every variant shares plus the
//! tag of the concrete type each row links to. Concrete rows live in their
//! own tables under the same `identity`.

pub mod identity;
pub mod link;
