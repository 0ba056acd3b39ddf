//! Core domain logic for polydash.
//! This crate is the single source of truth for extension composition,
//! polymorphic linkage and dashboard invariants.

pub mod builtin;
pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod extension;
pub mod logging;
pub mod model;
pub mod poly;
pub mod repo;
pub mod service;

pub use builtin::{core_catalog, core_declarations, core_key, CORE_NAMESPACE};
pub use catalog::TypeCatalog;
pub use config::{ConfigError, CoreConfig};
pub use dashboard::entry::{EntryKinds, EntryValue, FieldStats, ModelCount, WidgetEntry};
pub use dashboard::widget::{Lane, Widget};
pub use dashboard::Dashboard;
pub use db::schema::sync_schema;
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use error::{CoreError, CoreResult};
pub use extension::fragment::ExtensionFragment;
pub use extension::registry::{ExtensionRegistry, NamespaceModule};
pub use extension::ExtensionError;
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::aggregate::Statistic;
pub use model::record::{Record, RecordType, TypeKey, TypeRole};
pub use model::value::{values, FieldDef, FieldKind, FieldValue, OnDelete, Values};
pub use poly::link::{BaseRecord, LinkedRecord, PolymorphicStore};
pub use repo::record_repo::{RecordStore, SqliteRecordStore};
pub use service::contact_service::ContactService;
pub use service::dashboard_service::{DashboardService, DashboardView, RequestInput};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
