//! Dashboard aggregate layer.
//!
//! # Responsibility
//! - Create, list and delete widgets and their entries through the
//!   polymorphic link.
//! - Resolve entries to their concrete kind and compute their values.
//!
//! # Invariants
//! - Nothing computed is persisted; every read recomputes.
//! - Widgets only target plain record types.

pub mod entry;
pub mod widget;

use crate::builtin::{core_key, FIELD_STATS, MODEL_COUNT, WIDGET, WIDGET_BASE, WIDGET_ENTRY};
use crate::catalog::TypeCatalog;
use crate::error::{CoreError, CoreResult};
use crate::model::record::{TypeKey, TypeRole};
use crate::model::value::{values, FieldValue};
use crate::poly::link::{BaseRecord, PolymorphicStore};
use crate::repo::record_repo::SqliteRecordStore;
use entry::{EntryContext, EntryKinds, EntryValue, WidgetEntry};
use log::{debug, warn};
use rusqlite::Connection;
use widget::{Lane, Widget};

/// Dashboard operations over one connection.
pub struct Dashboard<'a> {
    conn: &'a Connection,
    catalog: &'a TypeCatalog,
    kinds: &'a EntryKinds,
}

impl<'a> Dashboard<'a> {
    pub fn new(conn: &'a Connection, catalog: &'a TypeCatalog, kinds: &'a EntryKinds) -> Self {
        Self {
            conn,
            catalog,
            kinds,
        }
    }

    pub fn catalog(&self) -> &'a TypeCatalog {
        self.catalog
    }

    fn links(&self) -> PolymorphicStore<'a> {
        PolymorphicStore::new(self.conn, self.catalog)
    }

    pub fn widget(&self, identity: i64) -> CoreResult<Widget> {
        let linked = self.links().resolve_identity(&core_key(WIDGET_BASE), identity)?;
        Widget::from_linked(&linked)
    }

    /// Widgets in `lane`, in storage order.
    pub fn lane(&self, lane: Lane) -> CoreResult<Vec<Widget>> {
        let links = self.links();
        let column = FieldValue::Integer(lane.column());
        links
            .list_bases(&core_key(WIDGET_BASE), Some(("column", &column)))?
            .iter()
            .map(|base| Widget::from_linked(&links.resolve(base)?))
            .collect()
    }

    /// Entry base rows of `widget`, unresolved.
    pub fn entry_bases(&self, widget: &Widget) -> CoreResult<Vec<BaseRecord>> {
        let owner = FieldValue::Integer(widget.identity);
        self.links()
            .list_bases(&core_key(WIDGET_ENTRY), Some(("widget", &owner)))
    }

    /// Resolves one entry base row to its behavior.
    pub fn resolve_entry(&self, base: &BaseRecord) -> CoreResult<Box<dyn EntryValue>> {
        let linked = self.links().resolve(base)?;
        self.kinds.build(&linked)
    }

    /// Resolves `entry` and computes its value against its widget's target.
    pub fn compute_value(&self, entry: &BaseRecord) -> CoreResult<FieldValue> {
        let resolved = self.resolve_entry(entry)?;
        let widget = self.widget(resolved.entry().widget)?;
        self.evaluate(resolved.as_ref(), &widget)
    }

    /// Computes an already resolved entry of `widget`.
    pub fn evaluate(&self, entry: &dyn EntryValue, widget: &Widget) -> CoreResult<FieldValue> {
        let store = SqliteRecordStore::new(self.conn);
        let ctx = EntryContext {
            catalog: self.catalog,
            store: &store,
            widget,
        };
        let meta = entry.entry();
        match entry.compute_value(&ctx) {
            Ok(value) => {
                debug!(
                    "event=compute_value module=dashboard status=ok entry={} kind={} target={}",
                    meta.identity, meta.kind, widget.target
                );
                Ok(value)
            }
            Err(err) => {
                warn!(
                    "event=compute_value module=dashboard status=error entry={} kind={} target={} error_code={}",
                    meta.identity,
                    meta.kind,
                    widget.target,
                    err.code()
                );
                Err(err)
            }
        }
    }

    /// Runs several dashboard writes as one transaction.
    pub fn atomically<T>(&self, write: impl FnOnce(&Self) -> CoreResult<T>) -> CoreResult<T> {
        self.links().atomically(|| write(self))
    }

    /// Creates a widget summarizing `target`.
    pub fn create_widget(&self, title: &str, lane: Lane, target: &TypeKey) -> CoreResult<Widget> {
        let target_ty = self.catalog.get(target)?;
        if target_ty.role != TypeRole::Plain {
            return Err(CoreError::ConstraintViolation(format!(
                "{target} is not a dashboard target type"
            )));
        }
        let linked = self.links().create_and_link(
            &core_key(WIDGET),
            &values([
                ("title", FieldValue::from(title)),
                ("column", FieldValue::Integer(lane.column())),
                ("target_namespace", FieldValue::from(target.namespace.as_str())),
                ("target_type_name", FieldValue::from(target.name.as_str())),
            ]),
        )?;
        Widget::from_linked(&linked)
    }

    pub fn create_model_count(&self, widget: &Widget, label: &str) -> CoreResult<WidgetEntry> {
        let linked = self.links().create_and_link(
            &core_key(MODEL_COUNT),
            &values([
                ("widget", FieldValue::Integer(widget.identity)),
                ("label", FieldValue::from(label)),
            ]),
        )?;
        WidgetEntry::from_linked(&linked)
    }

    /// Creates a FieldStats entry. `statistic` is checked on compute.
    pub fn create_field_stats(
        &self,
        widget: &Widget,
        label: &str,
        field: &str,
        statistic: &str,
    ) -> CoreResult<WidgetEntry> {
        let linked = self.links().create_and_link(
            &core_key(FIELD_STATS),
            &values([
                ("widget", FieldValue::Integer(widget.identity)),
                ("label", FieldValue::from(label)),
                ("field", FieldValue::from(field)),
                ("statistic", FieldValue::from(statistic)),
            ]),
        )?;
        WidgetEntry::from_linked(&linked)
    }

    /// Deletes a widget; its entries go with it.
    pub fn delete_widget(&self, identity: i64) -> CoreResult<()> {
        self.links().delete(&core_key(WIDGET_BASE), identity)
    }
}

#[cfg(test)]
mod tests {
    use super::widget::Lane;
    use super::Dashboard;
    use crate::builtin::{core_declarations, core_key};
    use crate::catalog::TypeCatalog;
    use crate::dashboard::entry::EntryKinds;
    use crate::db::open_db_in_memory;
    use crate::db::schema::sync_schema;
    use crate::error::CoreError;
    use crate::extension::registry::ExtensionRegistry;
    use crate::model::value::FieldValue;
    use rusqlite::Connection;

    fn setup() -> (Connection, TypeCatalog) {
        let conn = open_db_in_memory().unwrap();
        let catalog =
            TypeCatalog::build(&ExtensionRegistry::default(), core_declarations()).unwrap();
        sync_schema(&conn, &catalog).unwrap();
        (conn, catalog)
    }

    #[test]
    fn computes_entries_against_widget_target() {
        let (conn, catalog) = setup();
        let kinds = EntryKinds::default();
        let dashboard = Dashboard::new(&conn, &catalog, &kinds);
        for name in ["sms", "email"] {
            conn.execute("INSERT INTO backends (name) VALUES (?1);", [name])
                .unwrap();
        }

        let widget = dashboard
            .create_widget("", Lane::new(1).unwrap(), &core_key("Backend"))
            .unwrap();
        dashboard.create_model_count(&widget, "Backends").unwrap();
        dashboard
            .create_field_stats(&widget, "Longest", "name", "Max")
            .unwrap();

        let values: Vec<FieldValue> = dashboard
            .entry_bases(&widget)
            .unwrap()
            .iter()
            .map(|base| dashboard.compute_value(base).unwrap())
            .collect();
        assert_eq!(
            values,
            vec![FieldValue::Integer(2), FieldValue::Text("sms".to_string())]
        );
    }

    #[test]
    fn rejects_framework_types_as_targets() {
        let (conn, catalog) = setup();
        let kinds = EntryKinds::default();
        let dashboard = Dashboard::new(&conn, &catalog, &kinds);
        let err = dashboard
            .create_widget("", Lane::new(1).unwrap(), &core_key("WidgetEntry"))
            .unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation(_)));
    }

    #[test]
    fn entry_for_missing_widget_is_rejected_by_storage() {
        let (conn, catalog) = setup();
        let kinds = EntryKinds::default();
        let dashboard = Dashboard::new(&conn, &catalog, &kinds);
        let widget = dashboard
            .create_widget("", Lane::new(1).unwrap(), &core_key("App"))
            .unwrap();
        dashboard.delete_widget(widget.identity).unwrap();
        let err = dashboard.create_model_count(&widget, "Apps").unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation(_)));
    }
}
