//! Record types shipped in the `core` namespace.
//!
//! # Invariants
//! - `core_declarations` lists types in dependency order: referenced tables
//!   and polymorphic bases come before the types that point at them.

use crate::catalog::TypeCatalog;
use crate::error::CoreResult;
use crate::extension::registry::ExtensionRegistry;
use crate::model::record::{Record, RecordType, TypeKey};
use crate::model::value::{FieldDef, FieldValue, OnDelete};

pub const CORE_NAMESPACE: &str = "core";

pub const BACKEND: &str = "Backend";
pub const APP: &str = "App";
pub const CONTACT: &str = "Contact";
pub const CONNECTION: &str = "Connection";
pub const WIDGET_BASE: &str = "WidgetBase";
pub const WIDGET: &str = "Widget";
pub const WIDGET_ENTRY: &str = "WidgetEntry";
pub const MODEL_COUNT: &str = "ModelCount";
pub const FIELD_STATS: &str = "FieldStats";

/// Maximum length of a widget entry `label`.
pub const ENTRY_LABEL_MAX: usize = 50;

pub const BACKENDS_TABLE: &str = "backends";
pub const CONTACTS_TABLE: &str = "contacts";
pub const WIDGET_BASES_TABLE: &str = "widget_bases";

/// Key of a type in the `core` namespace.
pub fn core_key(name: &str) -> TypeKey {
    TypeKey::new(CORE_NAMESPACE, name)
}

pub fn backend_type() -> RecordType {
    RecordType::plain(CORE_NAMESPACE, BACKEND, BACKENDS_TABLE)
        .with_field(FieldDef::text("name", 20).unique())
}

pub fn app_type() -> RecordType {
    RecordType::plain(CORE_NAMESPACE, APP, "apps")
        .with_field(FieldDef::text("module", 100).unique())
        .with_field(FieldDef::boolean("active").with_default(false))
}

pub fn contact_type() -> RecordType {
    RecordType::plain(CORE_NAMESPACE, CONTACT, CONTACTS_TABLE)
        .with_field(FieldDef::text("name", 100).with_default(""))
        .with_field(FieldDef::text("language", 6).with_default(""))
        .with_method("is_anonymous", contact_is_anonymous)
        .with_method("display", contact_display)
        .extensible()
}

pub fn connection_type() -> RecordType {
    RecordType::plain(CORE_NAMESPACE, CONNECTION, "connections")
        .with_field(FieldDef::reference("backend", BACKENDS_TABLE, OnDelete::Cascade))
        .with_field(FieldDef::text("identity", 100))
        .with_field(FieldDef::reference("contact", CONTACTS_TABLE, OnDelete::SetNull).nullable())
        .extensible()
}

pub fn widget_base_type() -> RecordType {
    RecordType::polymorphic_base(CORE_NAMESPACE, WIDGET_BASE, WIDGET_BASES_TABLE)
        .with_field(FieldDef::text("title", 40).with_default(""))
        .with_field(FieldDef::positive_integer("column").with_range(1, 3))
        .with_field(FieldDef::text("target_namespace", 100))
        .with_field(FieldDef::text("target_type_name", 100))
}

pub fn widget_type() -> RecordType {
    RecordType::derivative(CORE_NAMESPACE, WIDGET, "widgets", &widget_base_type()).extensible()
}

pub fn widget_entry_type() -> RecordType {
    RecordType::polymorphic_base(CORE_NAMESPACE, WIDGET_ENTRY, "widget_entries")
        .with_field(FieldDef::reference("widget", WIDGET_BASES_TABLE, OnDelete::Cascade))
        .with_field(FieldDef::text("label", ENTRY_LABEL_MAX))
        .extensible()
}

pub fn model_count_type() -> RecordType {
    RecordType::derivative(CORE_NAMESPACE, MODEL_COUNT, "model_counts", &widget_entry_type())
}

pub fn field_stats_type() -> RecordType {
    RecordType::derivative(CORE_NAMESPACE, FIELD_STATS, "field_stats", &widget_entry_type())
        .with_field(FieldDef::text("field", 50))
        .with_field(FieldDef::text("statistic", 10))
}

/// Every `core` declaration, in dependency order.
pub fn core_declarations() -> Vec<RecordType> {
    vec![
        backend_type(),
        app_type(),
        contact_type(),
        connection_type(),
        widget_base_type(),
        widget_type(),
        widget_entry_type(),
        model_count_type(),
        field_stats_type(),
    ]
}

/// Builds the catalog of `core` types followed by `extra` declarations.
pub fn core_catalog<I>(extensions: &ExtensionRegistry, extra: I) -> CoreResult<TypeCatalog>
where
    I: IntoIterator<Item = RecordType>,
{
    TypeCatalog::build(extensions, core_declarations().into_iter().chain(extra))
}

fn contact_is_anonymous(record: &Record) -> FieldValue {
    let name = record.text("name").unwrap_or_default();
    FieldValue::Boolean(name.trim().is_empty())
}

fn contact_display(record: &Record) -> FieldValue {
    match record.text("name").map(str::trim) {
        Some(name) if !name.is_empty() => FieldValue::Text(name.to_string()),
        _ => FieldValue::Text("Anonymous".to_string()),
    }
}
