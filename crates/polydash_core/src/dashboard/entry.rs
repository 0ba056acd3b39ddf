//! Widget entries and their computed values.
//!
//! # Responsibility
//! - Map resolved entry derivatives to behavior through `EntryKinds`.
//! - Compute each entry's value fresh against the widget's target type.
//!
//! # Invariants
//! - A computation either returns a value or a typed error; it never falls
//!   back to a default value.

use crate::builtin::{core_key, FIELD_STATS, MODEL_COUNT};
use crate::catalog::TypeCatalog;
use crate::dashboard::widget::Widget;
use crate::error::{CoreError, CoreResult};
use crate::model::aggregate::Statistic;
use crate::model::record::TypeKey;
use crate::model::value::FieldValue;
use crate::poly::link::LinkedRecord;
use crate::repo::record_repo::RecordStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

/// Fields every entry kind shares.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetEntry {
    pub identity: i64,
    pub kind: TypeKey,
    /// Identity of the owning widget.
    pub widget: i64,
    pub label: String,
}

impl WidgetEntry {
    pub fn from_linked(linked: &LinkedRecord) -> CoreResult<Self> {
        let identity = linked.identity();
        Ok(Self {
            identity,
            kind: linked.derivative().clone(),
            widget: linked.integer("widget").ok_or_else(|| {
                CoreError::InvalidData(format!("widget entry {identity} has no widget"))
            })?,
            label: linked.text("label").unwrap_or_default().to_string(),
        })
    }
}

/// Collaborators an entry computes against.
pub struct EntryContext<'a> {
    pub catalog: &'a TypeCatalog,
    pub store: &'a dyn RecordStore,
    pub widget: &'a Widget,
}

/// Behavior of one entry kind.
pub trait EntryValue: Debug {
    fn entry(&self) -> &WidgetEntry;
    fn compute_value(&self, ctx: &EntryContext<'_>) -> CoreResult<FieldValue>;
}

/// Row count of the widget's target type.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCount {
    pub entry: WidgetEntry,
}

impl ModelCount {
    pub fn build(linked: &LinkedRecord) -> CoreResult<Box<dyn EntryValue>> {
        Ok(Box::new(Self {
            entry: WidgetEntry::from_linked(linked)?,
        }))
    }
}

impl EntryValue for ModelCount {
    fn entry(&self) -> &WidgetEntry {
        &self.entry
    }

    fn compute_value(&self, ctx: &EntryContext<'_>) -> CoreResult<FieldValue> {
        let target = ctx.widget.target_type(ctx.catalog)?;
        Ok(FieldValue::Integer(ctx.store.count(&target)?))
    }
}

/// Named aggregate over one field of the widget's target type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldStats {
    pub entry: WidgetEntry,
    pub field: String,
    /// Stored statistic name; checked only when computing.
    pub statistic: String,
}

impl FieldStats {
    pub fn build(linked: &LinkedRecord) -> CoreResult<Box<dyn EntryValue>> {
        Ok(Box::new(Self {
            entry: WidgetEntry::from_linked(linked)?,
            field: linked.text("field").unwrap_or_default().to_string(),
            statistic: linked.text("statistic").unwrap_or_default().to_string(),
        }))
    }
}

impl EntryValue for FieldStats {
    fn entry(&self) -> &WidgetEntry {
        &self.entry
    }

    fn compute_value(&self, ctx: &EntryContext<'_>) -> CoreResult<FieldValue> {
        let statistic = Statistic::parse(&self.statistic)
            .ok_or_else(|| CoreError::UnknownStatistic(self.statistic.clone()))?;
        let target = ctx.widget.target_type(ctx.catalog)?;
        ctx.store.aggregate(&target, &self.field, statistic)
    }
}

pub type EntryFactory = fn(&LinkedRecord) -> CoreResult<Box<dyn EntryValue>>;

/// Entry derivative type -> behavior factory.
pub struct EntryKinds {
    factories: BTreeMap<TypeKey, EntryFactory>,
}

impl EntryKinds {
    /// Registry without any kinds.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registers `factory` for `kind`, returning the one it replaces.
    pub fn register(&mut self, kind: TypeKey, factory: EntryFactory) -> Option<EntryFactory> {
        self.factories.insert(kind, factory)
    }

    pub fn contains(&self, kind: &TypeKey) -> bool {
        self.factories.contains_key(kind)
    }

    /// Builds the behavior for a resolved entry.
    pub fn build(&self, linked: &LinkedRecord) -> CoreResult<Box<dyn EntryValue>> {
        let factory = self
            .factories
            .get(linked.derivative())
            .ok_or_else(|| CoreError::UnresolvableType(linked.derivative().clone()))?;
        factory(linked)
    }
}

impl Default for EntryKinds {
    fn default() -> Self {
        let mut kinds = Self::empty();
        kinds.register(core_key(MODEL_COUNT), ModelCount::build);
        kinds.register(core_key(FIELD_STATS), FieldStats::build);
        kinds
    }
}

impl Debug for EntryKinds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryKinds")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
