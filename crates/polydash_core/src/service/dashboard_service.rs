//! Dashboard use-case service.
//!
//! # Responsibility
//! - Expose the request-layer contract: target listing, the three-lane
//!   dashboard, and create/delete operations over plain key/value input.
//! - Turn submitted strings into typed dashboard calls.
//!
//! # Invariants
//! - Missing or unparsable input is `ConstraintViolation`; nothing is
//!   defaulted silently.
//! - Entry computation errors are reported per entry, with their code.

use crate::builtin::ENTRY_LABEL_MAX;
use crate::catalog::TypeCatalog;
use crate::dashboard::entry::{EntryKinds, WidgetEntry};
use crate::dashboard::widget::{Lane, Widget};
use crate::dashboard::Dashboard;
use crate::error::{CoreError, CoreResult};
use crate::model::record::TypeKey;
use crate::model::value::FieldValue;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

/// Plain key/value request input.
pub type RequestInput = BTreeMap<String, String>;

/// One type a widget may summarize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetTypeView {
    /// Submittable `Name+namespace` form.
    pub id: String,
    pub label: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorView {
    pub code: &'static str,
    pub message: String,
}

impl From<&CoreError> for ErrorView {
    fn from(value: &CoreError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryView {
    pub identity: i64,
    pub kind: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetView {
    pub identity: i64,
    pub title: String,
    pub target: String,
    pub fields: Vec<String>,
    pub entries: Vec<EntryView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneView {
    pub column: i64,
    pub widgets: Vec<WidgetView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub lanes: Vec<LaneView>,
}

/// Use-case service wrapper over the dashboard layer.
pub struct DashboardService<'a> {
    dashboard: Dashboard<'a>,
}

impl<'a> DashboardService<'a> {
    pub fn new(conn: &'a Connection, catalog: &'a TypeCatalog, kinds: &'a EntryKinds) -> Self {
        Self {
            dashboard: Dashboard::new(conn, catalog, kinds),
        }
    }

    /// Target types in declaration order.
    pub fn target_types(&self) -> Vec<TargetTypeView> {
        self.dashboard
            .catalog()
            .target_types()
            .iter()
            .map(|ty| TargetTypeView {
                id: ty.key.target_id(),
                label: ty.key.label(),
                fields: ty.field_names().into_iter().map(str::to_string).collect(),
            })
            .collect()
    }

    /// Builds all three lanes with freshly computed entry values.
    pub fn dashboard(&self) -> CoreResult<DashboardView> {
        let mut lanes = Vec::with_capacity(Lane::ALL.len());
        for lane in Lane::ALL {
            let widgets = self
                .dashboard
                .lane(lane)?
                .iter()
                .map(|widget| self.widget_view(widget))
                .collect::<CoreResult<Vec<_>>>()?;
            lanes.push(LaneView {
                column: lane.column(),
                widgets,
            });
        }
        Ok(DashboardView { lanes })
    }

    fn widget_view(&self, widget: &Widget) -> CoreResult<WidgetView> {
        let mut entries = Vec::new();
        for base in self.dashboard.entry_bases(widget)? {
            let label = base
                .values
                .get("label")
                .and_then(FieldValue::as_str)
                .unwrap_or_default()
                .to_string();
            let outcome = self
                .dashboard
                .resolve_entry(&base)
                .and_then(|entry| self.dashboard.evaluate(entry.as_ref(), widget));
            let (value, error) = match outcome {
                Ok(value) => (Some(value), None),
                Err(err) => (None, Some(ErrorView::from(&err))),
            };
            entries.push(EntryView {
                identity: base.identity,
                kind: base.derivative.to_string(),
                label,
                value,
                error,
            });
        }

        Ok(WidgetView {
            identity: widget.identity,
            title: widget.display_title(),
            target: widget.target.label(),
            fields: widget.field_names(self.dashboard.catalog())?,
            entries,
        })
    }

    /// Creates a widget plus its `Number Of <Name>s` count entry, in one
    /// transaction.
    ///
    /// Keys: `title` (optional), `column`, `target` (`Name+namespace`).
    pub fn create_widget(&self, input: &RequestInput) -> CoreResult<Widget> {
        let title = optional(input, "title").unwrap_or_default();
        let lane = Lane::new(parse_integer(input, "column")?)?;
        let raw_target = required(input, "target")?;
        let target = TypeKey::parse_target(raw_target).ok_or_else(|| {
            CoreError::ConstraintViolation(format!(
                "target must look like `Name+namespace`, got `{raw_target}`"
            ))
        })?;

        let label = count_label(&target);
        self.dashboard.atomically(|dashboard| {
            let widget = dashboard.create_widget(title, lane, &target)?;
            dashboard.create_model_count(&widget, &label)?;
            Ok(widget)
        })
    }

    /// Creates a FieldStats entry.
    ///
    /// Keys: `widget_id`, `label`, `field`, `stats`.
    pub fn create_entry(&self, input: &RequestInput) -> CoreResult<WidgetEntry> {
        let widget_id = parse_integer(input, "widget_id")?;
        let label = required(input, "label")?;
        let field = required(input, "field")?;
        let statistic = required(input, "stats")?;
        let widget = self.dashboard.widget(widget_id)?;
        self.dashboard
            .create_field_stats(&widget, label, field, statistic)
    }

    /// Deletes a widget and its entries. Key: `base_id`.
    pub fn delete_widget(&self, input: &RequestInput) -> CoreResult<i64> {
        let identity = parse_integer(input, "base_id")?;
        self.dashboard.delete_widget(identity)?;
        Ok(identity)
    }
}

/// `Number Of <Name>s`, cut to the entry label limit.
fn count_label(target: &TypeKey) -> String {
    format!("Number Of {}s", target.name)
        .chars()
        .take(ENTRY_LABEL_MAX)
        .collect()
}

fn optional<'i>(input: &'i RequestInput, key: &str) -> Option<&'i str> {
    input.get(key).map(String::as_str)
}

fn required<'i>(input: &'i RequestInput, key: &str) -> CoreResult<&'i str> {
    optional(input, key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| CoreError::ConstraintViolation(format!("missing required input `{key}`")))
}

fn parse_integer(input: &RequestInput, key: &str) -> CoreResult<i64> {
    let raw = required(input, key)?;
    raw.trim().parse::<i64>().map_err(|_| {
        CoreError::ConstraintViolation(format!("input `{key}` must be an integer, got `{raw}`"))
    })
}
