//! Widget read model and dashboard lanes.

use crate::catalog::TypeCatalog;
use crate::error::{CoreError, CoreResult};
use crate::model::record::{RecordType, TypeKey};
use crate::poly::link::LinkedRecord;
use serde::Serialize;
use std::sync::Arc;

/// One of the three dashboard columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Lane(u8);

impl Lane {
    pub const ALL: [Lane; 3] = [Lane(1), Lane(2), Lane(3)];

    /// Validates a stored or submitted `column` value.
    pub fn new(column: i64) -> CoreResult<Self> {
        match column {
            1..=3 => Ok(Self(column as u8)),
            other => Err(CoreError::ConstraintViolation(format!(
                "column must be one of 1, 2, 3, got {other}"
            ))),
        }
    }

    pub fn column(self) -> i64 {
        i64::from(self.0)
    }
}

/// A resolved widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Widget {
    pub identity: i64,
    /// Concrete widget type the base row links to.
    pub kind: TypeKey,
    pub title: String,
    pub lane: Lane,
    /// Record type the widget summarizes.
    pub target: TypeKey,
}

impl Widget {
    pub fn from_linked(linked: &LinkedRecord) -> CoreResult<Self> {
        let identity = linked.identity();
        let missing = |field: &str| {
            CoreError::InvalidData(format!("widget {identity} has no valid `{field}`"))
        };
        let column = linked.integer("column").ok_or_else(|| missing("column"))?;
        Ok(Self {
            identity,
            kind: linked.derivative().clone(),
            title: linked.text("title").unwrap_or_default().to_string(),
            lane: Lane::new(column)?,
            target: TypeKey::new(
                linked
                    .text("target_namespace")
                    .ok_or_else(|| missing("target_namespace"))?,
                linked
                    .text("target_type_name")
                    .ok_or_else(|| missing("target_type_name"))?,
            ),
        })
    }

    /// Title shown to users; blank titles fall back to the target name.
    pub fn display_title(&self) -> String {
        if self.title.trim().is_empty() {
            format!("{} Dashboard Widget", self.target.name)
        } else {
            self.title.clone()
        }
    }

    pub fn target_type(&self, catalog: &TypeCatalog) -> CoreResult<Arc<RecordType>> {
        catalog.get(&self.target)
    }

    /// Target field names, excluding its primary key.
    pub fn field_names(&self, catalog: &TypeCatalog) -> CoreResult<Vec<String>> {
        let target = self.target_type(catalog)?;
        Ok(target
            .fields
            .iter()
            .filter(|field| field.name != target.primary_key)
            .map(|field| field.name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{Lane, Widget};
    use crate::builtin::core_declarations;
    use crate::catalog::TypeCatalog;
    use crate::error::CoreError;
    use crate::extension::registry::ExtensionRegistry;
    use crate::model::record::TypeKey;

    fn widget(title: &str, target: TypeKey) -> Widget {
        Widget {
            identity: 1,
            kind: TypeKey::new("core", "Widget"),
            title: title.to_string(),
            lane: Lane::new(2).unwrap(),
            target,
        }
    }

    #[test]
    fn lane_accepts_only_three_columns() {
        assert_eq!(Lane::new(3).unwrap().column(), 3);
        assert!(matches!(Lane::new(0), Err(CoreError::ConstraintViolation(_))));
        assert!(matches!(Lane::new(4), Err(CoreError::ConstraintViolation(_))));
    }

    #[test]
    fn blank_title_falls_back_to_target_name() {
        let contact = TypeKey::new("core", "Contact");
        assert_eq!(widget(" ", contact.clone()).display_title(), "Contact Dashboard Widget");
        assert_eq!(widget("People", contact).display_title(), "People");
    }

    #[test]
    fn field_names_come_from_target_type() {
        let catalog =
            TypeCatalog::build(&ExtensionRegistry::default(), core_declarations()).unwrap();
        let names = widget("", TypeKey::new("core", "Connection"))
            .field_names(&catalog)
            .unwrap();
        assert_eq!(names, vec!["backend", "identity", "contact"]);

        let err = widget("", TypeKey::new("core", "Ghost"))
            .field_names(&catalog)
            .unwrap_err();
        assert!(matches!(err, CoreError::UnresolvableType(_)));
    }
}
