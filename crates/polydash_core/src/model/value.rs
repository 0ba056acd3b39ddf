//! Field definitions and typed field values.
//!
//! # Responsibility
//! - Describe one column of a record type (kind, nullability, bounds).
//! - Check candidate values against a definition before any SQL runs.
//! - Parse plain `key=value` request input into typed values.
//!
//! # Invariants
//! - `FieldDef::check` is the single write-side validation path; the storage
//!   engine only sees values that passed it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Field values keyed by field name.
pub type Values = BTreeMap<String, FieldValue>;

/// Builds a `Values` map from `(name, value)` pairs.
pub fn values<I, K>(pairs: I) -> Values
where
    I: IntoIterator<Item = (K, FieldValue)>,
    K: Into<String>,
{
    pairs
        .into_iter()
        .map(|(name, value)| (name.into(), value))
        .collect()
}

/// Referential action applied when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    SetNull,
}

impl OnDelete {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
        }
    }
}

/// Storage shape of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    /// Integer that must be `>= 0`.
    PositiveInteger,
    Real,
    Text {
        max_length: usize,
    },
    Boolean,
    /// Foreign key to the primary key of `table`.
    Reference {
        table: String,
        on_delete: OnDelete,
    },
}

impl FieldKind {
    /// Whether numeric-only aggregates (`Sum`, `Avg`, ...) accept this kind.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::PositiveInteger | Self::Real)
    }

    /// Whether two kinds store the same shape of data.
    ///
    /// Text lengths may differ; references must point at the same table.
    pub fn same_shape(&self, other: &FieldKind) -> bool {
        match (self, other) {
            (Self::Text { .. }, Self::Text { .. }) => true,
            (
                Self::Reference { table: left, .. },
                Self::Reference { table: right, .. },
            ) => left == right,
            (left, right) => left == right,
        }
    }

    pub(crate) fn sql_type(&self) -> &'static str {
        match self {
            Self::Integer | Self::PositiveInteger | Self::Boolean | Self::Reference { .. } => {
                "INTEGER"
            }
            Self::Real => "REAL",
            Self::Text { .. } => "TEXT",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::PositiveInteger => "positive integer",
            Self::Real => "real",
            Self::Text { .. } => "text",
            Self::Boolean => "boolean",
            Self::Reference { .. } => "reference",
        }
    }
}

/// One typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Real(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Column definition inside a record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
    pub unique: bool,
    /// Value written when the caller omits the field.
    pub default: Option<FieldValue>,
    /// Inclusive integer bounds.
    pub range: Option<(i64, i64)>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            unique: false,
            default: None,
            range: None,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn positive_integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::PositiveInteger)
    }

    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Real)
    }

    pub fn text(name: impl Into<String>, max_length: usize) -> Self {
        Self::new(name, FieldKind::Text { max_length })
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn reference(name: impl Into<String>, table: impl Into<String>, on_delete: OnDelete) -> Self {
        Self::new(
            name,
            FieldKind::Reference {
                table: table.into(),
                on_delete,
            },
        )
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_range(mut self, min: i64, max: i64) -> Self {
        self.range = Some((min, max));
        self
    }

    /// A required field has no default and rejects null.
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none()
    }

    /// Checks one candidate value against this definition.
    ///
    /// Returns a human-readable reason on failure; callers wrap it into
    /// `CoreError::ConstraintViolation`.
    pub fn check(&self, value: &FieldValue) -> Result<(), String> {
        let name = self.name.as_str();
        if value.is_null() {
            if self.nullable {
                return Ok(());
            }
            return Err(format!("field `{name}` must not be null"));
        }

        match (&self.kind, value) {
            (FieldKind::Integer | FieldKind::Reference { .. }, FieldValue::Integer(_)) => {}
            (FieldKind::PositiveInteger, FieldValue::Integer(number)) => {
                if *number < 0 {
                    return Err(format!("field `{name}` must be >= 0, got {number}"));
                }
            }
            (FieldKind::Real, FieldValue::Real(_) | FieldValue::Integer(_)) => {}
            (FieldKind::Boolean, FieldValue::Boolean(_)) => {}
            (FieldKind::Text { max_length }, FieldValue::Text(text)) => {
                let length = text.chars().count();
                if length > *max_length {
                    return Err(format!(
                        "field `{name}` is limited to {max_length} characters, got {length}"
                    ));
                }
            }
            (kind, other) => {
                return Err(format!(
                    "field `{name}` expects {}, got {}",
                    kind.label(),
                    other.label()
                ));
            }
        }

        if let (Some((min, max)), FieldValue::Integer(number)) = (self.range, value) {
            if *number < min || *number > max {
                return Err(format!(
                    "field `{name}` must be within {min}..={max}, got {number}"
                ));
            }
        }

        Ok(())
    }

    /// Parses plain request input into a typed value for this field.
    ///
    /// Blank input on a nullable non-text field parses to `Null`.
    pub fn parse_input(&self, raw: &str) -> Result<FieldValue, String> {
        let name = self.name.as_str();
        let trimmed = raw.trim();
        if trimmed.is_empty() && self.nullable && !matches!(self.kind, FieldKind::Text { .. }) {
            return Ok(FieldValue::Null);
        }

        match &self.kind {
            FieldKind::Text { .. } => Ok(FieldValue::Text(raw.to_string())),
            FieldKind::Integer | FieldKind::PositiveInteger | FieldKind::Reference { .. } => trimmed
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| format!("field `{name}` expects an integer, got `{trimmed}`")),
            FieldKind::Real => trimmed
                .parse::<f64>()
                .map(FieldValue::Real)
                .map_err(|_| format!("field `{name}` expects a number, got `{trimmed}`")),
            FieldKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(FieldValue::Boolean(true)),
                "false" | "0" | "no" | "off" => Ok(FieldValue::Boolean(false)),
                _ => Err(format!("field `{name}` expects a boolean, got `{trimmed}`")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldDef, FieldKind, FieldValue, OnDelete};

    #[test]
    fn check_rejects_null_for_required_field() {
        let field = FieldDef::text("label", 50);
        let err = field.check(&FieldValue::Null).unwrap_err();
        assert!(err.contains("must not be null"));
        assert!(field.clone().nullable().check(&FieldValue::Null).is_ok());
    }

    #[test]
    fn check_enforces_text_length_in_characters() {
        let field = FieldDef::text("language", 6);
        assert!(field.check(&"pt-BR".into()).is_ok());
        let err = field.check(&"english".into()).unwrap_err();
        assert!(err.contains("limited to 6"));
    }

    #[test]
    fn check_enforces_positive_and_range_bounds() {
        let field = FieldDef::positive_integer("column").with_range(1, 3);
        assert!(field.check(&FieldValue::Integer(2)).is_ok());
        assert!(field.check(&FieldValue::Integer(-1)).unwrap_err().contains(">= 0"));
        assert!(field.check(&FieldValue::Integer(4)).unwrap_err().contains("1..=3"));
    }

    #[test]
    fn check_rejects_kind_mismatch() {
        let field = FieldDef::integer("age");
        let err = field.check(&"ten".into()).unwrap_err();
        assert_eq!(err, "field `age` expects integer, got text");
    }

    #[test]
    fn real_fields_accept_integers() {
        assert!(FieldDef::real("score").check(&FieldValue::Integer(7)).is_ok());
    }

    #[test]
    fn parse_input_handles_each_kind() {
        assert_eq!(
            FieldDef::integer("age").parse_input(" 42 ").unwrap(),
            FieldValue::Integer(42)
        );
        assert_eq!(
            FieldDef::boolean("active").parse_input("Yes").unwrap(),
            FieldValue::Boolean(true)
        );
        assert_eq!(
            FieldDef::text("title", 40).parse_input(" spaced ").unwrap(),
            FieldValue::Text(" spaced ".to_string())
        );
        assert_eq!(
            FieldDef::reference("contact", "contacts", OnDelete::SetNull)
                .nullable()
                .parse_input("")
                .unwrap(),
            FieldValue::Null
        );
        assert!(FieldDef::real("score").parse_input("abc").is_err());
    }

    #[test]
    fn same_shape_ignores_text_length_but_not_reference_target() {
        let short = FieldKind::Text { max_length: 5 };
        let long = FieldKind::Text { max_length: 500 };
        assert!(short.same_shape(&long));

        let to_contacts = FieldKind::Reference {
            table: "contacts".to_string(),
            on_delete: OnDelete::Cascade,
        };
        let to_backends = FieldKind::Reference {
            table: "backends".to_string(),
            on_delete: OnDelete::Cascade,
        };
        assert!(!to_contacts.same_shape(&to_backends));
        assert!(!FieldKind::Integer.same_shape(&FieldKind::Real));
    }
}
