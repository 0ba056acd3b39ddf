//! Record-type descriptors and loaded records.
//!
//! # Responsibility
//! - Describe one record type: identity, table, fields, computed methods and
//!   its final ancestor chain.
//! - Carry loaded rows as `Record` values keyed by field name.
//!
//! # Invariants
//! - Method lookup is most-derived-first: the composer places fragment
//!   methods before declared methods, and `call_method` takes the first hit.
//! - Polymorphic bases and derivatives always use `identity` as primary key.

use crate::model::is_valid_identifier;
use crate::model::value::{FieldDef, FieldValue, Values};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Primary-key column of plain record types.
pub const DEFAULT_PRIMARY_KEY: &str = "id";
/// Primary-key column shared by polymorphic bases and their derivatives.
pub const IDENTITY_COLUMN: &str = "identity";
/// Base-table column naming the derivative's namespace.
pub const DERIVATIVE_NAMESPACE_COLUMN: &str = "derivative_namespace";
/// Base-table column naming the derivative's type.
pub const DERIVATIVE_TYPE_NAME_COLUMN: &str = "derivative_type_name";

/// Stable tag of one record type: namespace plus type name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeKey {
    pub namespace: String,
    pub name: String,
}

impl TypeKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parses the `Name+namespace` form submitted by the request layer.
    pub fn parse_target(value: &str) -> Option<Self> {
        let (name, namespace) = value.trim().split_once('+')?;
        if !is_valid_identifier(name) || !is_valid_identifier(namespace) {
            return None;
        }
        Some(Self::new(namespace, name))
    }

    /// Renders the `Name+namespace` form.
    pub fn target_id(&self) -> String {
        format!("{}+{}", self.name, self.namespace)
    }

    /// Human-readable label, e.g. `Contact (core)`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.namespace)
    }
}

impl Display for TypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// Computed property contributed by a declaration or an extension fragment.
pub type MethodFn = fn(&Record) -> FieldValue;

/// Named computed property.
#[derive(Clone)]
pub struct MethodDef {
    pub name: String,
    pub call: MethodFn,
}

impl MethodDef {
    pub fn new(name: impl Into<String>, call: MethodFn) -> Self {
        Self {
            name: name.into(),
            call,
        }
    }
}

impl std::fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDef").field("name", &self.name).finish()
    }
}

/// Place of a record type in the polymorphic linkage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRole {
    /// Ordinary table with an auto-assigned `id`.
    Plain,
    /// Shared-identity table that points at derivative rows by type tag.
    PolymorphicBase,
    /// Concrete table whose `identity` equals a base row's `identity`.
    Derivative { base: TypeKey, base_table: String },
}

/// Immutable descriptor for one record type.
#[derive(Debug, Clone)]
pub struct RecordType {
    pub key: TypeKey,
    pub table: String,
    pub primary_key: String,
    pub role: TypeRole,
    /// Whether the composer splices extension fragments into this type.
    pub extensible: bool,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    /// Final ancestor chain, most specific first.
    pub ancestors: Vec<TypeKey>,
}

impl RecordType {
    fn with_role(
        namespace: &str,
        name: &str,
        table: &str,
        primary_key: &str,
        role: TypeRole,
    ) -> Self {
        Self {
            key: TypeKey::new(namespace, name),
            table: table.to_string(),
            primary_key: primary_key.to_string(),
            role,
            extensible: false,
            fields: Vec::new(),
            methods: Vec::new(),
            ancestors: Vec::new(),
        }
    }

    /// Declares an ordinary record type keyed by `id`.
    pub fn plain(namespace: &str, name: &str, table: &str) -> Self {
        Self::with_role(namespace, name, table, DEFAULT_PRIMARY_KEY, TypeRole::Plain)
    }

    /// Declares a polymorphic base keyed by the shared `identity`.
    pub fn polymorphic_base(namespace: &str, name: &str, table: &str) -> Self {
        Self::with_role(
            namespace,
            name,
            table,
            IDENTITY_COLUMN,
            TypeRole::PolymorphicBase,
        )
    }

    /// Declares a concrete derivative of `base`.
    pub fn derivative(namespace: &str, name: &str, table: &str, base: &RecordType) -> Self {
        let mut ty = Self::with_role(
            namespace,
            name,
            table,
            IDENTITY_COLUMN,
            TypeRole::Derivative {
                base: base.key.clone(),
                base_table: base.table.clone(),
            },
        );
        ty.ancestors.push(base.key.clone());
        ty
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_method(mut self, name: &str, call: MethodFn) -> Self {
        self.methods.push(MethodDef::new(name, call));
        self
    }

    pub fn with_ancestor(mut self, ancestor: TypeKey) -> Self {
        self.ancestors.push(ancestor);
        self
    }

    pub fn extensible(mut self) -> Self {
        self.extensible = true;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|method| method.name == name)
    }

    /// Invokes the most-derived method named `name` on `record`.
    pub fn call_method(&self, name: &str, record: &Record) -> Option<FieldValue> {
        self.methods
            .iter()
            .find(|method| method.name == name)
            .map(|method| (method.call)(record))
    }

    pub fn is_polymorphic_base(&self) -> bool {
        self.role == TypeRole::PolymorphicBase
    }

    /// Base type key when this type is a derivative.
    pub fn derivative_base(&self) -> Option<&TypeKey> {
        match &self.role {
            TypeRole::Derivative { base, .. } => Some(base),
            _ => None,
        }
    }

    /// Columns the storage layer manages itself for this type.
    pub fn reserved_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.primary_key.as_str()];
        if self.is_polymorphic_base() {
            columns.push(DERIVATIVE_NAMESPACE_COLUMN);
            columns.push(DERIVATIVE_TYPE_NAME_COLUMN);
        }
        columns
    }

    /// Validates declaration-level descriptor invariants.
    pub fn validate(&self) -> Result<(), String> {
        for (what, value) in [
            ("namespace", self.key.namespace.as_str()),
            ("type name", self.key.name.as_str()),
            ("table", self.table.as_str()),
            ("primary key", self.primary_key.as_str()),
        ] {
            if !is_valid_identifier(value) {
                return Err(format!("{what} `{value}` is not a valid identifier"));
            }
        }

        let reserved = self.reserved_columns();
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !is_valid_identifier(&field.name) {
                return Err(format!(
                    "field `{}` of {} is not a valid identifier",
                    field.name, self.key
                ));
            }
            if reserved.contains(&field.name.as_str()) {
                return Err(format!(
                    "field `{}` of {} collides with a managed column",
                    field.name, self.key
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(format!("field `{}` of {} is declared twice", field.name, self.key));
            }
            if let Some(default) = &field.default {
                field.check(default)?;
            }
        }
        Ok(())
    }
}

/// One loaded row of a record type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub type_key: TypeKey,
    /// Primary-key value (`id` or shared `identity`).
    pub id: i64,
    pub values: Values,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_i64)
    }
}
