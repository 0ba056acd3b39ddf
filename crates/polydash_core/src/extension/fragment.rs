//! Extension fragment declaration and validation.

use crate::model::is_valid_identifier;
use crate::model::record::{MethodDef, MethodFn};
use crate::model::value::FieldDef;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Column names no fragment may declare.
pub const RESERVED_FRAGMENT_MEMBERS: &[&str] = &[
    "id",
    "identity",
    "derivative_namespace",
    "derivative_type_name",
];

/// Fields and computed properties one namespace contributes to a base type.
///
/// A fragment becomes an additional, more specific ancestor of the composed
/// type. It has no table of its own; its fields land in the base type's table.
#[derive(Debug, Clone)]
pub struct ExtensionFragment {
    /// Fragment type name, e.g. `ContactLocation`.
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
}

impl ExtensionFragment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_method(mut self, name: &str, call: MethodFn) -> Self {
        self.methods.push(MethodDef::new(name, call));
        self
    }

    /// Validates that this fragment is a usable record-type definition.
    pub fn validate(&self) -> Result<(), FragmentValidationError> {
        if !is_valid_identifier(&self.name) {
            return Err(FragmentValidationError::InvalidName(self.name.clone()));
        }

        let mut members = BTreeSet::new();
        let names = self
            .fields
            .iter()
            .map(|field| field.name.as_str())
            .chain(self.methods.iter().map(|method| method.name.as_str()));
        for name in names {
            if !is_valid_identifier(name) {
                return Err(FragmentValidationError::InvalidMemberName(
                    name.to_string(),
                ));
            }
            if RESERVED_FRAGMENT_MEMBERS.contains(&name) {
                return Err(FragmentValidationError::ReservedMember(name.to_string()));
            }
            if !members.insert(name) {
                return Err(FragmentValidationError::DuplicateMember(name.to_string()));
            }
        }

        for field in &self.fields {
            if let Some(default) = &field.default {
                field
                    .check(default)
                    .map_err(|reason| FragmentValidationError::InvalidDefault {
                        field: field.name.clone(),
                        reason,
                    })?;
            }
        }
        Ok(())
    }
}

/// Reasons a fragment is not a valid record-type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentValidationError {
    InvalidName(String),
    InvalidMemberName(String),
    ReservedMember(String),
    DuplicateMember(String),
    InvalidDefault { field: String, reason: String },
}

impl Display for FragmentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(value) => write!(f, "fragment name is invalid: {value}"),
            Self::InvalidMemberName(value) => {
                write!(f, "fragment member name is invalid: {value}")
            }
            Self::ReservedMember(value) => {
                write!(f, "fragment member name is reserved: {value}")
            }
            Self::DuplicateMember(value) => {
                write!(f, "fragment member is declared twice: {value}")
            }
            Self::InvalidDefault { field, reason } => {
                write!(f, "fragment default for `{field}` is invalid: {reason}")
            }
        }
    }
}

impl Error for FragmentValidationError {}
