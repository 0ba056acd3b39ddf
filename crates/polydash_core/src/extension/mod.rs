//! Extension composition.
//!
//! Namespaces contribute fragments to extensible base types by registering
//! them at a conventional module path. At startup the composer folds the
//! discovered fragments into each base type's descriptor once; nothing is
//! scanned or spliced at runtime.

pub mod composer;
pub mod fragment;
pub mod registry;

use crate::model::record::TypeKey;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Namespace registration and composition errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    InvalidNamespace(String),
    DuplicateNamespace(String),
    DuplicateFragment(String),
    /// Two fragments declare the same member for one type.
    FragmentCollision {
        type_key: TypeKey,
        member: String,
        first: String,
        second: String,
    },
    /// A fragment redeclares a field with a different storage shape.
    IncompatibleOverride {
        type_key: TypeKey,
        field: String,
        namespace: String,
    },
}

impl Display for ExtensionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNamespace(value) => write!(f, "namespace name is invalid: {value}"),
            Self::DuplicateNamespace(value) => {
                write!(f, "namespace installed twice: {value}")
            }
            Self::DuplicateFragment(path) => {
                write!(f, "extension fragment already registered at {path}")
            }
            Self::FragmentCollision {
                type_key,
                member,
                first,
                second,
            } => write!(
                f,
                "member `{member}` of {type_key} is contributed by both `{first}` and `{second}`"
            ),
            Self::IncompatibleOverride {
                type_key,
                field,
                namespace,
            } => write!(
                f,
                "namespace `{namespace}` redeclares field `{field}` of {type_key} with a different shape"
            ),
        }
    }
}

impl Error for ExtensionError {}
