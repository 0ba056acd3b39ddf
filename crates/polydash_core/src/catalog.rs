//! Type catalog: the startup-populated registry of record types.
//!
//! # Responsibility
//! - Map stable type tags to composed, immutable descriptors.
//! - Answer `lookup(namespace, type_name)` with a typed failure for
//!   unregistered tags.
//!
//! # Invariants
//! - Each type is composed and registered exactly once.
//! - Derivatives are registered after their base, so declaration order is
//!   also a valid table-creation order.

use crate::error::{CoreError, CoreResult};
use crate::extension::composer::compose;
use crate::extension::registry::ExtensionRegistry;
use crate::model::record::{RecordType, TypeKey, TypeRole};
use log::info;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct TypeCatalog {
    types: Vec<Arc<RecordType>>,
    index: BTreeMap<TypeKey, usize>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composes and registers every declaration, in order.
    pub fn build<I>(extensions: &ExtensionRegistry, declarations: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = RecordType>,
    {
        let mut catalog = Self::new();
        for declaration in declarations {
            catalog.register(extensions, declaration)?;
        }
        info!(
            "event=catalog_build module=catalog status=ok types={} namespaces={}",
            catalog.len(),
            extensions.installed_namespaces().join(",")
        );
        Ok(catalog)
    }

    /// Composes one declaration and registers the result.
    pub fn register(
        &mut self,
        extensions: &ExtensionRegistry,
        declaration: RecordType,
    ) -> CoreResult<Arc<RecordType>> {
        if self.index.contains_key(&declaration.key) {
            return Err(CoreError::DuplicateType(declaration.key));
        }
        let composed = compose(extensions, declaration)?;
        composed
            .validate()
            .map_err(|reason| CoreError::InvalidDeclaration {
                type_key: composed.key.clone(),
                reason,
            })?;

        if let Some(existing) = self.types.iter().find(|ty| ty.table == composed.table) {
            return Err(CoreError::InvalidDeclaration {
                type_key: composed.key.clone(),
                reason: format!("table `{}` already belongs to {}", composed.table, existing.key),
            });
        }

        if let TypeRole::Derivative { base, base_table } = &composed.role {
            let registered_base = self.get(base).map_err(|_| CoreError::InvalidDeclaration {
                type_key: composed.key.clone(),
                reason: format!("base {base} must be registered first"),
            })?;
            if !registered_base.is_polymorphic_base() || &registered_base.table != base_table {
                return Err(CoreError::InvalidDeclaration {
                    type_key: composed.key.clone(),
                    reason: format!("{base} is not the polymorphic base stored in `{base_table}`"),
                });
            }
            // Linked creation routes flat input by field name.
            if let Some(shared) = composed
                .fields
                .iter()
                .find(|field| registered_base.field(&field.name).is_some())
            {
                return Err(CoreError::InvalidDeclaration {
                    type_key: composed.key.clone(),
                    reason: format!("field `{}` is already declared by {base}", shared.name),
                });
            }
        }

        let ty = Arc::new(composed);
        self.index.insert(ty.key.clone(), self.types.len());
        self.types.push(Arc::clone(&ty));
        Ok(ty)
    }

    /// Resolves a type by namespace and name.
    pub fn lookup(&self, namespace: &str, type_name: &str) -> CoreResult<Arc<RecordType>> {
        self.get(&TypeKey::new(namespace, type_name))
    }

    pub fn get(&self, key: &TypeKey) -> CoreResult<Arc<RecordType>> {
        self.index
            .get(key)
            .map(|position| Arc::clone(&self.types[*position]))
            .ok_or_else(|| CoreError::UnresolvableType(key.clone()))
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.index.contains_key(key)
    }

    /// All registered types in declaration order.
    pub fn types(&self) -> impl Iterator<Item = &RecordType> {
        self.types.iter().map(|ty| ty.as_ref())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Plain types a dashboard widget may summarize.
    ///
    /// Polymorphic bases and derivatives are framework internals and are
    /// never offered as targets.
    pub fn target_types(&self) -> Vec<Arc<RecordType>> {
        self.types
            .iter()
            .filter(|ty| ty.role == TypeRole::Plain)
            .cloned()
            .collect()
    }

    /// Registered derivatives of `base`, in declaration order.
    pub fn derivatives_of(&self, base: &TypeKey) -> Vec<Arc<RecordType>> {
        self.types
            .iter()
            .filter(|ty| ty.derivative_base() == Some(base))
            .cloned()
            .collect()
    }
}
