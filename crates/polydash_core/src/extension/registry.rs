//! Installed-namespace registry and fragment discovery.
//!
//! # Invariants
//! - Discovery order equals installation order of namespaces.
//! - A namespace contributes at most one fragment per base type.
//! - A fragment registered by a namespace that is not installed is kept but
//!   never discovered.

use crate::extension::fragment::ExtensionFragment;
use crate::extension::ExtensionError;
use crate::model::is_valid_identifier;
use crate::model::record::TypeKey;
use log::warn;
use std::collections::{BTreeMap, BTreeSet};

/// Fixed path segment between a contributor and the extended type.
pub const EXTENSIONS_SEGMENT: &str = "extensions";

/// Contract for code that contributes fragments under one namespace.
pub trait NamespaceModule {
    fn namespace(&self) -> &str;
    /// Fragments keyed by the base type they extend.
    fn fragments(&self) -> Vec<(TypeKey, ExtensionFragment)>;
}

/// One fragment found for a base type.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveredFragment<'a> {
    pub namespace: &'a str,
    pub fragment: &'a ExtensionFragment,
}

impl DiscoveredFragment<'_> {
    /// Ancestor key the composed type records for this fragment.
    pub fn ancestor_key(&self) -> TypeKey {
        TypeKey::new(self.namespace, self.fragment.name.as_str())
    }
}

/// Ordered installed namespaces plus the fragments they expose by module path.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    installed: Vec<String>,
    modules: BTreeMap<String, ExtensionFragment>,
}

impl ExtensionRegistry {
    /// Creates a registry for namespaces installed in the given order.
    pub fn new<I, S>(installed: I) -> Result<Self, ExtensionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        for namespace in installed {
            let namespace = namespace.into().trim().to_string();
            if !is_valid_identifier(&namespace) {
                return Err(ExtensionError::InvalidNamespace(namespace));
            }
            if !seen.insert(namespace.clone()) {
                return Err(ExtensionError::DuplicateNamespace(namespace));
            }
            ordered.push(namespace);
        }
        Ok(Self {
            installed: ordered,
            modules: BTreeMap::new(),
        })
    }

    pub fn installed_namespaces(&self) -> &[String] {
        &self.installed
    }

    /// Module path at which `contributor` exposes its fragment for `base`.
    ///
    /// Shape: `<contributor>.extensions.<base namespace>.<lowercase base name>`.
    pub fn extension_path(contributor: &str, base: &TypeKey) -> String {
        format!(
            "{contributor}.{EXTENSIONS_SEGMENT}.{}.{}",
            base.namespace,
            base.name.to_lowercase()
        )
    }

    /// Registers the fragment `contributor` exposes for `base`.
    pub fn register_fragment(
        &mut self,
        contributor: &str,
        base: &TypeKey,
        fragment: ExtensionFragment,
    ) -> Result<(), ExtensionError> {
        if !is_valid_identifier(contributor) {
            return Err(ExtensionError::InvalidNamespace(contributor.to_string()));
        }
        let path = Self::extension_path(contributor, base);
        if self.modules.contains_key(path.as_str()) {
            return Err(ExtensionError::DuplicateFragment(path));
        }
        self.modules.insert(path, fragment);
        Ok(())
    }

    /// Registers every fragment a namespace module exposes.
    pub fn register_module(&mut self, module: &impl NamespaceModule) -> Result<(), ExtensionError> {
        let namespace = module.namespace().to_string();
        for (base, fragment) in module.fragments() {
            self.register_fragment(&namespace, &base, fragment)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Returns fragments for `base` in namespace installation order.
    ///
    /// Namespaces without a module at the conventional path contribute
    /// nothing. Fragments that fail validation are skipped.
    pub fn find_extensions(&self, base: &TypeKey) -> Vec<DiscoveredFragment<'_>> {
        let mut found = Vec::new();
        for namespace in &self.installed {
            let path = Self::extension_path(namespace, base);
            let Some(fragment) = self.modules.get(path.as_str()) else {
                continue;
            };
            if let Err(err) = fragment.validate() {
                warn!(
                    "event=fragment_skip module=extension status=skipped path={path} error={err}"
                );
                continue;
            }
            found.push(DiscoveredFragment {
                namespace: namespace.as_str(),
                fragment,
            });
        }
        found
    }
}
