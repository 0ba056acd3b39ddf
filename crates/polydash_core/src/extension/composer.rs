//! Definition-time composition of extension fragments into record types.
//!
//! # Invariants
//! - Output ancestors are discovered fragments (discovery order) followed by
//!   the declaration's own ancestors.
//! - Without fragments the declaration is returned unchanged.
//! - Two fragments may not declare the same member; a fragment may override a
//!   declared field only with a field of the same shape.

use crate::extension::registry::ExtensionRegistry;
use crate::extension::ExtensionError;
use crate::model::record::{MethodDef, RecordType};
use log::debug;
use std::collections::BTreeMap;

/// Splices the fragments discovered for `declaration` into its definition.
pub fn compose(
    registry: &ExtensionRegistry,
    declaration: RecordType,
) -> Result<RecordType, ExtensionError> {
    if !declaration.extensible {
        return Ok(declaration);
    }
    let discovered = registry.find_extensions(&declaration.key);
    if discovered.is_empty() {
        return Ok(declaration);
    }

    let mut composed = declaration;
    let mut claimed: BTreeMap<String, String> = BTreeMap::new();
    let mut fragment_methods: Vec<MethodDef> = Vec::new();
    let mut fragment_ancestors = Vec::with_capacity(discovered.len());

    for item in &discovered {
        let contributor = item.namespace;
        let members = item
            .fragment
            .fields
            .iter()
            .map(|field| field.name.as_str())
            .chain(item.fragment.methods.iter().map(|method| method.name.as_str()));
        for member in members {
            if let Some(first) = claimed.insert(member.to_string(), contributor.to_string()) {
                return Err(ExtensionError::FragmentCollision {
                    type_key: composed.key.clone(),
                    member: member.to_string(),
                    first,
                    second: contributor.to_string(),
                });
            }
        }

        for field in &item.fragment.fields {
            match composed.fields.iter().position(|own| own.name == field.name) {
                Some(index) => {
                    if !composed.fields[index].kind.same_shape(&field.kind) {
                        return Err(ExtensionError::IncompatibleOverride {
                            type_key: composed.key.clone(),
                            field: field.name.clone(),
                            namespace: contributor.to_string(),
                        });
                    }
                    composed.fields[index] = field.clone();
                }
                None => composed.fields.push(field.clone()),
            }
        }

        fragment_methods.extend(item.fragment.methods.iter().cloned());
        fragment_ancestors.push(item.ancestor_key());
    }

    fragment_methods.append(&mut composed.methods);
    composed.methods = fragment_methods;
    fragment_ancestors.append(&mut composed.ancestors);
    composed.ancestors = fragment_ancestors;

    debug!(
        "event=type_compose module=extension status=ok type={} fragments={} fields={}",
        composed.key,
        discovered.len(),
        composed.fields.len()
    );
    Ok(composed)
}

#[cfg(test)]
mod tests {
    use super::compose;
    use crate::extension::fragment::ExtensionFragment;
    use crate::extension::registry::ExtensionRegistry;
    use crate::extension::ExtensionError;
    use crate::model::record::{Record, RecordType, TypeKey};
    use crate::model::value::{values, FieldDef, FieldValue};

    fn contact_declaration() -> RecordType {
        RecordType::plain("core", "Contact", "contacts")
            .with_field(FieldDef::text("name", 100).with_default(""))
            .with_field(FieldDef::text("language", 6).with_default(""))
            .with_method("display", |_| FieldValue::Text("declared".to_string()))
            .with_ancestor(TypeKey::new("core", "ContactBase"))
            .extensible()
    }

    fn registry_with(fragments: &[(&str, ExtensionFragment)]) -> ExtensionRegistry {
        let namespaces: Vec<&str> = fragments.iter().map(|(namespace, _)| *namespace).collect();
        let mut registry = ExtensionRegistry::new(namespaces).unwrap();
        for (namespace, fragment) in fragments {
            registry
                .register_fragment(namespace, &TypeKey::new("core", "Contact"), fragment.clone())
                .unwrap();
        }
        registry
    }

    fn record(ty: &RecordType) -> Record {
        Record {
            type_key: ty.key.clone(),
            id: 1,
            values: values([("name", FieldValue::from("ana"))]),
        }
    }

    #[test]
    fn passes_through_without_fragments() {
        let registry = ExtensionRegistry::new(["locations"]).unwrap();
        let composed = compose(&registry, contact_declaration()).unwrap();
        assert_eq!(composed.ancestors, vec![TypeKey::new("core", "ContactBase")]);
        assert_eq!(composed.field_names(), vec!["name", "language"]);
    }

    #[test]
    fn leaves_non_extensible_types_alone() {
        let registry = registry_with(&[(
            "locations",
            ExtensionFragment::new("ContactLocation").with_field(FieldDef::integer("zone").nullable()),
        )]);
        let mut declaration = contact_declaration();
        declaration.extensible = false;
        let composed = compose(&registry, declaration).unwrap();
        assert_eq!(composed.field_names(), vec!["name", "language"]);
    }

    #[test]
    fn prepends_fragments_as_more_specific_ancestors() {
        let registry = registry_with(&[
            (
                "reporters",
                ExtensionFragment::new("Reporter").with_field(FieldDef::boolean("is_reporter").with_default(false)),
            ),
            (
                "locations",
                ExtensionFragment::new("ContactLocation")
                    .with_field(FieldDef::text("village", 60).with_default("")),
            ),
        ]);
        let composed = compose(&registry, contact_declaration()).unwrap();
        assert_eq!(
            composed.ancestors,
            vec![
                TypeKey::new("reporters", "Reporter"),
                TypeKey::new("locations", "ContactLocation"),
                TypeKey::new("core", "ContactBase"),
            ]
        );
        assert_eq!(
            composed.field_names(),
            vec!["name", "language", "is_reporter", "village"]
        );
    }

    #[test]
    fn fragment_methods_take_precedence_over_declared_methods() {
        let registry = registry_with(&[(
            "locations",
            ExtensionFragment::new("ContactLocation")
                .with_method("display", |_| FieldValue::Text("fragment".to_string())),
        )]);
        let composed = compose(&registry, contact_declaration()).unwrap();
        assert_eq!(
            composed.call_method("display", &record(&composed)),
            Some(FieldValue::Text("fragment".to_string()))
        );
    }

    #[test]
    fn compatible_field_override_replaces_in_place() {
        let registry = registry_with(&[(
            "i18n",
            ExtensionFragment::new("WideLanguage")
                .with_field(FieldDef::text("language", 35).with_default("")),
        )]);
        let composed = compose(&registry, contact_declaration()).unwrap();
        assert_eq!(composed.field_names(), vec!["name", "language"]);
        assert!(composed.field("language").unwrap().check(&"x".repeat(30).into()).is_ok());
    }

    #[test]
    fn incompatible_field_override_fails() {
        let registry = registry_with(&[(
            "i18n",
            ExtensionFragment::new("NumericLanguage").with_field(FieldDef::integer("language")),
        )]);
        let err = compose(&registry, contact_declaration()).unwrap_err();
        assert!(matches!(err, ExtensionError::IncompatibleOverride { field, .. } if field == "language"));
    }

    #[test]
    fn collision_between_fragments_fails() {
        let registry = registry_with(&[
            (
                "reporters",
                ExtensionFragment::new("Reporter").with_field(FieldDef::text("region", 10).with_default("")),
            ),
            (
                "locations",
                ExtensionFragment::new("ContactLocation")
                    .with_field(FieldDef::text("region", 10).with_default("")),
            ),
        ]);
        let err = compose(&registry, contact_declaration()).unwrap_err();
        assert_eq!(
            err,
            ExtensionError::FragmentCollision {
                type_key: TypeKey::new("core", "Contact"),
                member: "region".to_string(),
                first: "reporters".to_string(),
                second: "locations".to_string(),
            }
        );
    }

    #[test]
    fn composition_is_deterministic() {
        let registry = registry_with(&[
            (
                "reporters",
                ExtensionFragment::new("Reporter").with_field(FieldDef::boolean("is_reporter").with_default(false)),
            ),
            (
                "locations",
                ExtensionFragment::new("ContactLocation")
                    .with_field(FieldDef::text("village", 60).with_default("")),
            ),
        ]);
        let first = compose(&registry, contact_declaration()).unwrap();
        let second = compose(&registry, contact_declaration()).unwrap();
        assert_eq!(first.ancestors, second.ancestors);
        assert_eq!(first.fields, second.fields);
        let first_methods: Vec<&str> = first.methods.iter().map(|m| m.name.as_str()).collect();
        let second_methods: Vec<&str> = second.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(first_methods, second_methods);
    }
}
