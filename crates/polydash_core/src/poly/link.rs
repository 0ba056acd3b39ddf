//! Polymorphic link: shared-identity base rows pointing at concrete rows.
//!
//! # Responsibility
//! - Create a base row and its concrete row atomically with one identity.
//! - Resolve a base row to its concrete variant through the type catalog.
//! - Delete linked pairs together.
//!
//! # Invariants
//! - Base and concrete rows of one link share `identity`.
//! - After a successful `create_and_link` both rows exist; after a failed
//!   one neither exists and no identity counter moved.
//! - A base row whose concrete row is missing is reported as
//!   `DanglingLink`, never repaired.

use crate::catalog::TypeCatalog;
use crate::error::{CoreError, CoreResult};
use crate::model::quote_identifier;
use crate::model::record::{
    Record, RecordType, TypeKey, DERIVATIVE_NAMESPACE_COLUMN, DERIVATIVE_TYPE_NAME_COLUMN,
};
use crate::model::value::{FieldValue, Values};
use crate::poly::identity::issue_identity;
use crate::repo::record_repo::{
    delete_row, fetch_record, insert_row, prepare_values, query_rows, read_record, select_sql,
};
use log::{debug, error, info, warn};
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// One row of a polymorphic base table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseRecord {
    pub base_type: TypeKey,
    pub identity: i64,
    /// Concrete type the row links to.
    pub derivative: TypeKey,
    pub values: Values,
}

/// A resolved base/concrete pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedRecord {
    pub base: BaseRecord,
    pub concrete: Record,
}

impl LinkedRecord {
    pub fn identity(&self) -> i64 {
        self.base.identity
    }

    pub fn derivative(&self) -> &TypeKey {
        &self.base.derivative
    }

    /// Looks a field up on the concrete row, then on the base row.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.concrete
            .get(field)
            .or_else(|| self.base.values.get(field))
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_i64)
    }
}

/// Polymorphic operations over one connection and one catalog.
pub struct PolymorphicStore<'a> {
    conn: &'a Connection,
    catalog: &'a TypeCatalog,
}

impl<'a> PolymorphicStore<'a> {
    pub fn new(conn: &'a Connection, catalog: &'a TypeCatalog) -> Self {
        Self { conn, catalog }
    }

    /// Runs `write` in one write transaction.
    ///
    /// Link writes made inside `write` join that transaction, so they commit
    /// or roll back together.
    pub fn atomically<T>(&self, write: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        let tx = self.begin()?;
        let value = write()?;
        commit(tx)?;
        Ok(value)
    }

    /// Opens a `BEGIN IMMEDIATE` transaction unless one is already open on
    /// the connection, in which case writes join the caller's.
    fn begin(&self) -> CoreResult<Option<Transaction<'a>>> {
        if !self.conn.is_autocommit() {
            return Ok(None);
        }
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        Ok(Some(tx))
    }

    /// Creates a concrete record together with its base row.
    ///
    /// `values` is one flat map; keys are routed to the base or the concrete
    /// table by field name.
    ///
    /// # Errors
    /// - `UnresolvableType` when `concrete` is not registered.
    /// - `ConstraintViolation` when `concrete` is not a derivative, a key
    ///   names no field, or a value fails its field's check.
    /// - `StorageFailure` when the transaction cannot complete.
    ///
    /// Inside an open transaction (see `atomically`) the rows join it instead
    /// of committing on their own.
    pub fn create_and_link(&self, concrete: &TypeKey, values: &Values) -> CoreResult<LinkedRecord> {
        let started_at = Instant::now();
        let result = self.create_and_link_inner(concrete, values);
        match &result {
            Ok(linked) => info!(
                "event=create_and_link module=poly status=ok type={concrete} identity={} duration_ms={}",
                linked.identity(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=create_and_link module=poly status=error type={concrete} duration_ms={} error_code={} error={err}",
                started_at.elapsed().as_millis(),
                err.code()
            ),
        }
        result
    }

    fn create_and_link_inner(&self, concrete: &TypeKey, values: &Values) -> CoreResult<LinkedRecord> {
        let concrete_ty = self.catalog.get(concrete)?;
        let base_ty = self.base_type_of(&concrete_ty)?;
        let (base_values, concrete_values) = partition_values(&base_ty, &concrete_ty, values)?;
        let base_values = prepare_values(&base_ty, &base_values)?;
        let concrete_values = prepare_values(&concrete_ty, &concrete_values)?;

        let tx = self.begin()?;
        let identity = issue_identity(self.conn, &base_ty.key)?;
        insert_row(self.conn, &base_ty, Some(identity), Some(concrete), &base_values)?;
        insert_row(self.conn, &concrete_ty, Some(identity), None, &concrete_values)?;
        commit(tx)?;

        Ok(LinkedRecord {
            base: BaseRecord {
                base_type: base_ty.key.clone(),
                identity,
                derivative: concrete.clone(),
                values: base_values,
            },
            concrete: Record {
                type_key: concrete.clone(),
                id: identity,
                values: concrete_values,
            },
        })
    }

    /// Loads one base row.
    pub fn base(&self, base_type: &TypeKey, identity: i64) -> CoreResult<Option<BaseRecord>> {
        let base_ty = self.polymorphic_base(base_type)?;
        let sql = format!(
            "{} WHERE {} = ?1;",
            select_sql(&base_ty),
            quote_identifier(&base_ty.primary_key)
        );
        let mut found = query_rows(self.conn, &sql, &[&FieldValue::Integer(identity)], |row| {
            read_base(&base_ty, row)
        })?;
        Ok(found.pop())
    }

    /// Lists base rows in identity order, optionally filtered by one field.
    pub fn list_bases(
        &self,
        base_type: &TypeKey,
        filter: Option<(&str, &FieldValue)>,
    ) -> CoreResult<Vec<BaseRecord>> {
        let base_ty = self.polymorphic_base(base_type)?;
        let order = quote_identifier(&base_ty.primary_key);
        let Some((field, value)) = filter else {
            let sql = format!("{} ORDER BY {order} ASC;", select_sql(&base_ty));
            return query_rows(self.conn, &sql, &[], |row| read_base(&base_ty, row));
        };

        if base_ty.field(field).is_none() {
            return Err(CoreError::UnknownField {
                type_key: base_ty.key.clone(),
                field: field.to_string(),
            });
        }
        let sql = format!(
            "{} WHERE {} = ?1 ORDER BY {order} ASC;",
            select_sql(&base_ty),
            quote_identifier(field)
        );
        query_rows(self.conn, &sql, &[value], |row| read_base(&base_ty, row))
    }

    /// Resolves a base row to its concrete variant.
    ///
    /// # Errors
    /// - `UnresolvableType` when the stored tag is empty, unregistered, or
    ///   not a derivative of this base.
    /// - `DanglingLink` when no concrete row carries the identity.
    pub fn resolve(&self, base: &BaseRecord) -> CoreResult<LinkedRecord> {
        let derivative = &base.derivative;
        if derivative.namespace.is_empty() || derivative.name.is_empty() {
            return Err(CoreError::UnresolvableType(derivative.clone()));
        }
        let concrete_ty = self.catalog.get(derivative)?;
        if concrete_ty.derivative_base() != Some(&base.base_type) {
            return Err(CoreError::UnresolvableType(derivative.clone()));
        }

        let Some(concrete) = fetch_record(self.conn, &concrete_ty, base.identity)? else {
            error!(
                "event=resolve module=poly status=error base_type={} identity={} derivative={derivative} error_code=dangling_link",
                base.base_type, base.identity
            );
            return Err(CoreError::DanglingLink {
                derivative: derivative.clone(),
                identity: base.identity,
            });
        };
        debug!(
            "event=resolve module=poly status=ok base_type={} identity={} derivative={derivative}",
            base.base_type, base.identity
        );
        Ok(LinkedRecord {
            base: base.clone(),
            concrete,
        })
    }

    /// Loads and resolves one base row by identity.
    pub fn resolve_identity(&self, base_type: &TypeKey, identity: i64) -> CoreResult<LinkedRecord> {
        let base = self
            .base(base_type, identity)?
            .ok_or_else(|| CoreError::NotFound {
                type_key: base_type.clone(),
                id: identity,
            })?;
        self.resolve(&base)
    }

    /// Deletes a base row together with its concrete row.
    ///
    /// Rows that reference the base with `ON DELETE CASCADE` go with it.
    pub fn delete(&self, base_type: &TypeKey, identity: i64) -> CoreResult<()> {
        let base = self
            .base(base_type, identity)?
            .ok_or_else(|| CoreError::NotFound {
                type_key: base_type.clone(),
                id: identity,
            })?;
        let base_ty = self.polymorphic_base(base_type)?;

        let tx = self.begin()?;
        // An unregistered derivative leaves its row to the cascade.
        if let Ok(concrete_ty) = self.catalog.get(&base.derivative) {
            delete_row(self.conn, &concrete_ty, identity)?;
        }
        delete_row(self.conn, &base_ty, identity)?;
        commit(tx)?;

        info!(
            "event=link_delete module=poly status=ok base_type={base_type} identity={identity} derivative={}",
            base.derivative
        );
        Ok(())
    }

    /// Base rows of `base_type` whose concrete row is missing.
    pub fn orphaned_bases(&self, base_type: &TypeKey) -> CoreResult<Vec<BaseRecord>> {
        let mut orphans = Vec::new();
        for base in self.list_bases(base_type, None)? {
            match self.resolve(&base) {
                Ok(_) => {}
                Err(CoreError::DanglingLink { .. }) => orphans.push(base),
                Err(err) => return Err(err),
            }
        }
        Ok(orphans)
    }

    fn polymorphic_base(&self, base_type: &TypeKey) -> CoreResult<Arc<RecordType>> {
        let base_ty = self.catalog.get(base_type)?;
        if !base_ty.is_polymorphic_base() {
            return Err(CoreError::ConstraintViolation(format!(
                "{base_type} is not a polymorphic base"
            )));
        }
        Ok(base_ty)
    }

    fn base_type_of(&self, concrete_ty: &RecordType) -> CoreResult<Arc<RecordType>> {
        let base = concrete_ty.derivative_base().ok_or_else(|| {
            CoreError::ConstraintViolation(format!(
                "{} is not a derivative of a polymorphic base",
                concrete_ty.key
            ))
        })?;
        self.polymorphic_base(base)
    }
}

/// Routes flat input keys to the base or the concrete type.
fn commit(tx: Option<Transaction<'_>>) -> CoreResult<()> {
    if let Some(tx) = tx {
        tx.commit()?;
    }
    Ok(())
}

fn partition_values(
    base_ty: &RecordType,
    concrete_ty: &RecordType,
    values: &Values,
) -> CoreResult<(Values, Values)> {
    let mut base_values = Values::new();
    let mut concrete_values = Values::new();
    for (name, value) in values {
        if concrete_ty.field(name).is_some() {
            concrete_values.insert(name.clone(), value.clone());
        } else if base_ty.field(name).is_some() {
            base_values.insert(name.clone(), value.clone());
        } else {
            return Err(CoreError::ConstraintViolation(format!(
                "{} has no field `{name}`",
                concrete_ty.key
            )));
        }
    }
    Ok((base_values, concrete_values))
}

fn read_base(base_ty: &RecordType, row: &Row<'_>) -> CoreResult<BaseRecord> {
    let record = read_record(base_ty, row)?;
    let namespace: String = row.get(DERIVATIVE_NAMESPACE_COLUMN)?;
    let name: String = row.get(DERIVATIVE_TYPE_NAME_COLUMN)?;
    Ok(BaseRecord {
        base_type: base_ty.key.clone(),
        identity: record.id,
        derivative: TypeKey::new(namespace, name),
        values: record.values,
    })
}

#[cfg(test)]
mod tests {
    use super::PolymorphicStore;
    use crate::catalog::TypeCatalog;
    use crate::db::open_db_in_memory;
    use crate::db::schema::sync_schema;
    use crate::error::CoreError;
    use crate::extension::registry::ExtensionRegistry;
    use crate::model::record::{RecordType, TypeKey};
    use crate::model::value::{values, FieldDef, FieldValue};
    use crate::poly::identity::last_issued;
    use rusqlite::Connection;

    fn catalog() -> TypeCatalog {
        let base = RecordType::polymorphic_base("shop", "Item", "items")
            .with_field(FieldDef::text("label", 30));
        let book = RecordType::derivative("shop", "Book", "books", &base)
            .with_field(FieldDef::text("author", 30));
        let lamp = RecordType::derivative("shop", "Lamp", "lamps", &base)
            .with_field(FieldDef::positive_integer("watts"));
        TypeCatalog::build(&ExtensionRegistry::default(), [base, book, lamp]).unwrap()
    }

    fn setup() -> (Connection, TypeCatalog) {
        let conn = open_db_in_memory().unwrap();
        let catalog = catalog();
        sync_schema(&conn, &catalog).unwrap();
        (conn, catalog)
    }

    fn item() -> TypeKey {
        TypeKey::new("shop", "Item")
    }

    #[test]
    fn atomically_rolls_back_every_link_written_inside() {
        let (conn, catalog) = setup();
        let store = PolymorphicStore::new(&conn, &catalog);

        let result = store.atomically(|| {
            store.create_and_link(
                &TypeKey::new("shop", "Book"),
                &values([("label", FieldValue::from("Dune")), ("author", FieldValue::from("Herbert"))]),
            )?;
            store.create_and_link(
                &TypeKey::new("shop", "Lamp"),
                &values([("label", FieldValue::from("Desk")), ("watts", FieldValue::Integer(-1))]),
            )
        });

        assert!(matches!(result, Err(CoreError::ConstraintViolation(_))));
        assert!(conn.is_autocommit());
        assert!(store.list_bases(&item(), None).unwrap().is_empty());
        assert_eq!(last_issued(&conn, &item()).unwrap(), None);

        let committed = store
            .atomically(|| {
                store.create_and_link(
                    &TypeKey::new("shop", "Lamp"),
                    &values([("label", FieldValue::from("Desk")), ("watts", FieldValue::Integer(40))]),
                )
            })
            .unwrap();
        assert_eq!(committed.identity(), 1);
        assert!(store.base(&item(), 1).unwrap().is_some());
    }

    #[test]
    fn create_and_link_shares_identity_across_variants() {
        let (conn, catalog) = setup();
        let store = PolymorphicStore::new(&conn, &catalog);
        let book = store
            .create_and_link(
                &TypeKey::new("shop", "Book"),
                &values([("label", FieldValue::from("Dune")), ("author", FieldValue::from("Herbert"))]),
            )
            .unwrap();
        let lamp = store
            .create_and_link(
                &TypeKey::new("shop", "Lamp"),
                &values([("label", FieldValue::from("Desk")), ("watts", FieldValue::Integer(40))]),
            )
            .unwrap();
        assert_eq!(book.identity(), 1);
        assert_eq!(lamp.identity(), 2);

        let bases = store.list_bases(&item(), None).unwrap();
        let resolved: Vec<TypeKey> = bases
            .iter()
            .map(|base| store.resolve(base).unwrap().derivative().clone())
            .collect();
        assert_eq!(resolved, vec![TypeKey::new("shop", "Book"), TypeKey::new("shop", "Lamp")]);
        assert_eq!(
            store.resolve_identity(&item(), 2).unwrap().integer("watts"),
            Some(40)
        );
    }

    #[test]
    fn failed_create_leaves_no_rows_and_no_identity() {
        let (conn, catalog) = setup();
        let store = PolymorphicStore::new(&conn, &catalog);
        let err = store
            .create_and_link(
                &TypeKey::new("shop", "Lamp"),
                &values([("label", FieldValue::from("Desk")), ("watts", FieldValue::Integer(-3))]),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation(_)));
        assert!(store.list_bases(&item(), None).unwrap().is_empty());
        assert_eq!(last_issued(&conn, &item()).unwrap(), None);
    }

    #[test]
    fn rejects_keys_that_belong_to_neither_table() {
        let (conn, catalog) = setup();
        let store = PolymorphicStore::new(&conn, &catalog);
        let err = store
            .create_and_link(
                &TypeKey::new("shop", "Book"),
                &values([
                    ("label", FieldValue::from("Dune")),
                    ("author", FieldValue::from("Herbert")),
                    ("watts", FieldValue::Integer(1)),
                ]),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation(_)));
    }

    #[test]
    fn unregistered_tag_is_unresolvable() {
        let (conn, catalog) = setup();
        let store = PolymorphicStore::new(&conn, &catalog);
        conn.execute(
            "INSERT INTO items (identity, derivative_namespace, derivative_type_name, label)
             VALUES (9, 'shop', 'Ghost', 'boo');",
            [],
        )
        .unwrap();
        let base = store.base(&item(), 9).unwrap().unwrap();
        assert!(matches!(
            store.resolve(&base),
            Err(CoreError::UnresolvableType(key)) if key == TypeKey::new("shop", "Ghost")
        ));
    }

    #[test]
    fn missing_concrete_row_is_dangling() {
        let (conn, catalog) = setup();
        let store = PolymorphicStore::new(&conn, &catalog);
        let book = store
            .create_and_link(
                &TypeKey::new("shop", "Book"),
                &values([("label", FieldValue::from("Dune")), ("author", FieldValue::from("Herbert"))]),
            )
            .unwrap();
        conn.execute("DELETE FROM books WHERE identity = ?1;", [book.identity()])
            .unwrap();

        assert!(matches!(
            store.resolve_identity(&item(), book.identity()),
            Err(CoreError::DanglingLink { identity, .. }) if identity == book.identity()
        ));
        assert_eq!(store.orphaned_bases(&item()).unwrap().len(), 1);
    }

    #[test]
    fn delete_removes_both_rows() {
        let (conn, catalog) = setup();
        let store = PolymorphicStore::new(&conn, &catalog);
        let lamp = store
            .create_and_link(
                &TypeKey::new("shop", "Lamp"),
                &values([("label", FieldValue::from("Desk")), ("watts", FieldValue::Integer(40))]),
            )
            .unwrap();
        store.delete(&item(), lamp.identity()).unwrap();

        let lamps: i64 = conn
            .query_row("SELECT COUNT(*) FROM lamps;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(lamps, 0);
        assert!(store.base(&item(), lamp.identity()).unwrap().is_none());
        assert!(matches!(
            store.delete(&item(), lamp.identity()),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn deleting_base_row_cascades_to_concrete_row() {
        let (conn, catalog) = setup();
        let store = PolymorphicStore::new(&conn, &catalog);
        let book = store
            .create_and_link(
                &TypeKey::new("shop", "Book"),
                &values([("label", FieldValue::from("Dune")), ("author", FieldValue::from("Herbert"))]),
            )
            .unwrap();
        conn.execute("DELETE FROM items WHERE identity = ?1;", [book.identity()])
            .unwrap();
        let books: i64 = conn
            .query_row("SELECT COUNT(*) FROM books;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(books, 0);
    }
}
