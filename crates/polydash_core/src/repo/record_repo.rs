//! Record store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide insert/get/list/filter/count/aggregate/delete over any
//!   registered record type.
//! - Keep SQL rendering and value conversion inside the persistence
//!   boundary.
//!
//! # Invariants
//! - Write paths run every value through `FieldDef::check` before SQL.
//! - Read paths reject values that cannot be mapped back to the field kind
//!   instead of masking them.
//! - Only validated identifiers reach generated SQL.

use crate::error::{CoreError, CoreResult};
use crate::model::aggregate::Statistic;
use crate::model::quote_identifier;
use crate::model::record::{
    Record, RecordType, TypeKey, DERIVATIVE_NAMESPACE_COLUMN, DERIVATIVE_TYPE_NAME_COLUMN,
};
use crate::model::value::{FieldKind, FieldValue, Values};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, Row, ToSql};

/// Storage-engine contract used by the polymorphic link and the dashboard.
pub trait RecordStore {
    /// Validates and inserts one row; returns it as stored.
    fn insert(&self, ty: &RecordType, values: &Values) -> CoreResult<Record>;
    fn get(&self, ty: &RecordType, id: i64) -> CoreResult<Option<Record>>;
    /// All rows in primary-key order.
    fn list(&self, ty: &RecordType) -> CoreResult<Vec<Record>>;
    /// Rows whose `field` equals `value`; a null value matches `IS NULL`.
    fn filter(&self, ty: &RecordType, field: &str, value: &FieldValue) -> CoreResult<Vec<Record>>;
    fn count(&self, ty: &RecordType) -> CoreResult<i64>;
    /// Evaluates `statistic` over every row's `field`.
    fn aggregate(
        &self,
        ty: &RecordType,
        field: &str,
        statistic: Statistic,
    ) -> CoreResult<FieldValue>;
    /// Deletes one row; returns whether a row was removed.
    fn delete(&self, ty: &RecordType, id: i64) -> CoreResult<bool>;
}

/// SQLite-backed record store.
pub struct SqliteRecordStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl RecordStore for SqliteRecordStore<'_> {
    fn insert(&self, ty: &RecordType, values: &Values) -> CoreResult<Record> {
        let prepared = prepare_values(ty, values)?;
        let explicit_pk = match values.get(&ty.primary_key) {
            Some(FieldValue::Integer(id)) => Some(*id),
            Some(other) => {
                return Err(CoreError::ConstraintViolation(format!(
                    "primary key `{}` of {} expects integer, got {other}",
                    ty.primary_key, ty.key
                )))
            }
            None => None,
        };
        let id = insert_row(self.conn, ty, explicit_pk, None, &prepared)?;
        Ok(Record {
            type_key: ty.key.clone(),
            id,
            values: prepared,
        })
    }

    fn get(&self, ty: &RecordType, id: i64) -> CoreResult<Option<Record>> {
        fetch_record(self.conn, ty, id)
    }

    fn list(&self, ty: &RecordType) -> CoreResult<Vec<Record>> {
        let sql = format!(
            "{} ORDER BY {} ASC;",
            select_sql(ty),
            quote_identifier(&ty.primary_key)
        );
        query_rows(self.conn, &sql, &[], |row| read_record(ty, row))
    }

    fn filter(&self, ty: &RecordType, field: &str, value: &FieldValue) -> CoreResult<Vec<Record>> {
        column_kind(ty, field)?;
        let column = quote_identifier(field);
        let order = quote_identifier(&ty.primary_key);
        if value.is_null() {
            let sql = format!("{} WHERE {column} IS NULL ORDER BY {order} ASC;", select_sql(ty));
            return query_rows(self.conn, &sql, &[], |row| read_record(ty, row));
        }
        let sql = format!("{} WHERE {column} = ?1 ORDER BY {order} ASC;", select_sql(ty));
        query_rows(self.conn, &sql, &[value], |row| read_record(ty, row))
    }

    fn count(&self, ty: &RecordType) -> CoreResult<i64> {
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {};", quote_identifier(&ty.table)),
            [],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count)
    }

    fn aggregate(
        &self,
        ty: &RecordType,
        field: &str,
        statistic: Statistic,
    ) -> CoreResult<FieldValue> {
        let kind = column_kind(ty, field)?;
        if statistic.numeric_only() && !kind.is_numeric() {
            return Err(CoreError::TypeMismatch {
                type_key: ty.key.clone(),
                field: field.to_string(),
                statistic,
            });
        }

        let table = quote_identifier(&ty.table);
        let column = quote_identifier(field);
        match statistic {
            Statistic::Count => {
                let count = self.conn.query_row(
                    &format!("SELECT COUNT({column}) FROM {table};"),
                    [],
                    |row| row.get::<_, i64>(0),
                )?;
                Ok(FieldValue::Integer(count))
            }
            Statistic::Sum | Statistic::Avg => {
                let function = if statistic == Statistic::Sum { "SUM" } else { "AVG" };
                let value = self.conn.query_row(
                    &format!("SELECT {function}({column}) FROM {table};"),
                    [],
                    |row| row.get::<_, Value>(0),
                )?;
                value_from_sql(None, value)
            }
            Statistic::Min | Statistic::Max => {
                let function = if statistic == Statistic::Min { "MIN" } else { "MAX" };
                let value = self.conn.query_row(
                    &format!("SELECT {function}({column}) FROM {table};"),
                    [],
                    |row| row.get::<_, Value>(0),
                )?;
                value_from_sql(Some(&kind), value)
            }
            Statistic::StdDev | Statistic::Variance => {
                let real = format!("CAST({column} AS REAL)");
                let mean = self.conn.query_row(
                    &format!("SELECT AVG({real}) FROM {table};"),
                    [],
                    |row| row.get::<_, Option<f64>>(0),
                )?;
                let Some(mean) = mean else {
                    return Ok(FieldValue::Null);
                };
                // Deviations from the mean, not AVG(x*x) - AVG(x)^2.
                let variance = self
                    .conn
                    .query_row(
                        &format!("SELECT AVG(({real} - ?1) * ({real} - ?1)) FROM {table};"),
                        [mean],
                        |row| row.get::<_, Option<f64>>(0),
                    )?
                    .unwrap_or(0.0);
                if statistic == Statistic::Variance {
                    Ok(FieldValue::Real(variance))
                } else {
                    Ok(FieldValue::Real(variance.sqrt()))
                }
            }
        }
    }

    fn delete(&self, ty: &RecordType, id: i64) -> CoreResult<bool> {
        delete_row(self.conn, ty, id)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Boolean(value) => ToSqlOutput::Owned(Value::Integer(i64::from(*value))),
            Self::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            Self::Real(value) => ToSqlOutput::Owned(Value::Real(*value)),
            Self::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

/// Checks caller values against `ty` and fills defaults.
///
/// The result holds exactly one value per declared field. Unknown keys are
/// rejected; the primary key is tolerated and left to the caller.
pub(crate) fn prepare_values(ty: &RecordType, input: &Values) -> CoreResult<Values> {
    for name in input.keys() {
        if name != &ty.primary_key && ty.field(name).is_none() {
            return Err(CoreError::ConstraintViolation(format!(
                "{} has no field `{name}`",
                ty.key
            )));
        }
    }

    let mut prepared = Values::new();
    for field in &ty.fields {
        let value = match input.get(&field.name) {
            Some(value) => value.clone(),
            None => match &field.default {
                Some(default) => default.clone(),
                None if field.nullable => FieldValue::Null,
                None => {
                    return Err(CoreError::ConstraintViolation(format!(
                        "missing required field `{}` for {}",
                        field.name, ty.key
                    )))
                }
            },
        };
        field.check(&value).map_err(CoreError::ConstraintViolation)?;
        let value = match (&field.kind, value) {
            (FieldKind::Real, FieldValue::Integer(number)) => FieldValue::Real(number as f64),
            (_, value) => value,
        };
        prepared.insert(field.name.clone(), value);
    }
    Ok(prepared)
}

/// Inserts one prepared row and returns its primary key.
///
/// `derivative` is written to the link columns of a polymorphic base.
pub(crate) fn insert_row(
    conn: &Connection,
    ty: &RecordType,
    primary_key: Option<i64>,
    derivative: Option<&TypeKey>,
    prepared: &Values,
) -> CoreResult<i64> {
    let mut columns = Vec::with_capacity(ty.fields.len() + 3);
    let mut params = Vec::with_capacity(ty.fields.len() + 3);
    if let Some(id) = primary_key {
        columns.push(quote_identifier(&ty.primary_key));
        params.push(FieldValue::Integer(id));
    }
    if let Some(derivative) = derivative {
        columns.push(quote_identifier(DERIVATIVE_NAMESPACE_COLUMN));
        params.push(FieldValue::Text(derivative.namespace.clone()));
        columns.push(quote_identifier(DERIVATIVE_TYPE_NAME_COLUMN));
        params.push(FieldValue::Text(derivative.name.clone()));
    }
    for field in &ty.fields {
        columns.push(quote_identifier(&field.name));
        params.push(prepared.get(&field.name).cloned().unwrap_or(FieldValue::Null));
    }

    let table = quote_identifier(&ty.table);
    if columns.is_empty() {
        conn.execute(&format!("INSERT INTO {table} DEFAULT VALUES;"), [])?;
    } else {
        let placeholders: Vec<String> = (1..=columns.len()).map(|index| format!("?{index}")).collect();
        conn.execute(
            &format!(
                "INSERT INTO {table} ({}) VALUES ({});",
                columns.join(", "),
                placeholders.join(", ")
            ),
            params_from_iter(params.iter()),
        )?;
    }

    Ok(primary_key.unwrap_or_else(|| conn.last_insert_rowid()))
}

pub(crate) fn fetch_record(conn: &Connection, ty: &RecordType, id: i64) -> CoreResult<Option<Record>> {
    let sql = format!(
        "{} WHERE {} = ?1;",
        select_sql(ty),
        quote_identifier(&ty.primary_key)
    );
    let mut found = query_rows(conn, &sql, &[&FieldValue::Integer(id)], |row| read_record(ty, row))?;
    Ok(found.pop())
}

pub(crate) fn delete_row(conn: &Connection, ty: &RecordType, id: i64) -> CoreResult<bool> {
    let changed = conn.execute(
        &format!(
            "DELETE FROM {} WHERE {} = ?1;",
            quote_identifier(&ty.table),
            quote_identifier(&ty.primary_key)
        ),
        [id],
    )?;
    Ok(changed > 0)
}

/// `SELECT` over the primary key, link columns (bases only) and fields.
pub(crate) fn select_sql(ty: &RecordType) -> String {
    let mut columns = vec![quote_identifier(&ty.primary_key)];
    if ty.is_polymorphic_base() {
        columns.push(quote_identifier(DERIVATIVE_NAMESPACE_COLUMN));
        columns.push(quote_identifier(DERIVATIVE_TYPE_NAME_COLUMN));
    }
    columns.extend(ty.fields.iter().map(|field| quote_identifier(&field.name)));
    format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        quote_identifier(&ty.table)
    )
}

pub(crate) fn query_rows<T>(
    conn: &Connection,
    sql: &str,
    params: &[&FieldValue],
    mut map: impl FnMut(&Row<'_>) -> CoreResult<T>,
) -> CoreResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(map(row)?);
    }
    Ok(items)
}

/// Maps one row selected by `select_sql` into a `Record`.
pub(crate) fn read_record(ty: &RecordType, row: &Row<'_>) -> CoreResult<Record> {
    let id: i64 = row.get(ty.primary_key.as_str())?;
    let mut values = Values::new();
    for field in &ty.fields {
        let raw: Value = row.get(field.name.as_str())?;
        let value = value_from_sql(Some(&field.kind), raw).map_err(|err| {
            CoreError::InvalidData(format!("{}.{} row {id}: {err}", ty.key, field.name))
        })?;
        values.insert(field.name.clone(), value);
    }
    Ok(Record {
        type_key: ty.key.clone(),
        id,
        values,
    })
}

fn column_kind(ty: &RecordType, field: &str) -> CoreResult<FieldKind> {
    if field == ty.primary_key {
        return Ok(FieldKind::Integer);
    }
    ty.field(field)
        .map(|definition| definition.kind.clone())
        .ok_or_else(|| CoreError::UnknownField {
            type_key: ty.key.clone(),
            field: field.to_string(),
        })
}

fn value_from_sql(kind: Option<&FieldKind>, value: Value) -> CoreResult<FieldValue> {
    match (kind, value) {
        (_, Value::Null) => Ok(FieldValue::Null),
        (Some(FieldKind::Boolean), Value::Integer(number)) => Ok(FieldValue::Boolean(number != 0)),
        (Some(FieldKind::Real), Value::Integer(number)) => Ok(FieldValue::Real(number as f64)),
        (Some(FieldKind::Text { .. }), Value::Text(text)) | (None, Value::Text(text)) => {
            Ok(FieldValue::Text(text))
        }
        (Some(FieldKind::Text { .. }), other) => Err(CoreError::InvalidData(format!(
            "expected text, found {:?}",
            other.data_type()
        ))),
        (_, Value::Integer(number)) => Ok(FieldValue::Integer(number)),
        (_, Value::Real(number)) => Ok(FieldValue::Real(number)),
        (_, other) => Err(CoreError::InvalidData(format!(
            "unsupported stored value of type {:?}",
            other.data_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordStore, SqliteRecordStore};
    use crate::catalog::TypeCatalog;
    use crate::db::open_db_in_memory;
    use crate::db::schema::sync_schema;
    use crate::error::CoreError;
    use crate::extension::registry::ExtensionRegistry;
    use crate::model::aggregate::Statistic;
    use crate::model::record::RecordType;
    use crate::model::value::{values, FieldDef, FieldValue};
    use rusqlite::Connection;
    use std::sync::Arc;

    fn person() -> RecordType {
        RecordType::plain("app", "Person", "people")
            .with_field(FieldDef::text("name", 20))
            .with_field(FieldDef::integer("age").nullable())
            .with_field(FieldDef::real("score").with_default(0.0))
            .with_field(FieldDef::boolean("active").with_default(true))
    }

    fn setup() -> (Connection, Arc<RecordType>) {
        let conn = open_db_in_memory().unwrap();
        let catalog = TypeCatalog::build(&ExtensionRegistry::default(), [person()]).unwrap();
        sync_schema(&conn, &catalog).unwrap();
        let ty = catalog.lookup("app", "Person").unwrap();
        (conn, ty)
    }

    fn add(store: &SqliteRecordStore<'_>, ty: &RecordType, name: &str, age: Option<i64>) {
        store
            .insert(
                ty,
                &values([("name", FieldValue::from(name)), ("age", FieldValue::from(age))]),
            )
            .unwrap();
    }

    #[test]
    fn insert_applies_defaults_and_roundtrips() {
        let (conn, ty) = setup();
        let store = SqliteRecordStore::new(&conn);
        let created = store
            .insert(&ty, &values([("name", FieldValue::from("ana"))]))
            .unwrap();
        let loaded = store.get(&ty, created.id).unwrap().unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.get("active"), Some(&FieldValue::Boolean(true)));
        assert_eq!(loaded.get("score"), Some(&FieldValue::Real(0.0)));
        assert_eq!(loaded.get("age"), Some(&FieldValue::Null));
    }

    #[test]
    fn insert_rejects_unknown_and_invalid_fields() {
        let (conn, ty) = setup();
        let store = SqliteRecordStore::new(&conn);
        let err = store
            .insert(&ty, &values([("name", FieldValue::from("ana")), ("nick", FieldValue::from("a"))]))
            .unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation(_)));

        let err = store
            .insert(&ty, &values([("name", FieldValue::from("x".repeat(21)))]))
            .unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation(_)));
        assert_eq!(store.count(&ty).unwrap(), 0);
    }

    #[test]
    fn filter_matches_values_and_nulls() {
        let (conn, ty) = setup();
        let store = SqliteRecordStore::new(&conn);
        add(&store, &ty, "ana", Some(10));
        add(&store, &ty, "bo", None);
        add(&store, &ty, "cy", Some(10));

        let tens = store.filter(&ty, "age", &FieldValue::Integer(10)).unwrap();
        assert_eq!(tens.len(), 2);
        let unknown = store.filter(&ty, "age", &FieldValue::Null).unwrap();
        assert_eq!(unknown[0].text("name"), Some("bo"));
        assert!(matches!(
            store.filter(&ty, "height", &FieldValue::Integer(1)),
            Err(CoreError::UnknownField { .. })
        ));
    }

    #[test]
    fn aggregates_numeric_fields() {
        let (conn, ty) = setup();
        let store = SqliteRecordStore::new(&conn);
        for (name, age) in [("a", 10), ("b", 20), ("c", 30)] {
            add(&store, &ty, name, Some(age));
        }
        add(&store, &ty, "d", None);

        assert_eq!(store.aggregate(&ty, "age", Statistic::Count).unwrap(), FieldValue::Integer(3));
        assert_eq!(store.aggregate(&ty, "age", Statistic::Sum).unwrap(), FieldValue::Integer(60));
        assert_eq!(store.aggregate(&ty, "age", Statistic::Avg).unwrap(), FieldValue::Real(20.0));
        assert_eq!(store.aggregate(&ty, "age", Statistic::Min).unwrap(), FieldValue::Integer(10));
        assert_eq!(store.aggregate(&ty, "age", Statistic::Max).unwrap(), FieldValue::Integer(30));

        let variance = store
            .aggregate(&ty, "age", Statistic::Variance)
            .unwrap()
            .as_f64()
            .unwrap();
        assert!((variance - 200.0 / 3.0).abs() < 1e-9);
        let deviation = store
            .aggregate(&ty, "age", Statistic::StdDev)
            .unwrap()
            .as_f64()
            .unwrap();
        assert!((deviation - (200.0f64 / 3.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn variance_keeps_precision_for_large_close_values() {
        let (conn, ty) = setup();
        let store = SqliteRecordStore::new(&conn);
        for (name, stamp) in [("a", 1_700_000_000), ("b", 1_700_000_001), ("c", 1_700_000_002)] {
            add(&store, &ty, name, Some(stamp));
        }

        let variance = store
            .aggregate(&ty, "age", Statistic::Variance)
            .unwrap()
            .as_f64()
            .unwrap();
        assert!((variance - 2.0 / 3.0).abs() < 1e-9, "variance={variance}");
        let deviation = store
            .aggregate(&ty, "age", Statistic::StdDev)
            .unwrap()
            .as_f64()
            .unwrap();
        assert!((deviation - (2.0f64 / 3.0).sqrt()).abs() < 1e-9, "stddev={deviation}");
    }

    #[test]
    fn aggregates_over_empty_table_are_null_or_zero() {
        let (conn, ty) = setup();
        let store = SqliteRecordStore::new(&conn);
        assert_eq!(store.aggregate(&ty, "age", Statistic::Count).unwrap(), FieldValue::Integer(0));
        assert_eq!(store.aggregate(&ty, "age", Statistic::Avg).unwrap(), FieldValue::Null);
        assert_eq!(store.aggregate(&ty, "age", Statistic::StdDev).unwrap(), FieldValue::Null);
    }

    #[test]
    fn aggregate_rejects_unknown_and_non_numeric_fields() {
        let (conn, ty) = setup();
        let store = SqliteRecordStore::new(&conn);
        assert!(matches!(
            store.aggregate(&ty, "height", Statistic::Max),
            Err(CoreError::UnknownField { .. })
        ));
        assert!(matches!(
            store.aggregate(&ty, "name", Statistic::Avg),
            Err(CoreError::TypeMismatch { .. })
        ));
        add(&store, &ty, "zed", Some(1));
        add(&store, &ty, "amy", Some(2));
        assert_eq!(
            store.aggregate(&ty, "name", Statistic::Max).unwrap(),
            FieldValue::Text("zed".to_string())
        );
    }

    #[test]
    fn delete_reports_whether_a_row_was_removed() {
        let (conn, ty) = setup();
        let store = SqliteRecordStore::new(&conn);
        add(&store, &ty, "ana", Some(1));
        let id = store.list(&ty).unwrap()[0].id;
        assert!(store.delete(&ty, id).unwrap());
        assert!(!store.delete(&ty, id).unwrap());
        assert!(store.get(&ty, id).unwrap().is_none());
    }
}
