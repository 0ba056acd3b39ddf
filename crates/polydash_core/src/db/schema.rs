//! Record-table DDL derived from composed type descriptors.
//!
//! # Responsibility
//! - Render `CREATE TABLE` statements for plain, base and derivative types.
//! - Create missing tables and add columns contributed by newly installed
//!   extension fragments.
//!
//! # Invariants
//! - Derivative primary keys reference their base table with
//!   `ON DELETE CASCADE`.
//! - Added columns must be nullable or carry a default; SQLite cannot
//!   backfill anything else.

use crate::catalog::TypeCatalog;
use crate::db::{DbError, DbResult};
use crate::model::quote_identifier;
use crate::model::record::{
    RecordType, TypeRole, DERIVATIVE_NAMESPACE_COLUMN, DERIVATIVE_TYPE_NAME_COLUMN,
};
use crate::model::value::{FieldDef, FieldKind, FieldValue};
use log::info;
use rusqlite::Connection;

/// What `ensure_table` changed for one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSync {
    Created,
    AddedColumns(Vec<String>),
    Unchanged,
}

/// Renders the `CREATE TABLE IF NOT EXISTS` statement for `ty`.
pub fn create_table_sql(ty: &RecordType) -> String {
    let pk = quote_identifier(&ty.primary_key);
    let mut columns = Vec::with_capacity(ty.fields.len() + 3);
    match &ty.role {
        TypeRole::Plain => columns.push(format!("{pk} INTEGER PRIMARY KEY AUTOINCREMENT")),
        TypeRole::PolymorphicBase => {
            columns.push(format!("{pk} INTEGER PRIMARY KEY NOT NULL"));
            columns.push(format!(
                "{} TEXT NOT NULL",
                quote_identifier(DERIVATIVE_NAMESPACE_COLUMN)
            ));
            columns.push(format!(
                "{} TEXT NOT NULL",
                quote_identifier(DERIVATIVE_TYPE_NAME_COLUMN)
            ));
        }
        TypeRole::Derivative { base_table, .. } => columns.push(format!(
            "{pk} INTEGER PRIMARY KEY NOT NULL REFERENCES {} ON DELETE CASCADE",
            quote_identifier(base_table)
        )),
    }
    columns.extend(ty.fields.iter().map(column_sql));

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
        quote_identifier(&ty.table),
        columns.join(",\n    ")
    )
}

/// Creates the table for `ty` or adds its missing columns.
pub fn ensure_table(conn: &Connection, ty: &RecordType) -> DbResult<TableSync> {
    if !table_exists(conn, &ty.table)? {
        conn.execute_batch(&create_table_sql(ty))?;
        return Ok(TableSync::Created);
    }

    let existing = table_columns(conn, &ty.table)?;
    let mut added = Vec::new();
    for field in &ty.fields {
        if existing.iter().any(|column| column == &field.name) {
            continue;
        }
        if field.unique || field.is_required() {
            return Err(DbError::IncompatibleColumn {
                table: ty.table.clone(),
                column: field.name.clone(),
                reason: "added columns must be nullable or defaulted and not unique",
            });
        }
        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {};",
            quote_identifier(&ty.table),
            added_column_sql(field)
        ))?;
        added.push(field.name.clone());
    }

    if added.is_empty() {
        Ok(TableSync::Unchanged)
    } else {
        Ok(TableSync::AddedColumns(added))
    }
}

/// Ensures tables for every catalog type, in declaration order.
///
/// Declaration order puts referenced tables first, which keeps foreign keys
/// resolvable on creation.
pub fn sync_schema(conn: &Connection, catalog: &TypeCatalog) -> DbResult<()> {
    let tx = conn.unchecked_transaction()?;
    let mut created = 0usize;
    let mut widened = 0usize;
    for ty in catalog.types() {
        match ensure_table(&tx, ty)? {
            TableSync::Created => created += 1,
            TableSync::AddedColumns(columns) => {
                widened += 1;
                info!(
                    "event=schema_sync module=db status=widened table={} columns={}",
                    ty.table,
                    columns.join(",")
                );
            }
            TableSync::Unchanged => {}
        }
    }
    tx.commit()?;

    info!(
        "event=schema_sync module=db status=ok types={} created={created} widened={widened}",
        catalog.len()
    );
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn table_columns(conn: &Connection, table: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "PRAGMA table_info({});",
        quote_identifier(table)
    ))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}

fn column_sql(field: &FieldDef) -> String {
    let mut sql = format!("{} {}", quote_identifier(&field.name), field.kind.sql_type());
    if !field.nullable {
        sql.push_str(" NOT NULL");
    }
    if field.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some(default) = &field.default {
        sql.push_str(&format!(" DEFAULT {}", literal_sql(default)));
    }
    if let FieldKind::Reference { table, on_delete } = &field.kind {
        sql.push_str(&format!(
            " REFERENCES {} ON DELETE {}",
            quote_identifier(table),
            on_delete.as_sql()
        ));
    }
    sql
}

fn added_column_sql(field: &FieldDef) -> String {
    let mut sql = format!("{} {}", quote_identifier(&field.name), field.kind.sql_type());
    match &field.default {
        Some(default) if !default.is_null() => {
            if !field.nullable {
                sql.push_str(" NOT NULL");
            }
            sql.push_str(&format!(" DEFAULT {}", literal_sql(default)));
        }
        _ => {
            if let FieldKind::Reference { table, on_delete } = &field.kind {
                sql.push_str(&format!(
                    " REFERENCES {} ON DELETE {}",
                    quote_identifier(table),
                    on_delete.as_sql()
                ));
            }
        }
    }
    sql
}

fn literal_sql(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => "NULL".to_string(),
        FieldValue::Boolean(flag) => i64::from(*flag).to_string(),
        FieldValue::Integer(number) => number.to_string(),
        FieldValue::Real(number) => format!("{number:?}"),
        FieldValue::Text(text) => format!("'{}'", text.replace('\'', "''")),
    }
}

#[cfg(test)]
mod tests {
    use super::{create_table_sql, ensure_table, table_columns, TableSync};
    use crate::db::{open_db_in_memory, DbError};
    use crate::model::record::RecordType;
    use crate::model::value::{FieldDef, OnDelete};

    fn contacts() -> RecordType {
        RecordType::plain("core", "Contact", "contacts")
            .with_field(FieldDef::text("name", 100).with_default(""))
    }

    #[test]
    fn renders_derivative_primary_key_as_cascading_reference() {
        let base = RecordType::polymorphic_base("core", "WidgetEntry", "widget_entries")
            .with_field(FieldDef::text("label", 50));
        let derived = RecordType::derivative("core", "FieldStats", "field_stats", &base)
            .with_field(FieldDef::text("field", 50));

        let base_sql = create_table_sql(&base);
        assert!(base_sql.contains("\"identity\" INTEGER PRIMARY KEY NOT NULL"));
        assert!(base_sql.contains("\"derivative_type_name\" TEXT NOT NULL"));

        let derived_sql = create_table_sql(&derived);
        assert!(derived_sql
            .contains("REFERENCES \"widget_entries\" ON DELETE CASCADE"));
        assert!(derived_sql.contains("\"field\" TEXT NOT NULL"));
    }

    #[test]
    fn renders_defaults_and_references() {
        let ty = RecordType::plain("core", "Connection", "connections")
            .with_field(FieldDef::text("identity", 100).with_default("it's"))
            .with_field(
                FieldDef::reference("contact", "contacts", OnDelete::SetNull).nullable(),
            );
        let sql = create_table_sql(&ty);
        assert!(sql.contains("DEFAULT 'it''s'"));
        assert!(sql.contains("\"contact\" INTEGER REFERENCES \"contacts\" ON DELETE SET NULL"));
    }

    #[test]
    fn ensure_table_creates_then_widens() {
        let conn = open_db_in_memory().unwrap();
        assert_eq!(ensure_table(&conn, &contacts()).unwrap(), TableSync::Created);
        assert_eq!(ensure_table(&conn, &contacts()).unwrap(), TableSync::Unchanged);

        let widened = contacts().with_field(FieldDef::text("nickname", 20).with_default(""));
        assert_eq!(
            ensure_table(&conn, &widened).unwrap(),
            TableSync::AddedColumns(vec!["nickname".to_string()])
        );
        let columns = table_columns(&conn, "contacts").unwrap();
        assert_eq!(columns, vec!["id", "name", "nickname"]);
    }

    #[test]
    fn ensure_table_refuses_required_added_column() {
        let conn = open_db_in_memory().unwrap();
        ensure_table(&conn, &contacts()).unwrap();
        let widened = contacts().with_field(FieldDef::integer("age"));
        let err = ensure_table(&conn, &widened).unwrap_err();
        assert!(matches!(err, DbError::IncompatibleColumn { column, .. } if column == "age"));
    }
}
