//! Contact use-case service.

use crate::builtin::{core_key, CONNECTION, CONTACT};
use crate::catalog::TypeCatalog;
use crate::error::{CoreError, CoreResult};
use crate::model::record::Record;
use crate::model::value::FieldValue;
use crate::repo::record_repo::{RecordStore, SqliteRecordStore};
use rusqlite::Connection;

/// Contact lookups over the composed `core.Contact` type.
pub struct ContactService<'a> {
    store: SqliteRecordStore<'a>,
    catalog: &'a TypeCatalog,
}

impl<'a> ContactService<'a> {
    pub fn new(conn: &'a Connection, catalog: &'a TypeCatalog) -> Self {
        Self {
            store: SqliteRecordStore::new(conn),
            catalog,
        }
    }

    pub fn contact(&self, contact_id: i64) -> CoreResult<Record> {
        let ty = self.catalog.get(&core_key(CONTACT))?;
        self.store
            .get(&ty, contact_id)?
            .ok_or_else(|| CoreError::NotFound {
                type_key: ty.key.clone(),
                id: contact_id,
            })
    }

    /// First connection referencing the contact, in storage order.
    pub fn default_connection(&self, contact_id: i64) -> CoreResult<Option<Record>> {
        self.contact(contact_id)?;
        let connections = self.catalog.get(&core_key(CONNECTION))?;
        let mut found = self
            .store
            .filter(&connections, "contact", &FieldValue::Integer(contact_id))?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.remove(0))
        })
    }

    /// Display name via the most-derived `display` method.
    pub fn display_name(&self, contact_id: i64) -> CoreResult<String> {
        let record = self.contact(contact_id)?;
        let ty = self.catalog.get(&record.type_key)?;
        Ok(ty
            .call_method("display", &record)
            .map(|value| value.to_string())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::ContactService;
    use crate::builtin::core_declarations;
    use crate::catalog::TypeCatalog;
    use crate::db::open_db_in_memory;
    use crate::db::schema::sync_schema;
    use crate::error::CoreError;
    use crate::extension::registry::ExtensionRegistry;

    #[test]
    fn default_connection_is_first_in_storage_order() {
        let conn = open_db_in_memory().unwrap();
        let catalog =
            TypeCatalog::build(&ExtensionRegistry::default(), core_declarations()).unwrap();
        sync_schema(&conn, &catalog).unwrap();
        conn.execute_batch(
            "INSERT INTO backends (name) VALUES ('sms');
             INSERT INTO contacts (name, language) VALUES ('ana', 'pt');
             INSERT INTO contacts (name, language) VALUES ('', 'en');
             INSERT INTO connections (backend, identity, contact) VALUES (1, '+100', 1);
             INSERT INTO connections (backend, identity, contact) VALUES (1, '+200', 1);",
        )
        .unwrap();

        let service = ContactService::new(&conn, &catalog);
        let first = service.default_connection(1).unwrap().unwrap();
        assert_eq!(first.text("identity"), Some("+100"));
        assert!(service.default_connection(2).unwrap().is_none());
        assert!(matches!(
            service.default_connection(9),
            Err(CoreError::NotFound { .. })
        ));
        assert_eq!(service.display_name(2).unwrap(), "Anonymous");
    }
}
