use crate::error::StoreError;
use redb::{Database, ReadOnlyTable, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

pub const USERS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("users");
pub const PLACES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("places");
pub const PRODUCTS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("products");
pub const ORDERS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("orders");

pub fn init_db(db: &Database) -> Result<(), StoreError> {
    let write_txn = db.begin_write()?;
    write_txn.open_table(USERS_TABLE)?;
    write_txn.open_table(PLACES_TABLE)?;
    write_txn.open_table(PRODUCTS_TABLE)?;
    write_txn.open_table(ORDERS_TABLE)?;
    write_txn.commit()?;
    Ok(())
}

/// One entity class of the primary store. Documents are JSON text keyed
/// by identifier.
pub trait Collection {
    /// Inserts a new document. `WriteConflict` if the key is taken.
    fn insert(&self, id: &str, doc: &str) -> Result<(), StoreError>;

    fn get(&self, id: &str) -> Result<Option<String>, StoreError>;

    /// Removes a document; `false` if the key was absent.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;

    fn list(&self) -> Result<Vec<String>, StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Full-collection scan matching one top-level field.
    fn find_by_field(&self, field: &str, value: &Value) -> Result<Vec<String>, StoreError> {
        let mut matches = Vec::new();
        for doc in self.list()? {
            let parsed: Value = serde_json::from_str(&doc)?;
            if parsed.get(field) == Some(value) {
                matches.push(doc);
            }
        }
        Ok(matches)
    }
}

#[derive(Clone)]
pub struct RedbCollection {
    db: Arc<Database>,
    table: TableDefinition<'static, &'static str, &'static str>,
}

impl RedbCollection {
    pub fn new(
        db: Arc<Database>,
        table: TableDefinition<'static, &'static str, &'static str>,
    ) -> Self {
        RedbCollection { db, table }
    }

    pub fn users(db: Arc<Database>) -> Self {
        Self::new(db, USERS_TABLE)
    }

    pub fn places(db: Arc<Database>) -> Self {
        Self::new(db, PLACES_TABLE)
    }

    pub fn products(db: Arc<Database>) -> Self {
        Self::new(db, PRODUCTS_TABLE)
    }

    pub fn orders(db: Arc<Database>) -> Self {
        Self::new(db, ORDERS_TABLE)
    }
}

impl Collection for RedbCollection {
    fn insert(&self, id: &str, doc: &str) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.table)?;
            if table.get(id)?.is_some() {
                return Err(StoreError::WriteConflict(format!("duplicate key {id}")));
            }
            table.insert(id, doc)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<String>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table: ReadOnlyTable<&str, &str> = read_txn.open_table(self.table)?;
        Ok(table.get(id)?.map(|value| value.value().to_string()))
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let write_txn = self.db.begin_write()?;
        let removed;
        {
            let mut table = write_txn.open_table(self.table)?;
            removed = table.remove(id)?.is_some();
        }
        write_txn.commit()?;
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table: ReadOnlyTable<&str, &str> = read_txn.open_table(self.table)?;
        let mut docs = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            docs.push(value.value().to_string());
        }
        Ok(docs)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table: ReadOnlyTable<&str, &str> = read_txn.open_table(self.table)?;
        let mut keys = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

/// Full-document replace: read the prior version, delete, insert the
/// replacement. On insert failure the prior document is reinserted and
/// the failure still surfaces to the caller. Between the delete and the
/// insert, readers observe the document as absent.
pub fn replace<C: Collection>(collection: &C, id: &str, replacement: &str) -> Result<(), StoreError> {
    let prior = collection.get(id)?.ok_or(StoreError::NotFound)?;
    collection.delete(id)?;
    if let Err(error) = collection.insert(id, replacement) {
        tracing::warn!(id, error = %error, "replace insert failed, compensating");
        if let Err(undo) = collection.insert(id, &prior) {
            tracing::error!(id, error = %undo, "compensation failed, document lost");
        }
        return Err(error);
    }
    Ok(())
}

pub fn insert_entity<T: Serialize>(
    collection: &impl Collection,
    id: &str,
    entity: &T,
) -> Result<(), StoreError> {
    collection.insert(id, &serde_json::to_string(entity)?)
}

pub fn replace_entity<T: Serialize>(
    collection: &impl Collection,
    id: &str,
    entity: &T,
) -> Result<(), StoreError> {
    replace(collection, id, &serde_json::to_string(entity)?)
}

pub fn get_entity<T: DeserializeOwned>(
    collection: &impl Collection,
    id: &str,
) -> Result<Option<T>, StoreError> {
    match collection.get(id)? {
        Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
        None => Ok(None),
    }
}

pub fn list_entities<T: DeserializeOwned>(
    collection: &impl Collection,
) -> Result<Vec<T>, StoreError> {
    let mut entities = Vec::new();
    for doc in collection.list()? {
        entities.push(serde_json::from_str(&doc)?);
    }
    Ok(entities)
}

pub fn find_entities_by<T: DeserializeOwned>(
    collection: &impl Collection,
    field: &str,
    value: &Value,
) -> Result<Vec<T>, StoreError> {
    let mut entities = Vec::new();
    for doc in collection.find_by_field(field, value)? {
        entities.push(serde_json::from_str(&doc)?);
    }
    Ok(entities)
}
