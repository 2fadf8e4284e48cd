//! Mapping definition storage using redb.
//!
//! Each strategy family gets its own table, named after
//! [`MappingStrategy::KIND`] (`range_mappings`, `category_mappings`).

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};

use cblocks_core::mapping::{Mapping, MappingDefinition, MappingId, MappingStore, MappingStrategy};

use crate::Error;

/// Mapping definition store for one strategy family.
pub struct RedbMappingStore<S> {
    db: Arc<Database>,
    table: String,
    _strategy: PhantomData<fn() -> S>,
}

impl<S: MappingStrategy> RedbMappingStore<S> {
    /// Create the store on an opened database.
    pub fn new(db: Arc<Database>) -> Result<Self, Error> {
        let store = Self {
            db,
            table: format!("{}_mappings", S::KIND),
            _strategy: PhantomData,
        };

        let write_txn = store.db.begin_write()?;
        {
            let _mappings = write_txn.open_table(store.definition())?;
        }
        write_txn.commit()?;

        Ok(store)
    }

    fn definition(&self) -> TableDefinition<'_, &'static str, &'static str> {
        TableDefinition::new(&self.table)
    }

    /// Save a mapping under its own ID.
    pub fn save(&self, mapping: &Mapping<S>) -> Result<(), Error> {
        let json = serde_json::to_string(mapping)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.definition())?;
            table.insert(mapping.mapping_id.as_str(), json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Overwrite a mapping only if its ID is already stored. Returns whether it was.
    pub fn update(&self, mapping: &Mapping<S>) -> Result<bool, Error> {
        let json = serde_json::to_string(mapping)?;
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(self.definition())?;
            let exists = table.get(mapping.mapping_id.as_str())?.is_some();
            if exists {
                table.insert(mapping.mapping_id.as_str(), json.as_str())?;
            }
            exists
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Load a mapping by ID.
    pub fn load(&self, mapping_id: &str) -> Result<Option<Mapping<S>>, Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(self.definition())?;

        match table.get(mapping_id)? {
            Some(value) => Ok(Some(serde_json::from_str(value.value())?)),
            None => Ok(None),
        }
    }

    /// List all mappings of this family.
    pub fn list(&self) -> Result<Vec<Mapping<S>>, Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(self.definition())?;

        let mut mappings = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            mappings.push(serde_json::from_str(value.value())?);
        }
        Ok(mappings)
    }

    /// Remove a mapping. Returns whether it existed.
    pub fn remove(&self, mapping_id: &str) -> Result<bool, Error> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(self.definition())?;
            let removed = table.remove(mapping_id)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }
}

#[async_trait]
impl<S: MappingStrategy> MappingStore<S> for RedbMappingStore<S> {
    async fn insert(&self, definition: MappingDefinition<S>) -> cblocks_core::Result<MappingId> {
        let mapping = Mapping::new(uuid::Uuid::new_v4().to_string(), definition);
        self.save(&mapping)?;
        Ok(mapping.mapping_id)
    }

    async fn find_by_id(&self, mapping_id: &str) -> cblocks_core::Result<Option<Mapping<S>>> {
        Ok(self.load(mapping_id)?)
    }

    async fn find_all(&self) -> cblocks_core::Result<Vec<Mapping<S>>> {
        Ok(self.list()?)
    }

    async fn replace(
        &self,
        mapping_id: &str,
        definition: MappingDefinition<S>,
    ) -> cblocks_core::Result<bool> {
        Ok(self.update(&Mapping::new(mapping_id, definition))?)
    }

    async fn delete(&self, mapping_id: &str) -> cblocks_core::Result<bool> {
        Ok(self.remove(mapping_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cblocks_core::resource::{Resource, ResourceAddress};
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Threshold {
        limit: f64,
    }

    impl MappingStrategy for Threshold {
        const KIND: &'static str = "threshold";

        fn apply(&self, value: &Value) -> cblocks_core::Result<Value> {
            Ok(Value::Bool(value.as_f64().unwrap_or_default() > self.limit))
        }

        fn is_applicable_for(&self, resource: &Resource) -> bool {
            resource.is_numeric()
        }
    }

    fn definition(label: &str, limit: f64) -> MappingDefinition<Threshold> {
        MappingDefinition::new(label, ResourceAddress::new(3303, 0, 0), Threshold { limit })
    }

    fn store() -> RedbMappingStore<Threshold> {
        let db = crate::temp_database("mappings_test").unwrap();
        RedbMappingStore::new(db).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = store();

        let id = store.insert(definition("Hot", 30.0)).await.unwrap();
        let mapping = store.find_by_id(&id).await.unwrap().unwrap();

        assert_eq!(mapping.mapping_id, id);
        assert_eq!(mapping.label(), "Hot");
        assert_eq!(store.find_all().await.unwrap().len(), 1);
        assert!(store.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_and_delete() {
        let store = store();
        let id = store.insert(definition("Hot", 30.0)).await.unwrap();

        assert!(store.replace(&id, definition("Warm", 20.0)).await.unwrap());
        assert!(!store.replace("missing", definition("Warm", 20.0)).await.unwrap());

        let mapping = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(mapping.strategy().limit, 20.0);

        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_after_delete_does_not_recreate() {
        let store = store();
        let id = store.insert(definition("Hot", 30.0)).await.unwrap();
        assert!(store.delete(&id).await.unwrap());

        assert!(!store.replace(&id, definition("Warm", 20.0)).await.unwrap());
        assert!(store.find_by_id(&id).await.unwrap().is_none());
        assert!(store.find_all().await.unwrap().is_empty());
    }
}
