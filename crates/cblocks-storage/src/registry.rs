//! CBlock registry storage using redb.
//!
//! Objects are stored as JSON keyed by object ID. The store is the
//! [`RegistryLookup`] implementation used by the mapping and write use cases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};

use cblocks_core::registry::RegistryLookup;
use cblocks_core::resource::{CBlock, InstanceId, ObjectId, Resource, ResourceId};

use crate::database::{open_database, temp_database};
use crate::Error;

// CBlocks table: key = object_id, value = CBlock (JSON)
const CBLOCKS_TABLE: TableDefinition<u32, &str> = TableDefinition::new("cblocks");

/// CBlock registry store.
pub struct RegistryStore {
    db: Arc<Database>,
}

impl RegistryStore {
    /// Open or create a registry store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::with_database(open_database(path)?)
    }

    /// Create a registry store backed by a temporary file, for testing.
    pub fn memory() -> Result<Self, Error> {
        Self::with_database(temp_database("registry_test")?)
    }

    /// Create a registry store on an already opened database.
    pub fn with_database(db: Arc<Database>) -> Result<Self, Error> {
        let write_txn = db.begin_write()?;
        {
            let _cblocks = write_txn.open_table(CBLOCKS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    /// Insert or replace a CBlock definition.
    pub fn update_object(&self, cblock: &CBlock) -> Result<(), Error> {
        let json = serde_json::to_string(cblock)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CBLOCKS_TABLE)?;
            table.insert(cblock.object_id, json.as_str())?;
        }
        write_txn.commit()?;

        tracing::debug!(object_id = cblock.object_id, "CBlock updated");
        Ok(())
    }

    /// Load a CBlock by ID.
    pub fn load_object(&self, object_id: ObjectId) -> Result<Option<CBlock>, Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CBLOCKS_TABLE)?;

        match table.get(object_id)? {
            Some(value) => Ok(Some(serde_json::from_str(value.value())?)),
            None => Ok(None),
        }
    }

    /// List all CBlocks ordered by object ID.
    pub fn get_objects(&self) -> Result<Vec<CBlock>, Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CBLOCKS_TABLE)?;

        let mut cblocks = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            cblocks.push(serde_json::from_str(value.value())?);
        }
        Ok(cblocks)
    }

    /// Change the label of one object instance.
    pub fn set_label(
        &self,
        object_id: ObjectId,
        instance_id: InstanceId,
        label: &str,
    ) -> Result<CBlock, Error> {
        if label.trim().is_empty() {
            return Err(Error::InvalidInput("Instance label is required".to_string()));
        }

        let write_txn = self.db.begin_write()?;
        let cblock = {
            let mut table = write_txn.open_table(CBLOCKS_TABLE)?;
            let json = match table.get(object_id)? {
                Some(value) => value.value().to_string(),
                None => return Err(Error::NotFound(format!("CBlock {}", object_id))),
            };

            let mut cblock: CBlock = serde_json::from_str(&json)?;
            let instance = cblock.instances.get_mut(&instance_id).ok_or_else(|| {
                Error::NotFound(format!("Instance {}/{}", object_id, instance_id))
            })?;
            instance.label = label.to_string();

            let json = serde_json::to_string(&cblock)?;
            table.insert(object_id, json.as_str())?;
            cblock
        };
        write_txn.commit()?;

        tracing::info!(object_id, instance_id, label, "Instance label changed");
        Ok(cblock)
    }
}

#[async_trait]
impl RegistryLookup for RegistryStore {
    async fn get_object(&self, object_id: ObjectId) -> cblocks_core::Result<CBlock> {
        self.load_object(object_id)?
            .ok_or_else(|| cblocks_core::Error::NotFound(format!("CBlock {}", object_id)))
    }

    async fn get_resource(
        &self,
        object_id: ObjectId,
        instance_id: InstanceId,
        resource_id: ResourceId,
    ) -> cblocks_core::Result<Resource> {
        let cblock = self.get_object(object_id).await?;
        if !cblock.instances.contains_key(&instance_id) {
            return Err(cblocks_core::Error::NotFound(format!(
                "Instance {}/{}",
                object_id, instance_id
            )));
        }
        cblock.resource(instance_id, resource_id).cloned().ok_or_else(|| {
            cblocks_core::Error::NotFound(format!(
                "Resource {}/{}/{}",
                object_id, instance_id, resource_id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cblocks_core::resource::{Instance, Schema};
    use std::collections::BTreeMap;

    fn temperature_sensor() -> CBlock {
        let resource = Resource {
            resource_id: 0,
            name: "Current Temperature".to_string(),
            is_writeable: false,
            unit: "°C".to_string(),
            schema: Schema::number(0.0, 100.0),
        };
        CBlock {
            object_id: 3303,
            name: "Temperature Sensor".to_string(),
            resources: BTreeMap::from([(0, resource)]),
            instances: BTreeMap::from([(
                0,
                Instance {
                    label: "Kitchen".to_string(),
                },
            )]),
        }
    }

    #[tokio::test]
    async fn test_update_and_lookup() {
        let store = RegistryStore::memory().unwrap();
        store.update_object(&temperature_sensor()).unwrap();

        let cblock = store.get_object(3303).await.unwrap();
        assert_eq!(cblock.name, "Temperature Sensor");

        let resource = store.get_resource(3303, 0, 0).await.unwrap();
        assert!(resource.is_numeric());
        assert_eq!(store.get_objects().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_not_found() {
        let store = RegistryStore::memory().unwrap();
        store.update_object(&temperature_sensor()).unwrap();

        for (o, i, r) in [(1, 0, 0), (3303, 9, 0), (3303, 0, 9)] {
            let err = store.get_resource(o, i, r).await.unwrap_err();
            assert!(matches!(err, cblocks_core::Error::NotFound(_)));
        }
    }

    #[test]
    fn test_set_label() {
        let store = RegistryStore::memory().unwrap();
        store.update_object(&temperature_sensor()).unwrap();

        let cblock = store.set_label(3303, 0, "Living room").unwrap();
        assert_eq!(cblock.instances[&0].label, "Living room");

        let stored = store.load_object(3303).unwrap().unwrap();
        assert_eq!(stored.instances[&0].label, "Living room");

        assert!(matches!(
            store.set_label(3303, 5, "Attic"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.set_label(3303, 0, ""),
            Err(Error::InvalidInput(_))
        ));
    }
}
