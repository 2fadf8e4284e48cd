//! Component wiring.

use std::sync::Arc;

use anyhow::Result;
use redb::Database;

use cblocks_commands::{MqttTransport, ResourceWriteProtocol, ResourceWriteUseCase};
use cblocks_core::mapping::MappingStrategy;
use cblocks_core::registry::RegistryLookup;
use cblocks_mappings::{
    ActionBridge, CategoryMapping, CategoryMappingsUseCase, MappingsUseCase, RangeMapping,
    RangeMappingsUseCase,
};
use cblocks_storage::{open_database, RedbMappingOutputStore, RedbMappingStore, RegistryStore};

use crate::config::{CBlocksConfig, StorageConfig};

/// Registry and both mapping families over the on-disk stores.
pub struct Stores {
    pub registry: Arc<RegistryStore>,
    pub range: Arc<RangeMappingsUseCase>,
    pub category: Arc<CategoryMappingsUseCase>,
}

impl Stores {
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let registry = Arc::new(RegistryStore::open(config.registry_path())?);
        let db = open_database(config.mappings_path())?;
        let outputs = Arc::new(RedbMappingOutputStore::new(db.clone())?);

        Ok(Self {
            range: mappings_use_case::<RangeMapping>(&db, outputs.clone(), registry.clone())?,
            category: mappings_use_case::<CategoryMapping>(&db, outputs, registry.clone())?,
            registry,
        })
    }

    pub fn range_actions(&self) -> ActionBridge<RangeMapping> {
        ActionBridge::new(self.range.clone())
    }

    pub fn category_actions(&self) -> ActionBridge<CategoryMapping> {
        ActionBridge::new(self.category.clone())
    }
}

fn mappings_use_case<S: MappingStrategy>(
    db: &Arc<Database>,
    outputs: Arc<RedbMappingOutputStore>,
    registry: Arc<RegistryStore>,
) -> Result<Arc<MappingsUseCase<S>>> {
    let mappings = Arc::new(RedbMappingStore::<S>::new(db.clone())?);
    let registry: Arc<dyn RegistryLookup> = registry;
    Ok(Arc::new(MappingsUseCase::new(mappings, outputs, registry)))
}

/// Write path over a live broker connection.
pub struct Writer {
    transport: Arc<MqttTransport>,
    writes: ResourceWriteUseCase,
}

impl Writer {
    /// Connect to the broker. Must be called from within a tokio runtime.
    pub fn connect(config: &CBlocksConfig, registry: Arc<RegistryStore>) -> Self {
        let transport = Arc::new(MqttTransport::connect(&config.mqtt));
        let protocol = Arc::new(ResourceWriteProtocol::new(
            transport.clone(),
            config.write.timeout(),
        ));
        Self {
            transport,
            writes: ResourceWriteUseCase::new(registry, protocol),
        }
    }

    pub fn client_id(&self) -> &str {
        self.transport.client_id()
    }

    pub fn writes(&self) -> &ResourceWriteUseCase {
        &self.writes
    }
}
