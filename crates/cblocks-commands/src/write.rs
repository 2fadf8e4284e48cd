//! Resource write use case.
//!
//! Re-validates writeability and the value schema against the registry
//! before anything is published.

use std::sync::Arc;

use serde_json::Value;

use cblocks_core::error::{Error, Result};
use cblocks_core::registry::RegistryLookup;
use cblocks_core::resource::{InstanceId, ObjectId, ResourceAddress, ResourceId};

use crate::protocol::ResourceWriteProtocol;

pub struct ResourceWriteUseCase {
    registry: Arc<dyn RegistryLookup>,
    protocol: Arc<ResourceWriteProtocol>,
}

impl ResourceWriteUseCase {
    pub fn new(registry: Arc<dyn RegistryLookup>, protocol: Arc<ResourceWriteProtocol>) -> Self {
        Self { registry, protocol }
    }

    /// Write `value` to a resource on behalf of `client_id`.
    ///
    /// Fails with `NotFound` for an unknown resource and with `Validation`
    /// if it is read-only or `value` violates its schema.
    pub async fn write(
        &self,
        client_id: &str,
        object_id: ObjectId,
        instance_id: InstanceId,
        resource_id: ResourceId,
        value: Value,
    ) -> Result<Value> {
        let address = ResourceAddress::new(object_id, instance_id, resource_id);
        let resource = self.registry.resolve(&address).await?;

        if !resource.is_writeable {
            return Err(Error::Validation(format!(
                "Resource {} is not writeable",
                address
            )));
        }
        resource.schema.validate(&value).map_err(|reason| {
            Error::Validation(format!("Invalid value for resource {}: {}", address, reason))
        })?;

        self.protocol.write(client_id, address, &value).await
    }
}
