//! Registry lookup interface.
//!
//! The registry owns object, instance and resource metadata. The rest of the
//! system only ever reads from it through this trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::resource::{CBlock, InstanceId, ObjectId, Resource, ResourceAddress, ResourceId};

/// Read access to CBlock metadata.
#[async_trait]
pub trait RegistryLookup: Send + Sync {
    /// Get an object by ID.
    ///
    /// Fails with `NotFound` if the object does not exist.
    async fn get_object(&self, object_id: ObjectId) -> Result<CBlock>;

    /// Get a resource of an object instance.
    ///
    /// Fails with `NotFound` if the object, the instance or the resource does
    /// not exist.
    async fn get_resource(
        &self,
        object_id: ObjectId,
        instance_id: InstanceId,
        resource_id: ResourceId,
    ) -> Result<Resource>;

    /// Resolve the resource behind an address.
    async fn resolve(&self, address: &ResourceAddress) -> Result<Resource> {
        self.get_resource(address.object_id, address.instance_id, address.resource_id)
            .await
    }
}
