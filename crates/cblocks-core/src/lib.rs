//! Core types and traits for CBlocks.
//!
//! This crate defines the registry model, the resource topic codec, the
//! mapping abstractions and the publish/subscribe seam shared by every
//! other crate in the workspace.

pub mod config;
pub mod error;
pub mod mapping;
pub mod registry;
pub mod resource;
pub mod topic;
pub mod transport;

pub use error::{Error, Result};
pub use mapping::{
    Mapping, MappingDefinition, MappingId, MappingOutputRecord, MappingOutputStore, MappingStore,
    MappingStrategy,
};
pub use registry::RegistryLookup;
pub use resource::{
    CBlock, Instance, InstanceId, ObjectId, Resource, ResourceAddress, ResourceId, Schema,
    SchemaType,
};
pub use transport::{MemoryTransport, Message, MessageHandler, PubSub, SubscriptionId};
