//! Persistent storage for CBlocks.
//!
//! All stores are backed by redb:
//! - `registry`: CBlock metadata, the registry lookup service
//! - `mappings`: mapping definitions, one table per strategy family
//! - `outputs`: append-only mapping output history

pub mod database;
pub mod error;
pub mod mappings;
pub mod outputs;
pub mod registry;

pub use database::{open_database, temp_database};
pub use error::{Error, Result};
pub use mappings::RedbMappingStore;
pub use outputs::RedbMappingOutputStore;
pub use registry::RegistryStore;
