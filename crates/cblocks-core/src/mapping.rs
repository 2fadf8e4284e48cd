//! Mapping definitions, output history and their store interfaces.
//!
//! A mapping transforms the raw value of one resource into a derived value.
//! The transformation itself is a [`MappingStrategy`]; everything stored
//! around it (identifier, label, target address) is generic over the
//! strategy so that every mapping family shares one definition type, one
//! store contract and one use case.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DEFAULT_RECORD_LIMIT;
use crate::error::{Error, Result};
use crate::resource::{Resource, ResourceAddress};

/// Opaque mapping identifier assigned by the store.
pub type MappingId = String;

/// Value transform applied by a mapping.
pub trait MappingStrategy:
    Clone + std::fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Family name, e.g. `"range"`.
    const KIND: &'static str;

    /// Derive the output value for a raw resource value.
    fn apply(&self, value: &Value) -> Result<Value>;

    /// Whether this transform can be attached to `resource`.
    fn is_applicable_for(&self, resource: &Resource) -> bool;

    /// Check the strategy parameters themselves.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Mapping payload as supplied by a client on create or replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDefinition<S> {
    pub label: String,
    #[serde(flatten)]
    pub address: ResourceAddress,
    #[serde(flatten)]
    pub strategy: S,
}

impl<S: MappingStrategy> MappingDefinition<S> {
    pub fn new(label: impl Into<String>, address: ResourceAddress, strategy: S) -> Self {
        Self {
            label: label.into(),
            address,
            strategy,
        }
    }

    /// Parse and validate a JSON payload.
    ///
    /// Missing or mistyped fields fail with `Validation`.
    pub fn from_json(payload: Value) -> Result<Self> {
        let definition: Self = serde_json::from_value(payload)
            .map_err(|e| Error::Validation(format!("Invalid {} mapping: {}", S::KIND, e)))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Check required fields and strategy parameters.
    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(Error::Validation("Mapping label is required".to_string()));
        }
        self.strategy.validate()
    }
}

/// A stored mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping<S> {
    #[serde(rename = "mappingID")]
    pub mapping_id: MappingId,
    #[serde(flatten)]
    pub definition: MappingDefinition<S>,
}

impl<S: MappingStrategy> Mapping<S> {
    pub fn new(mapping_id: impl Into<MappingId>, definition: MappingDefinition<S>) -> Self {
        Self {
            mapping_id: mapping_id.into(),
            definition,
        }
    }

    pub fn label(&self) -> &str {
        &self.definition.label
    }

    pub fn address(&self) -> &ResourceAddress {
        &self.definition.address
    }

    pub fn strategy(&self) -> &S {
        &self.definition.strategy
    }

    /// Run the strategy on a raw value.
    pub fn apply(&self, value: &Value) -> Result<Value> {
        self.definition.strategy.apply(value)
    }
}

/// Immutable history entry written each time a mapping is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingOutputRecord {
    pub id: String,
    #[serde(rename = "mappingID")]
    pub mapping_id: MappingId,
    pub from: Value,
    pub to: Value,
    /// Event time supplied by the caller.
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Persistence of mapping definitions for one strategy family.
#[async_trait]
pub trait MappingStore<S: MappingStrategy>: Send + Sync {
    /// Persist a new definition and return its assigned ID.
    async fn insert(&self, definition: MappingDefinition<S>) -> Result<MappingId>;

    async fn find_by_id(&self, mapping_id: &str) -> Result<Option<Mapping<S>>>;

    async fn find_all(&self) -> Result<Vec<Mapping<S>>>;

    /// Replace a definition in full. Returns `false` if the ID is unknown.
    async fn replace(&self, mapping_id: &str, definition: MappingDefinition<S>) -> Result<bool>;

    /// Remove a definition. Returns `false` if the ID is unknown.
    async fn delete(&self, mapping_id: &str) -> Result<bool>;
}

/// Append-only mapping output history.
///
/// Reads are sorted by `timestamp` descending. A limit of `Some(0)` yields
/// an empty result and `None` defaults to [`DEFAULT_RECORD_LIMIT`].
#[async_trait]
pub trait MappingOutputStore: Send + Sync {
    async fn record(
        &self,
        mapping_id: &str,
        from: Value,
        to: Value,
        timestamp: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<MappingOutputRecord>;

    async fn get_records(
        &self,
        mapping_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<MappingOutputRecord>>;

    async fn get_records_by_to(
        &self,
        mapping_id: &str,
        to: &Value,
        limit: Option<usize>,
    ) -> Result<Vec<MappingOutputRecord>>;
}

/// Resolve an optional record limit.
pub fn record_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_RECORD_LIMIT)
}
