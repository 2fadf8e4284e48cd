//! Mapping use case.
//!
//! One instance is wired per strategy family. It owns the CRUD rules for
//! mapping definitions and applies mappings, recording every result to the
//! output history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use cblocks_core::error::{Error, Result};
use cblocks_core::mapping::{
    Mapping, MappingDefinition, MappingOutputRecord, MappingOutputStore, MappingStore,
    MappingStrategy,
};
use cblocks_core::registry::RegistryLookup;

/// CRUD and apply operations for one mapping family.
pub struct MappingsUseCase<S: MappingStrategy> {
    mappings: Arc<dyn MappingStore<S>>,
    outputs: Arc<dyn MappingOutputStore>,
    registry: Arc<dyn RegistryLookup>,
}

impl<S: MappingStrategy> MappingsUseCase<S> {
    pub fn new(
        mappings: Arc<dyn MappingStore<S>>,
        outputs: Arc<dyn MappingOutputStore>,
        registry: Arc<dyn RegistryLookup>,
    ) -> Self {
        Self {
            mappings,
            outputs,
            registry,
        }
    }

    /// Mapping family handled by this instance.
    pub fn kind(&self) -> &'static str {
        S::KIND
    }

    pub async fn get_mappings(&self) -> Result<Vec<Mapping<S>>> {
        self.mappings.find_all().await
    }

    pub async fn get_mapping(&self, mapping_id: &str) -> Result<Mapping<S>> {
        self.mappings
            .find_by_id(mapping_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} mapping {}", S::KIND, mapping_id)))
    }

    /// Validate a definition against the registry and persist it under a
    /// fresh ID.
    pub async fn create_mapping(&self, definition: MappingDefinition<S>) -> Result<Mapping<S>> {
        definition.validate()?;
        self.check_applicable(&definition).await?;

        let mapping_id = self.mappings.insert(definition.clone()).await?;
        info!(
            kind = S::KIND,
            mapping_id = %mapping_id,
            resource = %definition.address,
            "Mapping created"
        );
        Ok(Mapping::new(mapping_id, definition))
    }

    /// Parse a JSON payload and create the mapping.
    pub async fn create_mapping_json(&self, payload: Value) -> Result<Mapping<S>> {
        self.create_mapping(MappingDefinition::from_json(payload)?)
            .await
    }

    /// Replace an existing mapping in full.
    pub async fn put_mapping(
        &self,
        mapping_id: &str,
        definition: MappingDefinition<S>,
    ) -> Result<Mapping<S>> {
        definition.validate()?;
        self.check_applicable(&definition).await?;

        if !self.mappings.replace(mapping_id, definition.clone()).await? {
            return Err(Error::NotFound(format!(
                "{} mapping {}",
                S::KIND,
                mapping_id
            )));
        }

        info!(kind = S::KIND, mapping_id, "Mapping replaced");
        Ok(Mapping::new(mapping_id, definition))
    }

    /// Parse a JSON payload and replace the mapping.
    pub async fn put_mapping_json(&self, mapping_id: &str, payload: Value) -> Result<Mapping<S>> {
        self.put_mapping(mapping_id, MappingDefinition::from_json(payload)?)
            .await
    }

    /// Remove a mapping definition. Its output history is kept.
    pub async fn delete_mapping(&self, mapping_id: &str) -> Result<()> {
        if !self.mappings.delete(mapping_id).await? {
            return Err(Error::NotFound(format!(
                "{} mapping {}",
                S::KIND,
                mapping_id
            )));
        }

        info!(kind = S::KIND, mapping_id, "Mapping deleted");
        Ok(())
    }

    /// Apply a mapping and record the result.
    ///
    /// `timestamp` is the event time of `raw`; it defaults to now.
    pub async fn apply(
        &self,
        mapping: &Mapping<S>,
        raw: Value,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Value> {
        let derived = mapping.apply(&raw)?;

        let now = Utc::now();
        self.outputs
            .record(
                &mapping.mapping_id,
                raw.clone(),
                derived.clone(),
                timestamp.unwrap_or(now),
                now,
            )
            .await?;

        debug!(
            kind = S::KIND,
            mapping_id = %mapping.mapping_id,
            from = %raw,
            to = %derived,
            "Mapping applied"
        );
        Ok(derived)
    }

    /// Resolve a mapping by ID and apply it.
    pub async fn apply_by_id(
        &self,
        mapping_id: &str,
        raw: Value,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Value> {
        let mapping = self.get_mapping(mapping_id).await?;
        self.apply(&mapping, raw, timestamp).await
    }

    /// Output history of a mapping, newest first.
    pub async fn get_records(
        &self,
        mapping_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<MappingOutputRecord>> {
        self.outputs.get_records(mapping_id, limit).await
    }

    /// Output history of a mapping filtered by derived value, newest first.
    pub async fn get_records_by_to(
        &self,
        mapping_id: &str,
        to: &Value,
        limit: Option<usize>,
    ) -> Result<Vec<MappingOutputRecord>> {
        self.outputs.get_records_by_to(mapping_id, to, limit).await
    }

    async fn check_applicable(&self, definition: &MappingDefinition<S>) -> Result<()> {
        let resource = self.registry.resolve(&definition.address).await?;
        if !definition.strategy.is_applicable_for(&resource) {
            return Err(Error::Validation(format!(
                "{} mapping is not applicable to resource {}",
                S::KIND,
                definition.address
            )));
        }
        Ok(())
    }
}
