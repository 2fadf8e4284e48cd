//! Action bridge for external automation triggers.
//!
//! An automation service posts `{"actionFields": {"mapping_id": ..., "to": ...}}`.
//! The bridge applies the referenced mapping to `to` and answers with a fresh
//! action instance ID. It never writes to a device itself.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use cblocks_core::error::{Error, Result};
use cblocks_core::mapping::MappingStrategy;

use crate::use_case::MappingsUseCase;

/// Status code for every bridge failure.
pub const ACTION_ERROR_STATUS: u16 = 400;

/// Fields of an automation trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFields {
    pub mapping_id: String,
    pub to: Value,
}

/// Automation trigger payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(rename = "actionFields")]
    pub action_fields: ActionFields,
}

/// Created action instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInstance {
    pub id: String,
}

/// Answer to a successful trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub data: Vec<ActionInstance>,
}

/// Bridge from automation triggers to one mapping family.
pub struct ActionBridge<S: MappingStrategy> {
    mappings: Arc<MappingsUseCase<S>>,
}

impl<S: MappingStrategy> ActionBridge<S> {
    pub fn new(mappings: Arc<MappingsUseCase<S>>) -> Self {
        Self { mappings }
    }

    /// Apply `mapping_id` to `target` and return a new action instance ID.
    pub async fn post_action(&self, mapping_id: &str, target: Value) -> Result<ActionResponse> {
        let result = self.mappings.apply_by_id(mapping_id, target, None).await;
        if let Err(e) = &result {
            warn!(kind = S::KIND, mapping_id, error = %e, "Action failed");
        }
        result?;

        Ok(ActionResponse {
            data: vec![ActionInstance {
                id: uuid::Uuid::new_v4().to_string(),
            }],
        })
    }

    /// Handle a parsed trigger payload.
    pub async fn handle(&self, request: ActionRequest) -> Result<ActionResponse> {
        let ActionFields { mapping_id, to } = request.action_fields;
        self.post_action(&mapping_id, to).await
    }

    /// Handle a raw JSON trigger payload.
    pub async fn handle_json(&self, payload: Value) -> Result<ActionResponse> {
        let request: ActionRequest = serde_json::from_value(payload)
            .map_err(|e| Error::Validation(format!("Invalid action payload: {}", e)))?;
        self.handle(request).await
    }
}
