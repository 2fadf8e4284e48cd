//! CBlock registry data model.
//!
//! A CBlock (object) exposes typed resources across numbered instances.
//! Every resource slot is identified by a [`ResourceAddress`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Object (CBlock) identifier.
pub type ObjectId = u32;

/// Instance identifier within an object.
pub type InstanceId = u32;

/// Resource identifier within an object.
pub type ResourceId = u32;

/// Identity of one addressable value slot on one object instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceAddress {
    #[serde(rename = "objectID")]
    pub object_id: ObjectId,
    #[serde(rename = "instanceID")]
    pub instance_id: InstanceId,
    #[serde(rename = "resourceID")]
    pub resource_id: ResourceId,
}

impl ResourceAddress {
    pub fn new(object_id: ObjectId, instance_id: InstanceId, resource_id: ResourceId) -> Self {
        Self {
            object_id,
            instance_id,
            resource_id,
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.object_id, self.instance_id, self.resource_id
        )
    }
}

/// Value type declared by a resource schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Number,
    Integer,
    String,
    Boolean,
    Object,
    Array,
}

/// JSON-schema subset describing the values a resource accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<Vec<Value>>,
    /// Per-field schemas for object values (e.g. an RGB triple).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(
        default,
        rename = "additionalProperties",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<bool>,
}

impl Schema {
    /// Create a schema of the given type with no further constraints.
    pub fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            minimum: None,
            maximum: None,
            enumeration: None,
            properties: BTreeMap::new(),
            additional_properties: None,
        }
    }

    /// Numeric schema bounded by `[minimum, maximum]`.
    pub fn number(minimum: f64, maximum: f64) -> Self {
        Self {
            minimum: Some(minimum),
            maximum: Some(maximum),
            ..Self::of(SchemaType::Number)
        }
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enumeration = Some(values);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Whether the schema describes a numeric value.
    pub fn is_numeric(&self) -> bool {
        matches!(self.schema_type, SchemaType::Number | SchemaType::Integer)
    }

    /// Check a value against this schema.
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        self.validate_at("value", value)
    }

    fn validate_at(&self, path: &str, value: &Value) -> std::result::Result<(), String> {
        match self.schema_type {
            SchemaType::Number => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| format!("{} must be a number", path))?;
                self.check_bounds(path, n)?;
            }
            SchemaType::Integer => {
                let is_integer = value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0);
                if !is_integer {
                    return Err(format!("{} must be an integer", path));
                }
                if let Some(n) = value.as_f64() {
                    self.check_bounds(path, n)?;
                }
            }
            SchemaType::String => {
                if !value.is_string() {
                    return Err(format!("{} must be a string", path));
                }
            }
            SchemaType::Boolean => {
                if !value.is_boolean() {
                    return Err(format!("{} must be a boolean", path));
                }
            }
            SchemaType::Array => {
                if !value.is_array() {
                    return Err(format!("{} must be an array", path));
                }
            }
            SchemaType::Object => {
                let object = value
                    .as_object()
                    .ok_or_else(|| format!("{} must be an object", path))?;
                for (name, schema) in &self.properties {
                    let field = object
                        .get(name)
                        .ok_or_else(|| format!("{}.{} is missing", path, name))?;
                    schema.validate_at(&format!("{}.{}", path, name), field)?;
                }
                if self.additional_properties == Some(false) && !self.properties.is_empty() {
                    if let Some(extra) = object.keys().find(|k| !self.properties.contains_key(*k)) {
                        return Err(format!("{}.{} is not allowed", path, extra));
                    }
                }
            }
        }

        if let Some(allowed) = &self.enumeration {
            if !allowed.contains(value) {
                return Err(format!("{} is not one of the allowed values", path));
            }
        }

        Ok(())
    }

    fn check_bounds(&self, path: &str, n: f64) -> std::result::Result<(), String> {
        if let Some(min) = self.minimum {
            if n < min {
                return Err(format!("{} must be >= {}", path, min));
            }
        }
        if let Some(max) = self.maximum {
            if n > max {
                return Err(format!("{} must be <= {}", path, max));
            }
        }
        Ok(())
    }
}

/// One typed value slot of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "resourceID")]
    pub resource_id: ResourceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_writeable: bool,
    #[serde(default)]
    pub unit: String,
    pub schema: Schema,
}

impl Resource {
    pub fn is_numeric(&self) -> bool {
        self.schema.is_numeric()
    }
}

/// A numbered sub-unit of an object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub label: String,
}

/// A managed device or virtual entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CBlock {
    #[serde(rename = "objectID")]
    pub object_id: ObjectId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resources: BTreeMap<ResourceId, Resource>,
    #[serde(default)]
    pub instances: BTreeMap<InstanceId, Instance>,
}

impl CBlock {
    /// Resolve a resource on one of this object's instances.
    pub fn resource(&self, instance_id: InstanceId, resource_id: ResourceId) -> Option<&Resource> {
        if !self.instances.contains_key(&instance_id) {
            return None;
        }
        self.resources.get(&resource_id)
    }
}
