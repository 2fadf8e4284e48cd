//! Range mapping: normalizes a numeric value from `[min, max]` to `[0, 100]`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cblocks_core::error::{Error, Result};
use cblocks_core::mapping::MappingStrategy;
use cblocks_core::resource::Resource;

/// Lower bound of the normalized output domain.
pub const OUTPUT_MIN: f64 = 0.0;
/// Upper bound of the normalized output domain.
pub const OUTPUT_MAX: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeMapping {
    pub min: f64,
    pub max: f64,
}

impl RangeMapping {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Interpolate `value` into the output domain, clamping at both ends.
    pub fn normalize(&self, value: f64) -> f64 {
        let ratio = (value - self.min) / (self.max - self.min);
        (ratio * OUTPUT_MAX).clamp(OUTPUT_MIN, OUTPUT_MAX)
    }
}

impl MappingStrategy for RangeMapping {
    const KIND: &'static str = "range";

    fn apply(&self, value: &Value) -> Result<Value> {
        let raw = value.as_f64().ok_or_else(|| {
            Error::Validation(format!("Range mapping needs a number, got {}", value))
        })?;
        Ok(number_value(self.normalize(raw)))
    }

    fn is_applicable_for(&self, resource: &Resource) -> bool {
        resource.is_numeric()
    }

    fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(Error::Validation(
                "Range bounds must be finite numbers".to_string(),
            ));
        }
        if self.min >= self.max {
            return Err(Error::Validation(format!(
                "Range min ({}) must be less than max ({})",
                self.min, self.max
            )));
        }
        if !(self.max - self.min).is_finite() {
            return Err(Error::Validation(format!(
                "Range span from {} to {} is too large",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

// Whole results are emitted as integers so `to` filters match `50` as well as `50.0`.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}
