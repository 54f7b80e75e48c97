//! Keras LRN layer config
//!
//! Maps a Keras `LRN` layer config dictionary onto a width-preserving
//! `LocalResponseNormalization` spec.

use log::debug;
use serde_json::{Map, Value};

use crate::error::{GraftError, Result};
use crate::layers::{InputType, LayerSpec, TrainingConfig};

/// Parsed Keras LRN hyperparameters
#[derive(Debug, Clone, PartialEq)]
pub struct KerasLrn {
    pub name: Option<String>,
    pub alpha: f64,
    pub beta: f64,
    pub k: i64,
    pub n: i64,
    pub dropout: Option<f64>,
}

impl KerasLrn {
    /// Read an LRN layer config
    ///
    /// Accepts either the full layer dictionary (hyperparameters under
    /// `"config"`) or the inner config map itself.
    ///
    /// # Errors
    /// `InvalidConfiguration` naming the key if a field is missing or has
    /// the wrong numeric type.
    pub fn from_config(layer_config: &Map<String, Value>) -> Result<Self> {
        let inner = match layer_config.get("config") {
            Some(Value::Object(inner)) => inner,
            Some(_) => return Err(invalid("config", "expected an object")),
            None => layer_config,
        };

        let name = inner
            .get("name")
            .or_else(|| layer_config.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let lrn = Self {
            name,
            alpha: float_field(inner, "alpha")?,
            beta: float_field(inner, "beta")?,
            k: int_field(inner, "k")?,
            n: int_field(inner, "n")?,
            dropout: match inner.get("dropout") {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.as_f64().ok_or_else(|| invalid("dropout", "expected a number"))?),
            },
        };

        if lrn.n <= 0 {
            return Err(invalid("n", "window size must be positive"));
        }

        debug!(
            "[IMPORT] LRN {:?}: alpha={} beta={} k={} n={}",
            lrn.name, lrn.alpha, lrn.beta, lrn.k, lrn.n
        );
        Ok(lrn)
    }

    /// Output type for the given inputs; LRN preserves its input type
    ///
    /// # Errors
    /// - `UnsupportedConfiguration` for more than one input
    /// - `InvalidConfiguration` for no input
    pub fn output_type(&self, inputs: &[InputType]) -> Result<InputType> {
        match inputs {
            [single] => Ok(*single),
            [] => Err(invalid("input_type", "LRN layer needs an input type")),
            many => Err(GraftError::UnsupportedConfiguration {
                reason: format!("LRN layer accepts only one input (received {})", many.len()),
            }),
        }
    }

    /// Build the layer spec for an input of the given type
    pub fn to_layer_spec(&self, input: &InputType) -> Result<LayerSpec> {
        let width = input.feature_width();
        if width == 0 {
            return Err(invalid("input_type", "input has zero features"));
        }
        // n is positive after from_config
        let mut spec = LayerSpec::local_response_norm(width, self.alpha, self.beta, self.k as f64, self.n as usize);
        if let Some(name) = &self.name {
            spec = spec.named(name.clone());
        }
        if let Some(dropout) = self.dropout {
            spec = spec.with_training(TrainingConfig::new().with_dropout(dropout));
        }
        Ok(spec)
    }
}

fn invalid(key: &str, reason: &str) -> GraftError {
    GraftError::InvalidConfiguration {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn float_field(config: &Map<String, Value>, key: &str) -> Result<f64> {
    match config.get(key) {
        Some(Value::Number(number)) if number.is_f64() => number
            .as_f64()
            .ok_or_else(|| invalid(key, "expected a floating point number")),
        Some(_) => Err(invalid(key, "expected a floating point number")),
        None => Err(invalid(key, "missing from LRN config")),
    }
}

fn int_field(config: &Map<String, Value>, key: &str) -> Result<i64> {
    match config.get(key).map(Value::as_i64) {
        Some(Some(value)) => Ok(value),
        Some(None) => Err(invalid(key, "expected an integer")),
        None => Err(invalid(key, "missing from LRN config")),
    }
}
