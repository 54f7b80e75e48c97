//! Instantiated layers
//!
//! A layer instance is a spec bound to its range in a network's parameter
//! buffer. Instances never own parameter values; the network hands each
//! one its slice at forward time.

use std::fmt::Debug;

use super::spec::{LayerKind, LayerSpec};
use crate::error::{GraftError, Result};
use crate::params::ParamRange;

/// Base trait for all instantiated layers
pub trait Layer: Debug + Send + Sync {
    /// The spec this layer was built from
    fn spec(&self) -> &LayerSpec;

    /// Range of this layer's values in the network buffer
    fn param_range(&self) -> ParamRange;

    /// Whether gradient updates may touch this layer's parameters
    fn is_trainable(&self) -> bool {
        true
    }

    /// Inference pass over one example
    ///
    /// `params` is this layer's slice of the network buffer.
    fn forward(&self, params: &[f32], input: &[f32]) -> Result<Vec<f32>>;
}

/// Build the concrete layer for a spec
pub fn instantiate(spec: &LayerSpec, range: ParamRange) -> Box<dyn Layer> {
    match spec.kind {
        LayerKind::Dense | LayerKind::Output { .. } => Box::new(DenseLayer {
            spec: spec.clone(),
            range,
        }),
        LayerKind::BatchNormalization { .. } => Box::new(BatchNormLayer {
            spec: spec.clone(),
            range,
        }),
        LayerKind::LocalResponseNormalization { .. } => Box::new(LrnLayer {
            spec: spec.clone(),
            range,
        }),
    }
}

fn check_shapes(spec: &LayerSpec, params: &[f32], input: &[f32]) -> Result<()> {
    let label = spec.label();
    if params.len() != spec.param_count() {
        return Err(GraftError::ShapeMismatch {
            location: format!("parameter count of {}", label),
            expected: spec.param_count(),
            actual: params.len(),
        });
    }
    if input.len() != spec.width_in {
        return Err(GraftError::ShapeMismatch {
            location: format!("input width of {}", label),
            expected: spec.width_in,
            actual: input.len(),
        });
    }
    Ok(())
}

/// Fully connected layer: `act(x W + b)`
#[derive(Debug, Clone)]
pub struct DenseLayer {
    spec: LayerSpec,
    range: ParamRange,
}

impl Layer for DenseLayer {
    fn spec(&self) -> &LayerSpec {
        &self.spec
    }

    fn param_range(&self) -> ParamRange {
        self.range
    }

    fn forward(&self, params: &[f32], input: &[f32]) -> Result<Vec<f32>> {
        check_shapes(&self.spec, params, input)?;
        let (n_in, n_out) = (self.spec.width_in, self.spec.width_out);
        let (weights, bias) = params.split_at(n_in * n_out);

        let mut output = if self.spec.has_bias {
            bias.to_vec()
        } else {
            vec![0.0; n_out]
        };
        for (i, &x) in input.iter().enumerate() {
            let row = &weights[i * n_out..(i + 1) * n_out];
            for (out, &w) in output.iter_mut().zip(row) {
                *out += x * w;
            }
        }
        self.spec.activation.apply(&mut output);
        Ok(output)
    }
}

/// Batch normalization using stored running statistics
#[derive(Debug, Clone)]
pub struct BatchNormLayer {
    spec: LayerSpec,
    range: ParamRange,
}

impl Layer for BatchNormLayer {
    fn spec(&self) -> &LayerSpec {
        &self.spec
    }

    fn param_range(&self) -> ParamRange {
        self.range
    }

    fn forward(&self, params: &[f32], input: &[f32]) -> Result<Vec<f32>> {
        check_shapes(&self.spec, params, input)?;
        let eps = match self.spec.kind {
            LayerKind::BatchNormalization { eps } => eps as f32,
            _ => 0.0,
        };
        let n = self.spec.width_out;
        let (gamma, rest) = params.split_at(n);
        let (beta, rest) = rest.split_at(n);
        let (mean, var) = rest.split_at(n);

        let mut output: Vec<f32> = (0..n)
            .map(|i| gamma[i] * (input[i] - mean[i]) / (var[i] + eps).sqrt() + beta[i])
            .collect();
        self.spec.activation.apply(&mut output);
        Ok(output)
    }
}

/// Cross-channel local response normalization
#[derive(Debug, Clone)]
pub struct LrnLayer {
    spec: LayerSpec,
    range: ParamRange,
}

impl Layer for LrnLayer {
    fn spec(&self) -> &LayerSpec {
        &self.spec
    }

    fn param_range(&self) -> ParamRange {
        self.range
    }

    fn forward(&self, params: &[f32], input: &[f32]) -> Result<Vec<f32>> {
        check_shapes(&self.spec, params, input)?;
        let (alpha, beta, k, n) = match self.spec.kind {
            LayerKind::LocalResponseNormalization { alpha, beta, k, n } => (alpha, beta, k, n),
            _ => (0.0, 0.0, 1.0, 1),
        };
        let half = n / 2;
        let channels = input.len();

        let output = (0..channels)
            .map(|i| {
                let lo = i.saturating_sub(half);
                let hi = (i + half).min(channels.saturating_sub(1));
                let sum_sq: f64 = input[lo..=hi].iter().map(|&x| (x as f64) * (x as f64)).sum();
                (input[i] as f64 / (k + alpha * sum_sq).powf(beta)) as f32
            })
            .collect();
        Ok(output)
    }
}
