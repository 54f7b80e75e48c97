//! Layer specifications
//!
//! A `LayerSpec` is an immutable description of one layer. The parameter
//! count and the ordered sub-tensor layout are pure functions of the spec,
//! so the position of every value in a flat parameter buffer can be derived
//! without instantiating anything.

use serde::{Deserialize, Serialize};

use super::training::TrainingConfig;
use crate::params::WeightInit;

/// Activation applied to a layer's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Identity,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl Activation {
    /// Apply the activation to a whole output vector
    pub fn apply(&self, values: &mut [f32]) {
        match self {
            Activation::Identity => {}
            Activation::Relu => values.iter_mut().for_each(|v| *v = v.max(0.0)),
            Activation::Sigmoid => values.iter_mut().for_each(|v| *v = 1.0 / (1.0 + (-*v).exp())),
            Activation::Tanh => values.iter_mut().for_each(|v| *v = v.tanh()),
            Activation::Softmax => {
                let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let mut sum = 0.0;
                for v in values.iter_mut() {
                    *v = (*v - max).exp();
                    sum += *v;
                }
                if sum > 0.0 {
                    values.iter_mut().for_each(|v| *v /= sum);
                }
            }
        }
    }
}

/// Loss attached to an output layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    Mse,
    McXent,
    NegativeLogLikelihood,
}

/// Layer kind and its kind-specific hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerKind {
    /// Fully connected layer
    Dense,
    /// Fully connected layer with a loss attached
    Output { loss: LossFunction },
    /// Batch normalization (inference statistics included)
    BatchNormalization {
        #[serde(default = "default_bn_eps")]
        eps: f64,
    },
    /// Cross-channel local response normalization
    LocalResponseNormalization { alpha: f64, beta: f64, k: f64, n: usize },
}

fn default_bn_eps() -> f64 {
    1e-5
}

impl LayerKind {
    /// Short type identifier used in logs and summaries
    pub fn type_name(&self) -> &'static str {
        match self {
            LayerKind::Dense => "dense",
            LayerKind::Output { .. } => "output",
            LayerKind::BatchNormalization { .. } => "batch_normalization",
            LayerKind::LocalResponseNormalization { .. } => "local_response_normalization",
        }
    }

    /// Whether the output width always equals the input width
    ///
    /// Width-preserving kinds have no independent input width, so they
    /// cannot be resized or absorb a cascaded width change.
    pub fn is_width_preserving(&self) -> bool {
        matches!(
            self,
            LayerKind::BatchNormalization { .. } | LayerKind::LocalResponseNormalization { .. }
        )
    }
}

/// Role of a sub-tensor inside a layer's parameter slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamRole {
    Weight,
    Bias,
    Gamma,
    Beta,
    RunningMean,
    RunningVar,
}

/// One named sub-tensor of a layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub shape: Vec<usize>,
    pub role: ParamRole,
}

impl ParamSpec {
    fn new(name: &'static str, shape: Vec<usize>, role: ParamRole) -> Self {
        Self { name, shape, role }
    }

    /// Number of elements in this sub-tensor
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Immutable description of one layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Informational name; identity is positional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: LayerKind,
    /// Input width; 0 on an appended layer means "infer from predecessor"
    #[serde(default)]
    pub width_in: usize,
    pub width_out: usize,
    #[serde(default = "default_has_bias")]
    pub has_bias: bool,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default)]
    pub weight_init: WeightInit,
    #[serde(default, skip_serializing_if = "TrainingConfig::is_empty")]
    pub training: TrainingConfig,
    /// Set by surgery only
    #[serde(default)]
    pub frozen: bool,
}

fn default_has_bias() -> bool {
    true
}

impl LayerSpec {
    fn with_kind(kind: LayerKind, width_in: usize, width_out: usize) -> Self {
        Self {
            name: None,
            kind,
            width_in,
            width_out,
            has_bias: true,
            activation: Activation::default(),
            weight_init: WeightInit::default(),
            training: TrainingConfig::default(),
            frozen: false,
        }
    }

    /// Fully connected layer
    pub fn dense(width_in: usize, width_out: usize) -> Self {
        Self::with_kind(LayerKind::Dense, width_in, width_out)
    }

    /// Output layer with a loss
    pub fn output(width_in: usize, width_out: usize, loss: LossFunction) -> Self {
        Self::with_kind(LayerKind::Output { loss }, width_in, width_out)
    }

    /// Batch normalization over `width` features
    pub fn batch_norm(width: usize) -> Self {
        let mut spec = Self::with_kind(LayerKind::BatchNormalization { eps: default_bn_eps() }, width, width);
        spec.has_bias = false;
        spec
    }

    /// Local response normalization over `width` channels
    pub fn local_response_norm(width: usize, alpha: f64, beta: f64, k: f64, n: usize) -> Self {
        let mut spec = Self::with_kind(
            LayerKind::LocalResponseNormalization { alpha, beta, k, n },
            width,
            width,
        );
        spec.has_bias = false;
        spec
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_weight_init(mut self, weight_init: WeightInit) -> Self {
        self.weight_init = weight_init;
        self
    }

    pub fn with_bias(mut self, has_bias: bool) -> Self {
        self.has_bias = has_bias;
        self
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    /// Display label: the name if set, else the type name
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.kind.type_name())
    }

    /// Ordered sub-tensors of this layer's parameter slice
    pub fn param_layout(&self) -> Vec<ParamSpec> {
        match self.kind {
            LayerKind::Dense | LayerKind::Output { .. } => {
                let mut params = vec![ParamSpec::new(
                    "W",
                    vec![self.width_in, self.width_out],
                    ParamRole::Weight,
                )];
                if self.has_bias {
                    params.push(ParamSpec::new("b", vec![self.width_out], ParamRole::Bias));
                }
                params
            }
            LayerKind::BatchNormalization { .. } => {
                let n = self.width_out;
                vec![
                    ParamSpec::new("gamma", vec![n], ParamRole::Gamma),
                    ParamSpec::new("beta", vec![n], ParamRole::Beta),
                    ParamSpec::new("mean", vec![n], ParamRole::RunningMean),
                    ParamSpec::new("var", vec![n], ParamRole::RunningVar),
                ]
            }
            LayerKind::LocalResponseNormalization { .. } => Vec::new(),
        }
    }

    /// Number of parameters this layer occupies in a flat buffer
    pub fn param_count(&self) -> usize {
        self.param_layout().iter().map(ParamSpec::numel).sum()
    }

    /// Derive a spec with new widths and scheme
    ///
    /// Width-preserving kinds keep `width_in == width_out`.
    pub(crate) fn resized(&self, width_in: Option<usize>, width_out: Option<usize>, weight_init: WeightInit) -> Self {
        let mut spec = self.clone();
        if let Some(w) = width_in {
            spec.width_in = w;
        }
        if let Some(w) = width_out {
            spec.width_out = w;
        }
        if spec.kind.is_width_preserving() {
            spec.width_in = spec.width_out;
        }
        spec.weight_init = weight_init;
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_param_count() {
        assert_eq!(LayerSpec::dense(4, 3).param_count(), 4 * 3 + 3);
        assert_eq!(LayerSpec::dense(4, 3).with_bias(false).param_count(), 12);
    }

    #[test]
    fn test_dense_param_layout_order() {
        let layout = LayerSpec::output(5, 2, LossFunction::McXent).param_layout();
        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].name, "W");
        assert_eq!(layout[0].shape, vec![5, 2]);
        assert_eq!(layout[1].name, "b");
        assert_eq!(layout[1].role, ParamRole::Bias);
    }

    #[test]
    fn test_batch_norm_param_count() {
        let spec = LayerSpec::batch_norm(8);
        assert_eq!(spec.param_count(), 32);
        let names: Vec<_> = spec.param_layout().iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["gamma", "beta", "mean", "var"]);
    }

    #[test]
    fn test_lrn_has_no_params() {
        let spec = LayerSpec::local_response_norm(16, 1e-4, 0.75, 2.0, 5);
        assert_eq!(spec.param_count(), 0);
        assert!(spec.kind.is_width_preserving());
    }

    #[test]
    fn test_resized_width_preserving() {
        let spec = LayerSpec::batch_norm(8).resized(Some(3), Some(16), WeightInit::Zero);
        assert_eq!(spec.width_in, 16);
        assert_eq!(spec.width_out, 16);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let mut values = vec![1.0, 2.0, 3.0];
        Activation::Softmax.apply(&mut values);
        let sum: f32 = values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(values[2] > values[1] && values[1] > values[0]);
    }

    #[test]
    fn test_spec_json_defaults() {
        let spec: LayerSpec = serde_json::from_str(
            r#"{"kind": {"type": "dense"}, "width_in": 3, "width_out": 2}"#,
        )
        .unwrap();
        assert!(spec.has_bias);
        assert!(!spec.frozen);
        assert_eq!(spec.weight_init, WeightInit::Xavier);
        assert_eq!(spec, LayerSpec::dense(3, 2));
    }
}
