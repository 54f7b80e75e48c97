//! Weight initialization
//!
//! Fresh parameter slices for appended and resized layers. Output is a pure
//! function of `(scheme, shape, rng state)`; callers always supply the
//! randomness (a seed or a generator handle) so surgery runs reproduce.
//!
//! Schemes follow the usual definitions:
//! - Xavier/Glorot (Glorot & Bengio, 2010)
//! - Kaiming/He (He et al., 2015), exposed as `relu`

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{GraftError, Result};
use crate::layers::ParamRole;

/// Weight initialization scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum WeightInit {
    Zero,
    Ones,
    /// N(0, sqrt(2 / (fan_in + fan_out)))
    #[default]
    Xavier,
    /// U(-a, a), a = sqrt(6 / (fan_in + fan_out))
    XavierUniform,
    /// N(0, sqrt(2 / fan_in))
    Relu,
    /// U(-a, a), a = sqrt(6 / fan_in)
    ReluUniform,
    /// U(-a, a), a = 1 / sqrt(fan_in)
    Uniform,
    /// N(0, 1 / sqrt(fan_in))
    Normal,
    /// Identity matrix; square 2-D shapes only
    Identity,
}

impl WeightInit {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightInit::Zero => "zero",
            WeightInit::Ones => "ones",
            WeightInit::Xavier => "xavier",
            WeightInit::XavierUniform => "xavier_uniform",
            WeightInit::Relu => "relu",
            WeightInit::ReluUniform => "relu_uniform",
            WeightInit::Uniform => "uniform",
            WeightInit::Normal => "normal",
            WeightInit::Identity => "identity",
        }
    }
}

impl fmt::Display for WeightInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeightInit {
    type Err = GraftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "zero" | "zeros" => Ok(WeightInit::Zero),
            "ones" => Ok(WeightInit::Ones),
            "xavier" | "glorot_normal" => Ok(WeightInit::Xavier),
            "xavier_uniform" | "glorot_uniform" => Ok(WeightInit::XavierUniform),
            "relu" | "he_normal" => Ok(WeightInit::Relu),
            "relu_uniform" | "he_uniform" => Ok(WeightInit::ReluUniform),
            "uniform" => Ok(WeightInit::Uniform),
            "normal" => Ok(WeightInit::Normal),
            "identity" => Ok(WeightInit::Identity),
            _ => Err(GraftError::UnsupportedScheme {
                scheme: s.to_string(),
                reason: "unknown scheme name".to_string(),
            }),
        }
    }
}

impl TryFrom<String> for WeightInit {
    type Error = GraftError;

    fn try_from(name: String) -> Result<Self> {
        name.parse()
    }
}

/// Fan-in and fan-out implied by a tensor shape
fn fans(shape: &[usize]) -> (usize, usize) {
    match shape {
        [] => (1, 1),
        [n] => (*n, *n),
        [fan_in, fan_out] => (*fan_in, *fan_out),
        [fan_in, rest @ ..] => (*fan_in, rest.iter().product()),
    }
}

/// Produce a fresh slice of `shape` using `scheme`
///
/// # Errors
/// `UnsupportedScheme` if the scheme cannot produce this shape.
pub fn initialize<R: Rng + ?Sized>(scheme: WeightInit, shape: &[usize], rng: &mut R) -> Result<Vec<f32>> {
    let numel: usize = shape.iter().product();
    let (fan_in, fan_out) = fans(shape);
    let fan_in = fan_in.max(1) as f32;
    let fan_out = fan_out.max(1) as f32;

    let data = match scheme {
        WeightInit::Zero => vec![0.0; numel],
        WeightInit::Ones => vec![1.0; numel],
        WeightInit::Xavier => normal(numel, (2.0 / (fan_in + fan_out)).sqrt(), rng),
        WeightInit::XavierUniform => uniform(numel, (6.0 / (fan_in + fan_out)).sqrt(), rng),
        WeightInit::Relu => normal(numel, (2.0 / fan_in).sqrt(), rng),
        WeightInit::ReluUniform => uniform(numel, (6.0 / fan_in).sqrt(), rng),
        WeightInit::Uniform => uniform(numel, 1.0 / fan_in.sqrt(), rng),
        WeightInit::Normal => normal(numel, 1.0 / fan_in.sqrt(), rng),
        WeightInit::Identity => identity(shape)?,
    };

    Ok(data)
}

/// Produce a fresh slice from a seed
pub fn initialize_seeded(scheme: WeightInit, shape: &[usize], seed: u64) -> Result<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    initialize(scheme, shape, &mut rng)
}

/// Produce a fresh sub-tensor for a parameter role
///
/// Only weights use the layer's scheme. Bias, beta and running mean start
/// at zero; gamma and running variance start at one.
pub fn initialize_role<R: Rng + ?Sized>(
    role: ParamRole,
    scheme: WeightInit,
    shape: &[usize],
    rng: &mut R,
) -> Result<Vec<f32>> {
    match role {
        ParamRole::Weight => initialize(scheme, shape, rng),
        ParamRole::Bias | ParamRole::Beta | ParamRole::RunningMean => {
            initialize(WeightInit::Zero, shape, rng)
        }
        ParamRole::Gamma | ParamRole::RunningVar => initialize(WeightInit::Ones, shape, rng),
    }
}

fn uniform<R: Rng + ?Sized>(numel: usize, bound: f32, rng: &mut R) -> Vec<f32> {
    if bound <= 0.0 || !bound.is_finite() {
        return vec![0.0; numel];
    }
    (0..numel).map(|_| rng.gen_range(-bound..bound)).collect()
}

// Box-Muller transform
fn normal<R: Rng + ?Sized>(numel: usize, std: f32, rng: &mut R) -> Vec<f32> {
    (0..numel)
        .map(|_| {
            let u1: f32 = rng.gen_range(0.0001_f32..1.0_f32);
            let u2: f32 = rng.gen_range(0.0_f32..1.0_f32);
            let z = (-2.0_f32 * u1.ln()).sqrt() * (2.0_f32 * std::f32::consts::PI * u2).cos();
            std * z
        })
        .collect()
}

fn identity(shape: &[usize]) -> Result<Vec<f32>> {
    match shape {
        [rows, cols] if rows == cols => {
            let mut data = vec![0.0; rows * cols];
            for i in 0..*rows {
                data[i * cols + i] = 1.0;
            }
            Ok(data)
        }
        _ => Err(GraftError::UnsupportedScheme {
            scheme: WeightInit::Identity.to_string(),
            reason: format!("requires a square 2-D shape, got {:?}", shape),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xavier_uniform_bounds() {
        let data = initialize_seeded(WeightInit::XavierUniform, &[100, 100], 42).unwrap();
        let a = (6.0 / 200.0_f32).sqrt();

        assert_eq!(data.len(), 10_000);
        for &val in &data {
            assert!((-a..=a).contains(&val), "Value {val} out of bounds [-{a}, {a}]");
        }
    }

    #[test]
    fn test_seeded_reproducible() {
        let a = initialize_seeded(WeightInit::Xavier, &[10, 10], 7).unwrap();
        let b = initialize_seeded(WeightInit::Xavier, &[10, 10], 7).unwrap();
        let c = initialize_seeded(WeightInit::Xavier, &[10, 10], 8).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_relu_normal_std() {
        let data = initialize_seeded(WeightInit::Relu, &[100, 100], 42).unwrap();
        let expected_std = (2.0 / 100.0_f32).sqrt();

        let mean: f32 = data.iter().sum::<f32>() / data.len() as f32;
        let var: f32 = data.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / data.len() as f32;

        assert!(mean.abs() < 0.01, "Mean {mean} too far from 0");
        assert!(
            (var.sqrt() - expected_std).abs() < 0.02,
            "Std {} too far from {expected_std}",
            var.sqrt()
        );
    }

    #[test]
    fn test_identity_square() {
        let data = initialize_seeded(WeightInit::Identity, &[3, 3], 0).unwrap();
        assert_eq!(data, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_identity_non_square_unsupported() {
        let err = initialize_seeded(WeightInit::Identity, &[3, 4], 0).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_SCHEME");
    }

    #[test]
    fn test_parse_scheme_names() {
        assert_eq!("xavier".parse::<WeightInit>().unwrap(), WeightInit::Xavier);
        assert_eq!("He-Normal".parse::<WeightInit>().unwrap(), WeightInit::Relu);
        assert_eq!("glorot_uniform".parse::<WeightInit>().unwrap(), WeightInit::XavierUniform);

        let err = "lecun_magic".parse::<WeightInit>().unwrap_err();
        assert!(matches!(err, GraftError::UnsupportedScheme { ref scheme, .. } if scheme == "lecun_magic"));
    }

    #[test]
    fn test_role_defaults() {
        let mut rng = StdRng::seed_from_u64(1);
        let bias = initialize_role(ParamRole::Bias, WeightInit::Xavier, &[4], &mut rng).unwrap();
        let gamma = initialize_role(ParamRole::Gamma, WeightInit::Xavier, &[4], &mut rng).unwrap();
        assert!(bias.iter().all(|&x| x == 0.0));
        assert!(gamma.iter().all(|&x| x == 1.0));
    }

    #[test]
    fn test_unknown_scheme_rejected_by_serde() {
        let err = "lecun_magic".parse::<WeightInit>().unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_SCHEME");

        let err = serde_json::from_str::<WeightInit>("\"lecun_magic\"").unwrap_err();
        assert!(err.to_string().contains("Unsupported weight init scheme 'lecun_magic'"));

        let parsed: WeightInit = serde_json::from_str("\"relu_uniform\"").unwrap();
        assert_eq!(parsed, WeightInit::ReluUniform);
        let parsed: WeightInit = serde_json::from_str("\"glorot_uniform\"").unwrap();
        assert_eq!(parsed, WeightInit::XavierUniform);
        assert_eq!(serde_json::to_string(&WeightInit::XavierUniform).unwrap(), "\"xavier_uniform\"");
    }
}
