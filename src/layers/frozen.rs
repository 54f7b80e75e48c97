//! Frozen layer wrapper
//!
//! Marks a layer as non-trainable. The wrapper owns no parameter values:
//! forward passes go straight to the wrapped layer and the parameter range
//! is unchanged, so freezing never moves data in the buffer.

use super::instance::Layer;
use super::spec::LayerSpec;
use crate::error::Result;
use crate::params::ParamRange;

/// Non-trainable decorator around an instantiated layer
#[derive(Debug)]
pub struct FrozenLayer {
    inner: Box<dyn Layer>,
}

impl FrozenLayer {
    /// Wrap a layer
    pub fn new(inner: Box<dyn Layer>) -> Self {
        Self { inner }
    }

    /// Get a reference to the wrapped layer
    pub fn inner(&self) -> &dyn Layer {
        self.inner.as_ref()
    }

    /// Unwrap, returning the original layer
    pub fn into_inner(self) -> Box<dyn Layer> {
        self.inner
    }
}

impl Layer for FrozenLayer {
    fn spec(&self) -> &LayerSpec {
        self.inner.spec()
    }

    fn param_range(&self) -> ParamRange {
        self.inner.param_range()
    }

    fn is_trainable(&self) -> bool {
        false
    }

    fn forward(&self, params: &[f32], input: &[f32]) -> Result<Vec<f32>> {
        self.inner.forward(params, input)
    }
}
