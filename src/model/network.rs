//! Assembled network
//!
//! Ties a topology to its parameter buffer and the instantiated layers
//! bound to it. Layers whose spec is frozen are wrapped in `FrozenLayer`.

use crate::error::{GraftError, Result};
use crate::layers::{instantiate, FrozenLayer, Layer, Topology};
use crate::params::{layout_for, Layout, ParameterBuffer};

/// A topology with its parameters and layer instances
#[derive(Debug)]
pub struct Network {
    topology: Topology,
    params: ParameterBuffer,
    layout: Layout,
    layers: Vec<Box<dyn Layer>>,
}

impl Network {
    /// Assemble a network from a topology and a matching buffer
    ///
    /// # Errors
    /// `ShapeMismatch` if the buffer length does not equal the topology's
    /// total parameter count.
    pub fn new(topology: Topology, params: ParameterBuffer) -> Result<Self> {
        topology.validate()?;
        let layout = layout_for(&topology);
        layout.check_buffer(&params)?;

        let layers = topology
            .iter()
            .zip(layout.iter())
            .map(|(spec, &range)| {
                let layer = instantiate(spec, range);
                if spec.frozen {
                    Box::new(FrozenLayer::new(layer)) as Box<dyn Layer>
                } else {
                    layer
                }
            })
            .collect();

        Ok(Self {
            topology,
            params,
            layout,
            layers,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn params(&self) -> &ParameterBuffer {
        &self.params
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Get an instantiated layer by ordinal
    pub fn layer(&self, ordinal: usize) -> Option<&dyn Layer> {
        self.layers.get(ordinal).map(|l| l.as_ref())
    }

    /// Borrow one layer's parameter values
    pub fn layer_params(&self, ordinal: usize) -> Result<&[f32]> {
        self.params.slice(&self.layout, ordinal)
    }

    /// Get the number of layers
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Total number of parameters
    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    /// Number of parameters gradient updates may touch
    pub fn num_trainable_params(&self) -> usize {
        self.layers
            .iter()
            .filter(|l| l.is_trainable())
            .map(|l| l.param_range().len)
            .sum()
    }

    /// Per-layer trainable flags, in layer order
    pub fn trainable_mask(&self) -> Vec<bool> {
        self.layers.iter().map(|l| l.is_trainable()).collect()
    }

    /// Run an inference pass through every layer
    pub fn output(&self, input: &[f32]) -> Result<Vec<f32>> {
        let mut activations = input.to_vec();
        for (ordinal, layer) in self.layers.iter().enumerate() {
            let params = self.params.slice(&self.layout, ordinal)?;
            activations = layer.forward(params, &activations)?;
        }
        Ok(activations)
    }

    /// Release the topology and buffer
    pub fn into_parts(self) -> (Topology, ParameterBuffer) {
        (self.topology, self.params)
    }
}

impl TryFrom<(Topology, ParameterBuffer)> for Network {
    type Error = GraftError;

    fn try_from((topology, params): (Topology, ParameterBuffer)) -> Result<Self> {
        Network::new(topology, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{LayerSpec, LossFunction};

    fn two_layer_topology() -> Topology {
        Topology::new(vec![
            LayerSpec::dense(2, 2),
            LayerSpec::output(2, 1, LossFunction::Mse),
        ])
        .unwrap()
    }

    #[test]
    fn test_network_rejects_wrong_buffer() {
        let err = Network::new(two_layer_topology(), ParameterBuffer::zeros(8)).unwrap_err();
        assert!(matches!(
            err,
            GraftError::ShapeMismatch {
                expected: 9,
                actual: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_network_output() {
        // Layer 0: identity weights, zero bias. Layer 1: sums inputs plus 1.
        let params = ParameterBuffer::from_vec(vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let network = Network::new(two_layer_topology(), params).unwrap();

        let out = network.output(&[2.0, 3.0]).unwrap();
        assert_eq!(out, vec![6.0]);
        assert_eq!(network.trainable_mask(), vec![true, true]);
        assert_eq!(network.num_trainable_params(), 9);
    }

    #[test]
    fn test_frozen_specs_are_wrapped() {
        let mut layers = two_layer_topology().layers().to_vec();
        layers[0].frozen = true;
        let topology = Topology::new(layers).unwrap();
        let network = Network::new(topology, ParameterBuffer::zeros(9)).unwrap();

        assert_eq!(network.trainable_mask(), vec![false, true]);
        assert_eq!(network.num_trainable_params(), 3);
        assert_eq!(network.layer_params(1).unwrap().len(), 3);
    }
}
