//! Parameter layout
//!
//! Maps each layer ordinal to its element range inside a flat parameter
//! buffer. Ranges follow topology order, are contiguous, and their lengths
//! equal each spec's `param_count`.

use serde::{Deserialize, Serialize};

use super::buffer::ParameterBuffer;
use crate::error::{GraftError, Result};
use crate::layers::{LayerSpec, Topology};

/// Element range of one layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamRange {
    pub start: usize,
    pub len: usize,
}

impl ParamRange {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// One past the last element
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.start..self.end()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Ordered per-layer ranges for a topology
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Layout {
    ranges: Vec<ParamRange>,
}

/// Compute the layout of a topology
pub fn layout_for(topology: &Topology) -> Layout {
    Layout::for_layers(topology.layers())
}

impl Layout {
    /// Walk the specs in order, accumulating parameter counts
    pub fn for_layers(layers: &[LayerSpec]) -> Self {
        let mut offset = 0;
        let ranges = layers
            .iter()
            .map(|spec| {
                let range = ParamRange::new(offset, spec.param_count());
                offset += range.len;
                range
            })
            .collect();
        Self { ranges }
    }

    /// Get the range of a layer
    ///
    /// # Errors
    /// `IndexOutOfRange` if `ordinal` is not a layer of this layout.
    pub fn range(&self, ordinal: usize) -> Result<ParamRange> {
        self.ranges
            .get(ordinal)
            .copied()
            .ok_or(GraftError::IndexOutOfRange {
                ordinal,
                len: self.ranges.len(),
            })
    }

    /// Total number of parameters covered
    pub fn total(&self) -> usize {
        self.ranges.last().map(ParamRange::end).unwrap_or(0)
    }

    /// Get the number of layers
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamRange> {
        self.ranges.iter()
    }

    /// Check that ranges are contiguous and start at zero
    pub fn validate(&self) -> Result<()> {
        let mut expected_start = 0;
        for (ordinal, range) in self.ranges.iter().enumerate() {
            if range.start != expected_start {
                return Err(GraftError::ShapeMismatch {
                    location: format!("layout offset of layer {}", ordinal),
                    expected: expected_start,
                    actual: range.start,
                });
            }
            expected_start = range.end();
        }
        Ok(())
    }

    /// Check that a buffer holds exactly the parameters of this layout
    pub fn check_buffer(&self, buffer: &ParameterBuffer) -> Result<()> {
        if buffer.len() != self.total() {
            return Err(GraftError::ShapeMismatch {
                location: "parameter buffer length".to_string(),
                expected: self.total(),
                actual: buffer.len(),
            });
        }
        Ok(())
    }

    /// Check that every range matches the given specs' parameter counts
    pub fn check_specs(&self, layers: &[LayerSpec]) -> Result<()> {
        if layers.len() != self.ranges.len() {
            return Err(GraftError::ShapeMismatch {
                location: "layout layer count".to_string(),
                expected: layers.len(),
                actual: self.ranges.len(),
            });
        }
        for (ordinal, (spec, range)) in layers.iter().zip(&self.ranges).enumerate() {
            if spec.param_count() != range.len {
                return Err(GraftError::ShapeMismatch {
                    location: format!("parameter count of layer {}", ordinal),
                    expected: spec.param_count(),
                    actual: range.len,
                });
            }
        }
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LossFunction;

    fn sample_topology() -> Topology {
        Topology::new(vec![
            LayerSpec::dense(4, 3),
            LayerSpec::batch_norm(3),
            LayerSpec::local_response_norm(3, 1e-4, 0.75, 2.0, 5),
            LayerSpec::output(3, 2, LossFunction::Mse),
        ])
        .unwrap()
    }

    #[test]
    fn test_layout_offsets() {
        let layout = layout_for(&sample_topology());

        assert_eq!(layout.len(), 4);
        assert_eq!(layout.range(0).unwrap(), ParamRange::new(0, 15));
        assert_eq!(layout.range(1).unwrap(), ParamRange::new(15, 12));
        assert_eq!(layout.range(2).unwrap(), ParamRange::new(27, 0));
        assert_eq!(layout.range(3).unwrap(), ParamRange::new(27, 8));
        assert_eq!(layout.total(), 35);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_range_out_of_bounds() {
        let layout = layout_for(&sample_topology());
        assert!(matches!(
            layout.range(4),
            Err(GraftError::IndexOutOfRange { ordinal: 4, len: 4 })
        ));
    }

    #[test]
    fn test_check_buffer_length() {
        let layout = layout_for(&sample_topology());
        assert!(layout.check_buffer(&ParameterBuffer::zeros(35)).is_ok());
        assert!(layout.check_buffer(&ParameterBuffer::zeros(34)).is_err());
    }

    #[test]
    fn test_check_specs_detects_stale_layout() {
        let topology = sample_topology();
        let layout = layout_for(&topology);
        let mut layers = topology.layers().to_vec();
        layers[0] = LayerSpec::dense(4, 5);

        let err = layout.check_specs(&layers).unwrap_err();
        assert!(err.to_string().contains("layer 0"));
    }
}
