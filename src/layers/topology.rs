//! Network topology
//!
//! An ordered, non-empty sequence of layer specs plus the global settings
//! that apply to the whole network. Layers are addressed by ordinal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::spec::LayerSpec;
use crate::error::{GraftError, Result};

/// How gradients are propagated through time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackpropType {
    #[default]
    Standard,
    TruncatedBptt,
}

/// Declared shape of the network input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputType {
    FeedForward { size: usize },
    Recurrent { size: usize },
    Convolutional { height: usize, width: usize, channels: usize },
}

impl InputType {
    /// Feature width seen by a layer consuming this input
    ///
    /// For convolutional input this is the channel count.
    pub fn feature_width(&self) -> usize {
        match self {
            InputType::FeedForward { size } | InputType::Recurrent { size } => *size,
            InputType::Convolutional { channels, .. } => *channels,
        }
    }
}

/// Reshaping applied to the activations entering a layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputPreprocessor {
    FeedForwardToRnn,
    RnnToFeedForward,
    CnnToFeedForward { height: usize, width: usize, channels: usize },
    FeedForwardToCnn { height: usize, width: usize, channels: usize },
}

/// Settings shared by every layer of a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    pub backprop: bool,
    pub pretrain: bool,
    pub backprop_type: BackpropType,
    pub tbptt_fwd_length: usize,
    pub tbptt_back_length: usize,
    pub input_type: Option<InputType>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            backprop: true,
            pretrain: false,
            backprop_type: BackpropType::Standard,
            tbptt_fwd_length: 20,
            tbptt_back_length: 20,
            input_type: None,
        }
    }
}

/// Ordered layer sequence plus global settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    layers: Vec<LayerSpec>,
    #[serde(default)]
    settings: GlobalSettings,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    input_preprocessors: BTreeMap<usize, InputPreprocessor>,
}

impl Topology {
    /// Create a topology with default global settings
    ///
    /// # Errors
    /// `InvalidTopology` if `layers` is empty.
    pub fn new(layers: Vec<LayerSpec>) -> Result<Self> {
        Self::with_settings(layers, GlobalSettings::default(), BTreeMap::new())
    }

    /// Create a topology with explicit settings and preprocessors
    ///
    /// # Errors
    /// `InvalidTopology` if `layers` is empty or a preprocessor key is not
    /// a valid ordinal.
    pub fn with_settings(
        layers: Vec<LayerSpec>,
        settings: GlobalSettings,
        input_preprocessors: BTreeMap<usize, InputPreprocessor>,
    ) -> Result<Self> {
        let topology = Self {
            layers,
            settings,
            input_preprocessors,
        };
        topology.validate()?;
        Ok(topology)
    }

    /// Check the structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(GraftError::InvalidTopology {
                reason: "topology must contain at least one layer".to_string(),
            });
        }
        if let Some((ordinal, spec)) = self
            .layers
            .iter()
            .enumerate()
            .find(|(_, spec)| spec.kind.is_width_preserving() && spec.width_in != spec.width_out)
        {
            return Err(GraftError::InvalidTopology {
                reason: format!(
                    "{} layer {} must keep its width but maps {} -> {}",
                    spec.kind.type_name(),
                    ordinal,
                    spec.width_in,
                    spec.width_out
                ),
            });
        }
        if let Some(&ordinal) = self
            .input_preprocessors
            .keys()
            .find(|&&ordinal| ordinal >= self.layers.len())
        {
            return Err(GraftError::InvalidTopology {
                reason: format!(
                    "input preprocessor keyed by layer {} but topology has {} layers",
                    ordinal,
                    self.layers.len()
                ),
            });
        }
        Ok(())
    }

    /// Get a layer spec by ordinal
    pub fn get(&self, ordinal: usize) -> Option<&LayerSpec> {
        self.layers.get(ordinal)
    }

    /// Get a layer spec by ordinal, failing if out of range
    pub fn layer(&self, ordinal: usize) -> Result<&LayerSpec> {
        self.layers.get(ordinal).ok_or(GraftError::IndexOutOfRange {
            ordinal,
            len: self.layers.len(),
        })
    }

    /// All layer specs in order
    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    pub fn input_preprocessors(&self) -> &BTreeMap<usize, InputPreprocessor> {
        &self.input_preprocessors
    }

    /// Get the number of layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false for a validated topology
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Iterate over layer specs in order
    pub fn iter(&self) -> impl Iterator<Item = &LayerSpec> {
        self.layers.iter()
    }

    /// Total number of parameters across all layers
    pub fn param_count(&self) -> usize {
        self.layers.iter().map(LayerSpec::param_count).sum()
    }

    /// Ordinals of frozen layers
    pub fn frozen_ordinals(&self) -> Vec<usize> {
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, spec)| spec.frozen)
            .map(|(i, _)| i)
            .collect()
    }

    /// Parse a topology from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let topology: Topology = serde_json::from_str(json)?;
        topology.validate()?;
        Ok(topology)
    }

    /// Serialize the topology to JSON
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
