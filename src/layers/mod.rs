//! Layer Model Module
//!
//! - Spec: immutable per-layer hyperparameters and parameter formulas
//! - Topology: ordered specs plus global network settings
//! - Instance: specs bound to buffer ranges for inference
//! - Frozen: non-trainable wrapper around an instance

mod frozen;
mod instance;
mod spec;
mod topology;
mod training;

pub use frozen::FrozenLayer;
pub use instance::{instantiate, BatchNormLayer, DenseLayer, Layer, LrnLayer};
pub use spec::{Activation, LayerKind, LayerSpec, LossFunction, ParamRole, ParamSpec};
pub use topology::{BackpropType, GlobalSettings, InputPreprocessor, InputType, Topology};
pub use training::{TrainingConfig, Updater};
