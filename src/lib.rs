//! Netgraft - Transfer-Learning Surgery for Layered Networks
//!
//! Netgraft takes a trained feed-forward network (an ordered list of layer
//! specs plus one flat parameter buffer) and derives a new network from it:
//! freeze a prefix, resize layers, drop the tail, append fresh layers.
//!
//! # Architecture
//!
//! Surgery runs in two phases:
//! - Plan: `TransferPlanBuilder` records edits against a borrowed base
//!   topology and validates them into an immutable `FrozenPlan`
//! - Apply: `SurgeryEngine` rebuilds the buffer from views of the base
//!   buffer and freshly initialized slices, then assembles a `Network`
//!
//! The base model is never mutated.

pub mod cli;
pub mod error;
pub mod import;
pub mod layers;
pub mod model;
pub mod params;
pub mod transfer;

pub use error::{GraftError, Result};
pub use layers::{LayerKind, LayerSpec, Topology};
pub use model::{ModelFile, Network};
pub use params::{Layout, ParameterBuffer, WeightInit};
pub use transfer::{FrozenPlan, SurgeryEngine, TransferPlanBuilder, TransferRequest, TransferSummary};
