//! Parameter Storage Module
//!
//! - Layout: per-layer element ranges derived from a topology
//! - ParameterBuffer: flat storage with borrowed per-layer views
//! - Initializer: fresh values for new and resized layers

pub mod buffer;
pub mod init;
pub mod layout;

pub use buffer::ParameterBuffer;
pub use init::{initialize, initialize_role, initialize_seeded, WeightInit};
pub use layout::{layout_for, Layout, ParamRange};
