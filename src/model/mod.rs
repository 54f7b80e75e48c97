//! Model Module
//!
//! Assembled networks and their on-disk form.

pub mod io;
pub mod network;

pub use io::ModelFile;
pub use network::Network;
