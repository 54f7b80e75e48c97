//! Import Module
//!
//! Config shims for layers described by other frameworks.

pub mod lrn;

pub use lrn::KerasLrn;
