//! Transfer Module
//!
//! Two phases: a builder records edits against a borrowed base topology and
//! freezes them into a plan, then the engine applies the plan to produce a
//! new network without touching the base.

pub mod engine;
pub mod plan;
pub mod request;
pub mod summary;

pub use engine::{ParamSource, SurgeryEngine, SurgeryOutput};
pub use plan::{FrozenPlan, Replacement, TransferPlanBuilder};
pub use request::{ReplacementKind, ReplacementRequest, TransferRequest};
pub use summary::{LayerRow, TransferSummary};
