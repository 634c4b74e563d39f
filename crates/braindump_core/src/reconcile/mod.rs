//! Reconciliation engine.
//!
//! # Responsibility
//! - `extract`: segment raw dumps and detect completion/demotion cues.
//! - `engine`: run one cycle and produce a `MergePlan`.
//! - `plan`: auditable transitions and their application.
//!
//! # Invariants
//! - Parse and classifier failures degrade to deterministic behavior here;
//!   they never abort the cycle.

pub mod engine;
pub mod extract;
pub mod plan;

pub use engine::{
    reconcile, ClassificationOutcome, EngineSettings, ReconcileError, ReconcileState,
    Reconciliation, TieBreak,
};
pub use plan::{MergeError, MergePlan, Transition, TransitionReason};
