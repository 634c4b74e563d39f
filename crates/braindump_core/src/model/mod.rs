//! Task-state domain model.
//!
//! # Responsibility
//! - Define the canonical task and document structures used by the engine.
//! - Keep local mutations (complete, clear, style) next to the data they touch.
//!
//! # Invariants
//! - Every task is identified by a stable `TaskId`.
//! - `bucket == Done` if and only if `completed_at` is set.

pub mod document;
pub mod task;
