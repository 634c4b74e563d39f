//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate the engine, the document file and the snapshot store into
//!   use-case level APIs.
//! - Keep the CLI decoupled from storage and classifier details.

pub mod planner_service;
pub mod summary;

pub use planner_service::{PlannerService, ServiceError, ServiceResult};
pub use summary::{Summary, SummaryItem, SummaryRange};
