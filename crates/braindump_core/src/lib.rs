//! Core domain logic for BrainDump.
//! This crate is the single source of truth for task-state invariants.

pub mod classifier;
pub mod codec;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod repo;
pub mod service;

pub use classifier::{Classifier, ClassifierError, ClassifyRequest, ClassifyResponse};
pub use codec::markdown::{parse, serialize, ParseError};
pub use config::{ConfigError, PlannerConfig};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::document::{DisplayStyle, Document, DocumentError, DocumentId};
pub use model::task::{Bucket, Task, TaskId};
pub use reconcile::{reconcile, EngineSettings, MergePlan, TieBreak};
pub use repo::{RepoError, SnapshotStore, SnapshotTrigger, SqliteSnapshotStore};
pub use service::{PlannerService, ServiceError, ServiceResult, Summary, SummaryRange};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
