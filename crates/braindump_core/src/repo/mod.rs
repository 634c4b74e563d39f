//! Persistence boundary.
//!
//! # Responsibility
//! - `snapshot_repo`: append-only snapshot history behind `SnapshotStore`.
//! - `document_file`: the live document on disk.
//!
//! # Invariants
//! - SQL and file-system details stay inside this module.
//! - Repository APIs return semantic errors (`NotFound`, `Corrupt`) in
//!   addition to transport errors.

pub mod document_file;
pub mod snapshot_repo;

pub use document_file::DocumentFile;
pub use snapshot_repo::{
    RepoError, RepoResult, Snapshot, SnapshotMeta, SnapshotStore, SnapshotTrigger,
    SqliteSnapshotStore,
};
