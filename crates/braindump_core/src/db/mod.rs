//! Snapshot database bootstrap.
//!
//! # Responsibility
//! - Hand out migrated SQLite connections to the snapshot store.
//!
//! # Invariants
//! - Schema version lives in `PRAGMA user_version`.
//! - Failures while opening name the database they were opening.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    /// Connecting to or preparing the database at `location` failed.
    Open {
        location: String,
        source: rusqlite::Error,
    },
    Sqlite(rusqlite::Error),
    /// The file was migrated by a newer build.
    SchemaTooNew { found: u32, supported: u32 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { location, source } => {
                write!(f, "cannot open snapshot database `{location}`: {source}")
            }
            Self::Sqlite(err) => write!(f, "snapshot database: {err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "snapshot schema v{found} needs a newer build (this one reads up to v{supported})"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Open { source, .. } | Self::Sqlite(source) => Some(source),
            Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
