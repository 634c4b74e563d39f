//! Snapshot store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Append immutable document versions with a monotonic version counter.
//! - List snapshot metadata oldest first and load single versions.
//!
//! # Invariants
//! - There is no update or delete path; the schema rejects both.
//! - Read paths report corrupted bodies instead of masking them.

use crate::codec::markdown::{self, ParseError};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::document::{Document, DocumentId};
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const SNAPSHOT_META_SQL: &str = "SELECT version, document_id, created_at, reason FROM snapshots";

pub type RepoResult<T> = Result<T, RepoError>;

/// Snapshot store errors.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(u64),
    /// Stored body no longer parses.
    Corrupt { version: u64, source: ParseError },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(version) => write!(f, "snapshot not found: {version}"),
            Self::Corrupt { version, source } => {
                write!(f, "snapshot {version} is corrupted: {source}")
            }
            Self::InvalidData(message) => write!(f, "invalid snapshot data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Corrupt { source, .. } => Some(source),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotTrigger {
    Reconcile,
    Complete,
    CompleteAll,
    ClearAll,
    Style,
    Manual,
}

impl SnapshotTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reconcile => "reconcile",
            Self::Complete => "complete",
            Self::CompleteAll => "complete_all",
            Self::ClearAll => "clear_all",
            Self::Style => "style",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for SnapshotTrigger {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "reconcile" => Ok(Self::Reconcile),
            "complete" => Ok(Self::Complete),
            "complete_all" => Ok(Self::CompleteAll),
            "clear_all" => Ok(Self::ClearAll),
            "style" => Ok(Self::Style),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown snapshot trigger `{other}`")),
        }
    }
}

impl Display for SnapshotTrigger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot row without its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub version: u64,
    pub document_id: DocumentId,
    pub created_at: DateTime<Utc>,
    pub trigger: SnapshotTrigger,
}

/// Immutable historical copy of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub document: Document,
}

/// Append-only document history.
pub trait SnapshotStore: Send + Sync {
    /// Appends `document` as the next version.
    fn save(&self, document: &Document, trigger: SnapshotTrigger) -> RepoResult<Snapshot>;
    /// All snapshot metadata, oldest first.
    fn list(&self) -> RepoResult<Vec<SnapshotMeta>>;
    fn load(&self, version: u64) -> RepoResult<Snapshot>;

    /// Metadata of snapshots taken in `[start, end)`, oldest first.
    fn list_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<SnapshotMeta>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|meta| meta.created_at >= start && meta.created_at < end)
            .collect())
    }
}

/// SQLite-backed snapshot store.
pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    /// Wraps a migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> RepoResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn save(&self, document: &Document, trigger: SnapshotTrigger) -> RepoResult<Snapshot> {
        let created_at = Utc::now();
        let body = markdown::serialize(document);
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO snapshots (document_id, created_at, reason, body)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                document.id.to_string(),
                created_at.timestamp_millis(),
                trigger.as_str(),
                body,
            ],
        );
        if let Err(err) = inserted {
            error!(
                "event=snapshot_save module=repo status=error trigger={} error={}",
                trigger, err
            );
            return Err(err.into());
        }

        let version = u64::try_from(conn.last_insert_rowid())
            .map_err(|_| RepoError::InvalidData("negative snapshot version".to_string()))?;
        info!(
            "event=snapshot_save module=repo status=ok version={} trigger={} tasks={}",
            version,
            trigger,
            document.tasks().len()
        );

        Ok(Snapshot {
            meta: SnapshotMeta {
                version,
                document_id: document.id,
                created_at: from_millis(created_at.timestamp_millis())?,
                trigger,
            },
            document: document.clone(),
        })
    }

    fn list(&self) -> RepoResult<Vec<SnapshotMeta>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{SNAPSHOT_META_SQL} ORDER BY version ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut metas = Vec::new();
        while let Some(row) = rows.next()? {
            metas.push(parse_meta_row(row)?);
        }
        Ok(metas)
    }

    fn load(&self, version: u64) -> RepoResult<Snapshot> {
        let key = i64::try_from(version).map_err(|_| RepoError::NotFound(version))?;
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT version, document_id, created_at, reason, body
             FROM snapshots
             WHERE version = ?1;",
        )?;
        let mut rows = stmt.query(params![key])?;
        let Some(row) = rows.next()? else {
            return Err(RepoError::NotFound(version));
        };

        let meta = parse_meta_row(row)?;
        let body: String = row.get(4)?;
        let document = markdown::parse(&body)
            .map_err(|source| RepoError::Corrupt { version, source })?;
        Ok(Snapshot { meta, document })
    }
}

fn parse_meta_row(row: &Row<'_>) -> RepoResult<SnapshotMeta> {
    let version: i64 = row.get(0)?;
    let document_id: String = row.get(1)?;
    let created_at: i64 = row.get(2)?;
    let trigger: String = row.get(3)?;

    Ok(SnapshotMeta {
        version: u64::try_from(version)
            .map_err(|_| RepoError::InvalidData(format!("negative version {version}")))?,
        document_id: Uuid::parse_str(&document_id).map_err(|err| {
            RepoError::InvalidData(format!("invalid document id `{document_id}`: {err}"))
        })?,
        created_at: from_millis(created_at)?,
        trigger: trigger.parse().map_err(RepoError::InvalidData)?,
    })
}

fn from_millis(value: i64) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| RepoError::InvalidData(format!("timestamp out of range: {value}")))
}

#[cfg(test)]
mod tests {
    use super::{RepoError, SnapshotStore, SnapshotTrigger, SqliteSnapshotStore};
    use crate::model::document::Document;
    use crate::model::task::{Bucket, Task};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn document() -> Document {
        let mut doc = Document::new(Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap());
        doc.push(Task::new(
            "Reply to email",
            Bucket::Today,
            NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
        ));
        doc
    }

    #[test]
    fn save_assigns_monotonic_versions_and_load_roundtrips() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        let doc = document();
        let first = store.save(&doc, SnapshotTrigger::Reconcile).unwrap();
        let second = store.save(&doc, SnapshotTrigger::Manual).unwrap();
        assert!(second.meta.version > first.meta.version);

        let metas = store.list().unwrap();
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].trigger, SnapshotTrigger::Reconcile);
        assert_eq!(metas[1].version, second.meta.version);

        let loaded = store.load(first.meta.version).unwrap();
        assert_eq!(loaded.document, doc);
        assert_eq!(loaded.meta, first.meta);
    }

    #[test]
    fn load_unknown_version_is_not_found() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        assert!(matches!(store.load(42), Err(RepoError::NotFound(42))));
    }

    #[test]
    fn rows_cannot_be_updated_or_deleted() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        store.save(&document(), SnapshotTrigger::Manual).unwrap();
        let conn = store.conn();
        assert!(conn.execute("DELETE FROM snapshots;", []).is_err());
        assert!(conn
            .execute("UPDATE snapshots SET body = 'x';", [])
            .is_err());
    }

    #[test]
    fn list_between_filters_by_creation_time() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        let saved = store.save(&document(), SnapshotTrigger::Complete).unwrap();
        let at = saved.meta.created_at;
        assert_eq!(
            store
                .list_between(at - Duration::minutes(1), at + Duration::minutes(1))
                .unwrap()
                .len(),
            1
        );
        assert!(store
            .list_between(at + Duration::minutes(1), at + Duration::minutes(2))
            .unwrap()
            .is_empty());
    }
}
