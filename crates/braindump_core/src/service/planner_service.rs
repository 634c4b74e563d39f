//! Planner use-case service.
//!
//! # Responsibility
//! - Own the live document and serialize every mutation through one lock.
//! - Run reconciliation cycles one at a time, without holding the document
//!   lock while classifying.
//! - Persist the document, record snapshots, write weekly summaries.
//! - Recover from a corrupted document file using the snapshot history.
//!
//! # Invariants
//! - The in-memory document only changes after the file write succeeded.
//! - Local mutations never call the classifier.
//! - A dump's raw text is consumed by exactly one cycle; cycles never
//!   overlap, so a later cycle always starts from the previous commit.
//! - Snapshot and summary failures are logged, never surfaced.

use crate::classifier::Classifier;
use crate::codec::markdown;
use crate::config::PlannerConfig;
use crate::model::document::{DisplayStyle, Document, DocumentError};
use crate::model::task::TaskId;
use crate::reconcile::engine::{EngineSettings, ReconcileError, Reconciliation};
use crate::reconcile::extract::find_matching;
use crate::repo::document_file::DocumentFile;
use crate::repo::snapshot_repo::{
    RepoError, SnapshotMeta, SnapshotStore, SnapshotTrigger, SqliteSnapshotStore,
};
use crate::service::summary::{Summary, SummaryRange};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service-level errors.
#[derive(Debug)]
pub enum ServiceError {
    Io { path: PathBuf, source: io::Error },
    Repo(RepoError),
    Document(DocumentError),
    Reconcile(ReconcileError),
    /// Task query matched nothing.
    TaskNotFound(String),
    /// Live document and every snapshot are unreadable.
    Unrecoverable(String),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "`{}`: {source}", path.display()),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Document(err) => write!(f, "{err}"),
            Self::Reconcile(err) => write!(f, "{err}"),
            Self::TaskNotFound(query) => write!(f, "no active task matches `{query}`"),
            Self::Unrecoverable(details) => {
                write!(f, "document is unrecoverable: {details}")
            }
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Repo(err) => Some(err),
            Self::Document(err) => Some(err),
            Self::Reconcile(err) => Some(err),
            Self::TaskNotFound(_) | Self::Unrecoverable(_) => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<DocumentError> for ServiceError {
    fn from(value: DocumentError) -> Self {
        Self::Document(value)
    }
}

impl From<ReconcileError> for ServiceError {
    fn from(value: ReconcileError) -> Self {
        Self::Reconcile(value)
    }
}

type Clock = fn() -> DateTime<Utc>;

struct LiveDocument {
    document: Document,
    /// Bumped on every committed change.
    revision: u64,
}

impl LiveDocument {
    fn replace(&mut self, next: Document) {
        self.document = next;
        self.revision += 1;
    }
}

/// Use-case facade over the document, classifier and snapshot history.
pub struct PlannerService<C: Classifier, S: SnapshotStore> {
    settings: EngineSettings,
    summaries_dir: Option<PathBuf>,
    classifier: C,
    snapshots: S,
    file: DocumentFile,
    live: Mutex<LiveDocument>,
    /// Held for a whole reconciliation cycle; local mutations skip it.
    cycle: Mutex<()>,
    clock: Clock,
}

impl PlannerService<Box<dyn Classifier>, SqliteSnapshotStore> {
    /// Opens the service with the classifier and snapshot database named by
    /// `config`.
    pub fn open_from_config(config: &PlannerConfig) -> ServiceResult<Self> {
        let snapshots = SqliteSnapshotStore::open(&config.storage.snapshot_db_path)?;
        Self::open(config, config.build_classifier(), snapshots)
    }
}

impl<C: Classifier, S: SnapshotStore> PlannerService<C, S> {
    /// Loads the live document, recovering from snapshots when it does not
    /// parse. A missing or blank file starts an empty document.
    ///
    /// # Errors
    /// - `Io` when the document file cannot be read or rewritten.
    /// - `Unrecoverable` when the file is corrupted and no snapshot loads.
    pub fn open(config: &PlannerConfig, classifier: C, snapshots: S) -> ServiceResult<Self> {
        let file = DocumentFile::new(&config.storage.document_path);
        let now = Utc::now();
        let text = file.read().map_err(|source| ServiceError::Io {
            path: file.path().to_path_buf(),
            source,
        })?;

        let document = match text {
            Some(text) if !text.trim().is_empty() => match markdown::parse_at(&text, now) {
                Ok(document) => document,
                Err(err) => {
                    error!(
                        "event=document_parse module=service status=error error={}",
                        err
                    );
                    let recovered = recover_from_snapshots(&snapshots).ok_or_else(|| {
                        ServiceError::Unrecoverable(format!(
                            "`{}` does not parse ({err}) and no snapshot loads",
                            file.path().display()
                        ))
                    })?;
                    write_document(&file, &recovered)?;
                    recovered
                }
            },
            _ => Document::new(now),
        };

        Ok(Self {
            settings: config.engine_settings(),
            summaries_dir: config.storage.summaries_dir.clone(),
            classifier,
            snapshots,
            file,
            live: Mutex::new(LiveDocument {
                document,
                revision: 0,
            }),
            cycle: Mutex::new(()),
            clock: Utc::now,
        })
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current document.
    pub fn document(&self) -> Document {
        self.lock().document.clone()
    }

    /// Number of committed changes since open.
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// Resolves a task id or a title fragment to an active task.
    pub fn find_task(&self, query: &str) -> ServiceResult<TaskId> {
        let live = self.lock();
        let document = &live.document;
        if let Ok(id) = Uuid::parse_str(query.trim()) {
            if document.find(id).is_some() {
                return Ok(id);
            }
        }
        find_matching(query, document.active_tasks())
            .ok_or_else(|| ServiceError::TaskNotFound(query.to_string()))
    }

    /// Appends `text` to the raw capture and runs a reconciliation cycle.
    ///
    /// The capture is persisted before waiting for the cycle slot, so a
    /// failed or queued cycle never loses the dump. The first cycle whose
    /// base contains the text consumes it.
    pub fn submit_dump(&self, text: &str) -> ServiceResult<Document> {
        {
            let mut live = self.lock();
            let mut next = live.document.clone();
            next.append_raw(text);
            if next.raw() != live.document.raw() {
                self.persist(&next)?;
                live.replace(next);
            }
        }

        let _cycle = self.cycle.lock().unwrap_or_else(|poisoned| {
            warn!("event=lock_recover module=service status=ok lock=cycle");
            poisoned.into_inner()
        });
        let (base, base_revision) = {
            let live = self.lock();
            (live.document.clone(), live.revision)
        };

        let mut cycle = Reconciliation::begin(&base, self.settings, self.now());
        cycle.classify(&self.classifier)?;

        let committed = {
            let mut live = self.lock();
            if live.revision != base_revision {
                info!(
                    "event=reconcile_rebase module=service status=ok base_revision={} revision={}",
                    base_revision, live.revision
                );
            }
            let plan = cycle.plan(&live.document)?;
            let next = cycle.commit(&live.document, &plan)?;
            self.persist(&next)?;
            live.replace(next.clone());
            next
        };

        self.after_commit(&committed, SnapshotTrigger::Reconcile);
        Ok(committed)
    }

    /// Moves one active task to the done archive.
    pub fn complete_task(&self, id: TaskId, note: Option<&str>) -> ServiceResult<Document> {
        let result = self.mutate(SnapshotTrigger::Complete, |document, now| {
            document.complete_task(id, note, now).map(|_| ())
        });
        match &result {
            Ok(_) => info!("event=task_complete module=service status=ok task_id={id}"),
            Err(err) => warn!(
                "event=task_complete module=service status=error task_id={id} error={err}"
            ),
        }
        result
    }

    /// Completes every Today task, and Can Skip tasks when requested.
    pub fn complete_all(&self, include_can_skip: bool) -> ServiceResult<Document> {
        let mut completed = 0;
        let document = self.mutate(SnapshotTrigger::CompleteAll, |document, now| {
            completed = document.complete_all(include_can_skip, now).len();
            Ok(())
        })?;
        info!(
            "event=task_complete module=service status=ok mode=all include_can_skip={include_can_skip} completed={completed}"
        );
        Ok(document)
    }

    /// Drops every active task and the raw capture; the archive stays.
    pub fn clear_all(&self) -> ServiceResult<Document> {
        let mut removed = 0;
        let document = self.mutate(SnapshotTrigger::ClearAll, |document, _| {
            removed = document.clear_all();
            Ok(())
        })?;
        info!("event=clear_all module=service status=ok removed={removed}");
        Ok(document)
    }

    pub fn set_display_style(&self, style: DisplayStyle) -> ServiceResult<Document> {
        self.mutate(SnapshotTrigger::Style, |document, _| {
            document.style = style;
            Ok(())
        })
    }

    /// Records the current document as a manual snapshot.
    pub fn save_snapshot(&self) -> ServiceResult<SnapshotMeta> {
        let document = self.document();
        Ok(self.snapshots.save(&document, SnapshotTrigger::Manual)?.meta)
    }

    /// Snapshot history, oldest first.
    pub fn snapshots(&self) -> ServiceResult<Vec<SnapshotMeta>> {
        Ok(self.snapshots.list()?)
    }

    /// Replaces the live document with a stored version.
    pub fn restore_snapshot(&self, version: u64) -> ServiceResult<Document> {
        let snapshot = self.snapshots.load(version)?;
        let document = {
            let mut live = self.lock();
            self.persist(&snapshot.document)?;
            live.replace(snapshot.document.clone());
            snapshot.document
        };
        info!("event=document_recover module=service status=ok source=restore version={version}");
        self.after_commit(&document, SnapshotTrigger::Manual);
        Ok(document)
    }

    /// Done tasks completed inside `range`, from the live document and every
    /// snapshot taken since the range started, newest first.
    pub fn get_summary(&self, range: SummaryRange) -> ServiceResult<Summary> {
        let current = self.document();
        let metas = self
            .snapshots
            .list_between(range.start_at(), DateTime::<Utc>::MAX_UTC)?;
        let mut documents = vec![current];
        for meta in metas.iter().rev() {
            match self.snapshots.load(meta.version) {
                Ok(snapshot) => documents.push(snapshot.document),
                Err(err) => warn!(
                    "event=summary_collect module=service status=error version={} error={}",
                    meta.version, err
                ),
            }
        }
        Ok(Summary::collect(range, &documents))
    }

    fn mutate(
        &self,
        trigger: SnapshotTrigger,
        change: impl FnOnce(&mut Document, DateTime<Utc>) -> Result<(), DocumentError>,
    ) -> ServiceResult<Document> {
        let now = self.now();
        let committed = {
            let mut live = self.lock();
            let mut next = live.document.clone();
            change(&mut next, now)?;
            self.persist(&next)?;
            live.replace(next.clone());
            next
        };
        self.after_commit(&committed, trigger);
        Ok(committed)
    }

    /// Snapshot and summary bookkeeping, done outside the document lock.
    fn after_commit(&self, document: &Document, trigger: SnapshotTrigger) {
        if let Err(err) = self.snapshots.save(document, trigger) {
            error!(
                "event=snapshot_save module=service status=error trigger={} error={}",
                trigger, err
            );
        }

        let writes_summary = matches!(
            trigger,
            SnapshotTrigger::Reconcile | SnapshotTrigger::Complete | SnapshotTrigger::CompleteAll
        );
        let Some(dir) = self.summaries_dir.as_ref().filter(|_| writes_summary) else {
            return;
        };
        let range = SummaryRange::iso_week_of(self.now().date_naive());
        let written = self.get_summary(range).and_then(|summary| {
            let path = dir.join(range.file_name());
            DocumentFile::new(&path)
                .write(&summary.render_markdown())
                .map_err(|source| ServiceError::Io { path, source })
        });
        match written {
            Ok(()) => info!(
                "event=summary_write module=service status=ok week={}",
                range.label()
            ),
            Err(err) => warn!(
                "event=summary_write module=service status=error week={} error={}",
                range.label(),
                err
            ),
        }
    }

    fn persist(&self, document: &Document) -> ServiceResult<()> {
        write_document(&self.file, document)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn lock(&self) -> MutexGuard<'_, LiveDocument> {
        self.live.lock().unwrap_or_else(|poisoned| {
            warn!("event=lock_recover module=service status=ok");
            poisoned.into_inner()
        })
    }
}

fn write_document(file: &DocumentFile, document: &Document) -> ServiceResult<()> {
    file.write(&markdown::serialize(document))
        .map_err(|source| ServiceError::Io {
            path: file.path().to_path_buf(),
            source,
        })
}

/// Newest snapshot that still loads.
fn recover_from_snapshots<S: SnapshotStore>(snapshots: &S) -> Option<Document> {
    let metas = match snapshots.list() {
        Ok(metas) => metas,
        Err(err) => {
            error!("event=document_recover module=service status=error error={err}");
            return None;
        }
    };
    for meta in metas.iter().rev() {
        match snapshots.load(meta.version) {
            Ok(snapshot) => {
                info!(
                    "event=document_recover module=service status=ok source=snapshot version={}",
                    meta.version
                );
                return Some(snapshot.document);
            }
            Err(err) => warn!(
                "event=document_recover module=service status=error version={} error={}",
                meta.version, err
            ),
        }
    }
    None
}
