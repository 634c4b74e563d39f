//! Classifier adapter contract.
//!
//! # Responsibility
//! - Define the wire schema exchanged with the external bucketing service.
//! - Validate responses all-or-nothing before the engine trusts them.
//! - Provide the always-unavailable classifier used when none is configured.
//!
//! # Invariants
//! - A validated response places every requested task exactly once into
//!   Today, Can Skip or Extra Energy with a non-empty first step.
//! - A response failing any check is rejected as a whole.
//!
//! # See also
//! - `reconcile::engine` for the fallback path.

use crate::model::document::Document;
use crate::model::task::{Bucket, Task, TaskId};
use crate::reconcile::extract::normalize_key;
use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub mod http;

pub use http::HttpClassifier;

/// Number of recent Done titles sent as context.
const RECENT_DONE_LIMIT: usize = 10;

/// One task offered for classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub task_id: TaskId,
    pub title: String,
    pub first_step: String,
    /// Current bucket for carry-over tasks; `None` for new tasks.
    pub bucket: Option<Bucket>,
    pub skip_reason: Option<String>,
    pub created_at: NaiveDate,
    pub note: Option<String>,
}

impl TaskDraft {
    pub fn carry_over(task: &Task) -> Self {
        Self {
            task_id: task.id,
            title: task.title.clone(),
            first_step: task.first_step.clone(),
            bucket: Some(task.bucket),
            skip_reason: task.skip_reason.clone(),
            created_at: task.created_at,
            note: task.note.clone(),
        }
    }

    pub fn new_task(task: &Task) -> Self {
        Self {
            bucket: None,
            ..Self::carry_over(task)
        }
    }
}

/// Compact description of the document being reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorDocumentSummary {
    pub generated_at: DateTime<Utc>,
    pub today_count: usize,
    pub can_skip_count: usize,
    pub extra_energy_count: usize,
    pub done_count: usize,
    /// Most recently completed titles, newest first.
    pub recent_done: Vec<String>,
}

impl PriorDocumentSummary {
    pub fn of(document: &Document) -> Self {
        let mut done: Vec<&Task> = document.bucket(Bucket::Done).collect();
        done.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Self {
            generated_at: document.generated_at,
            today_count: document.count(Bucket::Today),
            can_skip_count: document.count(Bucket::CanSkip),
            extra_energy_count: document.count(Bucket::ExtraEnergy),
            done_count: done.len(),
            recent_done: done
                .into_iter()
                .take(RECENT_DONE_LIMIT)
                .map(|task| task.title.clone())
                .collect(),
        }
    }
}

/// Request body sent to the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRequest {
    pub raw_dump: String,
    pub carry_over: Vec<TaskDraft>,
    pub new_tasks: Vec<TaskDraft>,
    pub max_today: usize,
    pub context: PriorDocumentSummary,
}

impl ClassifyRequest {
    pub fn is_empty(&self) -> bool {
        self.carry_over.is_empty() && self.new_tasks.is_empty()
    }

    fn drafts(&self) -> impl Iterator<Item = &TaskDraft> {
        self.carry_over.iter().chain(self.new_tasks.iter())
    }
}

/// Assignment as received on the wire. Either `task_id` or
/// `new_task_title` identifies the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAssignment {
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub new_task_title: Option<String>,
    pub bucket: Bucket,
    #[serde(default)]
    pub first_step: String,
    /// Optional explanation, used as the skip reason for Can Skip.
    #[serde(default)]
    pub reason: Option<String>,
    /// Ease of starting; lower is easier.
    #[serde(default)]
    pub ease: Option<u32>,
}

/// Response body returned by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyResponse {
    pub assignments: Vec<WireAssignment>,
}

/// Assignment that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub task_id: TaskId,
    pub bucket: Bucket,
    pub first_step: String,
    pub reason: Option<String>,
    pub ease: Option<u32>,
    /// Position in the response, used for ranking when `ease` is absent.
    pub position: usize,
}

/// Classifier failures; every variant triggers the engine fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    Timeout,
    InvalidResponse(String),
    QuotaExceeded,
    Unavailable(String),
}

impl ClassifierError {
    /// Stable error kind for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::InvalidResponse(_) => "invalid_response",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

impl Display for ClassifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => f.write_str("classifier timed out"),
            Self::InvalidResponse(message) => write!(f, "invalid classifier response: {message}"),
            Self::QuotaExceeded => f.write_str("classifier quota exceeded"),
            Self::Unavailable(message) => write!(f, "classifier unavailable: {message}"),
        }
    }
}

impl Error for ClassifierError {}

/// External bucketing capability.
pub trait Classifier: Send + Sync {
    fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyResponse, ClassifierError>;
}

/// Classifier used when no endpoint is configured; always unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableClassifier;

impl Classifier for UnavailableClassifier {
    fn classify(&self, _request: &ClassifyRequest) -> Result<ClassifyResponse, ClassifierError> {
        Err(ClassifierError::Unavailable(
            "no classifier endpoint configured".to_string(),
        ))
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyResponse, ClassifierError> {
        (**self).classify(request)
    }
}

/// Calls `classifier` and validates its response.
///
/// # Side effects
/// - Emits one `classifier_call` event with status and duration.
pub fn classify_batch(
    classifier: &dyn Classifier,
    request: &ClassifyRequest,
) -> Result<Vec<Assignment>, ClassifierError> {
    let started_at = Instant::now();
    let result = classifier
        .classify(request)
        .and_then(|response| validate_response(request, &response));

    match &result {
        Ok(assignments) => info!(
            "event=classifier_call module=classifier status=ok duration_ms={} tasks={}",
            started_at.elapsed().as_millis(),
            assignments.len()
        ),
        Err(err) => warn!(
            "event=classifier_call module=classifier status=error duration_ms={} error_kind={}",
            started_at.elapsed().as_millis(),
            err.kind()
        ),
    }
    result
}

/// Validates a response against its request.
///
/// # Errors
/// - `InvalidResponse` when any assignment references an unknown task,
///   places a task twice, uses the Done bucket, lacks a first step, or when
///   a requested task is not placed.
pub fn validate_response(
    request: &ClassifyRequest,
    response: &ClassifyResponse,
) -> Result<Vec<Assignment>, ClassifierError> {
    let requested: HashSet<TaskId> = request.drafts().map(|draft| draft.task_id).collect();
    let new_by_title: HashMap<String, TaskId> = request
        .new_tasks
        .iter()
        .map(|draft| (normalize_key(&draft.title), draft.task_id))
        .collect();

    let mut placed = HashSet::new();
    let mut assignments = Vec::with_capacity(response.assignments.len());
    for (position, wire) in response.assignments.iter().enumerate() {
        let task_id = match (wire.task_id, wire.new_task_title.as_deref()) {
            (Some(id), _) => id,
            (None, Some(title)) => *new_by_title.get(&normalize_key(title)).ok_or_else(|| {
                invalid(format!("assignment {position} names an unknown new task"))
            })?,
            (None, None) => {
                return Err(invalid(format!(
                    "assignment {position} has neither taskId nor newTaskTitle"
                )))
            }
        };
        if !requested.contains(&task_id) {
            return Err(invalid(format!("unknown task id {task_id}")));
        }
        if !placed.insert(task_id) {
            return Err(invalid(format!("task {task_id} assigned more than once")));
        }
        if !wire.bucket.is_active() {
            return Err(invalid(format!("task {task_id} assigned to done")));
        }
        let first_step = wire.first_step.trim();
        if first_step.is_empty() {
            return Err(invalid(format!("task {task_id} has an empty first step")));
        }

        assignments.push(Assignment {
            task_id,
            bucket: wire.bucket,
            first_step: first_step.to_string(),
            reason: wire
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .map(str::to_string),
            ease: wire.ease,
            position,
        });
    }

    if let Some(missing) = requested.iter().find(|id| !placed.contains(*id)) {
        return Err(invalid(format!("task {missing} was not assigned")));
    }
    Ok(assignments)
}

fn invalid(message: String) -> ClassifierError {
    ClassifierError::InvalidResponse(message)
}
