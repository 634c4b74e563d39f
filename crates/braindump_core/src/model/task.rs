//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical record placed into document buckets.
//! - Normalize free-text fields so the visible document grammar round-trips.
//! - Provide lifecycle helpers for completion and re-bucketing.
//!
//! # Invariants
//! - `id` is stable across reconciliation cycles and never reused.
//! - `bucket == Bucket::Done` if and only if `completed_at` is set.
//! - Text fields are stored in normalized form (see `normalize_inline`).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier carried by a task through every reconciliation.
pub type TaskId = Uuid;

/// Section a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Small set of tasks to start today, ranked by ease of starting.
    Today,
    /// Acknowledged but deferred, always with a reason when known.
    CanSkip,
    /// Optional work for spare energy.
    ExtraEnergy,
    /// Completed; lives only in the done archive.
    Done,
}

impl Bucket {
    /// Buckets rendered as active sections, in document order.
    pub const ACTIVE: [Bucket; 3] = [Bucket::Today, Bucket::CanSkip, Bucket::ExtraEnergy];

    /// Stable string id used in logs and wire payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::CanSkip => "can_skip",
            Self::ExtraEnergy => "extra_energy",
            Self::Done => "done",
        }
    }

    pub fn is_active(self) -> bool {
        self != Self::Done
    }

    /// Position of this bucket's section in the rendered document.
    pub(crate) fn section_rank(self) -> u8 {
        match self {
            Self::Today => 0,
            Self::CanSkip => 1,
            Self::ExtraEnergy => 2,
            Self::Done => 3,
        }
    }
}

impl Display for Bucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation errors for task invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    EmptyTitle(TaskId),
    /// A text field is not in normalized form and would not survive a
    /// serialize/parse round trip.
    UnnormalizedText { id: TaskId, field: &'static str },
    DoneWithoutCompletion(TaskId),
    CompletionOnActiveTask(TaskId),
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle(id) => write!(f, "task {id} has an empty title"),
            Self::UnnormalizedText { id, field } => {
                write!(f, "task {id} has unnormalized text in `{field}`")
            }
            Self::DoneWithoutCompletion(id) => {
                write!(f, "task {id} is done but has no completion timestamp")
            }
            Self::CompletionOnActiveTask(id) => {
                write!(f, "task {id} is active but carries a completion timestamp")
            }
        }
    }
}

impl Error for TaskValidationError {}

/// Canonical task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    /// Concrete action that can be started within minutes. May be empty for
    /// tasks that were never classified.
    pub first_step: String,
    pub bucket: Bucket,
    pub created_at: NaiveDate,
    pub completed_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub skip_reason: Option<String>,
    /// Reconciliation batch that introduced this task.
    pub batch: Option<String>,
}

impl Task {
    /// Creates an active task with a generated stable ID.
    pub fn new(title: &str, bucket: Bucket, created_at: NaiveDate) -> Self {
        Self::with_id(Uuid::new_v4(), title, bucket, created_at)
    }

    /// Creates a task with a caller-provided stable ID.
    ///
    /// The title is normalized. A `Done` bucket is downgraded to `CanSkip`
    /// because completion must go through `complete`.
    pub fn with_id(id: TaskId, title: &str, bucket: Bucket, created_at: NaiveDate) -> Self {
        let bucket = if bucket == Bucket::Done {
            Bucket::CanSkip
        } else {
            bucket
        };
        Self {
            id,
            title: normalize_title(title),
            first_step: String::new(),
            bucket,
            created_at,
            completed_at: None,
            note: None,
            skip_reason: None,
            batch: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.bucket == Bucket::Done
    }

    /// Moves this task into the done archive.
    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.bucket = Bucket::Done;
        self.completed_at = Some(at);
        self.skip_reason = None;
    }

    /// Places this task into an active bucket.
    ///
    /// `skip_reason` is only kept for `CanSkip`; `Done` is rejected by
    /// falling back to `CanSkip`.
    pub fn place(&mut self, bucket: Bucket, skip_reason: Option<&str>) {
        self.bucket = if bucket == Bucket::Done {
            Bucket::CanSkip
        } else {
            bucket
        };
        self.completed_at = None;
        self.skip_reason = if self.bucket == Bucket::CanSkip {
            normalize_optional(skip_reason)
        } else {
            None
        };
    }

    pub fn set_first_step(&mut self, step: &str) {
        self.first_step = normalize_inline(step);
    }

    pub fn set_note(&mut self, note: Option<&str>) {
        self.note = normalize_optional(note);
    }

    /// Validates bucket/completion consistency and text normalization.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.title.is_empty() {
            return Err(TaskValidationError::EmptyTitle(self.id));
        }
        if self.title != normalize_title(&self.title) {
            return Err(TaskValidationError::UnnormalizedText {
                id: self.id,
                field: "title",
            });
        }
        if self.first_step != normalize_inline(&self.first_step) {
            return Err(TaskValidationError::UnnormalizedText {
                id: self.id,
                field: "first_step",
            });
        }
        if let Some(reason) = &self.skip_reason {
            if reason.is_empty() || *reason != normalize_inline(reason) {
                return Err(TaskValidationError::UnnormalizedText {
                    id: self.id,
                    field: "skip_reason",
                });
            }
        }
        match (self.bucket, self.completed_at) {
            (Bucket::Done, None) => Err(TaskValidationError::DoneWithoutCompletion(self.id)),
            (bucket, Some(_)) if bucket.is_active() => {
                Err(TaskValidationError::CompletionOnActiveTask(self.id))
            }
            _ => Ok(()),
        }
    }
}

/// Collapses whitespace (including newlines) and neutralizes comment
/// openers so a value always fits on one visible document line.
pub fn normalize_inline(value: &str) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    replace_until_stable(&collapsed, "<!--", "<!-")
}

/// Normalizes a title: inline rules plus removal of the separators the
/// section grammar splits on (`**`, `→`, `—`). A leading checkbox is
/// rewritten with parentheses so the title never reads back as a marker.
pub fn normalize_title(value: &str) -> String {
    let separators = value.replace('→', "->").replace('—', "-");
    let inline = normalize_inline(&separators);
    let title = replace_until_stable(&inline, "**", "*");
    for (marker, neutral) in [("[x]", "(x)"), ("[X]", "(X)"), ("[ ]", "( )")] {
        if let Some(rest) = title.strip_prefix(marker) {
            return format!("{neutral}{rest}");
        }
    }
    title
}

/// Normalizes optional text; blank values become `None`.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(normalize_inline)
        .filter(|normalized| !normalized.is_empty())
}

fn replace_until_stable(value: &str, from: &str, to: &str) -> String {
    let mut current = value.to_string();
    while current.contains(from) {
        current = current.replace(from, to);
    }
    current
}
