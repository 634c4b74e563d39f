//! Document domain model.
//!
//! # Responsibility
//! - Hold the full task state: active buckets, done archive, raw capture.
//! - Provide local mutations (complete, complete-all, clear-all, style)
//!   that never need the external classifier.
//!
//! # Invariants
//! - Tasks are kept grouped by bucket in section order; order inside a
//!   bucket is meaningful (Today is ranked by ease of start).
//! - Task ids are unique within one document.
//! - `raw` holds only unprocessed dump text and is cleared on commit.

use crate::model::task::{normalize_optional, Bucket, Task, TaskId, TaskValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of the persisted document across versions.
pub type DocumentId = Uuid;

/// Tone used by outer layers when rendering feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStyle {
    Snarky,
    #[default]
    Neutral,
    Warm,
}

impl DisplayStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snarky => "snarky",
            Self::Neutral => "neutral",
            Self::Warm => "warm",
        }
    }

    /// Parses a style id; unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "snarky" => Some(Self::Snarky),
            "neutral" => Some(Self::Neutral),
            "warm" => Some(Self::Warm),
            _ => None,
        }
    }
}

/// Document invariant violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentValidationError {
    DuplicateTaskId(TaskId),
    InvalidTask(TaskValidationError),
    TodayOverCapacity { count: usize, max: usize },
}

impl Display for DocumentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateTaskId(id) => write!(f, "duplicate task id {id}"),
            Self::InvalidTask(err) => write!(f, "{err}"),
            Self::TodayOverCapacity { count, max } => {
                write!(f, "today holds {count} tasks, more than the maximum {max}")
            }
        }
    }
}

impl Error for DocumentValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidTask(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TaskValidationError> for DocumentValidationError {
    fn from(value: TaskValidationError) -> Self {
        Self::InvalidTask(value)
    }
}

/// Errors raised by local document mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    TaskNotFound(TaskId),
    TaskAlreadyDone(TaskId),
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::TaskAlreadyDone(id) => write!(f, "task already done: {id}"),
        }
    }
}

impl Error for DocumentError {}

/// In-memory task-state document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocumentId,
    pub generated_at: DateTime<Utc>,
    pub style: DisplayStyle,
    pub(crate) raw: String,
    pub(crate) tasks: Vec<Task>,
    pub(crate) extras: Vec<String>,
}

impl Document {
    /// Creates an empty document with a fresh id.
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            generated_at,
            style: DisplayStyle::default(),
            raw: String::new(),
            tasks: Vec::new(),
            extras: Vec::new(),
        }
    }

    /// All tasks, grouped by bucket in section order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Tasks of one bucket in document order.
    pub fn bucket(&self, bucket: Bucket) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |task| task.bucket == bucket)
    }

    pub fn count(&self, bucket: Bucket) -> usize {
        self.bucket(bucket).count()
    }

    /// Non-done tasks in document order.
    pub fn active_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|task| task.bucket.is_active())
    }

    pub fn find(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Unrecognized lines preserved verbatim across parse/serialize.
    pub fn extras(&self) -> &[String] {
        &self.extras
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Replaces the raw capture with normalized text.
    pub fn set_raw(&mut self, text: &str) {
        self.raw = normalize_raw(text);
    }

    /// Appends a new dump below any unprocessed capture.
    pub fn append_raw(&mut self, text: &str) {
        let addition = normalize_raw(text);
        if addition.is_empty() {
            return;
        }
        if self.raw.is_empty() {
            self.raw = addition;
        } else {
            self.raw = normalize_raw(&format!("{}\n{}", self.raw, addition));
        }
    }

    /// Inserts a task at the end of its bucket.
    pub fn push(&mut self, task: Task) {
        self.tasks.push(task);
        self.sort_by_section();
    }

    /// Moves one active task to the done archive.
    pub fn complete_task(
        &mut self,
        id: TaskId,
        note: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<&Task, DocumentError> {
        let index = self
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(DocumentError::TaskNotFound(id))?;
        if self.tasks[index].is_done() {
            return Err(DocumentError::TaskAlreadyDone(id));
        }

        let mut task = self.tasks.remove(index);
        task.complete(at);
        if let Some(note) = normalize_optional(note) {
            task.note = Some(note);
        }
        self.tasks.push(task);
        self.sort_by_section();
        self.tasks
            .iter()
            .find(|task| task.id == id)
            .ok_or(DocumentError::TaskNotFound(id))
    }

    /// Completes every Today task, and Can Skip tasks when requested.
    ///
    /// Returns completed task ids in document order.
    pub fn complete_all(&mut self, include_can_skip: bool, at: DateTime<Utc>) -> Vec<TaskId> {
        let mut completed = Vec::new();
        let (mut finished, mut kept): (Vec<Task>, Vec<Task>) =
            std::mem::take(&mut self.tasks).into_iter().partition(|task| {
                task.bucket == Bucket::Today
                    || (include_can_skip && task.bucket == Bucket::CanSkip)
            });
        for task in &mut finished {
            task.complete(at);
            completed.push(task.id);
        }
        kept.append(&mut finished);
        self.tasks = kept;
        self.sort_by_section();
        completed
    }

    /// Removes every active task and the raw capture. The done archive stays.
    ///
    /// Returns the number of removed tasks.
    pub fn clear_all(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(Task::is_done);
        self.raw.clear();
        before - self.tasks.len()
    }

    /// Checks id uniqueness, per-task invariants and an optional Today cap.
    pub fn validate(&self, max_today: Option<usize>) -> Result<(), DocumentValidationError> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id) {
                return Err(DocumentValidationError::DuplicateTaskId(task.id));
            }
            task.validate()?;
        }
        if let Some(max) = max_today {
            let count = self.count(Bucket::Today);
            if count > max {
                return Err(DocumentValidationError::TodayOverCapacity { count, max });
            }
        }
        Ok(())
    }

    pub(crate) fn sort_by_section(&mut self) {
        self.tasks.sort_by_key(|task| task.bucket.section_rank());
    }
}

/// Normalizes raw capture text.
///
/// Trailing whitespace and surrounding blank lines are dropped. Lines that
/// would be read back as a section heading or document token are escaped
/// with a leading backslash.
pub fn normalize_raw(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|line| {
            let line = line.trim_end();
            if crate::codec::markdown::is_structural_line(line) {
                format!("\\{line}")
            } else {
                line.to_string()
            }
        })
        .collect();

    let start = lines.iter().position(|line| !line.trim().is_empty());
    let end = lines.iter().rposition(|line| !line.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_raw, DisplayStyle, Document, DocumentError, DocumentValidationError};
    use crate::model::task::{Bucket, Task};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    fn doc_with(tasks: &[(&str, Bucket)]) -> Document {
        let mut doc = Document::new(Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap());
        for (title, bucket) in tasks {
            doc.push(Task::new(title, *bucket, day()));
        }
        doc
    }

    #[test]
    fn push_keeps_section_order() {
        let doc = doc_with(&[
            ("skip me", Bucket::CanSkip),
            ("first", Bucket::Today),
            ("bonus", Bucket::ExtraEnergy),
            ("second", Bucket::Today),
        ]);
        let titles: Vec<&str> = doc.tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second", "skip me", "bonus"]);
    }

    #[test]
    fn complete_task_moves_to_archive_with_note() {
        let mut doc = doc_with(&[("Reply to email", Bucket::Today)]);
        let id = doc.tasks()[0].id;
        let at = Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap();

        let done = doc.complete_task(id, Some("sent draft"), at).unwrap();
        assert_eq!(done.bucket, Bucket::Done);
        assert_eq!(done.completed_at, Some(at));
        assert_eq!(done.note.as_deref(), Some("sent draft"));

        let again = doc.complete_task(id, None, at).unwrap_err();
        assert_eq!(again, DocumentError::TaskAlreadyDone(id));
    }

    #[test]
    fn complete_all_respects_can_skip_flag() {
        let mut doc = doc_with(&[
            ("a", Bucket::Today),
            ("b", Bucket::CanSkip),
            ("c", Bucket::ExtraEnergy),
        ]);
        let at = Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap();
        assert_eq!(doc.complete_all(false, at).len(), 1);
        assert_eq!(doc.count(Bucket::CanSkip), 1);
        assert_eq!(doc.complete_all(true, at).len(), 1);
        assert_eq!(doc.count(Bucket::Done), 2);
        assert_eq!(doc.count(Bucket::ExtraEnergy), 1);
    }

    #[test]
    fn clear_all_keeps_done_archive() {
        let mut doc = doc_with(&[("a", Bucket::Today), ("b", Bucket::CanSkip)]);
        let id = doc.tasks()[0].id;
        doc.complete_task(id, None, Utc::now()).unwrap();
        doc.set_raw("pending thoughts");

        assert_eq!(doc.clear_all(), 1);
        assert_eq!(doc.tasks().len(), 1);
        assert!(doc.raw().is_empty());
    }

    #[test]
    fn validate_enforces_unique_ids_and_cap() {
        let mut doc = doc_with(&[("a", Bucket::Today), ("b", Bucket::Today)]);
        assert_eq!(
            doc.validate(Some(1)),
            Err(DocumentValidationError::TodayOverCapacity { count: 2, max: 1 })
        );

        let duplicate = doc.tasks()[0].clone();
        doc.push(duplicate.clone());
        assert_eq!(
            doc.validate(None),
            Err(DocumentValidationError::DuplicateTaskId(duplicate.id))
        );
    }

    #[test]
    fn normalize_raw_trims_and_escapes_headings() {
        assert_eq!(
            normalize_raw("\n\n  call bob  \n## Today's Tasks\n\n"),
            "  call bob\n\\## Today's Tasks"
        );
        assert_eq!(normalize_raw("\\## Today's Tasks"), "\\## Today's Tasks");
    }

    #[test]
    fn append_raw_stacks_dumps() {
        let mut doc = doc_with(&[]);
        doc.append_raw("first");
        doc.append_raw("   ");
        doc.append_raw("second");
        assert_eq!(doc.raw(), "first\nsecond");
    }

    #[test]
    fn display_style_parse_is_case_insensitive() {
        assert_eq!(DisplayStyle::parse(" Warm "), Some(DisplayStyle::Warm));
        assert_eq!(DisplayStyle::parse("loud"), None);
    }
}
