//! Auditable merge plan and its application.
//!
//! # Responsibility
//! - Describe every bucket move of one reconciliation as a `Transition`.
//! - Apply a plan to a base document to produce the next document.
//!
//! # Invariants
//! - A plan covers every active task of its base exactly once.
//! - Done tasks of the base are carried over untouched.
//! - Plans are never persisted.

use crate::model::document::{normalize_raw, Document};
use crate::model::task::{Bucket, Task, TaskId};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Why a task landed in its target bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionReason {
    /// Reported done in the dump.
    Completed,
    /// Moved to Can Skip before classification; carries the skip reason.
    Demoted(String),
    /// Bucket assigned by the classifier.
    Classified,
    /// Qualified for Today but cut by the selection cap.
    CapReached,
    /// New task parked because the classifier gave no usable answer.
    Unclassified,
    /// Existing bucket kept.
    Retained,
}

impl TransitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Demoted(_) => "demoted",
            Self::Classified => "classified",
            Self::CapReached => "cap_reached",
            Self::Unclassified => "unclassified",
            Self::Retained => "retained",
        }
    }
}

impl Display for TransitionReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Demoted(reason) => f.write_str(reason),
            Self::Classified => f.write_str("classified"),
            Self::CapReached => f.write_str("deferred: selection cap reached"),
            Self::Unclassified => f.write_str("unclassified: classifier unavailable"),
            Self::Retained => f.write_str("retained"),
        }
    }
}

/// One task move. `from_bucket` is `None` for tasks created by this plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub task_id: TaskId,
    pub from_bucket: Option<Bucket>,
    pub to_bucket: Bucket,
    pub reason: TransitionReason,
    /// Replacement first step, when the plan changes it.
    pub first_step: Option<String>,
    /// Skip reason applied when `to_bucket` is Can Skip.
    pub skip_reason: Option<String>,
}

/// Transitions computed for one reconciliation, ordered as the resulting
/// sections should read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub transitions: Vec<Transition>,
    /// Tasks introduced by the dump, before placement.
    pub new_tasks: Vec<Task>,
    pub completed_at: DateTime<Utc>,
    /// Raw capture the plan was computed from.
    pub consumed_raw: String,
}

/// Plan does not fit the document it is applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    UnknownTask(TaskId),
    MissingTask(TaskId),
    DuplicateTransition(TaskId),
    StaleBucket {
        id: TaskId,
        expected: Option<Bucket>,
        actual: Option<Bucket>,
    },
}

impl Display for MergeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTask(id) => write!(f, "plan references unknown task {id}"),
            Self::MissingTask(id) => write!(f, "plan does not place active task {id}"),
            Self::DuplicateTransition(id) => write!(f, "plan moves task {id} twice"),
            Self::StaleBucket {
                id,
                expected,
                actual,
            } => write!(
                f,
                "plan expects task {id} in {} but it is in {}",
                bucket_label(*expected),
                bucket_label(*actual)
            ),
        }
    }
}

impl Error for MergeError {}

impl MergePlan {
    /// Ids moved into `bucket`, in plan order.
    pub fn moved_to(&self, bucket: Bucket) -> impl Iterator<Item = TaskId> + '_ {
        self.transitions
            .iter()
            .filter(move |transition| transition.to_bucket == bucket)
            .map(|transition| transition.task_id)
    }

    pub fn transition(&self, id: TaskId) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|transition| transition.task_id == id)
    }

    /// Applies this plan to `base` and returns the next document.
    ///
    /// # Errors
    /// - `UnknownTask` / `DuplicateTransition` / `StaleBucket` when a
    ///   transition does not match `base`.
    /// - `MissingTask` when an active task of `base` is not placed.
    pub fn apply(&self, base: &Document, now: DateTime<Utc>) -> Result<Document, MergeError> {
        let existing: HashMap<TaskId, &Task> = base
            .tasks()
            .iter()
            .filter(|task| task.bucket.is_active())
            .map(|task| (task.id, task))
            .collect();
        let created: HashMap<TaskId, &Task> =
            self.new_tasks.iter().map(|task| (task.id, task)).collect();

        let mut moved = HashSet::new();
        let mut placed: Vec<Task> = Vec::with_capacity(self.transitions.len());
        for transition in &self.transitions {
            let id = transition.task_id;
            if !moved.insert(id) {
                return Err(MergeError::DuplicateTransition(id));
            }
            let source = match (existing.get(&id), created.get(&id)) {
                (Some(task), _) => {
                    if transition.from_bucket != Some(task.bucket) {
                        return Err(MergeError::StaleBucket {
                            id,
                            expected: transition.from_bucket,
                            actual: Some(task.bucket),
                        });
                    }
                    *task
                }
                (None, Some(task)) => {
                    if transition.from_bucket.is_some() {
                        return Err(MergeError::StaleBucket {
                            id,
                            expected: transition.from_bucket,
                            actual: None,
                        });
                    }
                    *task
                }
                (None, None) => return Err(MergeError::UnknownTask(id)),
            };

            let mut task = source.clone();
            match transition.to_bucket {
                Bucket::Done => task.complete(self.completed_at),
                bucket if bucket == task.bucket && transition.skip_reason == task.skip_reason => {}
                bucket => task.place(bucket, transition.skip_reason.as_deref()),
            }
            if let Some(step) = &transition.first_step {
                task.set_first_step(step);
            }
            placed.push(task);
        }

        if let Some(missing) = existing.keys().find(|id| !moved.contains(*id)) {
            return Err(MergeError::MissingTask(*missing));
        }

        let mut next = base.clone();
        next.generated_at = now;
        next.tasks = base.tasks().iter().filter(|task| task.is_done()).cloned().collect();
        next.tasks.extend(placed);
        next.sort_by_section();
        next.raw = remaining_raw(base.raw(), &self.consumed_raw);
        Ok(next)
    }
}

/// Raw capture left after consuming `consumed`; text appended after the
/// plan was computed survives.
fn remaining_raw(current: &str, consumed: &str) -> String {
    if consumed.is_empty() {
        return current.to_string();
    }
    match current.strip_prefix(consumed) {
        Some(rest) => normalize_raw(rest),
        None => current.to_string(),
    }
}

fn bucket_label(bucket: Option<Bucket>) -> &'static str {
    bucket.map_or("no bucket", Bucket::as_str)
}

#[cfg(test)]
mod tests {
    use super::{MergeError, MergePlan, Transition, TransitionReason};
    use crate::model::document::Document;
    use crate::model::task::{Bucket, Task};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn move_to(task: &Task, to: Bucket, reason: TransitionReason) -> Transition {
        Transition {
            task_id: task.id,
            from_bucket: Some(task.bucket),
            to_bucket: to,
            reason,
            first_step: None,
            skip_reason: None,
        }
    }

    fn plan(transitions: Vec<Transition>, new_tasks: Vec<Task>, consumed: &str) -> MergePlan {
        MergePlan {
            transitions,
            new_tasks,
            completed_at: Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap(),
            consumed_raw: consumed.to_string(),
        }
    }

    #[test]
    fn apply_moves_tasks_and_keeps_archive() {
        let mut base = Document::new(Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap());
        let a = Task::new("a", Bucket::Today, day());
        let b = Task::new("b", Bucket::Today, day());
        let mut old = Task::new("old", Bucket::Today, day());
        old.complete(Utc.with_ymd_and_hms(2026, 10, 15, 8, 0, 0).unwrap());
        base.push(a.clone());
        base.push(b.clone());
        base.push(old.clone());
        base.set_raw("done: a\nnew thing");

        let fresh = Task::new("new thing", Bucket::CanSkip, day());
        let mut park = Transition {
            task_id: fresh.id,
            from_bucket: None,
            to_bucket: Bucket::CanSkip,
            reason: TransitionReason::Unclassified,
            first_step: None,
            skip_reason: Some(TransitionReason::Unclassified.to_string()),
        };
        park.first_step = Some("look at it".to_string());
        let plan = plan(
            vec![
                move_to(&a, Bucket::Done, TransitionReason::Completed),
                move_to(&b, Bucket::Today, TransitionReason::Retained),
                park,
            ],
            vec![fresh.clone()],
            "done: a\nnew thing",
        );

        let now = Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap();
        let next = plan.apply(&base, now).unwrap();
        assert_eq!(next.generated_at, now);
        assert!(next.raw().is_empty());
        assert_eq!(next.find(a.id).unwrap().completed_at, Some(now));
        assert_eq!(next.find(old.id), Some(&old));
        let parked = next.find(fresh.id).unwrap();
        assert_eq!(
            parked.skip_reason.as_deref(),
            Some("unclassified: classifier unavailable")
        );
        assert_eq!(parked.first_step, "look at it");
        assert!(next.validate(Some(5)).is_ok());
    }

    #[test]
    fn apply_keeps_raw_appended_after_planning() {
        let mut base = Document::new(Utc::now());
        base.set_raw("first dump\nsecond dump");
        let next = plan(vec![], vec![], "first dump").apply(&base, Utc::now()).unwrap();
        assert_eq!(next.raw(), "second dump");

        let kept = plan(vec![], vec![], "something else").apply(&base, Utc::now()).unwrap();
        assert_eq!(kept.raw(), "first dump\nsecond dump");
    }

    #[test]
    fn apply_rejects_incomplete_or_stale_plans() {
        let mut base = Document::new(Utc::now());
        let a = Task::new("a", Bucket::Today, day());
        let b = Task::new("b", Bucket::CanSkip, day());
        base.push(a.clone());
        base.push(b.clone());

        let missing = plan(vec![move_to(&a, Bucket::Today, TransitionReason::Retained)], vec![], "");
        assert_eq!(
            missing.apply(&base, Utc::now()),
            Err(MergeError::MissingTask(b.id))
        );

        let mut stale_move = move_to(&b, Bucket::Today, TransitionReason::Classified);
        stale_move.from_bucket = Some(Bucket::ExtraEnergy);
        let stale = plan(
            vec![move_to(&a, Bucket::Today, TransitionReason::Retained), stale_move],
            vec![],
            "",
        );
        assert!(matches!(
            stale.apply(&base, Utc::now()),
            Err(MergeError::StaleBucket { .. })
        ));

        let twice = plan(
            vec![
                move_to(&a, Bucket::Today, TransitionReason::Retained),
                move_to(&a, Bucket::CanSkip, TransitionReason::CapReached),
            ],
            vec![],
            "",
        );
        assert_eq!(
            twice.apply(&base, Utc::now()),
            Err(MergeError::DuplicateTransition(a.id))
        );

        let stranger = Task::new("x", Bucket::Today, day());
        let unknown = plan(vec![move_to(&stranger, Bucket::Today, TransitionReason::Retained)], vec![], "");
        assert_eq!(
            unknown.apply(&base, Utc::now()),
            Err(MergeError::UnknownTask(stranger.id))
        );
    }
}
