//! Reconciliation cycle state machine.
//!
//! # Responsibility
//! - Drive one cycle `Idle -> CollectingCarryOver -> Classifying -> Merging
//!   -> Committed` from a base document and its raw capture.
//! - Apply precedence: dump completions, then demotion cues, then
//!   classification, then the Today cap.
//! - Degrade to a deterministic fallback when the classifier fails.
//!
//! # Invariants
//! - The classifier is called at most once per cycle and never while the
//!   caller holds the document lock.
//! - Every produced plan leaves `|Today| <= max_today`.
//! - Planning against a newer document reuses the obtained classification.

use crate::classifier::{
    classify_batch, Assignment, Classifier, ClassifierError, ClassifyRequest,
    PriorDocumentSummary, TaskDraft,
};
use crate::model::document::Document;
use crate::model::task::{Bucket, Task, TaskId};
use crate::reconcile::extract::{self, demotion_reason, find_matching, titles_match};
use crate::reconcile::plan::{MergeError, MergePlan, Transition, TransitionReason};
use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Skip reason for tasks the classifier parked without an explanation.
pub const DEFAULT_SKIP_REASON: &str = "not today";

/// Order applied between Today candidates of equal ease.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    OldestFirst,
    NewestFirst,
}

impl TieBreak {
    fn compare(self, left: NaiveDate, right: NaiveDate) -> Ordering {
        match self {
            Self::OldestFirst => left.cmp(&right),
            Self::NewestFirst => right.cmp(&left),
        }
    }
}

/// Engine knobs taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_today: usize,
    pub tie_break: TieBreak,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_today: 5,
            tie_break: TieBreak::default(),
        }
    }
}

/// Cycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Idle,
    CollectingCarryOver,
    Classifying,
    Merging,
    Committed,
}

impl ReconcileState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CollectingCarryOver => "collecting_carry_over",
            Self::Classifying => "classifying",
            Self::Merging => "merging",
            Self::Committed => "committed",
        }
    }

    fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::CollectingCarryOver)
                | (Self::CollectingCarryOver, Self::Classifying)
                | (Self::Classifying, Self::Merging)
                | (Self::Merging, Self::Merging)
                | (Self::Merging, Self::Committed)
        )
    }
}

/// Result of the classification step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationOutcome {
    /// Nothing needed classification; existing buckets stand.
    Skipped,
    Assigned(Vec<Assignment>),
    /// Classifier failed; the deterministic fallback applies.
    Fallback(ClassifierError),
}

/// Engine misuse or a plan that no longer fits its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    InvalidState {
        from: ReconcileState,
        to: ReconcileState,
    },
    Merge(MergeError),
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidState { from, to } => write!(
                f,
                "invalid reconcile transition {} -> {}",
                from.as_str(),
                to.as_str()
            ),
            Self::Merge(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Merge(err) => Some(err),
            Self::InvalidState { .. } => None,
        }
    }
}

impl From<MergeError> for ReconcileError {
    fn from(value: MergeError) -> Self {
        Self::Merge(value)
    }
}

/// Where one task should land, before the cap is applied.
struct Placement {
    task_id: TaskId,
    from_bucket: Option<Bucket>,
    bucket: Bucket,
    reason: TransitionReason,
    first_step: Option<String>,
    skip_reason: Option<String>,
    created_at: NaiveDate,
    /// Classifier rank; `None` keeps the existing Today position.
    rank: Option<Rank>,
}

/// Classifier ordering of one Today candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rank {
    ease: Option<u32>,
    position: usize,
}

impl Rank {
    /// Eased entries first by ease, then the tie-break on `created`;
    /// entries without ease follow in response order.
    fn compare(
        self,
        other: Self,
        created: (NaiveDate, NaiveDate),
        tie_break: TieBreak,
    ) -> Ordering {
        match (self.ease, other.ease) {
            (Some(left), Some(right)) => left
                .cmp(&right)
                .then_with(|| tie_break.compare(created.0, created.1))
                .then_with(|| self.position.cmp(&other.position)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.position.cmp(&other.position),
        }
    }
}

/// One reconciliation cycle.
pub struct Reconciliation {
    state: ReconcileState,
    settings: EngineSettings,
    now: DateTime<Utc>,
    consumed_raw: String,
    /// Active tasks of the base reported done in the dump.
    completed: HashSet<TaskId>,
    /// Tasks created from the dump: new candidates, then unmatched completions.
    new_tasks: Vec<Task>,
    request: ClassifyRequest,
    outcome: Option<ClassificationOutcome>,
}

impl Reconciliation {
    /// Collects carry-over from `base` and segments its raw capture.
    pub fn begin(base: &Document, settings: EngineSettings, now: DateTime<Utc>) -> Self {
        let mut cycle = Self {
            state: ReconcileState::Idle,
            settings,
            now,
            consumed_raw: base.raw().to_string(),
            completed: HashSet::new(),
            new_tasks: Vec::new(),
            request: ClassifyRequest {
                raw_dump: base.raw().to_string(),
                carry_over: Vec::new(),
                new_tasks: Vec::new(),
                max_today: settings.max_today,
                context: PriorDocumentSummary::of(base),
            },
            outcome: None,
        };
        cycle.enter(ReconcileState::CollectingCarryOver);

        let today = now.date_naive();
        let batch = format!("dump-{}", now.format("%Y%m%dT%H%M%S"));
        let extraction = extract::extract(base.raw());
        let active: Vec<&Task> = base.active_tasks().collect();

        let mut completed_new = Vec::new();
        for title in &extraction.completions {
            let open = active
                .iter()
                .copied()
                .filter(|task| !cycle.completed.contains(&task.id));
            match find_matching(title, open) {
                Some(id) => {
                    cycle.completed.insert(id);
                }
                None => {
                    let mut task = Task::new(title, Bucket::CanSkip, today);
                    task.batch = Some(batch.clone());
                    completed_new.push(task);
                }
            }
        }

        if let Some(scope) = extraction.complete_all {
            let before = cycle.completed.len();
            cycle.completed.extend(
                active
                    .iter()
                    .filter(|task| scope.covers(task.bucket))
                    .map(|task| task.id),
            );
            info!(
                "event=dump_complete_all module=reconcile status=ok include_can_skip={} completed={}",
                scope.includes_can_skip(),
                cycle.completed.len() - before
            );
        }

        for task in &active {
            if cycle.completed.contains(&task.id) || demotion_reason(task, today).is_some() {
                continue;
            }
            cycle.request.carry_over.push(TaskDraft::carry_over(task));
        }

        for title in &extraction.candidates {
            if active.iter().any(|task| titles_match(&task.title, title)) {
                continue;
            }
            let mut task = Task::new(title, Bucket::CanSkip, today);
            task.batch = Some(batch.clone());
            cycle.request.new_tasks.push(TaskDraft::new_task(&task));
            cycle.new_tasks.push(task);
        }
        cycle.new_tasks.extend(completed_new);

        if base.raw().trim().is_empty() || cycle.request.is_empty() {
            cycle.outcome = Some(ClassificationOutcome::Skipped);
        }

        info!(
            "event=reconcile_collect module=reconcile status=ok carry_over={} completed={} new_tasks={}",
            cycle.request.carry_over.len(),
            cycle.completed.len(),
            cycle.request.new_tasks.len()
        );
        cycle
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// Request the classifier receives (or would receive).
    pub fn request(&self) -> &ClassifyRequest {
        &self.request
    }

    pub fn outcome(&self) -> Option<&ClassificationOutcome> {
        self.outcome.as_ref()
    }

    /// Runs the classification step. Skipped cycles do not call out.
    pub fn classify(&mut self, classifier: &dyn Classifier) -> Result<(), ReconcileError> {
        self.advance(ReconcileState::Classifying)?;
        if self.outcome.is_some() {
            return Ok(());
        }

        let outcome = match classify_batch(classifier, &self.request) {
            Ok(assignments) => ClassificationOutcome::Assigned(assignments),
            Err(err) => {
                warn!(
                    "event=classifier_call module=reconcile status=fallback error_kind={}",
                    err.kind()
                );
                ClassificationOutcome::Fallback(err)
            }
        };
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Builds the merge plan against `current`, which may be newer than the
    /// base this cycle started from.
    pub fn plan(&mut self, current: &Document) -> Result<MergePlan, ReconcileError> {
        self.advance(ReconcileState::Merging)?;
        let today = self.now.date_naive();
        let assigned: HashMap<TaskId, &Assignment> = match &self.outcome {
            Some(ClassificationOutcome::Assigned(assignments)) => assignments
                .iter()
                .map(|assignment| (assignment.task_id, assignment))
                .collect(),
            _ => HashMap::new(),
        };
        let fallback = matches!(self.outcome, Some(ClassificationOutcome::Fallback(_)));

        let mut done = Vec::new();
        let mut placements = Vec::new();
        for task in current.active_tasks() {
            if self.completed.contains(&task.id) {
                done.push(completion(task.id, Some(task.bucket)));
                continue;
            }
            if let Some(reason) = demotion_reason(task, today) {
                placements.push(Placement {
                    task_id: task.id,
                    from_bucket: Some(task.bucket),
                    bucket: Bucket::CanSkip,
                    skip_reason: Some(reason.clone()),
                    reason: TransitionReason::Demoted(reason),
                    first_step: None,
                    created_at: task.created_at,
                    rank: None,
                });
                continue;
            }
            placements.push(match assigned.get(&task.id) {
                Some(assignment) => classified(task, Some(task.bucket), assignment),
                None => Placement {
                    task_id: task.id,
                    from_bucket: Some(task.bucket),
                    bucket: task.bucket,
                    reason: TransitionReason::Retained,
                    first_step: None,
                    skip_reason: task.skip_reason.clone(),
                    created_at: task.created_at,
                    rank: None,
                },
            });
        }

        let requested_new: HashSet<TaskId> =
            self.request.new_tasks.iter().map(|draft| draft.task_id).collect();
        for task in &self.new_tasks {
            if !requested_new.contains(&task.id) {
                done.push(completion(task.id, None));
                continue;
            }
            placements.push(match assigned.get(&task.id) {
                Some(assignment) => classified(task, None, assignment),
                None => {
                    let reason = if fallback {
                        TransitionReason::Unclassified
                    } else {
                        TransitionReason::Retained
                    };
                    Placement {
                        task_id: task.id,
                        from_bucket: None,
                        bucket: Bucket::CanSkip,
                        skip_reason: Some(TransitionReason::Unclassified.to_string()),
                        reason,
                        first_step: None,
                        created_at: task.created_at,
                        rank: None,
                    }
                }
            });
        }

        let transitions = self.arrange(done, placements);
        Ok(MergePlan {
            transitions,
            new_tasks: self.new_tasks.clone(),
            completed_at: self.now,
            consumed_raw: self.consumed_raw.clone(),
        })
    }

    /// Applies `plan` to `current` and finishes the cycle.
    pub fn commit(&mut self, current: &Document, plan: &MergePlan) -> Result<Document, ReconcileError> {
        let next = plan.apply(current, self.now)?;
        self.advance(ReconcileState::Committed)?;
        Ok(next)
    }

    /// Orders transitions section by section and enforces the Today cap.
    fn arrange(&self, done: Vec<Transition>, placements: Vec<Placement>) -> Vec<Transition> {
        let (today, others): (Vec<Placement>, Vec<Placement>) = placements
            .into_iter()
            .partition(|placement| placement.bucket == Bucket::Today);
        let (kept, overflow) = enforce_cap(today, self.settings);
        if !overflow.is_empty() {
            info!(
                "event=cap_enforced module=reconcile status=ok max_today={} deferred={}",
                self.settings.max_today,
                overflow.len()
            );
        }

        let mut transitions = done;
        transitions.extend(kept.into_iter().map(Placement::into_transition));
        for bucket in [Bucket::CanSkip, Bucket::ExtraEnergy] {
            transitions.extend(
                others
                    .iter()
                    .filter(|placement| placement.bucket == bucket)
                    .map(Placement::to_transition),
            );
            if bucket == Bucket::CanSkip {
                transitions.extend(overflow.iter().map(|placement| Transition {
                    task_id: placement.task_id,
                    from_bucket: placement.from_bucket,
                    to_bucket: Bucket::CanSkip,
                    reason: TransitionReason::CapReached,
                    first_step: placement.first_step.clone(),
                    skip_reason: Some(TransitionReason::CapReached.to_string()),
                }));
            }
        }
        transitions
    }

    fn advance(&mut self, next: ReconcileState) -> Result<(), ReconcileError> {
        if !self.state.can_advance_to(next) {
            warn!(
                "event=reconcile_state module=reconcile status=error from={} to={}",
                self.state.as_str(),
                next.as_str()
            );
            return Err(ReconcileError::InvalidState {
                from: self.state,
                to: next,
            });
        }
        self.enter(next);
        Ok(())
    }

    fn enter(&mut self, next: ReconcileState) {
        info!(
            "event=reconcile_state module=reconcile status=ok from={} to={}",
            self.state.as_str(),
            next.as_str()
        );
        self.state = next;
    }
}

impl Placement {
    fn to_transition(&self) -> Transition {
        Transition {
            task_id: self.task_id,
            from_bucket: self.from_bucket,
            to_bucket: self.bucket,
            reason: self.reason.clone(),
            first_step: self.first_step.clone(),
            skip_reason: self.skip_reason.clone(),
        }
    }

    fn into_transition(self) -> Transition {
        Transition {
            task_id: self.task_id,
            from_bucket: self.from_bucket,
            to_bucket: self.bucket,
            reason: self.reason,
            first_step: self.first_step,
            skip_reason: self.skip_reason,
        }
    }
}

/// Runs a full cycle without interleaving mutations: begin, classify, plan,
/// commit against the same document.
pub fn reconcile(
    base: &Document,
    classifier: &dyn Classifier,
    settings: EngineSettings,
    now: DateTime<Utc>,
) -> Result<(Document, MergePlan), ReconcileError> {
    let mut cycle = Reconciliation::begin(base, settings, now);
    cycle.classify(classifier)?;
    let plan = cycle.plan(base)?;
    let next = cycle.commit(base, &plan)?;
    Ok((next, plan))
}

fn completion(task_id: TaskId, from_bucket: Option<Bucket>) -> Transition {
    Transition {
        task_id,
        from_bucket,
        to_bucket: Bucket::Done,
        reason: TransitionReason::Completed,
        first_step: None,
        skip_reason: None,
    }
}

fn classified(task: &Task, from_bucket: Option<Bucket>, assignment: &Assignment) -> Placement {
    let skip_reason = (assignment.bucket == Bucket::CanSkip).then(|| {
        assignment
            .reason
            .clone()
            .or_else(|| task.skip_reason.clone())
            .unwrap_or_else(|| DEFAULT_SKIP_REASON.to_string())
    });
    Placement {
        task_id: task.id,
        from_bucket,
        bucket: assignment.bucket,
        reason: TransitionReason::Classified,
        first_step: Some(assignment.first_step.clone()),
        skip_reason,
        created_at: task.created_at,
        rank: Some(Rank {
            ease: assignment.ease,
            position: assignment.position,
        }),
    }
}

/// Splits Today placements into kept (final order) and overflow.
///
/// Ranked placements come first in `Rank` order, then id. Unranked
/// placements keep their document order; when they do not all fit,
/// survivors are chosen by the tie-break.
fn enforce_cap(today: Vec<Placement>, settings: EngineSettings) -> (Vec<Placement>, Vec<Placement>) {
    let (mut ranked, unranked): (Vec<Placement>, Vec<Placement>) =
        today.into_iter().partition(|placement| placement.rank.is_some());
    ranked.sort_by(|a, b| {
        let order = match (a.rank, b.rank) {
            (Some(left), Some(right)) => {
                left.compare(right, (a.created_at, b.created_at), settings.tie_break)
            }
            _ => Ordering::Equal,
        };
        order.then_with(|| a.task_id.cmp(&b.task_id))
    });

    let mut kept = Vec::new();
    let mut overflow = Vec::new();
    for placement in ranked {
        if kept.len() < settings.max_today {
            kept.push(placement);
        } else {
            overflow.push(placement);
        }
    }

    let room = settings.max_today.saturating_sub(kept.len());
    let survivors: HashSet<TaskId> = if unranked.len() <= room {
        unranked.iter().map(|placement| placement.task_id).collect()
    } else {
        let mut by_age: Vec<&Placement> = unranked.iter().collect();
        by_age.sort_by(|a, b| {
            settings
                .tie_break
                .compare(a.created_at, b.created_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        by_age
            .into_iter()
            .take(room)
            .map(|placement| placement.task_id)
            .collect()
    };
    for placement in unranked {
        if survivors.contains(&placement.task_id) {
            kept.push(placement);
        } else {
            overflow.push(placement);
        }
    }
    (kept, overflow)
}
