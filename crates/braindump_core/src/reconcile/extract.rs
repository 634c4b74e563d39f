//! Raw dump segmentation and carry-over cues.
//!
//! # Responsibility
//! - Split a raw dump into candidate task titles and completion statements.
//! - Recognize bulk completion phrases ("all done") and their scope.
//! - Match dump text against existing task titles.
//! - Detect demotion cues (passed deadline, waiting on someone else).
//!
//! # Invariants
//! - Extraction is pure and deterministic for a given input.
//! - Returned titles are normalized and deduplicated by `normalize_key`.

use crate::codec::markdown::{split_checkbox, strip_list_marker};
use crate::codec::metadata;
use crate::model::task::{normalize_title, Bucket, Task, TaskId};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;

/// Shorter keys only match exactly; longer ones may match by containment.
const MIN_FUZZY_KEY_CHARS: usize = 6;

static TIMESTAMP_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[\d{4}-\d{2}-\d{2}(?:[ T]\d{2}:\d{2}(?::\d{2})?)?\]\s*")
        .expect("timestamp prefix regex must compile")
});
static DATED_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}\s*[—-]\s*").expect("dated prefix regex must compile")
});
static SENTENCE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[.!?;]+(?:\s+|$)|[。！？；]+\s*").expect("sentence break regex must compile")
});
static COMPLETION_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:done|finished|completed)\s*[:：]\s*(.+)$")
        .expect("completion label regex must compile")
});
static COMPLETION_VERB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:i\s+)?(?:just\s+)?(?:finished|completed)\s+(.+)$")
        .expect("completion verb regex must compile")
});
static COMPLETION_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.+?)\s+(?:is|are)\s+(?:done|finished|completed)$")
        .expect("completion suffix regex must compile")
});
static EVERYTHING_DONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:all\s+all\s+done|everything\s+everything\s+(?:is\s+)?done|nothing\s+(?:is\s+)?left|totally\s+done|completely\s+clear(?:ed)?|(?:all|everything)\s+(?:is\s+)?done,?\s+(?:including\s+(?:the\s+)?)?(?:parking(?:\s+lot)?|can\s+skip)(?:\s+too)?)$",
    )
    .expect("everything done regex must compile")
});
static ALL_DONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?:i'?m|i\s+am|we'?re)\s+)?(?:all|everything)\s+(?:is\s+)?(?:done|finished|completed|cleared)$|^(?:i\s+)?(?:finished|completed)\s+(?:(?:it|them)\s+)?(?:all|everything)$|^all\s+clear(?:ed)?$",
    )
    .expect("all done regex must compile")
});
static DEADLINE_CUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:by|due|before|until|deadline:?)\s+(\d{4}-\d{2}-\d{2})\b")
        .expect("deadline regex must compile")
});
static WAITING_CUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:waiting\s+(?:on|for)|blocked\s+by|pending\s+reply|awaiting)\b")
        .expect("waiting regex must compile")
});

/// Which active buckets a bulk completion phrase covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CompleteAllScope {
    Today,
    TodayAndCanSkip,
}

impl CompleteAllScope {
    pub fn covers(self, bucket: Bucket) -> bool {
        match self {
            Self::Today => bucket == Bucket::Today,
            Self::TodayAndCanSkip => matches!(bucket, Bucket::Today | Bucket::CanSkip),
        }
    }

    pub fn includes_can_skip(self) -> bool {
        self == Self::TodayAndCanSkip
    }
}

/// Candidate items found in one raw dump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpExtraction {
    /// Titles the user reported as finished.
    pub completions: Vec<String>,
    /// Titles of things to do, in dump order.
    pub candidates: Vec<String>,
    /// Widest bulk completion phrase found, if any.
    pub complete_all: Option<CompleteAllScope>,
}

impl DumpExtraction {
    pub fn is_empty(&self) -> bool {
        self.completions.is_empty() && self.candidates.is_empty() && self.complete_all.is_none()
    }
}

/// One classified piece of dump text.
enum Segment<'a> {
    Completion(Cow<'a, str>),
    Candidate(&'a str),
    CompleteAll(CompleteAllScope),
}

/// Segments a raw dump into completion statements and candidate tasks.
///
/// A line opening with a checkbox is read whole; other lines are split into
/// sentences, and each sentence may carry its own checkbox.
pub fn extract(raw: &str) -> DumpExtraction {
    let mut extraction = DumpExtraction::default();
    let mut seen_completions = HashSet::new();
    let mut seen_candidates = HashSet::new();

    for line in raw.lines() {
        let Some(body) = clean_line(line) else {
            continue;
        };

        let segments: Vec<Segment<'_>> = if split_checkbox(body).0.is_some() {
            vec![segment(body)]
        } else {
            SENTENCE_BREAK
                .split(body)
                .map(str::trim)
                .filter(|sentence| !sentence.is_empty())
                .map(segment)
                .collect()
        };

        for item in segments {
            match item {
                Segment::Completion(title) => {
                    push_unique(&mut extraction.completions, &mut seen_completions, &title)
                }
                Segment::Candidate(title) => {
                    push_unique(&mut extraction.candidates, &mut seen_candidates, title)
                }
                Segment::CompleteAll(scope) => {
                    extraction.complete_all = extraction.complete_all.max(Some(scope));
                }
            }
        }
    }

    extraction
}

/// Lowercased alphanumeric projection used for title matching.
pub fn normalize_key(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Returns whether two titles refer to the same task.
pub fn titles_match(left: &str, right: &str) -> bool {
    keys_match(&normalize_key(left), &normalize_key(right))
}

/// Finds the task whose title matches `title`; exact key matches win over
/// containment matches.
pub fn find_matching<'a>(title: &str, tasks: impl IntoIterator<Item = &'a Task>) -> Option<TaskId> {
    let key = normalize_key(title);
    if key.is_empty() {
        return None;
    }
    let mut fuzzy = None;
    for task in tasks {
        let candidate = normalize_key(&task.title);
        if candidate == key {
            return Some(task.id);
        }
        if fuzzy.is_none() && keys_match(&key, &candidate) {
            fuzzy = Some(task.id);
        }
    }
    fuzzy
}

/// Returns the skip reason when a carry-over task should bypass the
/// classifier and go straight to Can Skip.
pub fn demotion_reason(task: &Task, today: NaiveDate) -> Option<String> {
    let text = match &task.note {
        Some(note) => format!("{} {}", task.title, note),
        None => task.title.clone(),
    };

    for captures in DEADLINE_CUE.captures_iter(&text) {
        let Some(date) = captures
            .get(1)
            .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok())
        else {
            continue;
        };
        if date < today {
            return Some(format!("deadline passed ({date})"));
        }
    }

    if WAITING_CUE.is_match(&text) {
        return Some("waiting on someone else".to_string());
    }
    None
}

fn keys_match(left: &str, right: &str) -> bool {
    if left.is_empty() || right.is_empty() {
        return false;
    }
    if left == right {
        return true;
    }
    let (short, long) = if left.chars().count() <= right.chars().count() {
        (left, right)
    } else {
        (right, left)
    };
    short.chars().count() >= MIN_FUZZY_KEY_CHARS && long.contains(short)
}

/// Strips bookkeeping and list decoration from one dump line.
fn clean_line(line: &str) -> Option<&str> {
    let (visible, _) = metadata::decode(line);
    let visible = visible.trim().trim_start_matches('\\').trim_start();
    if visible.is_empty() || visible.starts_with('#') || visible.chars().all(|c| c == '-') {
        return None;
    }
    let visible = match TIMESTAMP_PREFIX.find(visible) {
        Some(prefix) => &visible[prefix.end()..],
        None => visible,
    };
    let body = strip_list_marker(visible).unwrap_or(visible).trim();
    (!body.is_empty()).then_some(body)
}

fn segment(text: &str) -> Segment<'_> {
    match split_checkbox(text) {
        (Some(true), rest) => Segment::Completion(DATED_PREFIX.replace(rest, "")),
        (Some(false), rest) => Segment::Candidate(rest),
        (None, text) => {
            let bare = text.trim_end_matches(['.', '!', '?', ';', '。', '！', '？', '；']);
            if EVERYTHING_DONE.is_match(bare) {
                return Segment::CompleteAll(CompleteAllScope::TodayAndCanSkip);
            }
            if ALL_DONE.is_match(bare) {
                return Segment::CompleteAll(CompleteAllScope::Today);
            }
            match completion_title(text) {
                Some(title) => Segment::Completion(Cow::Borrowed(title)),
                None => Segment::Candidate(text),
            }
        }
    }
}

fn completion_title(sentence: &str) -> Option<&str> {
    [&*COMPLETION_LABEL, &*COMPLETION_VERB, &*COMPLETION_SUFFIX]
        .into_iter()
        .find_map(|pattern| pattern.captures(sentence))
        .and_then(|captures| captures.get(1))
        .map(|title| title.as_str().trim())
}

fn push_unique(target: &mut Vec<String>, seen: &mut HashSet<String>, text: &str) {
    let title = normalize_title(text.trim_end_matches(['.', ';', '。', '；']));
    let key = normalize_key(&title);
    if key.is_empty() || !seen.insert(key) {
        return;
    }
    target.push(title);
}
