//! Document parse/serialize pair.
//!
//! # Responsibility
//! - Convert persisted task-state text into a typed `Document` and back.
//! - Tolerate hand edits: missing sections, blank lines, legacy line forms,
//!   unknown content (kept verbatim in `extras`).
//!
//! # Invariants
//! - `parse(&serialize(d)) == d` for every document reachable through the
//!   model API or through `parse`.
//! - Sections are always rendered in fixed order: Today, Can Skip, Extra
//!   Energy, Done Archive, then Other Notes when extras exist.
//! - A corrupted metadata token only affects its own line.

use crate::codec::metadata::{self, TaskMetadata};
use crate::model::document::{normalize_raw, Document, DocumentValidationError};
use crate::model::task::{
    normalize_inline, normalize_optional, normalize_title, Bucket, Task, TaskId,
    TaskValidationError,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub const TODAY_HEADING: &str = "## Today's Tasks";
pub const CAN_SKIP_HEADING: &str = "## Can Skip Today";
pub const EXTRA_ENERGY_HEADING: &str = "## If You Have Extra Energy";
pub const DONE_HEADING: &str = "## Done Archive";
pub const NOTES_HEADING: &str = "## Other Notes";

/// Heading texts each section answers to, lowercased. Any other heading
/// opens an unknown block kept in `extras`.
const SECTION_TITLES: [(Section, &[&str]); 5] = [
    (
        Section::Today,
        &["today's tasks", "todays tasks", "today", "do these", "do these today"],
    ),
    (
        Section::CanSkip,
        &["can skip today", "can skip", "parking lot", "parking", "not today"],
    ),
    (
        Section::ExtraEnergy,
        &["if you have extra energy", "extra energy", "if you have energy"],
    ),
    (Section::Done, &["done archive", "just completed", "done"]),
    (Section::Notes, &["other notes"]),
];

const SECTION_SEPARATOR: &str = "---";
const COMPLETED_MARKER: &str = " (completed: ";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Persisted document could not be turned into a valid `Document`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    DuplicateTaskId {
        line: usize,
        id: TaskId,
    },
    InvalidTask {
        line: usize,
        source: TaskValidationError,
    },
    InvalidDocument(DocumentValidationError),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateTaskId { line, id } => {
                write!(f, "line {line}: duplicate task id {id}")
            }
            Self::InvalidTask { line, source } => write!(f, "line {line}: {source}"),
            Self::InvalidDocument(err) => write!(f, "invalid document: {err}"),
        }
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidTask { source, .. } => Some(source),
            Self::InvalidDocument(err) => Some(err),
            Self::DuplicateTaskId { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Today,
    CanSkip,
    ExtraEnergy,
    Done,
    Notes,
    Unknown,
}

/// Task line recognized in the visible grammar, not yet resolved against
/// document defaults.
#[derive(Debug)]
struct PendingTask {
    line: usize,
    bucket: Bucket,
    title: String,
    first_step: String,
    skip_reason: Option<String>,
    completed_on: Option<NaiveDate>,
    metadata: Option<TaskMetadata>,
}

/// Parses persisted text. Lines without a readable document token fall back
/// to the Unix epoch for `generated_at`.
pub fn parse(text: &str) -> Result<Document, ParseError> {
    parse_at(text, DateTime::<Utc>::default())
}

/// Parses persisted text using `fallback_now` when the document token is
/// missing or unreadable.
pub fn parse_at(text: &str, fallback_now: DateTime<Utc>) -> Result<Document, ParseError> {
    let mut section = Section::Preamble;
    let mut raw_lines: Vec<&str> = Vec::new();
    let mut extras: Vec<String> = Vec::new();
    let mut pending: Vec<PendingTask> = Vec::new();
    let mut document_metadata = None;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;

        if metadata::is_document_token(line) {
            if let Some(decoded) = metadata::decode_document(line) {
                document_metadata = Some(decoded);
            }
            continue;
        }

        if let Some(next) = heading_section(line) {
            match (section, next) {
                (Section::Preamble, Section::Unknown) => raw_lines.push(line),
                (_, Section::Unknown) => {
                    section = Section::Unknown;
                    extras.push(line.trim_end().to_string());
                }
                (_, known) => section = known,
            }
            continue;
        }

        if section == Section::Preamble {
            raw_lines.push(line);
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || is_separator(trimmed) {
            continue;
        }

        let recognized = match section {
            Section::Today => parse_today_line(line, line_no, &mut pending),
            Section::CanSkip | Section::ExtraEnergy | Section::Done => {
                match parse_bullet_line(section, line, line_no) {
                    Some(task) => {
                        pending.push(task);
                        true
                    }
                    None => false,
                }
            }
            Section::Notes | Section::Unknown | Section::Preamble => false,
        };
        if !recognized {
            extras.push(line.trim_end().to_string());
        }
    }

    let generated_at = document_metadata
        .as_ref()
        .map_or(fallback_now, |decoded| decoded.generated_at);
    let mut document = Document::new(generated_at);
    if let Some(decoded) = document_metadata {
        document.id = decoded.id;
        document.style = decoded.style;
    }
    document.raw = normalize_raw(&raw_lines.join("\n"));
    document.extras = extras;

    let mut seen = HashSet::new();
    for item in pending {
        let line = item.line;
        let task = resolve_task(item, generated_at);
        if !seen.insert(task.id) {
            return Err(ParseError::DuplicateTaskId { line, id: task.id });
        }
        task.validate()
            .map_err(|source| ParseError::InvalidTask { line, source })?;
        document.tasks.push(task);
    }
    document.sort_by_section();
    document.validate(None).map_err(ParseError::InvalidDocument)?;

    Ok(document)
}

/// Renders a document into its persisted text form.
pub fn serialize(document: &Document) -> String {
    let mut out = String::new();
    if !document.raw.is_empty() {
        out.push_str(&document.raw);
        out.push_str("\n\n");
    }

    out.push_str(TODAY_HEADING);
    out.push_str("\n\n");
    for (index, task) in document.bucket(Bucket::Today).enumerate() {
        let mut line = format!("{}. **{}**", index + 1, task.title);
        if !task.first_step.is_empty() {
            line.push_str(" → ");
            line.push_str(&task.first_step);
        }
        push_task_line(&mut out, &line, task);
    }

    push_section_break(&mut out, CAN_SKIP_HEADING);
    for task in document.bucket(Bucket::CanSkip) {
        let line = match &task.skip_reason {
            Some(reason) => format!("- {} — {}", task.title, reason),
            None => format!("- {}", task.title),
        };
        push_task_line(&mut out, &line, task);
    }

    push_section_break(&mut out, EXTRA_ENERGY_HEADING);
    for task in document.bucket(Bucket::ExtraEnergy) {
        push_task_line(&mut out, &format!("- {}", task.title), task);
    }

    out.push('\n');
    out.push_str(DONE_HEADING);
    out.push_str("\n\n");
    for task in document.bucket(Bucket::Done) {
        let completed_on = task
            .completed_at
            .map(|at| at.date_naive())
            .unwrap_or_else(|| document.generated_at.date_naive());
        let line = format!(
            "- {}{COMPLETED_MARKER}{})",
            task.title,
            completed_on.format(DATE_FORMAT)
        );
        push_task_line(&mut out, &line, task);
    }

    if !document.extras.is_empty() {
        out.push('\n');
        out.push_str(NOTES_HEADING);
        out.push_str("\n\n");
        for line in &document.extras {
            out.push_str(line);
            out.push('\n');
        }
    }

    out.push('\n');
    out.push_str(&metadata::encode_document(
        document.id,
        document.generated_at,
        document.style,
    ));
    out.push('\n');
    out
}

/// Returns whether a line would be consumed as structure (a known section
/// heading or the document token) rather than read as free text.
pub(crate) fn is_structural_line(line: &str) -> bool {
    metadata::is_document_token(line)
        || matches!(heading_section(line), Some(section) if section != Section::Unknown)
}

/// Strips a leading list marker (`- `, `* `, `+ `, `1. `, `1) `).
pub(crate) fn strip_list_marker(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim_start());
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    rest.strip_prefix(". ")
        .or_else(|| rest.strip_prefix(") "))
        .map(str::trim_start)
}

/// Splits a leading checkbox. Returns `Some(true)` for a checked box.
pub(crate) fn split_checkbox(body: &str) -> (Option<bool>, &str) {
    if let Some(rest) = body.strip_prefix("[x]").or_else(|| body.strip_prefix("[X]")) {
        return (Some(true), rest.trim_start());
    }
    if let Some(rest) = body.strip_prefix("[ ]") {
        return (Some(false), rest.trim_start());
    }
    (None, body)
}

fn heading_section(line: &str) -> Option<Section> {
    let trimmed = line.trim();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }

    let text = rest
        .trim()
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .trim_end_matches([':', ' '])
        .replace('’', "'")
        .to_lowercase();
    let section = SECTION_TITLES
        .iter()
        .find(|(_, titles)| titles.contains(&text.as_str()))
        .map_or(Section::Unknown, |(section, _)| *section);
    Some(section)
}

fn is_separator(trimmed: &str) -> bool {
    trimmed.len() >= SECTION_SEPARATOR.len() && trimmed.chars().all(|c| c == '-')
}

fn parse_today_line(line: &str, line_no: usize, pending: &mut Vec<PendingTask>) -> bool {
    let (visible, metadata) = metadata::decode(line);
    let visible = visible.trim();

    // Legacy two-line form: the first step sits on its own `→` line.
    if let Some(step) = visible.strip_prefix('→') {
        if let Some(last) = pending.last_mut() {
            if last.bucket == Bucket::Today && last.first_step.is_empty() {
                last.first_step = normalize_inline(step);
                return true;
            }
        }
        return false;
    }

    let Some(body) = strip_list_marker(visible) else {
        return false;
    };
    let (checkbox, body) = split_checkbox(body);
    if checkbox == Some(true) {
        return match done_task(body, line_no, metadata) {
            Some(task) => {
                pending.push(task);
                true
            }
            None => false,
        };
    }

    let (title, step) = split_today_body(body);
    let title = normalize_title(title);
    if title.is_empty() {
        return false;
    }
    pending.push(PendingTask {
        line: line_no,
        bucket: Bucket::Today,
        title,
        first_step: normalize_inline(step),
        skip_reason: None,
        completed_on: None,
        metadata,
    });
    true
}

fn split_today_body(body: &str) -> (&str, &str) {
    if let Some(after) = body.strip_prefix("**") {
        if let Some((title, step)) = after.split_once("** →") {
            return (title, step.trim());
        }
        if let Some(title) = after.strip_suffix("**") {
            return (title, "");
        }
        if let Some((title, rest)) = after.split_once("**") {
            return (title, rest.trim().trim_start_matches('→').trim());
        }
        return (after, "");
    }
    match body.split_once('→') {
        Some((title, step)) => (title.trim(), step.trim()),
        None => (body, ""),
    }
}

fn parse_bullet_line(section: Section, line: &str, line_no: usize) -> Option<PendingTask> {
    let (visible, metadata) = metadata::decode(line);
    let body = strip_list_marker(visible.trim())?;
    let (checkbox, body) = split_checkbox(body);
    if checkbox == Some(true) || section == Section::Done {
        return done_task(body, line_no, metadata);
    }

    let (title, skip_reason) = match section {
        Section::CanSkip => match body.split_once(" — ") {
            Some((title, reason)) => (title, normalize_optional(Some(reason))),
            None => (body, None),
        },
        _ => (body, None),
    };
    let title = normalize_title(title);
    if title.is_empty() {
        return None;
    }
    let bucket = if section == Section::CanSkip {
        Bucket::CanSkip
    } else {
        Bucket::ExtraEnergy
    };
    Some(PendingTask {
        line: line_no,
        bucket,
        title,
        first_step: String::new(),
        skip_reason,
        completed_on: None,
        metadata,
    })
}

/// Reads a done line body: `Title (completed: date)`, legacy
/// `date — Title`, or a bare title.
fn done_task(body: &str, line_no: usize, metadata: Option<TaskMetadata>) -> Option<PendingTask> {
    let (title, completed_on) = split_done_body(body);
    let title = normalize_title(title);
    if title.is_empty() {
        return None;
    }
    Some(PendingTask {
        line: line_no,
        bucket: Bucket::Done,
        title,
        first_step: String::new(),
        skip_reason: None,
        completed_on,
        metadata,
    })
}

fn split_done_body(body: &str) -> (&str, Option<NaiveDate>) {
    if let Some(inner) = body.strip_suffix(')') {
        if let Some((title, date)) = inner.rsplit_once(COMPLETED_MARKER) {
            if let Ok(date) = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT) {
                return (title, Some(date));
            }
        }
    }

    if body.len() > 10 && body.is_char_boundary(10) {
        if let Ok(date) = NaiveDate::parse_from_str(&body[..10], DATE_FORMAT) {
            let rest = body[10..].trim_start();
            if let Some(title) = rest.strip_prefix('—').or_else(|| rest.strip_prefix('-')) {
                return (title.trim(), Some(date));
            }
        }
    }

    (body, None)
}

fn resolve_task(item: PendingTask, generated_at: DateTime<Utc>) -> Task {
    let metadata = item.metadata;
    let id = metadata.as_ref().map_or_else(Uuid::new_v4, |meta| meta.id);
    let created_at = metadata
        .as_ref()
        .map_or_else(|| generated_at.date_naive(), |meta| meta.created);

    let mut task = Task::with_id(id, &item.title, item.bucket, created_at);
    let hidden_step = metadata
        .as_ref()
        .and_then(|meta| meta.first_step.as_deref())
        .unwrap_or_default();
    let hidden_reason = metadata
        .as_ref()
        .and_then(|meta| normalize_optional(meta.skip_reason.as_deref()));

    match item.bucket {
        Bucket::Done => {
            let completed_at = metadata
                .as_ref()
                .and_then(|meta| meta.completed)
                .or_else(|| {
                    item.completed_on
                        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
                })
                .unwrap_or(generated_at);
            task.complete(completed_at);
            task.set_first_step(hidden_step);
            task.skip_reason = hidden_reason;
        }
        Bucket::Today => {
            task.place(Bucket::Today, None);
            task.set_first_step(&item.first_step);
            task.skip_reason = hidden_reason;
        }
        Bucket::CanSkip => {
            task.place(Bucket::CanSkip, item.skip_reason.as_deref());
            task.set_first_step(hidden_step);
        }
        Bucket::ExtraEnergy => {
            task.place(Bucket::ExtraEnergy, None);
            task.set_first_step(hidden_step);
            task.skip_reason = hidden_reason;
        }
    }

    if let Some(meta) = metadata {
        task.note = normalize_optional(meta.note.as_deref());
        task.batch = normalize_optional(meta.batch.as_deref());
    }
    task
}

fn push_section_break(out: &mut String, heading: &str) {
    out.push('\n');
    out.push_str(SECTION_SEPARATOR);
    out.push_str("\n\n");
    out.push_str(heading);
    out.push_str("\n\n");
}

fn push_task_line(out: &mut String, visible: &str, task: &Task) {
    out.push_str(visible);
    out.push(' ');
    out.push_str(&metadata::encode(task));
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::{parse, parse_at, serialize, split_done_body, strip_list_marker, ParseError};
    use crate::model::document::{DisplayStyle, Document};
    use crate::model::task::{Bucket, Task};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn sample_document() -> Document {
        let mut doc = Document::new(Utc.with_ymd_and_hms(2026, 10, 17, 8, 15, 0).unwrap());
        doc.style = DisplayStyle::Snarky;
        doc.set_raw("call plumber\n\nmaybe clean desk");

        let mut today = Task::new("Reply to email", Bucket::Today, day(15));
        today.set_first_step("open inbox and search for Dana");
        today.set_note(Some("about the invoice"));
        doc.push(today);

        let mut starred = Task::new("Fix *bold* title*", Bucket::Today, day(16));
        starred.set_first_step("look at the ** markers → carefully");
        doc.push(starred);

        let mut skip = Task::new("Renew passport", Bucket::CanSkip, day(10));
        skip.place(Bucket::CanSkip, Some("deadline is next month"));
        skip.set_first_step("find the form");
        doc.push(skip);

        let mut bare_skip = Task::new("Sort photos", Bucket::CanSkip, day(11));
        bare_skip.batch = Some("dump-20261011".to_string());
        doc.push(bare_skip);

        doc.push(Task::new("Read a chapter", Bucket::ExtraEnergy, day(12)));

        let mut done = Task::new("Pay rent (completed: 2026-01-01)", Bucket::Today, day(1));
        done.complete(Utc.with_ymd_and_hms(2026, 10, 16, 21, 5, 7).unwrap());
        doc.push(done);

        doc.extras = vec!["## Someday".to_string(), "  - learn piano".to_string()];
        doc
    }

    #[test]
    fn serialize_then_parse_is_identity() {
        let doc = sample_document();
        let text = serialize(&doc);
        let parsed = parse(&text).expect("serialized document should parse");
        assert_eq!(parsed, doc);
        assert_eq!(serialize(&parsed), text);
    }

    #[test]
    fn serialize_renders_fixed_section_order_and_visible_grammar() {
        let text = serialize(&sample_document());
        let today = text.find("## Today's Tasks").unwrap();
        let skip = text.find("## Can Skip Today").unwrap();
        let extra = text.find("## If You Have Extra Energy").unwrap();
        let done = text.find("## Done Archive").unwrap();
        let notes = text.find("## Other Notes").unwrap();
        assert!(text.starts_with("call plumber"));
        assert!(today < skip && skip < extra && extra < done && done < notes);

        assert!(text.contains("1. **Reply to email** → open inbox and search for Dana <!-- bd:"));
        assert!(text.contains("- Renew passport — deadline is next month <!-- bd:"));
        assert!(text.contains("- Read a chapter <!-- bd:"));
        assert!(text.contains("(completed: 2026-10-16) <!-- bd:"));
    }

    #[test]
    fn empty_document_roundtrips() {
        let doc = Document::new(Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap());
        assert_eq!(parse(&serialize(&doc)).unwrap(), doc);
    }

    #[test]
    fn missing_sections_and_blank_lines_are_tolerated() {
        let text = "\n\n## Can Skip Today\n\n\n- Taxes — after payday\n\n\n";
        let doc = parse(text).unwrap();
        assert_eq!(doc.count(Bucket::Today), 0);
        assert_eq!(doc.count(Bucket::CanSkip), 1);
        let task = doc.bucket(Bucket::CanSkip).next().unwrap();
        assert_eq!(task.title, "Taxes");
        assert_eq!(task.skip_reason.as_deref(), Some("after payday"));
        assert!(doc.raw().is_empty());
    }

    #[test]
    fn hand_written_legacy_document_parses() {
        let text = "\
[2026-10-17 09:00] need to call the bank

## Today's Tasks

1. **Call the bank**
   → find the card number

---

## Can Skip Today

- Clean garage — weekend

---

## If You Have Extra Energy

- Stretch

## Done Archive
- [x] 2026-10-15 — Send report
- [x] Buy milk
";
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        let doc = parse_at(text, now).unwrap();
        assert_eq!(doc.raw(), "[2026-10-17 09:00] need to call the bank");

        let today: Vec<_> = doc.bucket(Bucket::Today).collect();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].title, "Call the bank");
        assert_eq!(today[0].first_step, "find the card number");
        assert_eq!(today[0].created_at, now.date_naive());

        let done: Vec<_> = doc.bucket(Bucket::Done).collect();
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].title, "Send report");
        assert_eq!(
            done[0].completed_at,
            Some(Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(done[1].completed_at, Some(now));
        assert!(doc.extras().is_empty());
    }

    #[test]
    fn unknown_content_is_preserved_in_extras() {
        let text = "## Today's Tasks\n\n(All done!)\n\n## Reading list\n- Dune\n";
        let doc = parse(text).unwrap();
        assert_eq!(
            doc.extras(),
            &["(All done!)".to_string(), "## Reading list".to_string(), "- Dune".to_string()]
        );
        let reparsed = parse(&serialize(&doc)).unwrap();
        assert_eq!(reparsed.extras(), doc.extras());
    }

    #[test]
    fn headings_match_whole_section_titles() {
        let text = "\
## Extras list
- spare cables

## Today's tasks:
1. **Call the bank**

## Not today
- Clean garage

## Doneness notes
- feels good
";
        let doc = parse(text).unwrap();
        assert_eq!(doc.count(Bucket::ExtraEnergy), 0);
        assert_eq!(doc.count(Bucket::Today), 1);
        assert_eq!(doc.count(Bucket::CanSkip), 1);
        assert_eq!(doc.count(Bucket::Done), 0);
        assert_eq!(doc.raw(), "## Extras list\n- spare cables");
        assert_eq!(doc.extras(), ["## Doneness notes", "- feels good"]);

        let mut extras_doc = Document::new(Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap());
        extras_doc.extras = vec!["## Extras list".to_string(), "- spare cables".to_string()];
        assert_eq!(parse(&serialize(&extras_doc)).unwrap(), extras_doc);
    }

    #[test]
    fn corrupted_metadata_only_affects_its_line() {
        let doc = sample_document();
        let text = serialize(&doc);
        let broken = text.replacen("<!-- bd:{", "<!-- bd:{,", 1);
        let parsed = parse(&broken).expect("one bad token must not fail the parse");
        assert_eq!(parsed.tasks().len(), doc.tasks().len());

        let first = &parsed.tasks()[0];
        assert_eq!(first.title, "Reply to email");
        assert_ne!(first.id, doc.tasks()[0].id);
        assert!(first.note.is_none());
        for (parsed_task, original) in parsed.tasks().iter().zip(doc.tasks()).skip(1) {
            assert_eq!(parsed_task, original);
        }
    }

    #[test]
    fn duplicate_ids_fail_the_parse() {
        let mut doc = Document::new(Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap());
        doc.push(Task::new("Once", Bucket::ExtraEnergy, day(17)));
        let text = serialize(&doc);
        let line = text
            .lines()
            .find(|line| line.starts_with("- Once"))
            .unwrap()
            .to_string();
        let duplicated = text.replace(&line, &format!("{line}\n{line}"));

        let err = parse(&duplicated).unwrap_err();
        assert!(matches!(err, ParseError::DuplicateTaskId { .. }));
    }

    #[test]
    fn checked_line_in_active_section_becomes_done() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 18, 0, 0).unwrap();
        let doc = parse_at("## Today's Tasks\n\n- [x] Water plants\n", now).unwrap();
        let task = doc.bucket(Bucket::Done).next().unwrap();
        assert_eq!(task.title, "Water plants");
        assert_eq!(task.completed_at, Some(now));
    }

    #[test]
    fn list_marker_and_done_body_helpers() {
        assert_eq!(strip_list_marker("12) thing"), Some("thing"));
        assert_eq!(strip_list_marker("-nothing"), None);
        assert_eq!(
            split_done_body("Pay (completed: 2026-10-01)"),
            ("Pay", Some(day(1)))
        );
        assert_eq!(split_done_body("plain"), ("plain", None));
    }
}
