//! Invisible per-line metadata tokens.
//!
//! # Responsibility
//! - Encode task bookkeeping into an HTML comment appended to the visible line.
//! - Decode a line back into its visible text and optional metadata.
//! - Encode/decode the single document-level token.
//!
//! # Invariants
//! - Stripping every token leaves exactly the human-readable view.
//! - Decoding never fails the caller: malformed tokens yield `None`.
//! - Fields already visible in a task's section are not duplicated.

use crate::model::document::{DisplayStyle, DocumentId};
use crate::model::task::{Bucket, Task, TaskId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

const TASK_TOKEN_PREFIX: &str = "<!-- bd:";
const DOCUMENT_TOKEN_PREFIX: &str = "<!-- braindump:doc ";
const TOKEN_SUFFIX: &str = "-->";

/// Bookkeeping carried by one task line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskMetadata {
    pub id: TaskId,
    pub created: NaiveDate,
    #[serde(default)]
    pub completed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// Present only when the step is not rendered in the visible line.
    #[serde(default)]
    pub first_step: Option<String>,
    /// Present only when the reason is not rendered in the visible line.
    #[serde(default)]
    pub skip_reason: Option<String>,
}

/// Bookkeeping carried by the trailing document line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentMetadata {
    pub id: DocumentId,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub style: DisplayStyle,
}

/// Encodes the token appended after a task's visible line.
pub fn encode(task: &Task) -> String {
    let mut fields = Map::new();
    fields.insert("id".to_string(), Value::String(task.id.to_string()));
    fields.insert(
        "created".to_string(),
        Value::String(task.created_at.format("%Y-%m-%d").to_string()),
    );
    if let Some(completed) = task.completed_at {
        fields.insert(
            "completed".to_string(),
            Value::String(completed.to_rfc3339()),
        );
    }
    insert_optional(&mut fields, "batch", task.batch.as_deref());
    insert_optional(&mut fields, "note", task.note.as_deref());
    if task.bucket != Bucket::Today && !task.first_step.is_empty() {
        fields.insert(
            "first_step".to_string(),
            Value::String(task.first_step.clone()),
        );
    }
    if task.bucket != Bucket::CanSkip {
        insert_optional(&mut fields, "skip_reason", task.skip_reason.as_deref());
    }

    format!("{TASK_TOKEN_PREFIX}{} {TOKEN_SUFFIX}", Value::Object(fields))
}

/// Splits a line into visible text and decoded metadata.
///
/// A token that is present but unreadable is still stripped from the
/// visible text; its metadata decodes to `None`.
pub fn decode(line: &str) -> (&str, Option<TaskMetadata>) {
    let trimmed = line.trim_end();
    let Some(start) = trimmed.rfind(TASK_TOKEN_PREFIX) else {
        return (trimmed, None);
    };

    let visible = trimmed[..start].trim_end();
    let body = &trimmed[start + TASK_TOKEN_PREFIX.len()..];
    let metadata = body
        .strip_suffix(TOKEN_SUFFIX)
        .and_then(|json| serde_json::from_str::<TaskMetadata>(json.trim()).ok());
    (visible, metadata)
}

/// Encodes the document-level token line.
pub fn encode_document(id: DocumentId, generated_at: DateTime<Utc>, style: DisplayStyle) -> String {
    let mut fields = Map::new();
    fields.insert("id".to_string(), Value::String(id.to_string()));
    fields.insert(
        "generated_at".to_string(),
        Value::String(generated_at.to_rfc3339()),
    );
    fields.insert(
        "style".to_string(),
        Value::String(style.as_str().to_string()),
    );
    format!("{DOCUMENT_TOKEN_PREFIX}{} {TOKEN_SUFFIX}", Value::Object(fields))
}

/// Returns whether a line is a document-level token, readable or not.
pub fn is_document_token(line: &str) -> bool {
    line.trim_start().starts_with(DOCUMENT_TOKEN_PREFIX.trim_end())
}

/// Decodes a document-level token; malformed tokens yield `None`.
pub fn decode_document(line: &str) -> Option<DocumentMetadata> {
    let trimmed = line.trim();
    let body = trimmed
        .strip_prefix(DOCUMENT_TOKEN_PREFIX.trim_end())?
        .strip_suffix(TOKEN_SUFFIX)?;
    serde_json::from_str(body.trim()).ok()
}

fn insert_optional(fields: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        fields.insert(key.to_string(), Value::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::{decode, decode_document, encode, encode_document, is_document_token};
    use crate::model::document::DisplayStyle;
    use crate::model::task::{Bucket, Task};
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn task(bucket: Bucket) -> Task {
        let mut task = Task::new(
            "Reply to email",
            bucket,
            NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
        );
        task.set_first_step("open the inbox");
        task.set_note(Some("ask about Friday"));
        task.batch = Some("dump-1".to_string());
        task
    }

    #[test]
    fn encode_then_decode_restores_hidden_fields() {
        let mut task = task(Bucket::Done);
        task.complete(Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 15).unwrap());
        let line = format!("- {} {}", task.title, encode(&task));

        let (visible, metadata) = decode(&line);
        let metadata = metadata.expect("token should decode");
        assert_eq!(visible, "- Reply to email");
        assert_eq!(metadata.id, task.id);
        assert_eq!(metadata.created, task.created_at);
        assert_eq!(metadata.completed, task.completed_at);
        assert_eq!(metadata.note.as_deref(), Some("ask about Friday"));
        assert_eq!(metadata.first_step.as_deref(), Some("open the inbox"));
        assert_eq!(metadata.batch.as_deref(), Some("dump-1"));
    }

    #[test]
    fn visible_fields_are_not_duplicated() {
        let mut today = task(Bucket::Today);
        today.skip_reason = None;
        assert!(!encode(&today).contains("first_step"));

        let mut skipped = task(Bucket::CanSkip);
        skipped.place(Bucket::CanSkip, Some("waiting"));
        assert!(!encode(&skipped).contains("skip_reason"));
    }

    #[test]
    fn corrupted_token_is_stripped_and_decodes_to_none() {
        let (visible, metadata) = decode("- Call bank <!-- bd:{\"id\": 12 -->");
        assert_eq!(visible, "- Call bank");
        assert!(metadata.is_none());

        let (visible, metadata) = decode("- Call bank <!-- bd:{\"id\"");
        assert_eq!(visible, "- Call bank");
        assert!(metadata.is_none());
    }

    #[test]
    fn line_without_token_is_returned_verbatim() {
        let (visible, metadata) = decode("- plain line   ");
        assert_eq!(visible, "- plain line");
        assert!(metadata.is_none());
    }

    #[test]
    fn document_token_roundtrip() {
        let id = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2026, 10, 17, 7, 0, 0).unwrap();
        let line = encode_document(id, at, DisplayStyle::Warm);
        assert!(is_document_token(&line));

        let metadata = decode_document(&line).expect("document token should decode");
        assert_eq!(metadata.id, id);
        assert_eq!(metadata.generated_at, at);
        assert_eq!(metadata.style, DisplayStyle::Warm);

        assert!(is_document_token("<!-- braindump:doc {broken -->"));
        assert!(decode_document("<!-- braindump:doc {broken -->").is_none());
    }
}
