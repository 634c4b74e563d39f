//! Completed-task summaries.
//!
//! # Responsibility
//! - Aggregate Done tasks by completion day over a date range.
//! - Render the weekly summary markdown.
//!
//! # Invariants
//! - A task id is counted once even when several documents contain it.
//! - Days are reported in ascending order.

use crate::model::document::Document;
use crate::model::task::{Bucket, TaskId};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use std::collections::{BTreeMap, HashSet};

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SummaryRange {
    /// Builds a range; reversed bounds are swapped.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Monday through Sunday of the ISO week containing `date`.
    pub fn iso_week_of(date: NaiveDate) -> Self {
        let offset = u64::from(date.weekday().num_days_from_monday());
        let start = date.checked_sub_days(Days::new(offset)).unwrap_or(date);
        let end = start.checked_add_days(Days::new(6)).unwrap_or(start);
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// First instant of the range.
    pub fn start_at(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// `YYYY-Www` for whole ISO weeks, `start~end` otherwise.
    pub fn label(&self) -> String {
        if self.is_iso_week() {
            let week = self.start.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        } else {
            format!("{}~{}", self.start, self.end)
        }
    }

    /// File name used when writing this summary to disk.
    pub fn file_name(&self) -> String {
        if self.is_iso_week() {
            format!("weekly_{}.md", self.label())
        } else {
            format!("summary_{}_{}.md", self.start, self.end)
        }
    }

    fn is_iso_week(&self) -> bool {
        *self == Self::iso_week_of(self.start)
    }
}

/// One completed task inside a summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryItem {
    pub task_id: TaskId,
    pub title: String,
    pub completed_at: DateTime<Utc>,
}

/// Completed tasks of a range grouped by day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub range: SummaryRange,
    pub days: BTreeMap<NaiveDate, Vec<SummaryItem>>,
}

impl Summary {
    /// Collects Done tasks completed inside `range`. Earlier documents win
    /// when the same id appears more than once.
    pub fn collect<'a>(
        range: SummaryRange,
        documents: impl IntoIterator<Item = &'a Document>,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut days: BTreeMap<NaiveDate, Vec<SummaryItem>> = BTreeMap::new();
        for document in documents {
            for task in document.bucket(Bucket::Done) {
                let Some(completed_at) = task.completed_at else {
                    continue;
                };
                let day = completed_at.date_naive();
                if !range.contains(day) || !seen.insert(task.id) {
                    continue;
                }
                days.entry(day).or_default().push(SummaryItem {
                    task_id: task.id,
                    title: task.title.clone(),
                    completed_at,
                });
            }
        }
        for items in days.values_mut() {
            items.sort_by(|a, b| {
                a.completed_at
                    .cmp(&b.completed_at)
                    .then_with(|| a.title.cmp(&b.title))
            });
        }
        Self { range, days }
    }

    pub fn total(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    pub fn render_markdown(&self) -> String {
        let mut out = format!("# Done Summary — {}\n\n", self.range.label());
        out.push_str(&format!("- Total completed: **{}**\n", self.total()));
        out.push_str(&format!(
            "- Date range: {} ~ {}\n\n## By Day\n\n",
            self.range.start, self.range.end
        ));
        if self.days.is_empty() {
            out.push_str("_Nothing completed in this range._\n");
            return out;
        }
        for (day, items) in &self.days {
            out.push_str(&format!("### {day} ({})\n\n", items.len()));
            for item in items {
                out.push_str(&format!("- {}\n", item.title));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{Summary, SummaryRange};
    use crate::model::document::Document;
    use crate::model::task::{Bucket, Task};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    #[test]
    fn iso_week_bounds_and_label() {
        let week = SummaryRange::iso_week_of(date(10, 17));
        assert_eq!(week.start, date(10, 12));
        assert_eq!(week.end, date(10, 18));
        assert_eq!(week.label(), "2026-W42");
        assert_eq!(week.file_name(), "weekly_2026-W42.md");

        let custom = SummaryRange::new(date(10, 20), date(10, 14));
        assert_eq!(custom.start, date(10, 14));
        assert_eq!(custom.label(), "2026-10-14~2026-10-20");
    }

    #[test]
    fn collect_groups_by_day_and_deduplicates() {
        let mut doc = Document::new(Utc::now());
        for (title, day, hour) in [("b", 16, 10), ("a", 16, 9), ("c", 13, 8), ("old", 1, 8)] {
            let mut task = Task::new(title, Bucket::Today, date(10, 1));
            task.complete(Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0).unwrap());
            doc.push(task);
        }
        doc.push(Task::new("open", Bucket::Today, date(10, 1)));
        let older_copy = doc.clone();

        let summary = Summary::collect(SummaryRange::iso_week_of(date(10, 17)), [&doc, &older_copy]);
        assert_eq!(summary.total(), 3);
        let sixteenth: Vec<&str> = summary.days[&date(10, 16)]
            .iter()
            .map(|item| item.title.as_str())
            .collect();
        assert_eq!(sixteenth, vec!["a", "b"]);

        let markdown = summary.render_markdown();
        assert!(markdown.starts_with("# Done Summary — 2026-W42"));
        assert!(markdown.contains("- Total completed: **3**"));
        assert!(markdown.contains("- Date range: 2026-10-12 ~ 2026-10-18"));
        assert!(markdown.find("### 2026-10-13 (1)").unwrap() < markdown.find("### 2026-10-16 (2)").unwrap());
    }

    #[test]
    fn empty_summary_says_so() {
        let summary = Summary::collect(SummaryRange::iso_week_of(date(10, 17)), std::iter::empty());
        assert_eq!(summary.total(), 0);
        assert!(summary.render_markdown().contains("Nothing completed"));
    }
}
