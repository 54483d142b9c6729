//! CSV exports, one row per record with the record's field names as header.

use crate::github::PullRequestSummary;
use crate::types::{Comment, Contributor, Issue, ItemState, ReviewEvent};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A record type with a fixed CSV column set, in serialization order.
pub trait CsvRecord: Serialize {
    const HEADER: &'static [&'static str];
}

impl<T: CsvRecord> CsvRecord for &T {
    const HEADER: &'static [&'static str] = T::HEADER;
}

impl CsvRecord for Contributor {
    const HEADER: &'static [&'static str] = &["login", "contributions"];
}

impl CsvRecord for ReviewEvent {
    const HEADER: &'static [&'static str] = &["pr", "reviewer", "state", "submitted_at"];
}

impl CsvRecord for Comment {
    const HEADER: &'static [&'static str] = &[
        "pr",
        "comment_id",
        "commenter",
        "created_at",
        "updated_at",
        "path",
        "type",
        "body",
    ];
}

/// Writes `records` to `dir/filename`, replacing any existing file.
///
/// An empty record list still produces a header-only file so the set of exports and their
/// columns are stable.
pub fn write_csv<T: CsvRecord>(dir: &Path, filename: &str, records: &[T]) -> Result<PathBuf> {
    let path = dir.join(filename);
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    if records.is_empty() {
        writer
            .write_record(T::HEADER)
            .with_context(|| format!("Failed to write the header of {}", path.display()))?;
    }

    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("Failed to write a row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;

    tracing::info!(file = %path.display(), rows = records.len(), "Saved CSV");
    Ok(path)
}

/// Pull request row with the user lists flattened into `;`-separated cells.
#[derive(Debug, Serialize)]
pub struct PullRequestRow<'a> {
    pub number: u64,
    pub title: &'a str,
    pub author: Option<&'a str>,
    pub state: ItemState,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub time_to_merge_days: Option<f64>,
    pub total_reviews: usize,
    pub total_review_comments: usize,
    pub total_issue_comments: usize,
    pub total_comments: usize,
    pub reviewers: String,
    pub commenters: String,
}

impl CsvRecord for PullRequestRow<'_> {
    const HEADER: &'static [&'static str] = &[
        "number",
        "title",
        "author",
        "state",
        "created_at",
        "closed_at",
        "merged_at",
        "time_to_merge_days",
        "total_reviews",
        "total_review_comments",
        "total_issue_comments",
        "total_comments",
        "reviewers",
        "commenters",
    ];
}

impl<'a> From<&'a PullRequestSummary> for PullRequestRow<'a> {
    fn from(s: &'a PullRequestSummary) -> Self {
        Self {
            number: s.number,
            title: &s.title,
            author: s.author.as_deref(),
            state: s.state,
            created_at: s.created_at,
            closed_at: s.closed_at,
            merged_at: s.merged_at,
            time_to_merge_days: s.time_to_merge_days,
            total_reviews: s.total_reviews,
            total_review_comments: s.total_review_comments,
            total_issue_comments: s.total_issue_comments,
            total_comments: s.total_comments,
            reviewers: s.reviewers.join(";"),
            commenters: s.commenters.join(";"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IssueRow<'a> {
    pub number: u64,
    pub title: &'a str,
    pub state: ItemState,
    pub author: Option<&'a str>,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<&'a str>,
}

impl CsvRecord for IssueRow<'_> {
    const HEADER: &'static [&'static str] = &[
        "number",
        "title",
        "state",
        "author",
        "created_at",
        "closed_at",
        "closed_by",
    ];
}

impl<'a> From<&'a Issue> for IssueRow<'a> {
    fn from(i: &'a Issue) -> Self {
        Self {
            number: i.number,
            title: &i.title,
            state: i.state,
            author: i.author.as_deref(),
            created_at: i.created_at,
            closed_at: i.closed_at,
            closed_by: i.closed_by.as_deref(),
        }
    }
}

/// Review comments followed by issue comments, for a single combined export.
pub fn all_comments<'a>(review: &'a [Comment], issue: &'a [Comment]) -> Vec<&'a Comment> {
    review.iter().chain(issue).collect()
}
