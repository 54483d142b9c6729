use crate::github::PullRequestSummary;
use crate::types::{Commit, Issue, IssueEvent, ItemState, PullRequest};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Commit counts keyed by calendar day (UTC) and by author display name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommitActivity {
    pub by_date: BTreeMap<NaiveDate, u64>,
    pub by_author: BTreeMap<String, u64>,
}

impl CommitActivity {
    /// Number of commits that made it into the maps.
    pub fn parsed_commits(&self) -> u64 {
        self.by_date.values().sum()
    }
}

/// One row of the reviewer table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerCount {
    pub user: String,
    pub interactions: u64,
}

/// Groups commits by day and by author.
///
/// Commits without a parseable author timestamp are skipped, so both maps always sum to the
/// same total.
pub fn group_commits_by_date_and_author(commits: &[Commit]) -> CommitActivity {
    let mut activity = CommitActivity::default();

    for commit in commits {
        let Some(timestamp) = commit.timestamp else {
            tracing::warn!(sha = %commit.sha, "Skipping commit without a valid author date");
            continue;
        };
        *activity.by_date.entry(timestamp.date_naive()).or_default() += 1;
        *activity
            .by_author
            .entry(commit.display_author().to_string())
            .or_default() += 1;
    }

    activity
}

/// Who closed an issue: `closed_by` if known, else the actor of its most recent `closed` event.
pub fn resolve_closer<'a>(issue: &'a Issue, events: Option<&'a [IssueEvent]>) -> Option<&'a str> {
    if let Some(closer) = issue.closed_by.as_deref() {
        return Some(closer);
    }
    events?
        .iter()
        .rev()
        .filter(|ev| ev.event.as_deref() == Some("closed"))
        .find_map(|ev| ev.actor.as_deref())
}

/// Counts closed issues per closing user.
///
/// `closing_events` holds the event timelines of closed issues without a `closed_by` user.
/// Issues whose closer can't be resolved are left out.
pub fn issues_fixed_by(
    issues: &[Issue],
    closing_events: &HashMap<u64, Vec<IssueEvent>>,
) -> BTreeMap<String, u64> {
    let mut fixed = BTreeMap::new();

    for issue in issues.iter().filter(|i| i.state == ItemState::Closed) {
        let events = closing_events.get(&issue.number).map(Vec::as_slice);
        if let Some(closer) = resolve_closer(issue, events) {
            *fixed.entry(closer.to_string()).or_default() += 1;
        }
    }

    fixed
}

/// Counts every appearance of a user as reviewer or commenter, most active first.
pub fn top_reviewers_table(summaries: &[PullRequestSummary]) -> Vec<ReviewerCount> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();

    for summary in summaries {
        for user in summary.reviewers.iter().chain(&summary.commenters) {
            *counts.entry(user.as_str()).or_default() += 1;
        }
    }

    let mut table: Vec<ReviewerCount> = counts
        .into_iter()
        .map(|(user, interactions)| ReviewerCount {
            user: user.to_string(),
            interactions,
        })
        .collect();
    table.sort_by(|a, b| {
        b.interactions
            .cmp(&a.interactions)
            .then_with(|| a.user.cmp(&b.user))
    });
    table
}

/// The `n` authors with the most commits, most active first.
pub fn top_authors(activity: &CommitActivity, n: usize) -> Vec<(String, u64)> {
    let mut authors: Vec<(String, u64)> = activity
        .by_author
        .iter()
        .map(|(author, count)| (author.clone(), *count))
        .collect();
    authors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    authors.truncate(n);
    authors
}

/// Pull requests opened per calendar day. Pull requests without a creation date are left out.
pub fn pull_requests_per_day(pull_requests: &[PullRequest]) -> BTreeMap<NaiveDate, u64> {
    let mut per_day = BTreeMap::new();
    for created_at in pull_requests.iter().filter_map(|pr| pr.created_at) {
        *per_day.entry(created_at.date_naive()).or_default() += 1;
    }
    per_day
}

/// Issue counts keyed by state name.
pub fn issue_state_counts(issues: &[Issue]) -> BTreeMap<&'static str, u64> {
    let mut counts = BTreeMap::new();
    for issue in issues {
        *counts.entry(issue.state.as_str()).or_default() += 1;
    }
    counts
}

/// Mean time to merge over merged pull requests, in days.
pub fn average_time_to_merge(summaries: &[PullRequestSummary]) -> Option<f64> {
    let merged: Vec<f64> = summaries
        .iter()
        .filter_map(|s| s.time_to_merge_days)
        .collect();
    if merged.is_empty() {
        return None;
    }
    Some(merged.iter().sum::<f64>() / merged.len() as f64)
}
