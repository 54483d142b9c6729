//! Resource collectors for one GitHub repository.
//!
//! Each collector binds the paginated fetcher to a REST path and decodes the returned items into
//! the typed records of [`crate::types`]. Per pull request and per issue collectors issue one
//! listing request per parent item, sequentially.

use crate::config::{PipelineConfig, RepoId};
use crate::fetcher::Fetcher;
use crate::types::{
    Comment, CommentKind, Commit, Contributor, Interaction, Issue, IssueEvent, ItemState,
    PullRequest, RepoInfo, ReviewEvent,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};

const STATE_ALL: &[(&str, &str)] = &[("state", "all")];

/// Records gathered for one pull request, plus who engaged with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected<T> {
    /// Every decoded record, including those without a user, for export.
    pub records: Vec<T>,
    /// One entry per record whose user differs from the pull request author.
    pub interactions: Vec<Interaction>,
    /// Distinct logins of the record users, in first-seen order.
    pub users: Vec<String>,
}

impl<T> Default for Collected<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            interactions: Vec::new(),
            users: Vec::new(),
        }
    }
}

/// Derives interactions and users from a pull request's records in a single pass.
///
/// Records without a login are kept for export but skipped here, as are interactions on pull
/// requests whose author is unknown.
pub fn collect_engagement<T>(
    pr: u64,
    author: Option<&str>,
    records: Vec<T>,
    login: impl Fn(&T) -> Option<&str>,
) -> Collected<T> {
    let mut interactions = Vec::new();
    let mut users = Vec::new();
    let mut seen = HashSet::new();

    for record in &records {
        let Some(user) = login(record) else {
            continue;
        };
        if seen.insert(user) {
            users.push(user.to_string());
        }
        if let Some(author) = author {
            if user != author {
                interactions.push(Interaction {
                    reviewer: user.to_string(),
                    author: author.to_string(),
                    pr,
                });
            }
        }
    }

    Collected {
        records,
        interactions,
        users,
    }
}

/// Per pull request export row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub author: Option<String>,
    pub state: ItemState,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub time_to_merge_days: Option<f64>,
    pub total_reviews: usize,
    pub total_review_comments: usize,
    pub total_issue_comments: usize,
    pub total_comments: usize,
    /// Distinct review authors and review commenters, sorted.
    pub reviewers: Vec<String>,
    /// Distinct issue commenters, sorted.
    pub commenters: Vec<String>,
}

impl PullRequestSummary {
    /// Totals count every record, including those left by deleted accounts.
    pub fn new<R, C, I>(
        pr: &PullRequest,
        reviews: &Collected<R>,
        review_comments: &Collected<C>,
        issue_comments: &Collected<I>,
    ) -> Self {
        let reviewer_set: BTreeSet<&String> =
            reviews.users.iter().chain(&review_comments.users).collect();
        let commenter_set: BTreeSet<&String> = issue_comments.users.iter().collect();

        Self {
            number: pr.number,
            title: pr.title.clone(),
            author: pr.author.clone(),
            state: pr.state,
            created_at: pr.created_at,
            closed_at: pr.closed_at,
            merged_at: pr.merged_at,
            time_to_merge_days: pr.time_to_merge_days(),
            total_reviews: reviews.records.len(),
            total_review_comments: review_comments.records.len(),
            total_issue_comments: issue_comments.records.len(),
            total_comments: review_comments.records.len() + issue_comments.records.len(),
            reviewers: reviewer_set.into_iter().cloned().collect(),
            commenters: commenter_set.into_iter().cloned().collect(),
        }
    }
}

/// Everything gathered from the pull request listing and its fan-out.
#[derive(Debug, Clone, Default)]
pub struct PullRequestDetails {
    pub pull_requests: Vec<PullRequest>,
    pub summaries: Vec<PullRequestSummary>,
    pub interactions: Vec<Interaction>,
    pub review_events: Vec<ReviewEvent>,
    pub review_comments: Vec<Comment>,
    pub issue_comments: Vec<Comment>,
}

/// Collectors bound to a single repository.
#[derive(Debug, Clone)]
pub struct RepoClient {
    fetcher: Fetcher,
    repo_id: RepoId,
    base_url: String,
}

impl RepoClient {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let repo_id = config.repo_id();
        let base_url = format!(
            "{}/repos/{}/{}",
            config.github_api_url.trim_end_matches('/'),
            repo_id.owner,
            repo_id.repo
        );

        Ok(Self {
            fetcher: Fetcher::new(config)?,
            repo_id,
            base_url,
        })
    }

    pub fn repo_id(&self) -> &RepoId {
        &self.repo_id
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.base_url)
    }

    /// Repository metadata, or `None` if it couldn't be fetched.
    pub async fn repo_info(&self) -> Option<RepoInfo> {
        let value = self.fetcher.fetch_one(&self.base_url).await?;
        match RepoInfo::from_json(value) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(repo = %self.repo_id, error = %e, "Malformed repository metadata");
                None
            }
        }
    }

    pub async fn commits(&self) -> Vec<Commit> {
        let items = self.fetcher.fetch_all(&self.url("/commits"), &[]).await;
        decode_all(items, "commit", Commit::from_json)
    }

    pub async fn contributors(&self) -> Vec<Contributor> {
        let items = self.fetcher.fetch_all(&self.url("/contributors"), &[]).await;
        decode_all(items, "contributor", Contributor::from_json)
    }

    pub async fn pull_requests(&self) -> Vec<PullRequest> {
        let items = self.fetcher.fetch_all(&self.url("/pulls"), STATE_ALL).await;
        decode_all(items, "pull request", PullRequest::from_json)
    }

    pub async fn reviews(&self, pr: u64, author: Option<&str>) -> Collected<ReviewEvent> {
        let items = self
            .fetcher
            .fetch_all(&self.url(&format!("/pulls/{pr}/reviews")), &[])
            .await;
        let records = decode_all(items, "review", |v| ReviewEvent::from_json(pr, v));
        collect_engagement(pr, author, records, |r| r.reviewer.as_deref())
    }

    pub async fn review_comments(&self, pr: u64, author: Option<&str>) -> Collected<Comment> {
        let items = self
            .fetcher
            .fetch_all(&self.url(&format!("/pulls/{pr}/comments")), &[])
            .await;
        let records = decode_all(items, "review comment", |v| {
            Comment::from_json(pr, CommentKind::ReviewComment, v)
        });
        collect_engagement(pr, author, records, |c| c.commenter.as_deref())
    }

    pub async fn issue_comments(&self, pr: u64, author: Option<&str>) -> Collected<Comment> {
        let items = self
            .fetcher
            .fetch_all(&self.url(&format!("/issues/{pr}/comments")), &[])
            .await;
        let records = decode_all(items, "issue comment", |v| {
            Comment::from_json(pr, CommentKind::IssueComment, v)
        });
        collect_engagement(pr, author, records, |c| c.commenter.as_deref())
    }

    /// Lists all pull requests and, when `include_fanout` is set, their reviews and comments.
    pub async fn pull_requests_with_details(&self, include_fanout: bool) -> PullRequestDetails {
        let pull_requests = self.pull_requests().await;
        let mut details = PullRequestDetails::default();

        for pr in &pull_requests {
            if !include_fanout {
                details.summaries.push(PullRequestSummary::new(
                    pr,
                    &Collected::<ReviewEvent>::default(),
                    &Collected::<Comment>::default(),
                    &Collected::<Comment>::default(),
                ));
                continue;
            }

            let author = pr.author.as_deref();
            let reviews = self.reviews(pr.number, author).await;
            let review_comments = self.review_comments(pr.number, author).await;
            let issue_comments = self.issue_comments(pr.number, author).await;

            details.summaries.push(PullRequestSummary::new(
                pr,
                &reviews,
                &review_comments,
                &issue_comments,
            ));

            details.interactions.extend(reviews.interactions);
            details.interactions.extend(review_comments.interactions);
            details.interactions.extend(issue_comments.interactions);
            details.review_events.extend(reviews.records);
            details.review_comments.extend(review_comments.records);
            details.issue_comments.extend(issue_comments.records);
        }

        tracing::info!(
            repo = %self.repo_id,
            pull_requests = pull_requests.len(),
            interactions = details.interactions.len(),
            "Collected pull request details"
        );

        details.pull_requests = pull_requests;
        details
    }

    /// Lists issues, leaving out the pull requests the issues endpoint also returns.
    pub async fn issues(&self) -> Vec<Issue> {
        let items = self.fetcher.fetch_all(&self.url("/issues"), STATE_ALL).await;
        decode_all(items, "issue", Issue::from_json)
            .into_iter()
            .flatten()
            .collect()
    }

    pub async fn issue_events(&self, issue: u64) -> Vec<IssueEvent> {
        let items = self
            .fetcher
            .fetch_all(&self.url(&format!("/issues/{issue}/events")), &[])
            .await;
        decode_all(items, "issue event", IssueEvent::from_json)
    }

    /// Fetches the event timeline of every closed issue that doesn't name its closer.
    pub async fn closing_events(&self, issues: &[Issue]) -> HashMap<u64, Vec<IssueEvent>> {
        let mut timelines = HashMap::new();
        for issue in issues
            .iter()
            .filter(|i| i.state == ItemState::Closed && i.closed_by.is_none())
        {
            let events = self.issue_events(issue.number).await;
            timelines.insert(issue.number, events);
        }
        timelines
    }
}

/// Decodes every item, skipping and logging the ones that don't fit the expected shape.
fn decode_all<T>(
    items: Vec<Value>,
    kind: &str,
    decode: impl Fn(Value) -> serde_json::Result<T>,
) -> Vec<T> {
    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| match decode(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(kind, error = %e, "Skipping malformed record");
                None
            }
        })
        .collect();

    if decoded.len() < total {
        tracing::warn!(kind, skipped = total - decoded.len(), "Some records were skipped");
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn comment(pr: u64, commenter: Option<&str>) -> Comment {
        Comment {
            pr,
            comment_id: Some(1),
            commenter: commenter.map(str::to_string),
            created_at: None,
            updated_at: None,
            path: Some("src/main.rs".to_string()),
            kind: CommentKind::ReviewComment,
            body: Some("nit".to_string()),
        }
    }

    fn login(c: &Comment) -> Option<&str> {
        c.commenter.as_deref()
    }

    #[test]
    fn test_comment_by_other_user_is_an_interaction() {
        let collected = collect_engagement(1, Some("carol"), vec![comment(1, Some("bob"))], login);

        assert_eq!(
            collected.interactions,
            vec![Interaction {
                reviewer: "bob".to_string(),
                author: "carol".to_string(),
                pr: 1,
            }]
        );
        assert_eq!(collected.users, vec!["bob".to_string()]);
    }

    #[test]
    fn test_comment_by_author_is_not_an_interaction() {
        let collected =
            collect_engagement(1, Some("carol"), vec![comment(1, Some("carol"))], login);

        assert!(collected.interactions.is_empty());
        assert_eq!(collected.users, vec!["carol".to_string()]);
    }

    #[test]
    fn test_ghost_comment_is_exported_but_not_counted() {
        let collected = collect_engagement(1, Some("carol"), vec![comment(1, None)], login);

        assert_eq!(collected.records.len(), 1);
        assert!(collected.users.is_empty());
        assert!(collected.interactions.is_empty());
    }

    #[test]
    fn test_unknown_author_produces_no_interactions() {
        let collected = collect_engagement(1, None, vec![comment(1, Some("bob"))], login);

        assert!(collected.interactions.is_empty());
        assert_eq!(collected.users, vec!["bob".to_string()]);
    }

    fn merged_pr() -> PullRequest {
        PullRequest {
            number: 5,
            title: "Add feature".to_string(),
            author: Some("carol".to_string()),
            state: ItemState::Closed,
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            closed_at: Some(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()),
            merged_at: Some(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()),
        }
    }

    fn review(pr: u64, reviewer: Option<&str>) -> ReviewEvent {
        ReviewEvent {
            pr,
            reviewer: reviewer.map(str::to_string),
            state: Some("COMMENTED".to_string()),
            submitted_at: None,
        }
    }

    fn reviews(pr: u64, reviewers: &[Option<&str>]) -> Collected<ReviewEvent> {
        let records = reviewers.iter().map(|r| review(pr, *r)).collect();
        collect_engagement(pr, Some("carol"), records, |r| r.reviewer.as_deref())
    }

    fn comments(pr: u64, commenters: &[Option<&str>]) -> Collected<Comment> {
        let records = commenters.iter().map(|c| comment(pr, *c)).collect();
        collect_engagement(pr, Some("carol"), records, login)
    }

    #[test]
    fn test_users_are_distinct_in_first_seen_order() {
        let collected = comments(1, &[Some("bob"), Some("amy"), Some("bob"), None]);

        assert_eq!(collected.users, vec!["bob".to_string(), "amy".to_string()]);
        assert_eq!(collected.records.len(), 4);
        // every record by someone other than the author counts
        assert_eq!(collected.interactions.len(), 3);
    }

    #[test]
    fn test_summary_merges_and_sorts_reviewers() {
        let summary = PullRequestSummary::new(
            &merged_pr(),
            &reviews(5, &[Some("zed"), Some("bob")]),
            &comments(5, &[Some("bob"), Some("amy")]),
            &comments(5, &[Some("dan"), Some("dan")]),
        );

        assert_eq!(summary.reviewers, vec!["amy", "bob", "zed"]);
        assert_eq!(summary.commenters, vec!["dan"]);
        assert_eq!(summary.total_reviews, 2);
        assert_eq!(summary.total_issue_comments, 2);
        assert_eq!(summary.total_comments, 4);
        assert_eq!(summary.time_to_merge_days, Some(2.0));
    }

    #[test]
    fn test_summary_totals_include_ghost_records() {
        let summary = PullRequestSummary::new(
            &merged_pr(),
            &reviews(5, &[Some("bob"), None]),
            &comments(5, &[None]),
            &comments(5, &[]),
        );

        assert_eq!(summary.reviewers, vec!["bob"]);
        assert_eq!(summary.total_reviews, 2);
        assert_eq!(summary.total_review_comments, 1);
        assert_eq!(summary.total_comments, 1);
    }

    #[test]
    fn test_summary_counts_repeat_reviews() {
        let summary = PullRequestSummary::new(
            &merged_pr(),
            &reviews(5, &[Some("bob"), Some("bob"), Some("bob")]),
            &comments(5, &[]),
            &comments(5, &[]),
        );

        assert_eq!(summary.reviewers, vec!["bob"]);
        assert_eq!(summary.total_reviews, 3);
    }

    #[test]
    fn test_decode_all_skips_malformed_items() {
        let items = vec![
            serde_json::json!({ "number": 1, "state": "open" }),
            serde_json::json!({ "state": "open" }),
        ];
        let prs = decode_all(items, "pull request", PullRequest::from_json);
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].number, 1);
    }
}
