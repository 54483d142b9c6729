//! Typed records for the GitHub entities the pipeline works with.
//!
//! Every nested field the API may omit or null out is an `Option`, so the wire payload is
//! decoded exactly once and the aggregators never have to dig through raw JSON for missing data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Parses an RFC 3339 / ISO-8601 timestamp, treating anything unparseable as absent.
pub fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw?.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Open/closed state shared by issues and pull requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Open,
    Closed,
    Unknown,
}

impl ItemState {
    fn from_wire(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("open") => Self::Open,
            Some(s) if s.eq_ignore_ascii_case("closed") => Self::Closed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireUser {
    login: Option<String>,
}

fn login_of(user: Option<WireUser>) -> Option<String> {
    user.and_then(|u| u.login).filter(|l| !l.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub open_issues: u64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRepo {
    name: Option<String>,
    owner: Option<WireUser>,
    description: Option<String>,
    stargazers_count: Option<u64>,
    forks_count: Option<u64>,
    open_issues_count: Option<u64>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

impl RepoInfo {
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        let wire: WireRepo = serde_json::from_value(value)?;
        let day = |raw: Option<String>| {
            parse_timestamp(raw.as_deref()).map(|ts| ts.format("%Y-%m-%d").to_string())
        };
        Ok(Self {
            name: wire.name.unwrap_or_else(|| "Unknown".to_string()),
            owner: login_of(wire.owner),
            description: wire.description,
            stars: wire.stargazers_count.unwrap_or(0),
            forks: wire.forks_count.unwrap_or(0),
            open_issues: wire.open_issues_count.unwrap_or(0),
            created_at: day(wire.created_at),
            updated_at: day(wire.updated_at),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub sha: String,
    pub author_name: Option<String>,
    pub author_login: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireCommit {
    sha: Option<String>,
    commit: Option<WireCommitDetail>,
    author: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireCommitDetail {
    author: Option<WireSignature>,
}

#[derive(Debug, Deserialize)]
struct WireSignature {
    name: Option<String>,
    date: Option<String>,
}

impl Commit {
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        let wire: WireCommit = serde_json::from_value(value)?;
        let signature = wire.commit.and_then(|c| c.author);
        let (author_name, timestamp) = match signature {
            Some(sig) => (
                sig.name.filter(|n| !n.is_empty()),
                parse_timestamp(sig.date.as_deref()),
            ),
            None => (None, None),
        };
        Ok(Self {
            sha: wire.sha.unwrap_or_default(),
            author_name,
            author_login: login_of(wire.author),
            timestamp,
        })
    }

    /// Display name for grouping: the author name, else the login, else "Unknown".
    pub fn display_author(&self) -> &str {
        self.author_name
            .as_deref()
            .or(self.author_login.as_deref())
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub login: String,
    pub contributions: u64,
}

#[derive(Debug, Deserialize)]
struct WireContributor {
    login: Option<String>,
    contributions: Option<u64>,
}

impl Contributor {
    /// Anonymous contributors have no login and are reported as "Unknown".
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        let wire: WireContributor = serde_json::from_value(value)?;
        Ok(Self {
            login: wire.login.unwrap_or_else(|| "Unknown".to_string()),
            contributions: wire.contributions.unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub author: Option<String>,
    pub state: ItemState,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WirePullRequest {
    number: u64,
    title: Option<String>,
    user: Option<WireUser>,
    state: Option<String>,
    created_at: Option<String>,
    closed_at: Option<String>,
    merged_at: Option<String>,
}

impl PullRequest {
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        let wire: WirePullRequest = serde_json::from_value(value)?;
        Ok(Self {
            number: wire.number,
            title: wire.title.unwrap_or_default(),
            author: login_of(wire.user),
            state: ItemState::from_wire(wire.state.as_deref()),
            created_at: parse_timestamp(wire.created_at.as_deref()),
            closed_at: parse_timestamp(wire.closed_at.as_deref()),
            merged_at: parse_timestamp(wire.merged_at.as_deref()),
        })
    }

    /// Days between creation and merge. `None` for pull requests that were never merged.
    pub fn time_to_merge_days(&self) -> Option<f64> {
        let elapsed = self.merged_at? - self.created_at?;
        Some(elapsed.num_milliseconds() as f64 / 86_400_000.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewEvent {
    pub pr: u64,
    pub reviewer: Option<String>,
    pub state: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireReview {
    user: Option<WireUser>,
    state: Option<String>,
    submitted_at: Option<String>,
}

impl ReviewEvent {
    pub fn from_json(pr: u64, value: Value) -> serde_json::Result<Self> {
        let wire: WireReview = serde_json::from_value(value)?;
        Ok(Self {
            pr,
            reviewer: login_of(wire.user),
            state: wire.state,
            submitted_at: parse_timestamp(wire.submitted_at.as_deref()),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    ReviewComment,
    IssueComment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub pr: u64,
    pub comment_id: Option<u64>,
    pub commenter: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub path: Option<String>,
    #[serde(rename = "type")]
    pub kind: CommentKind,
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireComment {
    id: Option<u64>,
    user: Option<WireUser>,
    created_at: Option<String>,
    updated_at: Option<String>,
    path: Option<String>,
    body: Option<String>,
}

impl Comment {
    /// Issue comments never carry a file path, even if the payload has one.
    pub fn from_json(pr: u64, kind: CommentKind, value: Value) -> serde_json::Result<Self> {
        let wire: WireComment = serde_json::from_value(value)?;
        Ok(Self {
            pr,
            comment_id: wire.id,
            commenter: login_of(wire.user),
            created_at: parse_timestamp(wire.created_at.as_deref()),
            updated_at: parse_timestamp(wire.updated_at.as_deref()),
            path: match kind {
                CommentKind::ReviewComment => wire.path,
                CommentKind::IssueComment => None,
            },
            kind,
            body: wire.body,
        })
    }
}

/// A non-author user engaging with a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interaction {
    pub reviewer: String,
    pub author: String,
    pub pr: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub state: ItemState,
    pub author: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireIssue {
    number: u64,
    title: Option<String>,
    state: Option<String>,
    user: Option<WireUser>,
    created_at: Option<String>,
    closed_at: Option<String>,
    closed_by: Option<WireUser>,
    pull_request: Option<Value>,
}

impl Issue {
    /// Returns `Ok(None)` for items the issues endpoint returns on behalf of pull requests.
    pub fn from_json(value: Value) -> serde_json::Result<Option<Self>> {
        let wire: WireIssue = serde_json::from_value(value)?;
        if wire.pull_request.is_some() {
            return Ok(None);
        }
        Ok(Some(Self {
            number: wire.number,
            title: wire.title.unwrap_or_default(),
            state: ItemState::from_wire(wire.state.as_deref()),
            author: login_of(wire.user),
            created_at: parse_timestamp(wire.created_at.as_deref()),
            closed_at: parse_timestamp(wire.closed_at.as_deref()),
            closed_by: login_of(wire.closed_by),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssueEvent {
    pub event: Option<String>,
    pub actor: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireIssueEvent {
    event: Option<String>,
    actor: Option<WireUser>,
    created_at: Option<String>,
}

impl IssueEvent {
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        let wire: WireIssueEvent = serde_json::from_value(value)?;
        Ok(Self {
            event: wire.event,
            actor: login_of(wire.actor),
            created_at: parse_timestamp(wire.created_at.as_deref()),
        })
    }
}
