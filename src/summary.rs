//! The structured summary a batch run reports to its caller.
//!
//! The summary is printed as one JSON line on stdout between two marker lines, so the invoking
//! process can find it amid any other output.

use crate::metrics::ReviewerCount;
use crate::types::RepoInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};

pub const SUMMARY_START: &str = "---REPO-INFO-START---";
pub const SUMMARY_END: &str = "---REPO-INFO-END---";
pub const FAILURE_START: &str = "---UNCAUGHT-EXCEPTION-START---";
pub const FAILURE_END: &str = "---UNCAUGHT-EXCEPTION-END---";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub commits: usize,
    pub parsed_commits: u64,
    pub contributors: usize,
    pub pull_requests: usize,
    pub merged_pull_requests: usize,
    pub issues: usize,
    pub open_issues: usize,
    pub closed_issues: usize,
    pub review_events: usize,
    pub review_comments: usize,
    pub issue_comments: usize,
    pub interactions: usize,
}

impl Totals {
    /// True when the run found no activity of any kind.
    pub fn is_empty(&self) -> bool {
        self.commits == 0 && self.pull_requests == 0 && self.issues == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    pub plots: Vec<String>,
    pub csv: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub repository: RepoInfo,
    pub totals: Totals,
    pub average_time_to_merge_days: Option<f64>,
    pub top_reviewers: Vec<ReviewerCount>,
    pub issues_fixed_by: BTreeMap<String, u64>,
    pub artifacts: Artifacts,
}

/// Writes the summary between its marker lines.
pub fn write_summary_block(summary: &RunSummary, out: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string(summary)?;
    writeln!(out, "{SUMMARY_START}")?;
    writeln!(out, "{json}")?;
    writeln!(out, "{SUMMARY_END}")?;
    out.flush()
}

/// Finds and decodes the last complete summary block in a run's stdout.
pub fn extract_summary(stdout: &str) -> Option<RunSummary> {
    let start = stdout.rfind(SUMMARY_START)? + SUMMARY_START.len();
    let end = start + stdout[start..].find(SUMMARY_END)?;
    match serde_json::from_str(stdout[start..end].trim()) {
        Ok(summary) => Some(summary),
        Err(e) => {
            tracing::warn!(error = %e, "Summary block is not valid JSON");
            None
        }
    }
}
