//! One analytics run: fetch → aggregate → render → serialize.
//!
//! The run is strictly sequential. Output directories are wiped and recreated first, so
//! artifacts from a previous repository never mix with the current one.

use crate::charts::{self, ChartSink, JsonChartWriter};
use crate::config::{OutputDirs, PipelineConfig};
use crate::export::{self, IssueRow, PullRequestRow};
use crate::github::{PullRequestDetails, RepoClient};
use crate::metrics::{self, CommitActivity};
use crate::summary::{Artifacts, RunSummary, Totals};
use crate::types::{Contributor, Issue, ItemState};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;

const TOP_REVIEWERS: usize = 10;

/// Runs the pipeline with the bundled JSON chart writer.
pub async fn run(config: &PipelineConfig) -> Result<RunSummary> {
    run_with_sink(config, &JsonChartWriter).await
}

pub async fn run_with_sink(config: &PipelineConfig, sink: &dyn ChartSink) -> Result<RunSummary> {
    let dirs = config.output_dirs();
    prepare_output_dirs(&dirs)?;
    tracing::info!(plots = %dirs.plots.display(), csv = %dirs.csv.display(), "Output directories ready");

    let client = RepoClient::new(config)?;
    let repo_id = client.repo_id().clone();

    let repository = client
        .repo_info()
        .await
        .ok_or_else(|| anyhow!("Failed to fetch repository data for {repo_id}"))?;
    tracing::info!(repo = %repo_id, stars = repository.stars, "Fetched repository metadata");

    let commits = client.commits().await;
    let activity = metrics::group_commits_by_date_and_author(&commits);
    let contributors = client.contributors().await;

    let details = client
        .pull_requests_with_details(config.include_review_details)
        .await;

    let issues = client.issues().await;
    let closing_events = if config.resolve_issue_closers {
        client.closing_events(&issues).await
    } else {
        Default::default()
    };
    let fixed_by = metrics::issues_fixed_by(&issues, &closing_events);

    let mut top_reviewers = metrics::top_reviewers_table(&details.summaries);
    top_reviewers.truncate(TOP_REVIEWERS);

    let plots = render_charts(sink, &dirs, &activity, &details, &issues, &fixed_by)?;
    let csv = write_exports(&dirs, &contributors, &details, &issues)?;

    let totals = Totals {
        commits: commits.len(),
        parsed_commits: activity.parsed_commits(),
        contributors: contributors.len(),
        pull_requests: details.pull_requests.len(),
        merged_pull_requests: details
            .pull_requests
            .iter()
            .filter(|pr| pr.merged_at.is_some())
            .count(),
        issues: issues.len(),
        open_issues: count_state(&issues, ItemState::Open),
        closed_issues: count_state(&issues, ItemState::Closed),
        review_events: details.review_events.len(),
        review_comments: details.review_comments.len(),
        issue_comments: details.issue_comments.len(),
        interactions: details.interactions.len(),
    };

    tracing::info!(repo = %repo_id, commits = totals.commits, pull_requests = totals.pull_requests, issues = totals.issues, "Run complete");

    Ok(RunSummary {
        repository,
        totals,
        average_time_to_merge_days: metrics::average_time_to_merge(&details.summaries),
        top_reviewers,
        issues_fixed_by: fixed_by,
        artifacts: Artifacts { plots, csv },
    })
}

/// Removes and recreates the plots and csv directories.
pub fn prepare_output_dirs(dirs: &OutputDirs) -> Result<()> {
    for dir in [&dirs.plots, &dirs.csv] {
        if dir.exists() {
            fs::remove_dir_all(dir)
                .with_context(|| format!("Failed to clear {}", dir.display()))?;
        }
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    Ok(())
}

fn count_state(issues: &[Issue], state: ItemState) -> usize {
    issues.iter().filter(|i| i.state == state).count()
}

fn render_charts(
    sink: &dyn ChartSink,
    dirs: &OutputDirs,
    activity: &CommitActivity,
    details: &PullRequestDetails,
    issues: &[Issue],
    fixed_by: &BTreeMap<String, u64>,
) -> Result<Vec<String>> {
    charts::render_all(
        sink,
        [
            charts::commit_activity(activity),
            charts::author_activity(activity),
            charts::pr_timeline(&details.pull_requests),
            charts::prs_per_day(&details.pull_requests),
            charts::issues_count(issues),
            charts::issues_fixed_by(fixed_by),
        ],
        &dirs.plots,
    )
}

fn write_exports(
    dirs: &OutputDirs,
    contributors: &[Contributor],
    details: &PullRequestDetails,
    issues: &[Issue],
) -> Result<Vec<String>> {
    let dir = dirs.csv.as_path();
    let pull_requests: Vec<PullRequestRow<'_>> = details.summaries.iter().map(Into::into).collect();
    let issue_rows: Vec<IssueRow<'_>> = issues.iter().map(Into::into).collect();

    let written = [
        export::write_csv(dir, "contributors.csv", contributors)?,
        export::write_csv(dir, "pull_requests.csv", &pull_requests)?,
        export::write_csv(dir, "issues.csv", &issue_rows)?,
        export::write_csv(dir, "review_events.csv", &details.review_events)?,
        export::write_csv(dir, "review_comments.csv", &details.review_comments)?,
        export::write_csv(dir, "issue_comments.csv", &details.issue_comments)?,
        export::write_csv(
            dir,
            "all_comments.csv",
            &export::all_comments(&details.review_comments, &details.issue_comments),
        )?,
    ];

    Ok(written
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect())
}
