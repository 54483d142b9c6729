//! Chart rendering.
//!
//! Aggregates are turned into `Chart` descriptions and handed to a [`ChartSink`], which produces
//! one named file per chart in the plots directory. The bundled sink writes JSON chart
//! descriptions that the front end draws.

use crate::metrics::{self, CommitActivity};
use crate::types::{Issue, ItemState, PullRequest};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const TOP_AUTHORS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Bar,
    HorizontalBar,
    Scatter,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub x: String,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub name: &'static str,
    pub kind: ChartKind,
    pub title: &'static str,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub series: Vec<Series>,
}

impl Chart {
    fn single(
        name: &'static str,
        kind: ChartKind,
        title: &'static str,
        x_label: &'static str,
        y_label: &'static str,
        points: Vec<Point>,
    ) -> Option<Self> {
        if points.is_empty() {
            tracing::info!(chart = name, "No data to plot");
            return None;
        }
        Some(Self {
            name,
            kind,
            title,
            x_label,
            y_label,
            series: vec![Series {
                label: title.to_string(),
                points,
            }],
        })
    }
}

/// Destination for rendered charts.
pub trait ChartSink: Send + Sync {
    /// Renders `chart` into `dir` and returns the path of the produced file.
    fn render(&self, chart: &Chart, dir: &Path) -> Result<PathBuf>;
}

/// Writes `<name>.json` chart descriptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonChartWriter;

impl ChartSink for JsonChartWriter {
    fn render(&self, chart: &Chart, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(format!("{}.json", chart.name));
        let json = serde_json::to_vec_pretty(chart)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(file = %path.display(), "Saved plot");
        Ok(path)
    }
}

fn counted<K: ToString>(map: &BTreeMap<K, u64>) -> Vec<Point> {
    map.iter()
        .map(|(k, v)| Point {
            x: k.to_string(),
            y: *v as f64,
        })
        .collect()
}

pub fn commit_activity(activity: &CommitActivity) -> Option<Chart> {
    Chart::single(
        "commit_activity",
        ChartKind::Line,
        "Commit Activity Over Time",
        "Date",
        "Number of Commits",
        counted(&activity.by_date),
    )
}

pub fn author_activity(activity: &CommitActivity) -> Option<Chart> {
    let points = metrics::top_authors(activity, TOP_AUTHORS)
        .into_iter()
        .map(|(author, count)| Point {
            x: author,
            y: count as f64,
        })
        .collect();
    Chart::single(
        "author_activity",
        ChartKind::HorizontalBar,
        "Top 10 Commit Authors",
        "Number of Commits",
        "Author",
        points,
    )
}

/// Open pull requests at their creation date, closed ones at their closing date.
pub fn pr_timeline(pull_requests: &[PullRequest]) -> Option<Chart> {
    let open: Vec<Point> = pull_requests
        .iter()
        .filter(|pr| pr.state == ItemState::Open)
        .filter_map(|pr| pr.created_at)
        .map(|ts| Point {
            x: ts.to_rfc3339(),
            y: 1.0,
        })
        .collect();
    let closed: Vec<Point> = pull_requests
        .iter()
        .filter(|pr| pr.state == ItemState::Closed)
        .filter_map(|pr| pr.closed_at)
        .map(|ts| Point {
            x: ts.to_rfc3339(),
            y: 0.5,
        })
        .collect();

    if open.is_empty() && closed.is_empty() {
        tracing::info!(chart = "pr_timeline", "No data to plot");
        return None;
    }

    Some(Chart {
        name: "pr_timeline",
        kind: ChartKind::Scatter,
        title: "Pull Request Timeline",
        x_label: "Date",
        y_label: "State",
        series: vec![
            Series {
                label: "Open PRs".to_string(),
                points: open,
            },
            Series {
                label: "Closed PRs".to_string(),
                points: closed,
            },
        ],
    })
}

pub fn prs_per_day(pull_requests: &[PullRequest]) -> Option<Chart> {
    Chart::single(
        "prs_per_day",
        ChartKind::Bar,
        "Pull Requests Created Per Day",
        "Date",
        "Number of PRs",
        counted(&metrics::pull_requests_per_day(pull_requests)),
    )
}

pub fn issues_count(issues: &[Issue]) -> Option<Chart> {
    Chart::single(
        "issues_count",
        ChartKind::Pie,
        "Open vs. Closed Issues Count",
        "State",
        "Issues",
        counted(&metrics::issue_state_counts(issues)),
    )
}

pub fn issues_fixed_by(fixed: &BTreeMap<String, u64>) -> Option<Chart> {
    let mut points = counted(fixed);
    points.sort_by(|a, b| b.y.total_cmp(&a.y).then_with(|| a.x.cmp(&b.x)));
    Chart::single(
        "issues_fixed_by",
        ChartKind::HorizontalBar,
        "Issues Fixed by User",
        "Number of Issues Fixed",
        "Author",
        points,
    )
}

/// Renders every chart that has data and returns the produced file names.
pub fn render_all(
    sink: &dyn ChartSink,
    charts: impl IntoIterator<Item = Option<Chart>>,
    dir: &Path,
) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for chart in charts.into_iter().flatten() {
        let path = sink.render(&chart, dir)?;
        if let Some(name) = path.file_name() {
            files.push(name.to_string_lossy().into_owned());
        }
    }
    Ok(files)
}
