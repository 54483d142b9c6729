//! Launches analytics runs as a subprocess on behalf of the web layer.
//!
//! Each run is bounded by a wall-clock timeout. Whatever happens, the caller gets a structured
//! response with the captured output and the artifacts currently on disk.

use crate::config::{AppConfig, OutputDirs, RepoId};
use crate::summary::{self, Artifacts, RunSummary};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// Why a run didn't succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The run exited with a non-zero status.
    Crashed,
    /// The run exceeded the configured timeout and was killed.
    TimedOut,
    /// The run could not be started.
    SpawnFailed,
    /// The run exited cleanly but printed no summary.
    MissingSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub status: RunStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub summary: Option<RunSummary>,
    pub output: String,
    pub error_output: String,
    pub artifacts: Artifacts,
}

impl RunResponse {
    fn failed(failure: FailureKind, message: String, artifacts: Artifacts) -> Self {
        Self {
            status: RunStatus::Error,
            message,
            failure: Some(failure),
            exit_code: None,
            summary: None,
            output: String::new(),
            error_output: String::new(),
            artifacts,
        }
    }

    /// Classifies a finished run from its exit status and captured output.
    pub fn from_output(output: &Output, artifacts: Artifacts) -> Self {
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code();

        if !output.status.success() {
            return Self {
                exit_code,
                output: stdout,
                error_output: stderr,
                ..Self::failed(
                    FailureKind::Crashed,
                    "Analytics run failed. Check the error output for details.".to_string(),
                    artifacts,
                )
            };
        }

        let Some(summary) = summary::extract_summary(&stdout) else {
            return Self {
                exit_code,
                output: stdout,
                error_output: stderr,
                ..Self::failed(
                    FailureKind::MissingSummary,
                    "Analytics run finished without reporting a summary.".to_string(),
                    artifacts,
                )
            };
        };

        let message = if summary.totals.is_empty() {
            "Analytics run completed but found no commits, pull requests or issues."
        } else {
            "Analytics run completed successfully."
        };

        Self {
            status: RunStatus::Success,
            message: message.to_string(),
            failure: None,
            exit_code,
            summary: Some(summary),
            output: stdout,
            error_output: stderr,
            artifacts,
        }
    }
}

/// A request to analyze one repository.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub repo_id: RepoId,
    pub token: Option<String>,
}

fn analytics_executable(config: &AppConfig) -> std::io::Result<PathBuf> {
    match &config.analytics_executable {
        Some(path) => Ok(PathBuf::from(path)),
        None => std::env::current_exe(),
    }
}

/// Runs `<executable> run` for the requested repository and waits for it, up to the timeout.
pub async fn run_analytics(config: &AppConfig, request: &RunRequest) -> RunResponse {
    let dirs = config.output_dirs();
    let timeout = config.run_timeout();

    let executable = match analytics_executable(config) {
        Ok(path) => path,
        Err(e) => {
            tracing::error!(error = %e, "Could not locate the analytics executable");
            return RunResponse::failed(
                FailureKind::SpawnFailed,
                format!("Could not locate the analytics executable: {e}"),
                list_artifacts(&dirs),
            );
        }
    };

    let mut command = Command::new(&executable);
    command
        .arg("run")
        .env("OWNER", &request.repo_id.owner)
        .env("REPO", &request.repo_id.repo)
        .env("OUTPUT_DIR", &config.output_dir)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    match request.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => command.env("GITHUB_TOKEN", token),
        None => command.env_remove("GITHUB_TOKEN"),
    };

    tracing::info!(
        repo_id = %request.repo_id,
        executable = %executable.display(),
        timeout_secs = timeout.as_secs(),
        "Running analytics"
    );

    let response = match tokio::time::timeout(timeout, command.output()).await {
        Err(_) => {
            tracing::error!(repo_id = %request.repo_id, "Analytics run timed out after {}s", timeout.as_secs());
            RunResponse {
                error_output: format!(
                    "Run exceeded the timeout limit of {} seconds.",
                    timeout.as_secs()
                ),
                ..RunResponse::failed(
                    FailureKind::TimedOut,
                    format!(
                        "Run timed out after {} seconds. The repository may be too large.",
                        timeout.as_secs()
                    ),
                    list_artifacts(&dirs),
                )
            }
        }
        Ok(Err(e)) => {
            tracing::error!(repo_id = %request.repo_id, error = %e, "Failed to start analytics run");
            RunResponse::failed(
                FailureKind::SpawnFailed,
                format!("Failed to start analytics run: {e}"),
                list_artifacts(&dirs),
            )
        }
        Ok(Ok(output)) => RunResponse::from_output(&output, list_artifacts(&dirs)),
    };

    match response.failure {
        None => tracing::info!(repo_id = %request.repo_id, "Analytics run completed"),
        Some(failure) => tracing::error!(
            repo_id = %request.repo_id,
            ?failure,
            exit_code = ?response.exit_code,
            stderr = %response.error_output,
            "Analytics run failed"
        ),
    }

    response
}

/// Lists the files currently present in the output directories, sorted by name.
pub fn list_artifacts(dirs: &OutputDirs) -> Artifacts {
    Artifacts {
        plots: file_names(&dirs.plots),
        csv: file_names(&dirs.csv),
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{write_summary_block, Totals};
    use crate::types::RepoInfo;
    use std::collections::BTreeMap;

    #[cfg(unix)]
    fn output(code: i32, stdout: Vec<u8>, stderr: &str) -> Output {
        use std::os::unix::process::ExitStatusExt;
        Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout,
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    fn summary(commits: usize) -> RunSummary {
        RunSummary {
            repository: RepoInfo {
                name: "hello".to_string(),
                owner: Some("octo".to_string()),
                description: None,
                stars: 0,
                forks: 0,
                open_issues: 0,
                created_at: None,
                updated_at: None,
            },
            totals: Totals {
                commits,
                ..Totals::default()
            },
            average_time_to_merge_days: None,
            top_reviewers: Vec::new(),
            issues_fixed_by: BTreeMap::new(),
            artifacts: Artifacts::default(),
        }
    }

    fn config(executable: &str, output_dir: &Path) -> AppConfig {
        AppConfig {
            port: 0,
            run_timeout_seconds: 5,
            output_dir: output_dir.to_string_lossy().into_owned(),
            static_dir: "dist".to_string(),
            analytics_executable: Some(executable.to_string()),
        }
    }

    fn request() -> RunRequest {
        RunRequest {
            repo_id: RepoId {
                owner: "octo".to_string(),
                repo: "hello".to_string(),
            },
            token: None,
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_run_with_summary() {
        let mut stdout = b"INFO noise\n".to_vec();
        write_summary_block(&summary(3), &mut stdout).unwrap();

        let response = RunResponse::from_output(&output(0, stdout, ""), Artifacts::default());

        assert_eq!(response.status, RunStatus::Success);
        assert_eq!(response.failure, None);
        assert_eq!(response.summary, Some(summary(3)));
        assert_eq!(response.message, "Analytics run completed successfully.");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_that_found_nothing_is_still_a_success() {
        let mut stdout = Vec::new();
        write_summary_block(&summary(0), &mut stdout).unwrap();

        let response = RunResponse::from_output(&output(0, stdout, ""), Artifacts::default());

        assert_eq!(response.status, RunStatus::Success);
        assert!(response.message.contains("found no"));
    }

    #[cfg(unix)]
    #[test]
    fn test_crashed_run_keeps_diagnostics() {
        let response = RunResponse::from_output(
            &output(1, Vec::new(), "---UNCAUGHT-EXCEPTION-START---\nboom\n"),
            Artifacts {
                plots: vec!["commit_activity.json".to_string()],
                csv: Vec::new(),
            },
        );

        assert_eq!(response.status, RunStatus::Error);
        assert_eq!(response.failure, Some(FailureKind::Crashed));
        assert_eq!(response.exit_code, Some(1));
        assert!(response.error_output.contains("boom"));
        assert_eq!(response.artifacts.plots, vec!["commit_activity.json"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_exit_without_summary() {
        let response = RunResponse::from_output(&output(0, b"hello".to_vec(), ""), Artifacts::default());

        assert_eq!(response.failure, Some(FailureKind::MissingSummary));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_analytics_reports_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();

        let response = run_analytics(&config("false", dir.path()), &request()).await;

        assert_eq!(response.status, RunStatus::Error);
        assert_eq!(response.failure, Some(FailureKind::Crashed));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_analytics_kills_run_past_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-analytics.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = config(&script.to_string_lossy(), dir.path());
        config.run_timeout_seconds = 1;

        let started = std::time::Instant::now();
        let response = run_analytics(&config, &request()).await;

        assert_eq!(response.status, RunStatus::Error);
        assert_eq!(response.failure, Some(FailureKind::TimedOut));
        assert!(response.error_output.contains("1 seconds"));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_run_analytics_reports_missing_executable() {
        let dir = tempfile::tempdir().unwrap();

        let response = run_analytics(
            &config("/nonexistent/repo-analytics-binary", dir.path()),
            &request(),
        )
        .await;

        assert_eq!(response.failure, Some(FailureKind::SpawnFailed));
    }

    #[test]
    fn test_list_artifacts_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = OutputDirs::under(dir.path());
        std::fs::create_dir_all(&dirs.csv).unwrap();
        std::fs::write(dirs.csv.join("issues.csv"), "").unwrap();
        std::fs::write(dirs.csv.join("contributors.csv"), "").unwrap();

        let artifacts = list_artifacts(&dirs);

        assert!(artifacts.plots.is_empty());
        assert_eq!(artifacts.csv, vec!["contributors.csv", "issues.csv"]);
    }
}
