//! Application configuration and environment variable parsing.
//!
//! Two configurations are loaded from the environment (optionally seeded from a .env file):
//! `PipelineConfig` drives one batch analytics run against a single repository, and
//! `AppConfig` drives the web layer that launches those runs and serves their artifacts.
//! Both are built once at process start and passed by reference from there on.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

/// A unique identifier for a GitHub repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    /// The owner of the repository (e.g., "facebook").
    pub owner: String,
    /// The name of the repository (e.g., "react").
    pub repo: String,
}

impl RepoId {
    /// Rejects owners and names that GitHub would never issue, such as `..` or anything with a
    /// path separator, so neither can reach a request URL.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("owner", &self.owner), ("repository name", &self.repo)] {
            if !is_valid_segment(value) {
                bail!("invalid {field} '{value}': use only letters, digits, '.', '-' and '_'");
            }
        }
        Ok(())
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.chars().all(|c| c == '.')
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// How the fetcher decides that it has reached the last page of a listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaginationStrategy {
    /// Trust the `Link` response header when present, fall back to short-page detection otherwise.
    #[default]
    LinkHeader,
    /// Stop as soon as a page holds fewer items than were requested.
    ShortPage,
}

impl FromStr for PaginationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "link_header" | "link" => Ok(Self::LinkHeader),
            "short_page" | "short" => Ok(Self::ShortPage),
            other => Err(format!("unknown pagination strategy '{other}'")),
        }
    }
}

/// Configuration for a single analytics run.
#[derive(Clone, Debug, Deserialize)]
pub struct PipelineConfig {
    /// Owner of the repository to analyze. Required.
    pub owner: String,

    /// Name of the repository to analyze. Required.
    pub repo: String,

    /// Optional GitHub token. Without it only public data is reachable.
    pub github_token: Option<String>,

    /// Base URL of the GitHub REST API.
    #[serde(default = "default_api_url")]
    pub github_api_url: String,

    /// Items requested per page when the caller doesn't pass `per_page` itself.
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Accepted values: `link_header` (default) or `short_page`.
    #[serde(default, deserialize_with = "deserialize_pagination")]
    pub pagination: PaginationStrategy,

    /// Hard limit on the number of pages fetched per listing. Unlimited when unset.
    pub max_pages: Option<u32>,

    /// Whether to fan out into reviews and comments for every pull request.
    #[serde(default = "default_true")]
    pub include_review_details: bool,

    /// Whether to scan issue events for closed issues that carry no `closed_by` user.
    #[serde(default = "default_true")]
    pub resolve_issue_closers: bool,

    /// Root directory for the `plots` and `csv` output directories.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Timeout applied to every single HTTP request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

/// Configuration for the web layer.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Port the HTTP server binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Wall-clock limit for one analytics run, in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,

    /// Root directory the analytics runs write their artifacts to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Directory holding the built front end.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Executable launched for each run. Defaults to the current executable.
    pub analytics_executable: Option<String>,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_per_page() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> String {
    std::env::temp_dir()
        .join("github_analytics")
        .to_string_lossy()
        .into_owned()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_port() -> u16 {
    3000
}

fn default_run_timeout() -> u64 {
    120
}

fn default_static_dir() -> String {
    "dist".to_string()
}

fn deserialize_pagination<'de, D>(deserializer: D) -> Result<PaginationStrategy, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

/// Directory layout shared by the batch job and the web layer.
#[derive(Clone, Debug)]
pub struct OutputDirs {
    pub plots: PathBuf,
    pub csv: PathBuf,
}

impl OutputDirs {
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            plots: root.join("plots"),
            csv: root.join("csv"),
        }
    }
}

impl PipelineConfig {
    /// Loads and validates the run configuration.
    pub fn from_env() -> Result<Self> {
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration with defaults for everything but the repository.
    pub fn for_repo(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            github_token: None,
            github_api_url: default_api_url(),
            per_page: default_per_page(),
            pagination: PaginationStrategy::default(),
            max_pages: None,
            include_review_details: true,
            resolve_issue_closers: true,
            output_dir: default_output_dir(),
            request_timeout_seconds: default_request_timeout(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            bail!("OWNER must be set to the repository owner");
        }
        if self.repo.trim().is_empty() {
            bail!("REPO must be set to the repository name");
        }
        if self.per_page == 0 {
            bail!("PER_PAGE must be greater than zero");
        }
        self.repo_id().validate()
    }

    pub fn repo_id(&self) -> RepoId {
        RepoId {
            owner: self.owner.trim().to_string(),
            repo: self.repo.trim().to_string(),
        }
    }

    /// The token, treating an empty value as absent.
    pub fn token(&self) -> Option<&str> {
        self.github_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn output_dirs(&self) -> OutputDirs {
        OutputDirs::under(&self.output_dir)
    }

    pub fn request_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.request_timeout_seconds)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn run_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.run_timeout_seconds)
    }

    pub fn output_dirs(&self) -> OutputDirs {
        OutputDirs::under(&self.output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const PIPELINE_VARS: &[&str] = &[
        "OWNER",
        "REPO",
        "GITHUB_TOKEN",
        "GITHUB_API_URL",
        "PER_PAGE",
        "PAGINATION",
        "MAX_PAGES",
        "INCLUDE_REVIEW_DETAILS",
        "RESOLVE_ISSUE_CLOSERS",
        "OUTPUT_DIR",
        "REQUEST_TIMEOUT_SECONDS",
    ];

    fn clear_pipeline_vars() {
        for var in PIPELINE_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_pipeline_config_from_env() {
        clear_pipeline_vars();
        env::set_var("OWNER", "rust-lang");
        env::set_var("REPO", "rust");
        env::set_var("GITHUB_TOKEN", "secret");
        env::set_var("PER_PAGE", "50");
        env::set_var("PAGINATION", "short_page");
        env::set_var("MAX_PAGES", "7");
        env::set_var("INCLUDE_REVIEW_DETAILS", "false");

        let config = PipelineConfig::from_env().expect("Failed to load config");

        assert_eq!(config.repo_id().to_string(), "rust-lang/rust");
        assert_eq!(config.token(), Some("secret"));
        assert_eq!(config.per_page, 50);
        assert_eq!(config.pagination, PaginationStrategy::ShortPage);
        assert_eq!(config.max_pages, Some(7));
        assert!(!config.include_review_details);
        assert!(config.resolve_issue_closers);
        assert_eq!(config.github_api_url, "https://api.github.com");

        clear_pipeline_vars();
    }

    #[test]
    #[serial]
    fn test_pipeline_config_defaults() {
        clear_pipeline_vars();
        env::set_var("OWNER", "octo");
        env::set_var("REPO", "hello");

        let config = PipelineConfig::from_env().expect("Failed to load config");

        assert_eq!(config.per_page, 100);
        assert_eq!(config.pagination, PaginationStrategy::LinkHeader);
        assert_eq!(config.max_pages, None);
        assert_eq!(config.token(), None);
        assert!(config.include_review_details);
        assert!(config.output_dir.ends_with("github_analytics"));

        clear_pipeline_vars();
    }

    #[test]
    #[serial]
    fn test_pipeline_config_missing_repo() {
        clear_pipeline_vars();
        env::set_var("OWNER", "octo");

        assert!(PipelineConfig::from_env().is_err());

        clear_pipeline_vars();
    }

    #[test]
    #[serial]
    fn test_pipeline_config_blank_owner_rejected() {
        clear_pipeline_vars();
        env::set_var("OWNER", "  ");
        env::set_var("REPO", "hello");

        assert!(PipelineConfig::from_env().is_err());

        clear_pipeline_vars();
    }

    #[test]
    #[serial]
    fn test_pipeline_config_bad_pagination_rejected() {
        clear_pipeline_vars();
        env::set_var("OWNER", "octo");
        env::set_var("REPO", "hello");
        env::set_var("PAGINATION", "cursor");

        assert!(PipelineConfig::from_env().is_err());

        clear_pipeline_vars();
    }

    #[test]
    fn test_empty_token_is_absent() {
        let mut config = PipelineConfig::for_repo("octo", "hello");
        config.github_token = Some("   ".to_string());
        assert_eq!(config.token(), None);
    }

    #[test]
    #[serial]
    fn test_app_config_from_env() {
        env::set_var("PORT", "8080");
        env::set_var("RUN_TIMEOUT_SECONDS", "600");
        env::remove_var("ANALYTICS_EXECUTABLE");

        let config = AppConfig::from_env().expect("Failed to load config");

        assert_eq!(config.port, 8080);
        assert_eq!(config.run_timeout(), StdDuration::from_secs(600));
        assert_eq!(config.static_dir, "dist");
        assert!(config.analytics_executable.is_none());

        env::remove_var("PORT");
        env::remove_var("RUN_TIMEOUT_SECONDS");
    }

    fn repo_id(owner: &str, repo: &str) -> RepoId {
        RepoId {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }
    }

    #[test]
    fn test_repo_id_accepts_github_names() {
        assert!(repo_id("rust-lang", "rust").validate().is_ok());
        assert!(repo_id("octo_org", "hello.world-2").validate().is_ok());
        assert!(repo_id("octo", ".github").validate().is_ok());
    }

    #[test]
    fn test_repo_id_rejects_path_segments() {
        assert!(repo_id("octo", "..").validate().is_err());
        assert!(repo_id("..", "hello").validate().is_err());
        assert!(repo_id("octo", "hello/../../orgs").validate().is_err());
        assert!(repo_id("octo", "hello?page=2").validate().is_err());
        assert!(repo_id("octo", "").validate().is_err());
    }

    #[test]
    fn test_pipeline_config_rejects_invalid_repo() {
        let config = PipelineConfig::for_repo("octo", "../admin");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pagination_strategy_parse() {
        assert_eq!("link-header".parse::<PaginationStrategy>(), Ok(PaginationStrategy::LinkHeader));
        assert_eq!("SHORT_PAGE".parse::<PaginationStrategy>(), Ok(PaginationStrategy::ShortPage));
        assert!("".parse::<PaginationStrategy>().is_err());
    }
}
