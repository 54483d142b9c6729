//! Paginated GET requests against the GitHub REST API.
//!
//! The fetcher never fails: transport errors, non-2xx responses and undecodable bodies are
//! logged with the endpoint and page that produced them, and pagination stops with whatever
//! was accumulated so far.

use crate::config::{PaginationStrategy, PipelineConfig};
use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use reqwest::{Client, Response};
use serde_json::Value;

const ACCEPT_MEDIA_TYPE: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = concat!("repo-analytics/", env!("CARGO_PKG_VERSION"));

/// Longest response body quoted in a failure log line.
const MAX_LOGGED_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    per_page: u32,
    strategy: PaginationStrategy,
    max_pages: Option<u32>,
}

impl Fetcher {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_MEDIA_TYPE));

        if let Some(token) = config.token() {
            let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            per_page: config.per_page,
            strategy: config.pagination,
            max_pages: config.max_pages.filter(|&max| max > 0),
        })
    }

    /// Fetches every page of a listing endpoint and returns the items in server order.
    ///
    /// `params` are sent with every request. When they don't include `per_page`, the configured
    /// page size is added.
    pub async fn fetch_all(&self, url: &str, params: &[(&str, &str)]) -> Vec<Value> {
        let per_page = params
            .iter()
            .find(|(key, _)| *key == "per_page")
            .and_then(|(_, value)| value.parse::<usize>().ok())
            .unwrap_or(self.per_page as usize);

        let mut query: Vec<(&str, String)> = params
            .iter()
            .filter(|(key, _)| *key != "page" && *key != "per_page")
            .map(|(key, value)| (*key, (*value).to_string()))
            .collect();
        query.push(("per_page", per_page.to_string()));

        let mut results = Vec::new();
        let mut page: u32 = 1;

        loop {
            let response = match self
                .client
                .get(url)
                .query(&query)
                .query(&[("page", page)])
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(endpoint = url, page, error = %e, "Request failed, stopping pagination");
                    break;
                }
            };

            let has_next = next_link_advertised(response.headers());

            let Some(body) = read_success_body(url, page, response).await else {
                break;
            };

            let items = match serde_json::from_str::<Value>(&body) {
                Ok(Value::Array(items)) => items,
                Ok(_) => {
                    tracing::debug!(endpoint = url, page, "Response is not a list, stopping pagination");
                    break;
                }
                Err(e) => {
                    tracing::warn!(endpoint = url, page, error = %e, body = %truncate(&body), "Failed to decode page");
                    break;
                }
            };

            if items.is_empty() {
                break;
            }

            let count = items.len();
            results.extend(items);

            if self.is_last_page(count, per_page, has_next) {
                break;
            }

            if self.max_pages.is_some_and(|max| page >= max) {
                tracing::warn!(
                    endpoint = url,
                    max_pages = page,
                    "Hit page limit before the end of the listing. Data may be incomplete."
                );
                break;
            }

            page += 1;
        }

        tracing::debug!(endpoint = url, pages = page, items = results.len(), "Fetched listing");
        results
    }

    /// Fetches a single non-paginated resource.
    pub async fn fetch_one(&self, url: &str) -> Option<Value> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(endpoint = url, error = %e, "Request failed");
                return None;
            }
        };

        let body = read_success_body(url, 1, response).await?;

        match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(endpoint = url, error = %e, body = %truncate(&body), "Failed to decode response");
                None
            }
        }
    }

    fn is_last_page(&self, count: usize, per_page: usize, has_next: Option<bool>) -> bool {
        let short_page = count < per_page;
        match (self.strategy, has_next) {
            (PaginationStrategy::LinkHeader, Some(has_next)) => !has_next,
            (PaginationStrategy::LinkHeader, None) | (PaginationStrategy::ShortPage, _) => short_page,
        }
    }
}

/// Returns the body of a 2xx response, logging anything else.
async fn read_success_body(url: &str, page: u32, response: Response) -> Option<String> {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(endpoint = url, page, status = %status, error = %e, "Failed to read response body");
            return None;
        }
    };

    if !status.is_success() {
        tracing::warn!(endpoint = url, page, status = %status, body = %truncate(&body), "GitHub API request failed");
        return None;
    }

    Some(body)
}

/// `None` when the response carries no `Link` header at all.
fn next_link_advertised(headers: &HeaderMap) -> Option<bool> {
    let link = headers.get(LINK)?.to_str().ok()?;
    Some(
        link.split(',')
            .any(|part| part.split(';').skip(1).any(|param| is_next_rel(param.trim()))),
    )
}

fn is_next_rel(param: &str) -> bool {
    param
        .strip_prefix("rel=")
        .map(|rel| rel.trim_matches('"'))
        .is_some_and(|rel| rel.split_whitespace().any(|r| r == "next"))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_LOGGED_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
