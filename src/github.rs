//! Repository metadata provider.
//!
//! The [`MetadataProvider`] trait is the pipeline's only window onto the
//! hosting platform. [`GithubClient`] implements it against the GitHub
//! REST API (single lookups, file contents, trees) and GraphQL API
//! (batched lookups, up to 50 aliased sub-queries per call). Tests
//! substitute a scripted fake.
//!
//! Not-found is `None`, never an error: a deleted or renamed repository
//! is an expected outcome, and callers treat it as "nothing to index".

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::StatusCode;

use crate::config::GithubConfig;

const LOG_TARGET: &str = "github";
const MAX_FETCH_RETRIES: u32 = 3;

/// Repository metadata as surfaced by the hosting platform.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoMetadata {
    pub owner: String,
    pub repo: String,
    pub stars: i64,
    pub forks: i64,
    pub description: Option<String>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub is_fork: bool,
    pub topics: Vec<String>,
    /// Commit id of the default branch head, if the repository has one.
    pub head_sha: Option<String>,
}

/// One blob entry of a repository tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub size: u64,
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch one repository. `None` when it does not exist or is gone.
    async fn fetch_repo(&self, owner: &str, repo: &str) -> Result<Option<RepoMetadata>>;

    /// Fetch up to 50 repositories in one batched call. Missing
    /// repositories are simply absent from the result map.
    async fn fetch_many(
        &self,
        refs: &[(String, String)],
    ) -> Result<HashMap<(String, String), RepoMetadata>>;

    /// Fetch one file's decoded text content. `None` when absent or not
    /// retrievable inline.
    async fn get_file(&self, owner: &str, repo: &str, path: &str) -> Result<Option<String>>;

    /// List all blob entries reachable from `head_ref` (a commit id or
    /// branch name), recursively. Empty for unknown refs.
    async fn get_tree(&self, owner: &str, repo: &str, head_ref: &str) -> Result<Vec<TreeEntry>>;
}

/// GitHub-backed [`MetadataProvider`].
pub struct GithubClient {
    client: reqwest::Client,
    api_base: String,
    graphql_url: String,
}

impl GithubClient {
    /// Build a client from configuration. The bearer token is read from
    /// the environment variable named in the config; without one the
    /// client still works at unauthenticated rate limits.
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Ok(token) = std::env::var(&config.token_env) {
            let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                .with_context(|| format!("Invalid token in ${}", config.token_env))?;
            auth.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, auth);
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            graphql_url: config.graphql_url.clone(),
        })
    }

    /// GET a JSON endpoint. `None` on 404; retries 429/5xx with
    /// exponential backoff.
    async fn get_json(&self, url: &str) -> Result<Option<serde_json::Value>> {
        let mut last_err = None;

        for attempt in 0..MAX_FETCH_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(1 << (attempt - 1))).await;
            }

            let resp = match self.client.get(url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() {
                return Ok(Some(resp.json().await?));
            }
            if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
                return Ok(None);
            }
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let body = resp.text().await.unwrap_or_default();
                last_err = Some(anyhow::anyhow!("GitHub API error {}: {}", status, body));
                continue;
            }

            let body = resp.text().await.unwrap_or_default();
            bail!("GitHub API error {}: {}", status, body);
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("GitHub request failed after retries")))
    }

    async fn post_graphql(&self, query: &str) -> Result<serde_json::Value> {
        let body = serde_json::json!({ "query": query });
        let mut last_err = None;

        for attempt in 0..MAX_FETCH_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(1 << (attempt - 1))).await;
            }

            let resp = match self.client.post(&self.graphql_url).json(&body).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() {
                return resp.json().await.map_err(Into::into);
            }
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let text = resp.text().await.unwrap_or_default();
                last_err = Some(anyhow::anyhow!("GitHub GraphQL error {}: {}", status, text));
                continue;
            }

            let text = resp.text().await.unwrap_or_default();
            bail!("GitHub GraphQL error {}: {}", status, text);
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("GitHub GraphQL failed after retries")))
    }

    async fn fetch_head_sha(&self, owner: &str, repo: &str, branch: &str) -> Result<Option<String>> {
        let url = format!("{}/repos/{}/{}/commits/{}", self.api_base, owner, repo, branch);
        let json = match self.get_json(&url).await? {
            Some(json) => json,
            None => return Ok(None),
        };
        Ok(json
            .get("sha")
            .and_then(|s| s.as_str())
            .map(|s| s.to_string()))
    }
}

#[async_trait]
impl MetadataProvider for GithubClient {
    async fn fetch_repo(&self, owner: &str, repo: &str) -> Result<Option<RepoMetadata>> {
        let url = format!("{}/repos/{}/{}", self.api_base, owner, repo);
        let json = match self.get_json(&url).await? {
            Some(json) => json,
            None => {
                debug!(target: LOG_TARGET, "{}/{} not found", owner, repo);
                return Ok(None);
            }
        };

        let mut meta = metadata_from_rest(owner, repo, &json);
        if let Some(branch) = json.get("default_branch").and_then(|b| b.as_str()) {
            meta.head_sha = self.fetch_head_sha(owner, repo, branch).await?;
        }
        Ok(Some(meta))
    }

    async fn fetch_many(
        &self,
        refs: &[(String, String)],
    ) -> Result<HashMap<(String, String), RepoMetadata>> {
        if refs.is_empty() {
            return Ok(HashMap::new());
        }
        if refs.len() > 50 {
            bail!("fetch_many accepts at most 50 repositories per call, got {}", refs.len());
        }

        let query = build_batch_query(refs);
        let json = self.post_graphql(&query).await?;

        let mut out = HashMap::new();
        let data = match json.get("data") {
            Some(data) if !data.is_null() => data,
            _ => {
                debug!(target: LOG_TARGET, "GraphQL batch returned no data: {}", json);
                return Ok(out);
            }
        };

        for (i, (owner, repo)) in refs.iter().enumerate() {
            let node = data.get(format!("r{}", i));
            if let Some(node) = node.filter(|n| !n.is_null()) {
                out.insert(
                    (owner.clone(), repo.clone()),
                    metadata_from_graphql(owner, repo, node),
                );
            }
        }
        Ok(out)
    }

    async fn get_file(&self, owner: &str, repo: &str, path: &str) -> Result<Option<String>> {
        let url = format!("{}/repos/{}/{}/contents/{}", self.api_base, owner, repo, path);
        let json = match self.get_json(&url).await? {
            Some(json) => json,
            None => return Ok(None),
        };

        let encoded = match json.get("content").and_then(|c| c.as_str()) {
            Some(content) if json.get("encoding").and_then(|e| e.as_str()) == Some("base64") => {
                content
            }
            // "none" encoding means the file is too large for inline fetch
            _ => return Ok(None),
        };

        let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = BASE64
            .decode(cleaned)
            .with_context(|| format!("Invalid base64 content for {}/{}/{}", owner, repo, path))?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(Some(text)),
            // Binary content under a text-looking path
            Err(_) => Ok(None),
        }
    }

    async fn get_tree(&self, owner: &str, repo: &str, head_ref: &str) -> Result<Vec<TreeEntry>> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, owner, repo, head_ref
        );
        let json = match self.get_json(&url).await? {
            Some(json) => json,
            None => return Ok(Vec::new()),
        };

        let entries = json
            .get("tree")
            .and_then(|t| t.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("blob"))
                    .filter_map(|item| {
                        Some(TreeEntry {
                            path: item.get("path")?.as_str()?.to_string(),
                            size: item.get("size").and_then(|s| s.as_u64()).unwrap_or(0),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(entries)
    }
}

fn graphql_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Build one GraphQL query with an alias per repository.
fn build_batch_query(refs: &[(String, String)]) -> String {
    let mut query = String::from("query {\n");
    for (i, (owner, repo)) in refs.iter().enumerate() {
        query.push_str(&format!(
            "  r{}: repository(owner: {}, name: {}) {{ stargazerCount forkCount pushedAt description isFork repositoryTopics(first: 10) {{ nodes {{ topic {{ name }} }} }} defaultBranchRef {{ target {{ oid }} }} }}\n",
            i,
            graphql_string(owner),
            graphql_string(repo)
        ));
    }
    query.push('}');
    query
}

fn parse_timestamp(value: Option<&serde_json::Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn metadata_from_rest(owner: &str, repo: &str, json: &serde_json::Value) -> RepoMetadata {
    RepoMetadata {
        owner: owner.to_string(),
        repo: repo.to_string(),
        stars: json
            .get("stargazers_count")
            .and_then(|v| v.as_i64())
            .unwrap_or(0),
        forks: json.get("forks_count").and_then(|v| v.as_i64()).unwrap_or(0),
        description: json
            .get("description")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        pushed_at: parse_timestamp(json.get("pushed_at")),
        is_fork: json.get("fork").and_then(|v| v.as_bool()).unwrap_or(false),
        topics: json
            .get("topics")
            .and_then(|t| t.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default(),
        head_sha: None,
    }
}

fn metadata_from_graphql(owner: &str, repo: &str, node: &serde_json::Value) -> RepoMetadata {
    RepoMetadata {
        owner: owner.to_string(),
        repo: repo.to_string(),
        stars: node
            .get("stargazerCount")
            .and_then(|v| v.as_i64())
            .unwrap_or(0),
        forks: node.get("forkCount").and_then(|v| v.as_i64()).unwrap_or(0),
        description: node
            .get("description")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        pushed_at: parse_timestamp(node.get("pushedAt")),
        is_fork: node.get("isFork").and_then(|v| v.as_bool()).unwrap_or(false),
        topics: node
            .get("repositoryTopics")
            .and_then(|t| t.get("nodes"))
            .and_then(|n| n.as_array())
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|n| n.get("topic")?.get("name")?.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default(),
        head_sha: node
            .get("defaultBranchRef")
            .and_then(|b| b.get("target"))
            .and_then(|t| t.get("oid"))
            .and_then(|o| o.as_str())
            .map(|s| s.to_string()),
    }
}
