//! The GitHub (and GitHub Enterprise) repository host.
//!
//! Talks to the REST "contents"/"git/trees"/"commits" endpoints the same
//! way the teacher's `github::api` module does, reusing its cached-request
//! plumbing (`crate::http`) and rate-limit tracker verbatim. The public
//! surface here is reshaped around `ResourceUrl`/`RepoTree` instead of the
//! teacher's single-download `RequestInfo`.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::{Mutex, OnceCell};

use crate::errors::CoreError;
use crate::gitinfo::CommitRecord;
use crate::rate_limit::{RateLimitSnapshot, RateLimitTracker};
use crate::types::GitInfo;
use crate::url::{ResourceUrl, UrlKind};

use super::RepoTree;

#[derive(Debug, Deserialize)]
struct GitTreeResponse {
    tree: Vec<GitTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct GitTreeEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    sha: String,
    html_url: String,
    commit: CommitDetail,
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
    author: CommitPersonIdent,
    committer: CommitPersonIdent,
}

#[derive(Debug, Deserialize)]
struct CommitPersonIdent {
    name: String,
    email: String,
    date: String,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    #[serde(rename = "type")]
    account_type: String,
}

/// Per-reference single-flight cell: concurrent resolvers racing to touch
/// the same `(owner, repo, ref)` all await the same in-flight fetch instead
/// of issuing N redundant tree requests.
type TreeCell = Arc<OnceCell<Result<Arc<RepoTree>, String>>>;

/// A single host instance answers for *every* GitHub/GHE hostname a manifest
/// references -- `accepts` only checks the URL scheme, and every per-request
/// decision that depends on which host is actually being talked to (API base
/// URL, OAuth token) is keyed off the resource URL's own `host` field rather
/// than anything fixed at construction. This is what lets one `--github-
/// oauth-token-map host=token` entry per enterprise host work without the
/// registry needing a separate `GitHubHost` per hostname.
pub struct GitHubHost {
    client: Client,
    rate_limit: Arc<RateLimitTracker>,
    tokens: HashMap<String, String>,
    no_cache: bool,
    trees: Mutex<HashMap<String, TreeCell>>,
}

impl Default for GitHubHost {
    fn default() -> Self {
        Self::new(HashMap::new(), false)
    }
}

impl GitHubHost {
    pub fn new(tokens: HashMap<String, String>, no_cache: bool) -> Self {
        Self {
            client: Client::new(),
            rate_limit: Arc::new(RateLimitTracker::default()),
            tokens,
            no_cache,
            trees: Mutex::new(HashMap::new()),
        }
    }

    pub fn accepts(&self, raw_url: &str) -> bool {
        raw_url.starts_with("https://") || raw_url.starts_with("http://")
    }

    pub fn parse(&self, raw_url: &str) -> Result<ResourceUrl, CoreError> {
        ResourceUrl::parse(raw_url)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn get_rate_limit(&self) -> Option<RateLimitSnapshot> {
        self.rate_limit.state.try_lock().ok()?.last_snapshot.clone()
    }

    fn token_for(&self, host: &str) -> Option<&str> {
        self.tokens.get(host).map(|s| s.as_str())
    }

    fn api_base(&self, host: &str, owner: &str, repo: &str) -> String {
        if host.eq_ignore_ascii_case("github.com") {
            format!("https://api.github.com/repos/{owner}/{repo}")
        } else {
            format!("https://{host}/api/v3/repos/{owner}/{repo}")
        }
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder, host: &str) -> reqwest::RequestBuilder {
        match self.token_for(host) {
            Some(token) => builder.header(AUTHORIZATION, format!("token {}", token.trim())),
            None => builder,
        }
    }

    /// Fetches the recursive tree for `reference`, single-flighted per
    /// `(owner, repo, ref)` so parallel resolvers never issue duplicate
    /// requests for the same reference.
    pub async fn load_repository(&self, reference: &ResourceUrl) -> Result<Arc<RepoTree>, CoreError> {
        let key = format!(
            "{}/{}/{}/{}",
            reference.host, reference.owner, reference.repo, reference.reference
        );

        let cell = {
            let mut guard = self.trees.lock().await;
            guard.entry(key).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let result = cell
            .get_or_init(|| async { self.fetch_tree(reference).await.map_err(|e| e.to_string()) })
            .await;

        result
            .clone()
            .map_err(|e| CoreError::TransientHttp(e))
    }

    async fn fetch_tree(&self, reference: &ResourceUrl) -> Result<Arc<RepoTree>, CoreError> {
        let url = format!(
            "{}/git/trees/{}?recursive=1",
            self.api_base(&reference.host, &reference.owner, &reference.repo),
            reference.reference
        );
        let builder = self.with_auth(self.client.get(&url), &reference.host);
        let context = format!(
            "enumerating git tree for {}/{}@{}",
            reference.owner, reference.repo, reference.reference
        );

        let body = crate::http::send_github_request_cached(&builder, &self.rate_limit, &context, self.no_cache)
            .await
            .map_err(|e| CoreError::TransientHttp(e.to_string()))?;

        let parsed: GitTreeResponse = serde_json::from_slice(&body)
            .map_err(|e| CoreError::FatalHttp(format!("decoding git tree for {context}: {e}")))?;

        if parsed.truncated {
            log::warn!("git tree for {context} is truncated by the API; some paths may be missing");
        }

        let mut tree = RepoTree::default();
        for entry in parsed.tree {
            let kind = match entry.entry_type.as_str() {
                "blob" => UrlKind::Blob,
                "tree" => UrlKind::Tree,
                _ => continue, // submodules ("commit") have no content to serve
            };
            if entry.path.split('/').next() == Some("vendor") {
                continue;
            }
            let url = ResourceUrl {
                host: reference.host.clone(),
                owner: reference.owner.clone(),
                repo: reference.repo.clone(),
                kind,
                raw: false,
                reference: reference.reference.clone(),
                path: entry.path.clone(),
                suffix: String::new(),
            };
            if let Some(sha) = entry.sha {
                tree.entries.insert(url, sha);
            }
        }

        Ok(Arc::new(tree))
    }

    pub async fn read(&self, url: &ResourceUrl) -> Result<Vec<u8>, CoreError> {
        let raw = url.raw_url();
        let builder = self.with_auth(self.client.get(&raw), &url.host);
        let context = format!("reading {}/{}@{}:{}", url.owner, url.repo, url.reference, url.path);

        let response = builder
            .send()
            .await
            .map_err(|e| CoreError::TransientHttp(format!("{context}: {e}")))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(CoreError::NotFound(context));
        }
        if status.as_u16() >= 400 {
            return Err(CoreError::FatalHttp(format!("{context} returned {status}")));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| CoreError::TransientHttp(format!("{context}: {e}")))
    }

    pub async fn git_info(&self, url: &ResourceUrl) -> Result<Option<GitInfo>, CoreError> {
        let api_url = format!(
            "{}/commits?path={}&sha={}",
            self.api_base(&url.host, &url.owner, &url.repo),
            url.path,
            url.reference
        );
        let builder = self.with_auth(self.client.get(&api_url), &url.host);
        let context = format!("listing commits for {}/{}:{}", url.owner, url.repo, url.path);

        let body = crate::http::send_github_request_cached(&builder, &self.rate_limit, &context, self.no_cache)
            .await
            .map_err(|e| CoreError::TransientHttp(e.to_string()))?;

        let entries: Vec<CommitEntry> = serde_json::from_slice(&body)
            .map_err(|e| CoreError::FatalHttp(format!("decoding commits for {context}: {e}")))?;

        let sha = entries.first().map(|e| e.sha.clone()).unwrap_or_default();
        let commits: Vec<CommitRecord> = entries
            .into_iter()
            .map(|e| CommitRecord {
                sha: e.sha,
                html_url: e.html_url,
                message: e.commit.message,
                author_name: e.commit.author.name,
                committer_email: e.commit.committer.email,
                date: e.commit.author.date,
                author_is_user: e
                    .author
                    .map(|a| a.account_type == "User")
                    .unwrap_or(false),
            })
            .collect();

        Ok(super::git_info_from_commits(commits, &sha, Some(&url.reference), &url.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        let host = GitHubHost::new(HashMap::new(), true);
        assert!(host.accepts("https://github.com/o/r/blob/main/a.md"));
        assert!(host.accepts("http://ghe.example.com/o/r/blob/main/a.md"));
        assert!(!host.accepts("file:///tmp/a.md"));
    }

    #[test]
    fn api_base_differs_for_enterprise_host() {
        let host = GitHubHost::new(HashMap::new(), true);
        assert_eq!(host.api_base("github.com", "o", "r"), "https://api.github.com/repos/o/r");
        assert_eq!(
            host.api_base("ghe.example.com", "o", "r"),
            "https://ghe.example.com/api/v3/repos/o/r"
        );
    }
}
