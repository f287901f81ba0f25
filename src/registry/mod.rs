//! The registry: a first-accepting dispatch list of repository hosts.
//!
//! A `Registry` answers "who can read this resource" and "go load this
//! repository's tree" without the resolver needing to know whether a URL
//! is served by GitHub, GitHub Enterprise, or a local checkout. Each host
//! is a variant of `RepositoryHost`; capability checks are plain methods on
//! that enum rather than a boxed trait object, since the set of hosts is
//! closed and known at compile time.

pub mod github;
pub mod local;
pub mod mapped;

use std::collections::HashMap;
use std::sync::Arc;

use log::info;

use crate::errors::CoreError;
use crate::gitinfo::CommitRecord;
use crate::rate_limit::RateLimitSnapshot;
use crate::url::{ResourceUrl, UrlKind};

pub use github::GitHubHost;
pub use local::LocalHost;
pub use mapped::MappedHost;

/// The recursive listing of one `(owner, repo, ref)`, keyed by resource URL
/// so a `tree/` guess and a `blob/` guess for the same path share an entry.
#[derive(Debug, Default)]
pub struct RepoTree {
    pub entries: HashMap<ResourceUrl, String>,
}

impl RepoTree {
    pub fn contains(&self, url: &ResourceUrl) -> bool {
        self.entries.contains_key(url)
    }
}

pub enum RepositoryHost {
    GitHub(GitHubHost),
    Local(LocalHost),
    Mapped(MappedHost),
}

impl RepositoryHost {
    pub fn accepts(&self, raw_url: &str) -> bool {
        match self {
            RepositoryHost::GitHub(h) => h.accepts(raw_url),
            RepositoryHost::Local(h) => h.accepts(raw_url),
            RepositoryHost::Mapped(h) => h.accepts(raw_url),
        }
    }

    pub fn parse(&self, raw_url: &str) -> Result<ResourceUrl, CoreError> {
        match self {
            RepositoryHost::GitHub(h) => h.parse(raw_url),
            RepositoryHost::Local(h) => h.parse(raw_url),
            RepositoryHost::Mapped(h) => h.parse(raw_url),
        }
    }

    pub async fn load_repository(&self, reference: &ResourceUrl) -> Result<Arc<RepoTree>, CoreError> {
        match self {
            RepositoryHost::GitHub(h) => h.load_repository(reference).await,
            RepositoryHost::Local(h) => h.load_repository(reference).await,
            RepositoryHost::Mapped(h) => h.load_repository(reference).await,
        }
    }

    pub async fn read(&self, url: &ResourceUrl) -> Result<Vec<u8>, CoreError> {
        match self {
            RepositoryHost::GitHub(h) => h.read(url).await,
            RepositoryHost::Local(h) => h.read(url).await,
            RepositoryHost::Mapped(h) => h.read(url).await,
        }
    }

    /// Probes the blob candidate then the tree candidate against the
    /// repository tree cache, loading the tree first if necessary.
    pub async fn resolve_relative_link(
        &self,
        from: &ResourceUrl,
        link: &str,
    ) -> Result<Option<ResourceUrl>, CoreError> {
        let (blob_candidate, tree_candidate) = from.resolve_relative(link)?;
        let reference = from.reference_url();
        let tree = self.load_repository(&reference).await?;

        if tree.contains(&blob_candidate) {
            return Ok(Some(blob_candidate));
        }
        if tree.contains(&tree_candidate) {
            return Ok(Some(tree_candidate));
        }
        Ok(None)
    }

    pub async fn git_info(
        &self,
        url: &ResourceUrl,
    ) -> Result<Option<crate::types::GitInfo>, CoreError> {
        match self {
            RepositoryHost::GitHub(h) => h.git_info(url).await,
            RepositoryHost::Local(h) => h.git_info(url).await,
            RepositoryHost::Mapped(h) => h.git_info(url).await,
        }
    }

    pub fn get_rate_limit(&self) -> Option<RateLimitSnapshot> {
        match self {
            RepositoryHost::GitHub(h) => h.get_rate_limit(),
            RepositoryHost::Local(_) => None,
            RepositoryHost::Mapped(_) => None,
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        match self {
            RepositoryHost::GitHub(h) => h.client(),
            RepositoryHost::Local(h) => h.client(),
            RepositoryHost::Mapped(h) => h.client(),
        }
    }

    /// `Tree(url)` (design §4.2): the repository-cache entries under a
    /// `tree`-kind resource URL, filtered to `content_formats` suffixes.
    pub async fn tree(
        &self,
        url: &ResourceUrl,
        content_formats: &[String],
    ) -> Result<Vec<ResourceUrl>, CoreError> {
        if url.kind != UrlKind::Tree {
            return Err(CoreError::InvalidManifest(format!(
                "Tree() requires a tree-kind URL, got {}",
                url.to_canonical_string()
            )));
        }
        let tree = self.load_repository(&url.reference_url()).await?;
        let prefix = if url.path.is_empty() {
            String::new()
        } else {
            format!("{}/", url.path)
        };
        let mut matches: Vec<ResourceUrl> = tree
            .entries
            .keys()
            .filter(|entry| entry.kind == UrlKind::Blob)
            .filter(|entry| {
                if prefix.is_empty() {
                    true
                } else {
                    entry.path.starts_with(&prefix)
                }
            })
            .filter(|entry| {
                content_formats
                    .iter()
                    .any(|suffix| entry.path.ends_with(suffix.as_str()))
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(matches)
    }

    /// `ResourceURL(url)` (design §4.2): disambiguates a guessed URL against
    /// the loaded repository tree, returning `NotFound` if it isn't present.
    pub async fn resource_url(&self, url: &ResourceUrl) -> Result<ResourceUrl, CoreError> {
        let tree = self.load_repository(&url.reference_url()).await?;
        if tree.contains(url) {
            Ok(url.clone())
        } else {
            Err(CoreError::NotFound(url.to_canonical_string()))
        }
    }
}

pub struct Registry {
    hosts: Vec<RepositoryHost>,
    default_client: reqwest::Client,
}

impl Registry {
    pub fn new(hosts: Vec<RepositoryHost>, default_client: reqwest::Client) -> Self {
        Self {
            hosts,
            default_client,
        }
    }

    pub fn default_client(&self) -> &reqwest::Client {
        &self.default_client
    }

    /// First-accepting dispatch: returns the first host willing to claim
    /// `raw_url`, or `None` if no host recognises it.
    pub fn accept(&self, raw_url: &str) -> Option<&RepositoryHost> {
        self.hosts.iter().find(|h| h.accepts(raw_url))
    }

    pub fn parse(&self, raw_url: &str) -> Result<(ResourceUrl, &RepositoryHost), CoreError> {
        let host = self
            .accept(raw_url)
            .ok_or_else(|| CoreError::NotFound(format!("no registered host accepts {raw_url}")))?;
        Ok((host.parse(raw_url)?, host))
    }

    /// Loads the repository owning `url`'s reference. A URL that no host
    /// accepts is silently ignored -- callers that need to know whether a
    /// resource exists call `read`/`resolve_relative_link` instead, which
    /// do surface `NotFound`.
    pub async fn load_repository(&self, url: &ResourceUrl) -> Option<Arc<RepoTree>> {
        for host in &self.hosts {
            if host.accepts(&url.to_canonical_string()) {
                return host.load_repository(url).await.ok();
            }
        }
        None
    }

    pub fn log_rate_limits(&self) {
        for host in &self.hosts {
            if let Some(snapshot) = host.get_rate_limit() {
                info!(
                    "rate limit: {}/{} remaining (resets {})",
                    snapshot.remaining.map(|v| v.to_string()).unwrap_or_else(|| "?".into()),
                    snapshot.limit.map(|v| v.to_string()).unwrap_or_else(|| "?".into()),
                    snapshot.reset_eta_display(),
                );
            }
        }
    }
}

/// Shared helper used by both hosts: turn a flat, newest-first commit list
/// plus the fetched blob sha into a `GitInfo`, or `None` if every commit was
/// filtered out as internal.
pub(crate) fn git_info_from_commits(
    commits: Vec<CommitRecord>,
    sha: &str,
    sha_alias: Option<&str>,
    path: &str,
) -> Option<crate::types::GitInfo> {
    crate::gitinfo::build_git_info(&commits, sha, sha_alias, path)
}

pub(crate) fn tree_kind_for_path(is_dir: bool) -> UrlKind {
    if is_dir {
        UrlKind::Tree
    } else {
        UrlKind::Blob
    }
}
