//! The local filesystem repository host.
//!
//! Lets a manifest reference a checkout already present on disk (useful for
//! previewing a manifest without round-tripping through GitHub). It has no
//! rate limit to track and no repository "load" step -- a directory walk
//! happens lazily the first time its tree is asked for, cached the same way
//! the GitHub host caches a remote tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::{Mutex, OnceCell};

use crate::errors::CoreError;
use crate::types::GitInfo;
use crate::url::{ResourceUrl, UrlKind};

use super::RepoTree;

const LOCAL_HOST: &str = "local";

pub struct LocalHost {
    client: Client,
    roots: Mutex<HashMap<String, TreeCell>>,
}

type TreeCell = Arc<OnceCell<Result<Arc<RepoTree>, String>>>;

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalHost {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            roots: Mutex::new(HashMap::new()),
        }
    }

    pub fn accepts(&self, raw_url: &str) -> bool {
        raw_url.starts_with("file://") || raw_url.starts_with("local://")
    }

    pub fn parse(&self, raw_url: &str) -> Result<ResourceUrl, CoreError> {
        let stripped = raw_url
            .strip_prefix("file://")
            .or_else(|| raw_url.strip_prefix("local://"))
            .ok_or_else(|| CoreError::InvalidManifest(format!("not a local resource URL: {raw_url}")))?;

        let path = Path::new(stripped);
        let kind = if path.is_dir() { UrlKind::Tree } else { UrlKind::Blob };

        Ok(ResourceUrl {
            host: LOCAL_HOST.to_string(),
            owner: String::new(),
            repo: String::new(),
            kind,
            raw: false,
            reference: String::new(),
            path: stripped.trim_start_matches('/').to_string(),
            suffix: String::new(),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn root_for(&self, reference: &ResourceUrl) -> PathBuf {
        PathBuf::from("/").join(&reference.path)
    }

    pub async fn load_repository(&self, reference: &ResourceUrl) -> Result<Arc<RepoTree>, CoreError> {
        let key = reference.path.clone();
        let cell = {
            let mut guard = self.roots.lock().await;
            guard.entry(key).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let result = cell
            .get_or_init(|| async { self.walk(reference).map_err(|e| e.to_string()) })
            .await;

        result.clone().map_err(CoreError::TransientHttp)
    }

    fn walk(&self, reference: &ResourceUrl) -> Result<Arc<RepoTree>, CoreError> {
        let root = self.root_for(reference);
        let mut tree = RepoTree::default();
        if root.exists() {
            walk_dir(&root, &root, reference, &mut tree)?;
        }
        Ok(Arc::new(tree))
    }

    pub async fn read(&self, url: &ResourceUrl) -> Result<Vec<u8>, CoreError> {
        let path = PathBuf::from("/").join(&url.path);
        tokio::fs::read(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CoreError::NotFound(path.display().to_string()),
                _ => CoreError::FatalHttp(format!("reading {}: {e}", path.display())),
            })
    }

    pub async fn git_info(&self, _url: &ResourceUrl) -> Result<Option<GitInfo>, CoreError> {
        Ok(None)
    }

    pub fn get_rate_limit(&self) -> Option<crate::rate_limit::RateLimitSnapshot> {
        None
    }
}

fn walk_dir(
    root: &Path,
    dir: &Path,
    reference: &ResourceUrl,
    tree: &mut RepoTree,
) -> Result<(), CoreError> {
    let read_dir = std::fs::read_dir(dir)
        .map_err(|e| CoreError::FatalHttp(format!("walking {}: {e}", dir.display())))?;

    for entry in read_dir {
        let entry = entry.map_err(|e| CoreError::FatalHttp(format!("walking {}: {e}", dir.display())))?;
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let relative_str = relative.to_string_lossy().replace('\\', "/");

        if relative_str.split('/').next() == Some("vendor") {
            continue;
        }

        let file_type = entry
            .file_type()
            .map_err(|e| CoreError::FatalHttp(format!("stat {}: {e}", path.display())))?;

        if file_type.is_dir() {
            walk_dir(root, &path, reference, tree)?;
            let url = ResourceUrl {
                kind: UrlKind::Tree,
                path: relative_str,
                ..reference.clone()
            };
            tree.entries.insert(url, String::new());
        } else if file_type.is_file() {
            let url = ResourceUrl {
                kind: UrlKind::Blob,
                path: relative_str,
                ..reference.clone()
            };
            tree.entries.insert(url, String::new());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_file_and_local_schemes() {
        let host = LocalHost::new();
        assert!(host.accepts("file:///tmp/docs"));
        assert!(host.accepts("local:///tmp/docs"));
        assert!(!host.accepts("https://github.com/o/r"));
    }

    #[tokio::test]
    async fn walks_directory_and_skips_vendor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("vendor")).unwrap();
        std::fs::write(dir.path().join("vendor/skip.md"), b"skip").unwrap();
        std::fs::write(dir.path().join("a.md"), b"hello").unwrap();

        let host = LocalHost::new();
        let raw = format!("file://{}", dir.path().display());
        let reference = host.parse(&raw).unwrap();
        let tree = host.load_repository(&reference).await.unwrap();

        let has_a = tree
            .entries
            .keys()
            .any(|u| u.path.ends_with("a.md"));
        let has_vendor = tree.entries.keys().any(|u| u.path.contains("vendor"));
        assert!(has_a);
        assert!(!has_vendor);
    }
}
