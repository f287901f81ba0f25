//! A local-override host (`--resource-mapping prefix=localPath`): lets a
//! manifest keep referencing ordinary GitHub-shaped URLs while a chosen URL
//! prefix is actually served from a local checkout, for previewing a
//! manifest edit without round-tripping through GitHub.
//!
//! Resource URLs stay in GitHub shape (`{host, owner, repo, kind, ref,
//! path}`) so a mapped repository still interoperates with links from
//! unmapped ones; only `read`/`load_repository` are redirected to disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::{Mutex, OnceCell};

use crate::errors::CoreError;
use crate::types::GitInfo;
use crate::url::{ResourceUrl, UrlKind};

use super::RepoTree;

type TreeCell = Arc<OnceCell<Result<Arc<RepoTree>, String>>>;

pub struct MappedHost {
    client: Client,
    /// Longest-prefix-first so a more specific mapping wins over a broader
    /// one covering the same repository.
    mappings: Vec<(String, PathBuf)>,
    trees: Mutex<HashMap<String, TreeCell>>,
}

impl MappedHost {
    pub fn new(mappings: HashMap<String, String>) -> Self {
        let mut mappings: Vec<(String, PathBuf)> = mappings
            .into_iter()
            .map(|(prefix, path)| (prefix, PathBuf::from(path)))
            .collect();
        mappings.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self {
            client: Client::new(),
            mappings,
            trees: Mutex::new(HashMap::new()),
        }
    }

    fn mapping_for(&self, raw_url: &str) -> Option<&(String, PathBuf)> {
        self.mappings.iter().find(|(prefix, _)| raw_url.starts_with(prefix.as_str()))
    }

    pub fn accepts(&self, raw_url: &str) -> bool {
        self.mapping_for(raw_url).is_some()
    }

    pub fn parse(&self, raw_url: &str) -> Result<ResourceUrl, CoreError> {
        ResourceUrl::parse(raw_url)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn local_root(&self, reference: &ResourceUrl) -> Option<PathBuf> {
        let canonical = reference.reference_url().to_canonical_string();
        self.mapping_for(&canonical).map(|(_, root)| root.clone())
    }

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
            .get_or_init(|| async { self.walk(reference).map_err(|e| e.to_string()) })
            .await;
        result.clone().map_err(CoreError::TransientHttp)
    }

    fn walk(&self, reference: &ResourceUrl) -> Result<Arc<RepoTree>, CoreError> {
        let Some(root) = self.local_root(reference) else {
            return Err(CoreError::NotFound(format!(
                "no resource mapping covers {}",
                reference.to_canonical_string()
            )));
        };
        let mut tree = RepoTree::default();
        if root.exists() {
            walk_dir(&root, &root, reference, &mut tree)?;
        }
        Ok(Arc::new(tree))
    }

    pub async fn read(&self, url: &ResourceUrl) -> Result<Vec<u8>, CoreError> {
        let root = self
            .local_root(url)
            .ok_or_else(|| CoreError::NotFound(url.to_canonical_string()))?;
        let path = root.join(&url.path);
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

fn walk_dir(root: &Path, dir: &Path, reference: &ResourceUrl, tree: &mut RepoTree) -> Result<(), CoreError> {
    let read_dir = std::fs::read_dir(dir)
        .map_err(|e| CoreError::FatalHttp(format!("walking {}: {e}", dir.display())))?;

    for entry in read_dir {
        let entry = entry.map_err(|e| CoreError::FatalHttp(format!("walking {}: {e}", dir.display())))?;
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let relative_str = relative.to_string_lossy().replace('\\', "/");

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
    fn longest_prefix_wins() {
        let mut mappings = HashMap::new();
        mappings.insert("https://github.com/o/r".to_string(), "/a".to_string());
        mappings.insert("https://github.com/o/r/tree/main/docs".to_string(), "/b".to_string());
        let host = MappedHost::new(mappings);
        assert_eq!(host.mappings[0].0, "https://github.com/o/r/tree/main/docs");
    }

    #[tokio::test]
    async fn reads_mapped_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), b"hello").unwrap();

        let mut mappings = HashMap::new();
        mappings.insert(
            "https://github.com/o/r".to_string(),
            dir.path().to_string_lossy().into_owned(),
        );
        let host = MappedHost::new(mappings);

        let url = ResourceUrl::parse("https://github.com/o/r/blob/main/a.md").unwrap();
        assert!(host.accepts(&url.to_canonical_string()));
        let bytes = host.read(&url).await.unwrap();
        assert_eq!(bytes, b"hello");
    }
}
