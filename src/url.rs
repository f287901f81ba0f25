//! Resource URL model (design §4.1).
//!
//! Classifies an absolute URL pointing at a tree, blob, or raw resource
//! inside a hosted repository into `{host, owner, repo, kind, ref, path,
//! suffix}`, and supports relative-link resolution against that shape.

use std::fmt;

use crate::errors::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlKind {
    Tree,
    Blob,
}

impl fmt::Display for UrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlKind::Tree => write!(f, "tree"),
            UrlKind::Blob => write!(f, "blob"),
        }
    }
}

/// An absolute URL into a hosted repository, decomposed per the design.
///
/// `Eq`/`Hash` deliberately ignore `suffix` (query/fragment): two links that
/// differ only by `#anchor` address the same resource for tree-cache lookups
/// and for the URL->nodes index.
#[derive(Debug, Clone)]
pub struct ResourceUrl {
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub kind: UrlKind,
    pub raw: bool,
    pub reference: String,
    pub path: String,
    pub suffix: String,
}

impl PartialEq for ResourceUrl {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.owner == other.owner
            && self.repo == other.repo
            && self.kind == other.kind
            && self.reference == other.reference
            && self.path == other.path
    }
}

impl Eq for ResourceUrl {}

impl std::hash::Hash for ResourceUrl {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.owner.hash(state);
        self.repo.hash(state);
        self.kind.hash(state);
        self.reference.hash(state);
        self.path.hash(state);
    }
}

impl ResourceUrl {
    pub fn parse(raw_url: &str) -> Result<Self, CoreError> {
        let parsed = url::Url::parse(raw_url)
            .map_err(|e| CoreError::InvalidManifest(format!("invalid resource URL {raw_url}: {e}")))?;

        let host = parsed
            .host_str()
            .ok_or_else(|| CoreError::InvalidManifest(format!("resource URL missing host: {raw_url}")))?
            .to_string();

        let suffix = build_suffix(&parsed);

        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        // Shape 1: https://<h>/raw/<owner>/<repo>/<ref>/<path...>
        if segments.first() == Some(&"raw") {
            if segments.len() < 4 {
                return Err(CoreError::InvalidManifest(format!(
                    "raw resource URL missing owner/repo/ref: {raw_url}"
                )));
            }
            return Ok(ResourceUrl {
                host,
                owner: segments[1].to_string(),
                repo: segments[2].to_string(),
                kind: UrlKind::Blob,
                raw: true,
                reference: segments[3].to_string(),
                path: segments[4..].join("/"),
                suffix,
            });
        }

        // Shape 2: https://raw.githubusercontent.com/<owner>/<repo>/<ref>/<path...>
        if host.eq_ignore_ascii_case("raw.githubusercontent.com") {
            if segments.len() < 3 {
                return Err(CoreError::InvalidManifest(format!(
                    "raw.githubusercontent.com URL missing owner/repo/ref: {raw_url}"
                )));
            }
            return Ok(ResourceUrl {
                host: "github.com".to_string(),
                owner: segments[0].to_string(),
                repo: segments[1].to_string(),
                kind: UrlKind::Blob,
                raw: true,
                reference: segments[2].to_string(),
                path: segments[3..].join("/"),
                suffix,
            });
        }

        // Shape 3: https://<h>/<owner>/<repo>/<type>/<ref>/<path...>
        if segments.len() < 4 {
            return Err(CoreError::InvalidManifest(format!(
                "resource URL must include /tree/ or /blob/ with a ref and path: {raw_url}"
            )));
        }
        let kind = match segments[2] {
            "tree" => UrlKind::Tree,
            "blob" => UrlKind::Blob,
            other => {
                return Err(CoreError::InvalidManifest(format!(
                    "unrecognised resource URL type '{other}' in {raw_url}"
                )))
            }
        };

        Ok(ResourceUrl {
            host,
            owner: segments[0].to_string(),
            repo: segments[1].to_string(),
            kind,
            raw: false,
            reference: segments[3].to_string(),
            path: segments[4..].join("/"),
            suffix,
        })
    }

    /// The `{owner,repo,ref}` prefix of this resource, as its own tree URL.
    pub fn reference_url(&self) -> ResourceUrl {
        ResourceUrl {
            host: self.host.clone(),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            kind: UrlKind::Tree,
            raw: false,
            reference: self.reference.clone(),
            path: String::new(),
            suffix: String::new(),
        }
    }

    pub fn is_tree_equivalent(&self, other: &ResourceUrl) -> bool {
        self.reference_url() == other.reference_url()
    }

    /// Canonical `.../{tree|blob}/<ref>/<path>` rendering (not the raw form).
    pub fn to_canonical_string(&self) -> String {
        let mut s = format!(
            "https://{}/{}/{}/{}/{}",
            self.host, self.owner, self.repo, self.kind, self.reference
        );
        if !self.path.is_empty() {
            s.push('/');
            s.push_str(&self.path);
        }
        s.push_str(&self.suffix);
        s
    }

    /// The raw-content URL for this resource (used for embeds and downloads).
    pub fn raw_url(&self) -> String {
        if self.host.eq_ignore_ascii_case("github.com") {
            format!(
                "https://raw.githubusercontent.com/{}/{}/{}/{}",
                self.owner, self.repo, self.reference, self.path
            )
        } else {
            format!(
                "https://{}/raw/{}/{}/{}/{}",
                self.host, self.owner, self.repo, self.reference, self.path
            )
        }
    }

    /// Resolve a relative link found inside this resource's document,
    /// returning the two disambiguation candidates (blob, then tree) the
    /// caller should probe against the repository tree cache.
    ///
    /// Absolute links are rejected -- callers must route those through
    /// `ResourceUrl::parse` directly.
    pub fn resolve_relative(&self, link: &str) -> Result<(ResourceUrl, ResourceUrl), CoreError> {
        let (link_path, link_suffix) = split_suffix(link);

        if url::Url::parse(link).is_ok() || link_path.starts_with("//") {
            return Err(CoreError::InvalidManifest(
                "expected relative link".to_string(),
            ));
        }

        let resolved_path = if link_path.starts_with('/') {
            normalize_path(link_path.trim_start_matches('/'))
        } else {
            let base_dir = match self.path.rsplit_once('/') {
                Some((dir, _)) => dir,
                None => "",
            };
            let joined = if base_dir.is_empty() {
                link_path.to_string()
            } else {
                format!("{base_dir}/{link_path}")
            };
            normalize_path(&joined)
        };

        let blob_candidate = ResourceUrl {
            host: self.host.clone(),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            kind: UrlKind::Blob,
            raw: false,
            reference: self.reference.clone(),
            path: resolved_path.clone(),
            suffix: link_suffix.clone(),
        };
        let tree_candidate = ResourceUrl {
            kind: UrlKind::Tree,
            ..blob_candidate.clone()
        };

        Ok((blob_candidate, tree_candidate))
    }
}

fn build_suffix(parsed: &url::Url) -> String {
    let mut suffix = String::new();
    if let Some(query) = parsed.query() {
        suffix.push('?');
        suffix.push_str(query);
    }
    if let Some(fragment) = parsed.fragment() {
        suffix.push('#');
        suffix.push_str(fragment);
    }
    suffix
}

fn split_suffix(link: &str) -> (&str, String) {
    match link.find(['?', '#']) {
        Some(idx) => (&link[..idx], link[idx..].to_string()),
        None => (link, String::new()),
    }
}

fn normalize_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_blob_url() {
        let u = ResourceUrl::parse("https://github.com/o/r/blob/main/docs/a.md").unwrap();
        assert_eq!(u.owner, "o");
        assert_eq!(u.repo, "r");
        assert_eq!(u.kind, UrlKind::Blob);
        assert_eq!(u.reference, "main");
        assert_eq!(u.path, "docs/a.md");
        assert!(!u.raw);
    }

    #[test]
    fn parses_raw_githubusercontent() {
        let u =
            ResourceUrl::parse("https://raw.githubusercontent.com/o/r/main/docs/a.md").unwrap();
        assert_eq!(u.host, "github.com");
        assert_eq!(u.kind, UrlKind::Blob);
        assert!(u.raw);
        assert_eq!(u.path, "docs/a.md");
    }

    #[test]
    fn parses_raw_path_shape() {
        let u = ResourceUrl::parse("https://ghe.example.com/raw/o/r/main/docs/a.md").unwrap();
        assert_eq!(u.host, "ghe.example.com");
        assert_eq!(u.kind, UrlKind::Blob);
        assert!(u.raw);
        assert_eq!(u.owner, "o");
        assert_eq!(u.path, "docs/a.md");
    }

    #[test]
    fn captures_suffix_without_polluting_path() {
        let u = ResourceUrl::parse("https://github.com/o/r/blob/main/a.md?plain=1#L10").unwrap();
        assert_eq!(u.path, "a.md");
        assert_eq!(u.suffix, "?plain=1#L10");
    }

    #[test]
    fn reference_url_strips_path_and_type() {
        let a = ResourceUrl::parse("https://github.com/o/r/blob/main/a.md").unwrap();
        let b = ResourceUrl::parse("https://github.com/o/r/tree/main/sub").unwrap();
        assert!(a.is_tree_equivalent(&b));
    }

    #[test]
    fn resolve_relative_rejects_absolute() {
        let a = ResourceUrl::parse("https://github.com/o/r/blob/main/a/b.md").unwrap();
        let err = a.resolve_relative("https://example.com/x").unwrap_err();
        assert!(err.to_string().contains("expected relative link"));
    }

    #[test]
    fn resolve_relative_joins_against_enclosing_dir() {
        let a = ResourceUrl::parse("https://github.com/o/r/blob/main/a/one.md").unwrap();
        let (blob, tree) = a.resolve_relative("../b/two.md").unwrap();
        assert_eq!(blob.path, "b/two.md");
        assert_eq!(tree.path, "b/two.md");
        assert_eq!(blob.kind, UrlKind::Blob);
        assert_eq!(tree.kind, UrlKind::Tree);
    }

    #[test]
    fn resolve_relative_absolute_repo_path() {
        let a = ResourceUrl::parse("https://github.com/o/r/blob/main/a/one.md").unwrap();
        let (blob, _tree) = a.resolve_relative("/docs/x.md").unwrap();
        assert_eq!(blob.path, "docs/x.md");
    }

    #[test]
    fn raw_url_for_github_and_ghe() {
        let gh = ResourceUrl::parse("https://github.com/o/r/blob/main/a.md").unwrap();
        assert_eq!(
            gh.raw_url(),
            "https://raw.githubusercontent.com/o/r/main/a.md"
        );

        let ghe = ResourceUrl::parse("https://ghe.example.com/o/r/blob/main/a.md").unwrap();
        assert_eq!(ghe.raw_url(), "https://ghe.example.com/raw/o/r/main/a.md");
    }

    #[test]
    fn equality_ignores_suffix() {
        let a = ResourceUrl::parse("https://github.com/o/r/blob/main/a.md#L1").unwrap();
        let b = ResourceUrl::parse("https://github.com/o/r/blob/main/a.md#L99").unwrap();
        assert_eq!(a, b);
    }
}
