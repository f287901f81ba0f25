//! Pure derivation rules for the `GitInfo` sidecar (design §4.2).
//!
//! A file's git history is a list of commits touching its path, newest
//! first. This module turns that list into the sidecar fields; it has no
//! knowledge of how the commits were fetched, so it's testable without a
//! network.

use crate::types::GitInfo;

#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub sha: String,
    pub html_url: String,
    pub message: String,
    pub author_name: String,
    pub committer_email: String,
    /// RFC3339 commit date.
    pub date: String,
    /// Whether GitHub resolved the author to a registered `User` account
    /// (as opposed to an unassociated email address).
    pub author_is_user: bool,
}

/// A commit is "internal" -- and excluded from lastmod/publishdate/author/
/// contributors -- if any of these hold.
pub fn is_internal_commit(commit: &CommitRecord) -> bool {
    commit.message.starts_with("[int]")
        || commit.message.contains("[skip ci]")
        || commit.committer_email.starts_with("gardener.ci")
        || commit.committer_email.starts_with("gardener.opensource")
}

fn truncate_at_commit(html_url: &str) -> String {
    const MARKER: &str = "/commit/";
    match html_url.find(MARKER) {
        Some(idx) => html_url[..idx + MARKER.len()].to_string(),
        None => html_url.to_string(),
    }
}

/// Builds the `GitInfo` sidecar from a path's commit history (newest
/// first). Returns `None` if every commit is "internal" (nothing survives
/// the filter), matching "if none remain, emit nothing".
///
/// - `lastmod` is the newest non-internal commit's date.
/// - `publishdate` and `author` come from the oldest non-internal commit.
/// - `weburl` is that commit's URL, truncated right after `/commit/`.
/// - `contributors` are distinct non-author `User`-typed committers across
///   the remaining commits, in first-seen (newest-to-oldest) order.
pub fn build_git_info(commits: &[CommitRecord], sha: &str, sha_alias: Option<&str>, path: &str) -> Option<GitInfo> {
    let relevant: Vec<&CommitRecord> = commits.iter().filter(|c| !is_internal_commit(c)).collect();
    let oldest = relevant.last()?;
    let newest = relevant.first()?;

    let author = oldest.author_name.clone();
    let mut contributors = Vec::new();
    for commit in &relevant {
        if !commit.author_is_user || commit.author_name == author {
            continue;
        }
        if !contributors.contains(&commit.author_name) {
            contributors.push(commit.author_name.clone());
        }
    }

    Some(GitInfo {
        last_modified_date: Some(newest.date.clone()),
        publish_date: Some(oldest.date.clone()),
        author: Some(author),
        contributors,
        web_url: Some(truncate_at_commit(&oldest.html_url)),
        sha: Some(sha.to_string()),
        sha_alias: sha_alias.map(|s| s.to_string()),
        path: Some(path.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(message: &str, author: &str, committer_email: &str, date: &str, is_user: bool) -> CommitRecord {
        CommitRecord {
            sha: "deadbeef".to_string(),
            html_url: format!("https://github.com/o/r/commit/deadbeef-{author}"),
            message: message.to_string(),
            author_name: author.to_string(),
            committer_email: committer_email.to_string(),
            date: date.to_string(),
            author_is_user: is_user,
        }
    }

    #[test]
    fn filters_internal_commit_prefix() {
        let c = commit("[int] bump deps", "bot", "bot@example.com", "2024-01-01", true);
        assert!(is_internal_commit(&c));
    }

    #[test]
    fn filters_skip_ci_anywhere_in_message() {
        let c = commit("docs: typo [skip ci]", "alice", "alice@example.com", "2024-01-01", true);
        assert!(is_internal_commit(&c));
    }

    #[test]
    fn filters_gardener_ci_committer() {
        let c = commit("routine sync", "alice", "gardener.ci@bots.invalid", "2024-01-01", true);
        assert!(is_internal_commit(&c));
    }

    #[test]
    fn filters_gardener_opensource_committer() {
        let c = commit(
            "routine sync",
            "alice",
            "gardener.opensource@bots.invalid",
            "2024-01-01",
            true,
        );
        assert!(is_internal_commit(&c));
    }

    #[test]
    fn normal_commit_is_not_internal() {
        let c = commit("fix typo", "alice", "alice@example.com", "2024-01-01", true);
        assert!(!is_internal_commit(&c));
    }

    #[test]
    fn build_git_info_uses_newest_for_lastmod_and_oldest_for_author() {
        let commits = vec![
            commit("latest change", "carol", "carol@example.com", "2024-03-01", true),
            commit("[int] sync", "bot", "bot@example.com", "2024-02-15", true),
            commit("middle change", "bob", "bob@example.com", "2024-02-01", true),
            commit("initial commit", "alice", "alice@example.com", "2024-01-01", true),
        ];

        let info = build_git_info(&commits, "sha1", Some("main"), "a.md").unwrap();

        assert_eq!(info.last_modified_date.as_deref(), Some("2024-03-01"));
        assert_eq!(info.publish_date.as_deref(), Some("2024-01-01"));
        assert_eq!(info.author.as_deref(), Some("alice"));
        assert_eq!(info.contributors, vec!["carol".to_string(), "bob".to_string()]);
        assert_eq!(info.web_url.as_deref(), Some("https://github.com/o/r/commit/"));
    }

    #[test]
    fn contributors_exclude_non_user_committers() {
        let commits = vec![
            commit("latest", "carol", "carol@example.com", "2024-03-01", true),
            commit("external patch", "dependabot[bot]", "deps@example.com", "2024-02-01", false),
        ];

        let info = build_git_info(&commits, "sha", None, "a.md").unwrap();
        assert!(info.contributors.is_empty());
    }

    #[test]
    fn all_internal_commits_yield_nothing() {
        let commits = vec![commit("[int] sync", "bot", "bot@example.com", "2024-01-01", true)];
        assert!(build_git_info(&commits, "sha", None, "a.md").is_none());
    }
}
