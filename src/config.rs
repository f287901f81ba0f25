//! The configuration record the rest of the engine consumes (design §6).
//!
//! `Cli` (see [`crate::cli`]) is the external collaborator spec.md leaves
//! unspecified; `Config` is the concrete shape this expansion gives it, built
//! once in `main` and then shared read-only (`Arc<Config>`) across the
//! registry, resolver, and every worker.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::CoreError;

/// Default extensions eligible for `fileTree` expansion and resource
/// classification (design §4.4 step "extractFilesFromNode").
pub fn default_content_file_formats() -> Vec<String> {
    vec![".md".to_string(), ".markdown".to_string()]
}

/// Directory names hoisted in place by the persona-folder plugin (design
/// §4.4 step 7).
pub fn default_persona_dirs() -> Vec<String> {
    vec![
        "development".to_string(),
        "operations".to_string(),
        "usage".to_string(),
    ]
}

/// Section-index file names recognised as `_index.md`-equivalent when the
/// writer decides whether a directory already has one.
pub fn default_hugo_section_files() -> Vec<String> {
    vec!["_index.md".to_string(), "index.md".to_string()]
}

#[derive(Debug, Clone)]
pub struct Config {
    pub manifest_url: String,
    pub destination: PathBuf,

    pub resources_download_path: String,
    pub resources_website_path: String,

    pub document_workers: usize,
    pub validation_workers: usize,
    pub download_workers: usize,

    pub fail_fast: bool,
    pub dry_run: bool,

    pub hugo: bool,
    pub hugo_pretty_urls: bool,
    pub hugo_base_url: String,
    pub hugo_section_files: Vec<String>,
    pub hugo_structural_dirs: Vec<String>,

    pub content_file_formats: Vec<String>,
    pub persona_dirs: Vec<String>,

    pub skip_link_validation: bool,
    pub hosts_to_report: Vec<String>,

    pub github_oauth_token_map: HashMap<String, String>,
    pub resource_mappings: HashMap<String, String>,

    pub cache_dir: Option<PathBuf>,
    pub no_cache: bool,

    /// Destination directory for git-info sidecars; `None` disables
    /// emission entirely (scenario 1: "absent unless enabled").
    pub git_info_destination: Option<PathBuf>,

    /// Upper bound on manifest-resolution fixed-point passes, guarding
    /// against a manifest that transitively imports itself (spec.md's
    /// "configuration error" for cyclic imports).
    pub max_resolve_passes: usize,
}

impl Config {
    /// Builds the shared, read-only configuration record from parsed CLI
    /// flags, falling back to this expansion's defaults for every
    /// repeatable flag the user left empty.
    pub fn from_cli(cli: &crate::cli::Cli) -> Result<Self, CoreError> {
        Ok(Self {
            manifest_url: cli.manifest.clone(),
            destination: cli.destination.clone(),
            resources_download_path: cli.resources_download_path.clone(),
            resources_website_path: cli.resources_website_path.clone(),
            document_workers: cli.document_workers,
            validation_workers: cli.validation_workers,
            download_workers: cli.download_workers,
            fail_fast: cli.fail_fast,
            dry_run: cli.dry_run,
            hugo: cli.hugo,
            hugo_pretty_urls: cli.hugo_pretty_urls,
            hugo_base_url: cli.hugo_base_url.clone(),
            hugo_section_files: non_empty_or(&cli.hugo_section_files, default_hugo_section_files),
            hugo_structural_dirs: cli.hugo_structural_dirs.clone(),
            content_file_formats: non_empty_or(&cli.content_file_formats, default_content_file_formats),
            persona_dirs: non_empty_or(&cli.persona_dirs, default_persona_dirs),
            skip_link_validation: cli.skip_link_validation,
            hosts_to_report: cli.hosts_to_report.clone(),
            github_oauth_token_map: Self::parse_kv_pairs(&cli.github_oauth_token_map, "github-oauth-token-map")?,
            resource_mappings: Self::parse_kv_pairs(&cli.resource_mappings, "resource-mapping")?,
            cache_dir: cli.cache_dir.clone(),
            no_cache: cli.no_cache,
            git_info_destination: cli.git_info_destination.clone(),
            max_resolve_passes: cli.max_resolve_passes,
        })
    }

    /// Parses `key=value` pairs from repeated CLI flags into a map,
    /// rejecting malformed entries up front (design §7 `ConfigError`).
    pub fn parse_kv_pairs(raw: &[String], flag_name: &str) -> Result<HashMap<String, String>, CoreError> {
        let mut out = HashMap::new();
        for entry in raw {
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                CoreError::ConfigError(format!(
                    "--{flag_name} expects key=value, got '{entry}'"
                ))
            })?;
            if key.is_empty() {
                return Err(CoreError::ConfigError(format!(
                    "--{flag_name} entry '{entry}' has an empty key"
                )));
            }
            out.insert(key.to_string(), value.to_string());
        }
        Ok(out)
    }
}

fn non_empty_or(values: &[String], default: fn() -> Vec<String>) -> Vec<String> {
    if values.is_empty() {
        default()
    } else {
        values.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_kv_pairs() {
        let map = Config::parse_kv_pairs(
            &["github.example.com=token123".to_string()],
            "github-oauth-token-map",
        )
        .unwrap();
        assert_eq!(map.get("github.example.com").map(String::as_str), Some("token123"));
    }

    #[test]
    fn rejects_entry_without_equals() {
        let err = Config::parse_kv_pairs(&["nope".to_string()], "resourceMappings").unwrap_err();
        assert!(err.to_string().contains("key=value"));
    }
}
