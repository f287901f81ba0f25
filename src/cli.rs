use std::path::PathBuf;

use clap::{ArgAction, Parser};

pub const VERSION: &str = env!("DOCWEAVE_VERSION");
pub const LONG_VERSION: &str = env!("DOCWEAVE_LONG_VERSION");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(
    author,
    version = VERSION,
    long_version = LONG_VERSION,
    about = "Assembles a browsable documentation tree from a manifest that stitches together Markdown across GitHub/GHE repositories."
)]
pub struct Cli {
    /// URL of the root manifest to resolve (a `manifest.yaml`, typically on GitHub)
    #[arg(long, value_name = "URL")]
    pub manifest: String,

    /// Directory to write the assembled output tree into
    #[arg(long, value_name = "DIR")]
    pub destination: PathBuf,

    /// Directory (relative to `destination`) downloaded embeds are written under
    #[arg(long, value_name = "DIR", default_value = "resources")]
    pub resources_download_path: String,

    /// URL path prefix rewritten embed links point at
    #[arg(long, value_name = "PATH", default_value = "resources")]
    pub resources_website_path: String,

    /// Number of concurrent document-rendering workers
    #[arg(long, value_name = "N", default_value_t = 8)]
    pub document_workers: usize,

    /// Number of concurrent link-validation workers
    #[arg(long, value_name = "N", default_value_t = 8)]
    pub validation_workers: usize,

    /// Number of concurrent embed-download workers
    #[arg(long, value_name = "N", default_value_t = 8)]
    pub download_workers: usize,

    /// Cancel every in-flight worker as soon as the first error is observed
    #[arg(long)]
    pub fail_fast: bool,

    /// Resolve and log the planned output tree without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Shape output paths and links for a Hugo content tree
    #[arg(long)]
    pub hugo: bool,

    /// With --hugo, collapse section index files and strip `.md` from links
    #[arg(long)]
    pub hugo_pretty_urls: bool,

    /// Base URL Hugo will serve the site from (informational, passed through)
    #[arg(long, value_name = "URL", default_value = "")]
    pub hugo_base_url: String,

    /// File names treated as a directory's section index (repeatable)
    #[arg(long = "hugo-section-file", value_name = "NAME")]
    pub hugo_section_files: Vec<String>,

    /// Manifest directory names stripped from the front of every output URL (repeatable)
    #[arg(long = "hugo-structural-dir", value_name = "NAME")]
    pub hugo_structural_dirs: Vec<String>,

    /// File extensions eligible for `fileTree` expansion (repeatable)
    #[arg(long = "content-file-format", value_name = "EXT")]
    pub content_file_formats: Vec<String>,

    /// Directory names hoisted in place as persona tags (repeatable)
    #[arg(long = "persona-dir", value_name = "NAME")]
    pub persona_dirs: Vec<String>,

    /// Skip validating external (non-manifest) links entirely
    #[arg(long)]
    pub skip_link_validation: bool,

    /// Hosts whose broken links are treated as fatal errors rather than warnings (repeatable)
    #[arg(long = "host-to-report", value_name = "HOST")]
    pub hosts_to_report: Vec<String>,

    /// `host=token` pairs authenticating requests to GitHub/GHE hosts (repeatable)
    #[arg(long = "github-oauth-token-map", value_name = "HOST=TOKEN")]
    pub github_oauth_token_map: Vec<String>,

    /// `prefix=localPath` pairs mapping manifest URL prefixes to local checkouts (repeatable)
    #[arg(long = "resource-mapping", value_name = "PREFIX=PATH")]
    pub resource_mappings: Vec<String>,

    /// Directory used for caching GitHub API responses
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Disable HTTP response caching
    #[arg(long)]
    pub no_cache: bool,

    /// Directory git-info sidecars are written under; omit to disable the feature
    #[arg(long, value_name = "DIR")]
    pub git_info_destination: Option<PathBuf>,

    /// Upper bound on manifest-resolution fixed-point passes
    #[arg(long, value_name = "N", default_value_t = 20)]
    pub max_resolve_passes: usize,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
