//! Wires the pieces together (design §5 "Orchestration"): parse flags, build
//! the registry and configuration, resolve the manifest to a fixed point,
//! build the link index, then start the four worker queues and seed one
//! document task per resolved file node before draining them to completion.

mod cache;
mod cli;
mod config;
mod errors;
mod gitinfo;
mod http;
mod linkresolver;
mod manifest;
mod markdown;
mod rate_limit;
mod reactor;
mod registry;
mod types;
mod url;
mod utils;
mod worker;
mod writer;
mod yaml_json;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::error;

use crate::cli::Cli;
use crate::config::Config;
use crate::linkresolver::LinkIndex;
use crate::reactor::{DocumentTask, QueueControllerCollection};
use crate::registry::{GitHubHost, LocalHost, MappedHost, Registry, RepositoryHost};
use crate::writer::Writer;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    utils::init_logging(cli.verbose);

    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(dir) = &config.cache_dir {
        cache::set_cache_dir_override(dir.clone());
    }

    let registry = Arc::new(build_registry(&config));
    let config = Arc::new(config);

    let outcome = match manifest::resolve(&registry, &config).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("manifest resolution failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    let arena = Arc::new(outcome.arena);
    let index = Arc::new(LinkIndex::build(&arena));

    let writer = Arc::new(make_writer(config.dry_run, Some(config.destination.as_path())));
    let gitinfo_writer = Arc::new(make_writer(config.dry_run, config.git_info_destination.as_deref()));

    let controllers = QueueControllerCollection::new(&config);

    let document_ctx = Arc::new(worker::document::DocumentContext {
        arena: Arc::clone(&arena),
        index: Arc::clone(&index),
        registry: Arc::clone(&registry),
        config: Arc::clone(&config),
        writer: Arc::clone(&writer),
        download: Arc::clone(&controllers.download),
        validate: Arc::clone(&controllers.validate),
        gitinfo: Arc::clone(&controllers.gitinfo),
    });
    let download_ctx = Arc::new(worker::download::DownloadContext {
        registry: Arc::clone(&registry),
        writer: Arc::clone(&writer),
    });
    let validate_ctx = Arc::new(worker::validate::ValidateContext::new(
        Arc::clone(&arena),
        registry.default_client().clone(),
        config.hosts_to_report.clone(),
    ));
    let gitinfo_ctx = Arc::new(worker::gitinfo::GitInfoContext {
        arena: Arc::clone(&arena),
        registry: Arc::clone(&registry),
        writer: Arc::clone(&gitinfo_writer),
    });

    controllers
        .start(
            &config,
            worker::document::make_execute(document_ctx),
            worker::download::make_execute(download_ctx),
            worker::validate::make_execute(validate_ctx),
            worker::gitinfo::make_execute(gitinfo_ctx),
        )
        .await;

    for id in arena.ids() {
        if arena.get(id).is_file() {
            let _ = controllers.document.add_task(DocumentTask { node: id }).await;
        }
    }

    let errors = controllers.stop_and_wait().await;
    registry.log_rate_limits();

    if errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        for err in &errors {
            error!("{err}");
        }
        error!("completed with {} error(s)", errors.len());
        ExitCode::FAILURE
    }
}

/// Mapped overrides are checked first (most specific, a manifest's own
/// `--resource-mapping` escape hatch), then the single GitHub/GHE host
/// (dispatch per-request on the resource URL's own host, see
/// [`registry::github`]), then local checkouts.
fn build_registry(config: &Config) -> Registry {
    let mut hosts = Vec::new();
    if !config.resource_mappings.is_empty() {
        hosts.push(RepositoryHost::Mapped(MappedHost::new(config.resource_mappings.clone())));
    }
    hosts.push(RepositoryHost::GitHub(GitHubHost::new(
        config.github_oauth_token_map.clone(),
        config.no_cache,
    )));
    hosts.push(RepositoryHost::Local(LocalHost::new()));
    Registry::new(hosts, reqwest::Client::new())
}

fn make_writer(dry_run: bool, root: Option<&std::path::Path>) -> Writer {
    match (dry_run, root) {
        (true, _) | (false, None) => Writer::dry_run(),
        (false, Some(root)) => Writer::real(root.to_path_buf()),
    }
}
