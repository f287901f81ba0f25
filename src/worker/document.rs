//! The document worker (design §4.7): turns one resolved file node into
//! bytes on the output tree, rewriting every link and image destination it
//! contains and opportunistically feeding the download/validate/gitinfo
//! queues along the way.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use log::warn;
use serde_json::Value as JsonValue;

use crate::config::Config;
use crate::errors::CoreError;
use crate::linkresolver::{self, LinkIndex};
use crate::markdown;
use crate::reactor::{DocumentTask, DownloadTask, ExecuteFn, GitInfoTask, Queue, ValidateTask};
use crate::registry::Registry;
use crate::types::{ContentSource, FrontMatter, NodeArena, NodeId, Processor};
use crate::url::ResourceUrl;
use crate::writer::Writer;

/// Authors can prefix a link with this to force it through verbatim (minus
/// the prefix) instead of going through resource resolution -- an escape
/// hatch for paths the manifest has no way to express as a resource URL.
const VERBATIM_ESCAPE: &str = "/:v:/";

pub struct DocumentContext {
    pub arena: Arc<NodeArena>,
    pub index: Arc<LinkIndex>,
    pub registry: Arc<Registry>,
    pub config: Arc<Config>,
    pub writer: Arc<Writer>,
    pub download: Arc<Queue<DownloadTask>>,
    pub validate: Arc<Queue<ValidateTask>>,
    pub gitinfo: Arc<Queue<GitInfoTask>>,
}

pub fn make_execute(ctx: Arc<DocumentContext>) -> ExecuteFn<DocumentTask> {
    Arc::new(move |task: DocumentTask| -> BoxFuture<'static, Result<(), CoreError>> {
        let ctx = Arc::clone(&ctx);
        Box::pin(async move { process(ctx, task.node).await })
    })
}

async fn process(ctx: Arc<DocumentContext>, node_id: NodeId) -> Result<(), CoreError> {
    let node = ctx.arena.get(node_id);
    if !node.is_file() {
        return Ok(());
    }

    if ctx.config.git_info_destination.is_some() && !node.sources.is_empty() {
        let _ = ctx.gitinfo.add_task(GitInfoTask { node: node_id }).await;
    }

    match node.processor {
        Some(Processor::Passthrough) => write_passthrough(&ctx, node_id).await,
        _ => write_markdown(&ctx, node_id).await,
    }
}

async fn write_passthrough(ctx: &DocumentContext, node_id: NodeId) -> Result<(), CoreError> {
    let node = ctx.arena.get(node_id);
    let Some(source) = node.sources.first() else {
        return Ok(());
    };
    let bytes = read_source(&ctx.registry, &source.url).await?;
    ctx.writer.write(&node.output_path(), &bytes).await
}

async fn write_markdown(ctx: &DocumentContext, node_id: NodeId) -> Result<(), CoreError> {
    let node = ctx.arena.get(node_id);
    let from_url = node.sources.first().map(|s| s.url.clone());

    let (mut front_matter, body) = if node.has_content() {
        assemble_multi_source(ctx, node_id).await?
    } else {
        (FrontMatter::new(), String::new())
    };

    for (key, value) in node.front_matter.iter() {
        if key == "aliases" {
            let aliases: Vec<String> = value
                .as_array()
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            front_matter.append_aliases(&aliases);
        } else {
            front_matter.insert(key.to_string(), value.clone());
        }
    }

    if front_matter.get("title").is_none() {
        let title = compute_title(&ctx.arena, node_id);
        front_matter.insert("title", JsonValue::String(title));
    }

    let rewritten = if let Some(from_url) = &from_url {
        rewrite_document_links(ctx, node_id, from_url, &body).await
    } else {
        body
    };

    let rendered = format!("{}{}", markdown::render_front_matter(&front_matter), rewritten);
    ctx.writer.write(&node.output_path(), rendered.as_bytes()).await
}

/// Reads `sources[0]` then every `multi_source` entry in declaration order,
/// splitting each document's own front matter off before concatenating
/// bodies. The emitted front matter is the union of every source's keys,
/// first-source-wins on a collision (design §4.7 step 3); `aliases` is the
/// one key that's unioned instead of shadowed, so a later source's aliases
/// add to the first's rather than being dropped.
async fn assemble_multi_source(
    ctx: &DocumentContext,
    node_id: NodeId,
) -> Result<(FrontMatter, String), CoreError> {
    let node = ctx.arena.get(node_id);
    let mut sources: Vec<&ContentSource> = Vec::new();
    sources.extend(node.sources.iter());
    sources.extend(node.multi_source.iter());

    let mut primary_fm = FrontMatter::new();
    let mut bodies = Vec::new();

    for (i, source) in sources.iter().enumerate() {
        let bytes = read_source(&ctx.registry, &source.url).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let (fm, body) = markdown::split_front_matter(&text);
        if i == 0 {
            primary_fm = fm;
        } else {
            for (key, value) in fm.iter() {
                if key != "aliases" && primary_fm.get(key).is_none() {
                    primary_fm.insert(key.to_string(), value.clone());
                }
            }
            let aliases: Vec<String> = fm
                .get("aliases")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            primary_fm.append_aliases(&aliases);
        }
        bodies.push(body.to_string());
    }

    Ok((primary_fm, bodies.join("\n\n")))
}

/// Resolves every link/image destination up front (the rewrite callback
/// `rewrite_links` takes has to be synchronous), then re-renders with a
/// lookup into that resolved map.
async fn rewrite_document_links(
    ctx: &DocumentContext,
    node_id: NodeId,
    from_url: &ResourceUrl,
    body: &str,
) -> String {
    let node = ctx.arena.get(node_id);
    let mut resolved: HashMap<(String, bool), String> = HashMap::new();

    for (link, is_embed) in markdown::collect_links(body) {
        if resolved.contains_key(&(link.clone(), is_embed)) {
            continue;
        }
        let replacement = resolve_one(ctx, node_id, node.skip_validation, from_url, &link, is_embed).await;
        resolved.insert((link, is_embed), replacement);
    }

    markdown::rewrite_links(body, |link, is_embed| {
        resolved
            .get(&(link.to_string(), is_embed))
            .cloned()
            .unwrap_or_else(|| link.to_string())
    })
}

async fn resolve_one(
    ctx: &DocumentContext,
    from_node: NodeId,
    skip_validation: bool,
    from_url: &ResourceUrl,
    link: &str,
    is_embed: bool,
) -> String {
    if link.starts_with("mailto:") {
        return link.to_string();
    }
    if let Some(rest) = link.strip_prefix(VERBATIM_ESCAPE) {
        return format!("/{rest}");
    }

    if is_embed {
        return resolve_embed(ctx, from_url, link).await;
    }

    // An absolute link to a host this registry doesn't manage (some
    // arbitrary external site) is never rewritten -- it's only checked for
    // liveness.
    if link.starts_with("http://") || link.starts_with("https://") {
        if ctx.registry.accept(link).is_none() {
            if !skip_validation && !ctx.config.skip_link_validation {
                let _ = ctx
                    .validate
                    .add_task(ValidateTask {
                        url: link.to_string(),
                        source_node: from_node,
                    })
                    .await;
            }
            return link.to_string();
        }
    }

    match linkresolver::resolve_resource_link(
        &ctx.arena,
        &ctx.index,
        &ctx.registry,
        from_node,
        from_url,
        link,
        &ctx.config,
    )
    .await
    {
        Ok(Some(path)) => path,
        Ok(None) => {
            warn!("unresolved link '{link}' in {}", ctx.arena.get(from_node).output_path());
            link.to_string()
        }
        Err(err) => {
            warn!("failed resolving link '{link}': {err}");
            link.to_string()
        }
    }
}

async fn resolve_embed(ctx: &DocumentContext, from_url: &ResourceUrl, link: &str) -> String {
    let raw = match linkresolver::resolve_embedded_link(from_url, link) {
        Ok(raw) => raw,
        Err(err) => {
            warn!("failed resolving embed '{link}': {err}");
            return link.to_string();
        }
    };

    let target = match ResourceUrl::parse(&raw) {
        Ok(url) => url,
        Err(_) => return raw,
    };

    let relative = format!(
        "{}/{}/{}/{}",
        target.owner, target.repo, target.reference, target.path
    );
    let destination = std::path::PathBuf::from(&ctx.config.resources_download_path).join(&relative);
    let _ = ctx
        .download
        .add_task(DownloadTask {
            url: target,
            destination,
        })
        .await;

    format!("/{}/{}", ctx.config.resources_website_path.trim_matches('/'), relative)
}

async fn read_source(registry: &Registry, url: &ResourceUrl) -> Result<Vec<u8>, CoreError> {
    let host = registry
        .accept(&url.to_canonical_string())
        .ok_or_else(|| CoreError::NotFound(url.to_canonical_string()))?;
    host.read(url).await
}

/// design §4.7 step 3: a section index (`_index.md`) takes its title from
/// the nearest named ancestor directory, or `"Root"` if there is none (the
/// site root); any other node uses its own file name. The result is then
/// normalised by stripping `.md` and title-casing `_`/`-`-separated words.
fn compute_title(arena: &NodeArena, node_id: NodeId) -> String {
    let node = arena.get(node_id);
    if node.name == "_index.md" {
        let mut cur = node.parent;
        while let Some(parent_id) = cur {
            let parent = arena.get(parent_id);
            if !parent.name.is_empty() {
                return titleize_filename(&parent.name);
            }
            cur = parent.parent;
        }
        return "Root".to_string();
    }
    titleize_filename(&node.name)
}

fn titleize_filename(name: &str) -> String {
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    stem.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeData;

    #[test]
    fn titleizes_a_plain_file_name() {
        let title = titleize_filename("quick_start-guide.md");
        assert_eq!(title, "Quick Start Guide");
    }

    #[test]
    fn index_file_takes_title_from_parent_dir() {
        let mut arena = NodeArena::new();
        let dir = arena.alloc(NodeData {
            is_dir: true,
            name: "getting-started".to_string(),
            ..Default::default()
        });
        let index = arena.alloc(NodeData::new("_index.md"));
        arena.add_child(dir, index);

        assert_eq!(compute_title(&arena, index), "Getting Started");
    }

    #[test]
    fn root_index_falls_back_to_root() {
        let mut arena = NodeArena::new();
        let root = arena.alloc(NodeData {
            is_dir: true,
            ..Default::default()
        });
        let index = arena.alloc(NodeData::new("_index.md"));
        arena.add_child(root, index);

        assert_eq!(compute_title(&arena, index), "Root");
    }

    #[test]
    fn regular_file_uses_its_own_name() {
        let mut arena = NodeArena::new();
        let node = arena.alloc(NodeData::new("quick_start-guide.md"));
        assert_eq!(compute_title(&arena, node), "Quick Start Guide");
    }
}
