//! The git-info worker (design §4.2/§4.7): fetches a file node's commit
//! history sidecar and writes it as `<node path>.json` under the directory
//! `--git-info-destination` names, when that flag enables the feature at
//! all. `ctx.writer` is a dedicated [`Writer`] rooted at that destination
//! (not the main output tree's writer), so dry-run mode and directory
//! creation are handled the same way as the rendered documents.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use crate::errors::CoreError;
use crate::reactor::{ExecuteFn, GitInfoTask};
use crate::registry::Registry;
use crate::types::NodeArena;
use crate::writer::Writer;

pub struct GitInfoContext {
    pub arena: Arc<NodeArena>,
    pub registry: Arc<Registry>,
    pub writer: Arc<Writer>,
}

pub fn make_execute(ctx: Arc<GitInfoContext>) -> ExecuteFn<GitInfoTask> {
    Arc::new(move |task: GitInfoTask| -> BoxFuture<'static, Result<(), CoreError>> {
        let ctx = Arc::clone(&ctx);
        Box::pin(async move { process(ctx, task).await })
    })
}

async fn process(ctx: Arc<GitInfoContext>, task: GitInfoTask) -> Result<(), CoreError> {
    let node = ctx.arena.get(task.node);
    let Some(source) = node.sources.first() else {
        return Ok(());
    };
    let output_path = node.output_path();

    let host = ctx
        .registry
        .accept(&source.url.to_canonical_string())
        .ok_or_else(|| CoreError::NotFound(source.url.to_canonical_string()))?;

    let Some(info) = host.git_info(&source.url).await? else {
        return Ok(());
    };

    let payload = json!({
        "lastmod": info.last_modified_date,
        "publishdate": info.publish_date,
        "author": info.author,
        "contributors": info.contributors,
        "weburl": info.web_url,
        "sha": info.sha,
        "shaalias": info.sha_alias,
        "path": info.path,
    });
    let bytes = serde_json::to_vec_pretty(&payload)
        .map_err(|e| CoreError::FatalHttp(format!("encoding git-info for {output_path}: {e}")))?;

    ctx.writer.write(&format!("{output_path}.json"), &bytes).await
}
