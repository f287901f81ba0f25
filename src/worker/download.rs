//! The download worker (design §4.7 embed handling): fetches an embedded
//! resource's raw bytes and hands them to the writer at the destination the
//! document worker computed.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::errors::CoreError;
use crate::reactor::{DownloadTask, ExecuteFn};
use crate::registry::Registry;
use crate::writer::Writer;

pub struct DownloadContext {
    pub registry: Arc<Registry>,
    pub writer: Arc<Writer>,
}

pub fn make_execute(ctx: Arc<DownloadContext>) -> ExecuteFn<DownloadTask> {
    Arc::new(move |task: DownloadTask| -> BoxFuture<'static, Result<(), CoreError>> {
        let ctx = Arc::clone(&ctx);
        Box::pin(async move { process(ctx, task).await })
    })
}

async fn process(ctx: Arc<DownloadContext>, task: DownloadTask) -> Result<(), CoreError> {
    let host = ctx
        .registry
        .accept(&task.url.to_canonical_string())
        .ok_or_else(|| CoreError::NotFound(task.url.to_canonical_string()))?;
    let bytes = host.read(&task.url).await?;
    let relative = task.destination.to_string_lossy().replace('\\', "/");
    ctx.writer.write(&relative, &bytes).await
}
