//! The output sink (design §4.8). The document worker hands each rendered
//! node its output-tree-relative path and final bytes; `Writer` abstracts
//! over actually creating that file versus (`--dry-run`) only logging the
//! tree that would have been created.
//!
//! Modelled as a closed two-variant enum rather than a boxed trait object,
//! the same way [`crate::registry::RepositoryHost`] dispatches over its
//! host kinds -- the set of sinks is fixed and known at compile time, and
//! `write` needs to be `async`, which a `dyn Trait` can't express without
//! pulling in `async-trait`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::info;

use crate::errors::CoreError;

pub enum Writer {
    Fs(FsWriter),
    DryRun(DryRunWriter),
}

impl Writer {
    pub fn real(root: PathBuf) -> Self {
        Writer::Fs(FsWriter::new(root))
    }

    pub fn dry_run() -> Self {
        Writer::DryRun(DryRunWriter::default())
    }

    /// Writes `bytes` to `relative_path` under the configured destination
    /// root, creating any missing parent directories.
    pub async fn write(&self, relative_path: &str, bytes: &[u8]) -> Result<(), CoreError> {
        match self {
            Writer::Fs(w) => w.write(relative_path, bytes).await,
            Writer::DryRun(w) => w.write(relative_path, bytes).await,
        }
    }

    pub fn written_count(&self) -> usize {
        match self {
            Writer::Fs(w) => w.count.load(Ordering::SeqCst),
            Writer::DryRun(w) => w.count.load(Ordering::SeqCst),
        }
    }
}

pub struct FsWriter {
    root: PathBuf,
    count: AtomicUsize,
}

impl FsWriter {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            count: AtomicUsize::new(0),
        }
    }

    async fn write(&self, relative_path: &str, bytes: &[u8]) -> Result<(), CoreError> {
        let target = self.root.join(relative_path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::FatalHttp(format!("creating {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| CoreError::FatalHttp(format!("writing {}: {e}", target.display())))?;
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct DryRunWriter {
    count: AtomicUsize,
}

impl DryRunWriter {
    async fn write(&self, relative_path: &str, bytes: &[u8]) -> Result<(), CoreError> {
        info!("[dry-run] would write {relative_path} ({} bytes)", bytes.len());
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_writer_creates_parent_dirs_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Writer::real(dir.path().to_path_buf());
        writer.write("guides/intro.md", b"hello").await.unwrap();
        let written = dir.path().join("guides/intro.md");
        assert_eq!(std::fs::read(&written).unwrap(), b"hello");
        assert_eq!(writer.written_count(), 1);
    }

    #[tokio::test]
    async fn dry_run_writer_never_touches_disk() {
        let writer = Writer::dry_run();
        writer.write("guides/intro.md", b"hello").await.unwrap();
        assert_eq!(writer.written_count(), 1);
    }
}
