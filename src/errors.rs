//! The error taxonomy from the design: each variant maps to one of the
//! kinds a worker or resolver pass can produce, with the propagation and
//! demotion rules encoded in how callers match on it rather than here.

use thiserror::Error;

/// Errors raised at the seams between the registry, resolver, and reactor.
///
/// `NotFound` and `Cancelled` are frequently non-fatal: callers decide
/// whether to log-and-continue or propagate based on context, matching the
/// per-operation rules in the design (a missing link target is a warning,
/// a missing declared source is fatal).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("transient HTTP failure: {0}")]
    TransientHttp(String),

    #[error("HTTP request failed: {0}")]
    FatalHttp(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl CoreError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled)
    }

    /// Wrap the error with a manifest URL so a chain of nested-manifest
    /// failures reads as "manifest A -> manifest B -> ...: <err>".
    pub fn with_manifest_trail(self, manifest_url: &str) -> CoreError {
        match self {
            CoreError::InvalidManifest(msg) => {
                CoreError::InvalidManifest(format!("{} -> {}", manifest_url, msg))
            }
            other => CoreError::InvalidManifest(format!("{}: {}", manifest_url, other)),
        }
    }
}
