//! The link validator (design §4.9): opportunistically checks that an
//! external link the document worker didn't resolve to a manifest node is
//! actually reachable, HEAD-first with a GET fallback for hosts that don't
//! support HEAD, retrying on rate-limit/5xx responses with a capped
//! backoff.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use log::warn;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::errors::CoreError;
use crate::reactor::{ExecuteFn, ValidateTask};
use crate::types::NodeArena;

const MAX_ATTEMPTS: u32 = 4;
const MAX_BACKOFF_SECS: u64 = 300;
/// Per-request timeout for link validation (spec.md §5, "5s for validation").
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);
/// Exponential backoff ladder for attempts without a usable `Retry-After`
/// header, indexed by attempt number (1-based).
const BACKOFF_LADDER_SECS: [u64; 4] = [1, 5, 10, 20];

pub struct ValidateContext {
    pub arena: Arc<NodeArena>,
    pub client: Client,
    pub hosts_to_report: Vec<String>,
    seen: Mutex<HashSet<String>>,
}

impl ValidateContext {
    pub fn new(arena: Arc<NodeArena>, client: Client, hosts_to_report: Vec<String>) -> Self {
        Self {
            arena,
            client,
            hosts_to_report,
            seen: Mutex::new(HashSet::new()),
        }
    }
}

pub fn make_execute(ctx: Arc<ValidateContext>) -> ExecuteFn<ValidateTask> {
    Arc::new(move |task: ValidateTask| -> BoxFuture<'static, Result<(), CoreError>> {
        let ctx = Arc::clone(&ctx);
        Box::pin(async move { process(ctx, task).await })
    })
}

async fn process(ctx: Arc<ValidateContext>, task: ValidateTask) -> Result<(), CoreError> {
    let key = normalize(&task.url);

    {
        let mut seen = ctx.seen.lock().await;
        if !seen.insert(key.clone()) {
            return Ok(());
        }
    }

    let Ok(parsed) = url::Url::parse(&task.url) else {
        return Ok(());
    };
    let Some(host) = parsed.host_str() else {
        return Ok(());
    };
    if is_localhost(host) {
        return Ok(());
    }

    match probe(&ctx.client, &task.url).await {
        Ok(()) => Ok(()),
        Err(message) => {
            let source = ctx.arena.get(task.source_node).output_path();
            if ctx.hosts_to_report.iter().any(|h| h.eq_ignore_ascii_case(host)) {
                Err(CoreError::FatalHttp(format!(
                    "broken link {} (referenced from {source}): {message}",
                    task.url
                )))
            } else {
                warn!("broken link {} (referenced from {source}): {message}", task.url);
                Ok(())
            }
        }
    }
}

/// HEAD first; a 4xx response falls back to a single GET, since some
/// servers reject HEAD outright. 429/5xx responses are retried with
/// backoff up to `MAX_ATTEMPTS` before giving up.
async fn probe(client: &Client, url: &str) -> Result<(), String> {
    for attempt in 1..=MAX_ATTEMPTS {
        let response = client
            .head(url)
            .timeout(VALIDATE_TIMEOUT)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        let status = response.status();

        if status.is_success() || status.is_redirection() {
            return Ok(());
        }

        if status.is_client_error() && status != StatusCode::UNAUTHORIZED && status != StatusCode::FORBIDDEN {
            let get_response = client
                .get(url)
                .timeout(VALIDATE_TIMEOUT)
                .send()
                .await
                .map_err(|e| format!("request failed: {e}"))?;
            if get_response.status().is_success() || get_response.status().is_redirection() {
                return Ok(());
            }
            if !is_retryable(get_response.status()) {
                return Err(format!("status {}", get_response.status()));
            }
        } else if !is_retryable(status) {
            // 401/403 (and any other non-retryable status) end the probe
            // without a GET fallback -- spec.md §4.8 excludes those two
            // codes from the HEAD-then-GET retry.
            return Err(format!("status {status}"));
        }

        if attempt == MAX_ATTEMPTS {
            return Err(format!("status {status} after {MAX_ATTEMPTS} attempts"));
        }

        let wait = backoff_for(status, response.headers(), attempt);
        sleep(wait).await;
    }
    Err("exhausted retries".to_string())
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff_for(status: StatusCode, headers: &reqwest::header::HeaderMap, attempt: u32) -> Duration {
    if status == StatusCode::TOO_MANY_REQUESTS {
        if let Some(retry_after) = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
        {
            return Duration::from_secs(retry_after.min(MAX_BACKOFF_SECS));
        }
    }
    let base = BACKOFF_LADDER_SECS[(attempt as usize - 1).min(BACKOFF_LADDER_SECS.len() - 1)];
    // A small deterministic jitter derived from the attempt number, since
    // the crate's dependency set has no `rand`.
    let jitter = (attempt as u64 * 37) % 5;
    Duration::from_secs((base + jitter).min(MAX_BACKOFF_SECS))
}

fn is_localhost(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1" || host == "::1" || host.ends_with(".localhost")
}

fn normalize(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_fragment() {
        assert_eq!(
            normalize("https://example.com/a#section"),
            "https://example.com/a"
        );
    }

    #[test]
    fn localhost_variants_are_recognised() {
        assert!(is_localhost("localhost"));
        assert!(is_localhost("127.0.0.1"));
        assert!(is_localhost("foo.localhost"));
        assert!(!is_localhost("example.com"));
    }

    #[test]
    fn backoff_prefers_retry_after_header() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(RETRY_AFTER, "42".parse().unwrap());
        let wait = backoff_for(StatusCode::TOO_MANY_REQUESTS, &headers, 1);
        assert_eq!(wait, Duration::from_secs(42));
    }

    #[test]
    fn backoff_falls_back_to_ladder() {
        let headers = reqwest::header::HeaderMap::new();
        let wait = backoff_for(StatusCode::BAD_GATEWAY, &headers, 3);
        assert!(wait.as_secs() >= BACKOFF_LADDER_SECS[2]);
    }
}
