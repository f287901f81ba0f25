//! On-disk HTTP response cache (SPEC_FULL §1 "HTTP response caching"):
//! SHA-256-keyed by request URL, ETag/Last-Modified aware, consulted by
//! [`crate::http::send_github_request_cached`] so repeated `GetTree`/
//! `GetBlobRaw`/`ListCommits`/`Get` calls against an unchanged reference
//! don't re-spend GitHub API rate limit.

use std::env;
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::utils::system_time_to_secs;

static CACHE_DIR_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

/// Pins the cache root to `--cache-dir`. Must be called at most once, before
/// any cache lookup; later calls are ignored so tests running in parallel
/// within one process can't fight over it.
pub fn set_cache_dir_override(dir: PathBuf) {
    let _ = CACHE_DIR_OVERRIDE.set(dir);
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CachedResponse {
    pub url: String,
    pub body: Vec<u8>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub timestamp: u64,
}

fn cache_base_dir() -> Result<PathBuf> {
    if let Some(dir) = CACHE_DIR_OVERRIDE.get() {
        return Ok(dir.clone());
    }

    let base = env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| {
            env::var_os("HOME")
                .map(PathBuf::from)
                .map(|home| home.join(".cache"))
        })
        .ok_or_else(|| {
            anyhow!("Unable to determine cache directory (set XDG_CACHE_HOME or HOME, or pass --cache-dir)")
        })?;

    Ok(base.join("docweave"))
}

pub fn responses_cache_dir() -> Result<PathBuf> {
    let dir = cache_base_dir()?.join("responses");
    fs::create_dir_all(&dir).with_context(|| {
        format!(
            "failed to create responses cache directory {}",
            dir.display()
        )
    })?;
    Ok(dir)
}

fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn load_cached_response(url: &str, ttl_secs: u64) -> Result<Option<CachedResponse>> {
    let key = cache_key(url);
    let path = responses_cache_dir()?.join(format!("{}.json", key));

    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(anyhow!(
                "failed to open cached response file {}: {}",
                path.display(),
                err
            ))
        }
    };

    let cached: CachedResponse = match serde_json::from_reader(file) {
        Ok(cached) => cached,
        Err(err) => {
            debug!(
                "Unable to parse cached response file {}; ignoring: {}",
                path.display(),
                err
            );
            return Ok(None);
        }
    };

    let now = system_time_to_secs(SystemTime::now());
    if now - cached.timestamp > ttl_secs {
        debug!(
            "Cached response for {} expired (age: {}s, ttl: {}s)",
            url,
            now - cached.timestamp,
            ttl_secs
        );
        return Ok(None);
    }

    debug!(
        "Using cached response for {} (age: {}s)",
        url,
        now - cached.timestamp
    );
    Ok(Some(cached))
}

pub fn save_cached_response(cached: &CachedResponse) -> Result<()> {
    let key = cache_key(&cached.url);
    let path = responses_cache_dir()?.join(format!("{}.json", key));
    let tmp_path = path.with_extension("json.tmp");

    let mut file = File::create(&tmp_path).with_context(|| {
        format!(
            "failed to create temporary cache file {}",
            tmp_path.display()
        )
    })?;

    serde_json::to_writer(&mut file, cached)
        .with_context(|| format!("failed to write cached response to {}", tmp_path.display()))?;

    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove existing cache file {}", path.display()))?;
    }

    fs::rename(&tmp_path, &path)
        .with_context(|| format!("failed to persist cache file {}", path.display()))?;

    debug!("Saved cached response for {}", cached.url);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn setup_test_cache_dir() -> PathBuf {
        let test_dir = env::temp_dir().join(format!("docweave_test_{}", std::process::id()));
        unsafe {
            env::set_var("XDG_CACHE_HOME", &test_dir);
        }
        test_dir
    }

    fn cleanup_test_cache_dir(dir: PathBuf) {
        let _ = fs::remove_dir_all(dir);
        unsafe {
            env::remove_var("XDG_CACHE_HOME");
        }
    }

    #[test]
    fn test_cache_key_consistency() {
        let url = "https://api.github.com/repos/owner/repo/contents";
        let key1 = cache_key(url);
        let key2 = cache_key(url);
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), 64); // SHA256 produces 64 hex chars
    }

    #[test]
    fn test_cache_key_uniqueness() {
        let url1 = "https://api.github.com/repos/owner/repo1/contents";
        let url2 = "https://api.github.com/repos/owner/repo2/contents";
        let key1 = cache_key(url1);
        let key2 = cache_key(url2);
        assert_ne!(key1, key2);
    }

    #[test]
    #[serial]
    fn test_save_and_load_cached_response() {
        let test_dir = setup_test_cache_dir();

        responses_cache_dir().expect("Failed to create cache dir");

        let cached = CachedResponse {
            url: "https://example.com/test".to_string(),
            body: b"test body".to_vec(),
            etag: Some("etag123".to_string()),
            last_modified: Some("Mon, 01 Jan 2024 00:00:00 GMT".to_string()),
            timestamp: system_time_to_secs(SystemTime::now()),
        };

        save_cached_response(&cached).expect("Failed to save cache");

        let loaded = load_cached_response(&cached.url, 3600)
            .expect("Failed to load cache")
            .expect("Cache should exist");

        assert_eq!(loaded.url, cached.url);
        assert_eq!(loaded.body, cached.body);
        assert_eq!(loaded.etag, cached.etag);
        assert_eq!(loaded.last_modified, cached.last_modified);

        cleanup_test_cache_dir(test_dir);
    }

    #[test]
    #[serial]
    fn test_load_cached_response_expired() {
        let test_dir = setup_test_cache_dir();

        responses_cache_dir().expect("Failed to create cache dir");

        let cached = CachedResponse {
            url: "https://example.com/test_expired".to_string(),
            body: b"test body".to_vec(),
            etag: Some("etag123".to_string()),
            last_modified: None,
            timestamp: system_time_to_secs(SystemTime::now()) - 7200, // 2 hours ago
        };

        save_cached_response(&cached).expect("Failed to save cache");

        let loaded = load_cached_response(&cached.url, 3600).expect("Should not error");
        assert!(loaded.is_none(), "Cache should be expired");

        cleanup_test_cache_dir(test_dir);
    }

    #[test]
    #[serial]
    fn test_load_cached_response_not_found() {
        let test_dir = setup_test_cache_dir();

        let result = load_cached_response("https://nonexistent.com/foo", 3600)
            .expect("Should not error on missing cache");
        assert!(result.is_none());

        cleanup_test_cache_dir(test_dir);
    }

    #[test]
    #[serial]
    fn test_responses_cache_dir_creation() {
        let test_dir = setup_test_cache_dir();

        let cache_dir = responses_cache_dir().expect("Failed to get cache dir");
        assert!(cache_dir.exists(), "Cache directory should be created");
        assert!(cache_dir.ends_with("docweave/responses"));

        cleanup_test_cache_dir(test_dir);
    }

    #[test]
    fn test_cached_response_serialization() {
        let cached = CachedResponse {
            url: "https://example.com/test".to_string(),
            body: vec![1, 2, 3, 4, 5],
            etag: Some("abc123".to_string()),
            last_modified: Some("timestamp".to_string()),
            timestamp: 1234567890,
        };

        let serialized = serde_json::to_string(&cached).expect("Failed to serialize");
        let deserialized: CachedResponse =
            serde_json::from_str(&serialized).expect("Failed to deserialize");

        assert_eq!(deserialized.url, cached.url);
        assert_eq!(deserialized.body, cached.body);
        assert_eq!(deserialized.etag, cached.etag);
        assert_eq!(deserialized.last_modified, cached.last_modified);
        assert_eq!(deserialized.timestamp, cached.timestamp);
    }
}
