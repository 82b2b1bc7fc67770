//! # Archive Transport
//!
//! Downloads pipeline archives over HTTPS or from a GitHub release.
//!
//! Plain URL downloads go through a conditional GET cache keyed by URL. A
//! response is cached only when the server sends both `ETag` and `Date`; later
//! requests send `If-None-Match` / `If-Modified-Since` and reuse the cached
//! body on `304 Not Modified`. Entries unused for longer than the configured
//! age are purged by a background task.

use crate::config::ControllerConfig;
use crate::crd::GitReleaseInfo;
use crate::observability;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, DATE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Byte retrieval for pipeline archives
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArchiveTransport: Send + Sync {
    async fn fetch(&self, url: &str, skip_cert_verify: bool) -> Result<Vec<u8>>;

    async fn fetch_from_git_release(
        &self,
        info: &GitReleaseInfo,
        skip_cert_verify: bool,
    ) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    etag: String,
    date: String,
    body: Vec<u8>,
    last_used: Instant,
}

/// Conditional GET cache, shared across reconciles
///
/// The lock is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct ArchiveCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl ArchiveCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        // A poisoned cache only holds stale bodies, keep using it
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// `(etag, date)` validators for a cached URL
    pub fn validators(&self, url: &str) -> Option<(String, String)> {
        self.lock()
            .get(url)
            .map(|entry| (entry.etag.clone(), entry.date.clone()))
    }

    /// Body for a `304 Not Modified`, refreshing the entry's last use
    pub fn hit(&self, url: &str) -> Option<Vec<u8>> {
        let mut entries = self.lock();
        let entry = entries.get_mut(url)?;
        entry.last_used = Instant::now();
        Some(entry.body.clone())
    }

    /// Record a `200 OK`. Without both validators any old entry is dropped.
    pub fn store(&self, url: &str, etag: Option<String>, date: Option<String>, body: &[u8]) {
        let mut entries = self.lock();
        match (etag, date) {
            (Some(etag), Some(date)) => {
                entries.insert(
                    url.to_string(),
                    CacheEntry {
                        etag,
                        date,
                        body: body.to_vec(),
                        last_used: Instant::now(),
                    },
                );
            }
            _ => {
                entries.remove(url);
            }
        }
    }

    /// Drop entries not used within `max_age`, returning how many were removed
    pub fn purge(&self, max_age: Duration) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.last_used.elapsed() <= max_age);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically purge stale entries
    pub fn spawn_purge_task(
        &self,
        interval: Duration,
        max_age: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.purge(max_age);
                if removed > 0 {
                    debug!("Purged {} stale archive cache entries", removed);
                }
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    url: String,
}

/// GitHub REST API base for a host
pub fn github_api_base(hostname: &str) -> String {
    let host = hostname.trim_end_matches('/');
    let host = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);
    if host.eq_ignore_ascii_case("github.com") || host.eq_ignore_ascii_case("api.github.com") {
        "https://api.github.com".to_string()
    } else {
        format!("https://{host}/api/v3")
    }
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpArchiveTransport {
    client: reqwest::Client,
    insecure_client: reqwest::Client,
    cache: ArchiveCache,
    github_token: Option<String>,
}

impl HttpArchiveTransport {
    pub fn new(config: &ControllerConfig, cache: ArchiveCache) -> Result<Self> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let user_agent = format!("stack-controller/{}", env!("CARGO_PKG_VERSION"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        let insecure_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to build HTTP client without certificate verification")?;

        Ok(Self {
            client,
            insecure_client,
            cache,
            github_token: config.github_token.clone(),
        })
    }

    pub fn cache(&self) -> &ArchiveCache {
        &self.cache
    }

    fn client(&self, skip_cert_verify: bool) -> &reqwest::Client {
        if skip_cert_verify {
            warn!("Certificate verification is disabled for this request");
            &self.insecure_client
        } else {
            &self.client
        }
    }

    fn request_error(err: reqwest::Error, skip_cert_verify: bool) -> anyhow::Error {
        let err = anyhow::Error::new(err);
        if skip_cert_verify {
            err.context("HTTP request error")
        } else {
            err.context("HTTP request error while using the default TLS configuration")
        }
    }

    fn with_token(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.github_token {
            Some(token) if !token.is_empty() => request.header(AUTHORIZATION, format!("token {token}")),
            _ => request,
        }
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl ArchiveTransport for HttpArchiveTransport {
    async fn fetch(&self, url: &str, skip_cert_verify: bool) -> Result<Vec<u8>> {
        let mut request = self.client(skip_cert_verify).get(url);
        if let Some((etag, date)) = self.cache.validators(url) {
            request = request
                .header(IF_NONE_MATCH, etag)
                .header(IF_MODIFIED_SINCE, date);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::request_error(e, skip_cert_verify))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                observability::metrics::increment_archive_cache_hits();
                debug!("Archive {} not modified, using cached copy", url);
                self.cache
                    .hit(url)
                    .ok_or_else(|| anyhow!("Received 304 Not Modified for {url} but no cached copy exists"))
            }
            StatusCode::OK => {
                let etag = header_string(&response, ETAG);
                let date = header_string(&response, DATE);
                let body = response
                    .bytes()
                    .await
                    .with_context(|| format!("Failed to read response body from {url}"))?
                    .to_vec();
                self.cache.store(url, etag, date, &body);
                Ok(body)
            }
            status => bail!(
                "Could not retrieve the pipeline archive from {}. Http status code: {}",
                url,
                status.as_u16()
            ),
        }
    }

    async fn fetch_from_git_release(
        &self,
        info: &GitReleaseInfo,
        skip_cert_verify: bool,
    ) -> Result<Vec<u8>> {
        let api = github_api_base(&info.hostname);
        let release_url = format!(
            "{api}/repos/{}/{}/releases/tags/{}",
            info.organization, info.project, info.release
        );
        info!("Resolving git release {}", release_url);

        let client = self.client(skip_cert_verify);
        let release: Release = self
            .with_token(client.get(&release_url).header(ACCEPT, "application/vnd.github+json"))
            .send()
            .await
            .map_err(|e| Self::request_error(e, skip_cert_verify))?
            .error_for_status()
            .with_context(|| format!("Failed to look up release {release_url}"))?
            .json()
            .await
            .with_context(|| format!("Failed to parse release {release_url}"))?;

        let asset = release
            .assets
            .iter()
            .find(|a| a.name == info.asset_name)
            .ok_or_else(|| {
                anyhow!(
                    "Asset {} not found in release {} of {}/{}",
                    info.asset_name,
                    info.release,
                    info.organization,
                    info.project
                )
            })?;

        let body = self
            .with_token(client.get(&asset.url).header(ACCEPT, "application/octet-stream"))
            .send()
            .await
            .map_err(|e| Self::request_error(e, skip_cert_verify))?
            .error_for_status()
            .with_context(|| format!("Failed to download release asset {}", asset.name))?
            .bytes()
            .await
            .with_context(|| format!("Failed to read release asset {}", asset.name))?;

        Ok(body.to_vec())
    }
}
