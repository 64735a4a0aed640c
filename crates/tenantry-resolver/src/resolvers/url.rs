//! URL resolver
//!
//! Fetches account tokens from an account server with `GET {url}/{account}`.
//! Responses are cached in a bounded TTL cache; an optional background task
//! refreshes cached entries so updated tokens are picked up before expiry.

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ResolverError, Result};
use crate::resolver::{AccountResolver, ResolverKind};

/// Default cache TTL
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(120);

/// Default cache capacity
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Read-only resolver backed by an account server
pub struct UrlResolver {
    base_url: String,
    cache: Cache<String, String>,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for UrlResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlResolver")
            .field("base_url", &self.base_url)
            .field("cached", &self.cache.entry_count())
            .finish()
    }
}

impl UrlResolver {
    /// Create a resolver with default cache and timeout settings
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_settings(base_url, DEFAULT_CACHE_TTL, DEFAULT_MAX_ENTRIES, DEFAULT_TIMEOUT)
    }

    /// Create a resolver with explicit settings
    pub fn with_settings(
        base_url: impl Into<String>,
        ttl: Duration,
        max_entries: u64,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ResolverError::InvalidConfig(format!(
                "resolver url must be http(s): '{}'",
                base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResolverError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_entries)
                .build(),
            http_client,
        })
    }

    /// Base URL of the account server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Drop a cached token so the next fetch goes to the server
    pub async fn invalidate(&self, account: &str) {
        self.cache.invalidate(account).await;
    }

    /// Number of cached tokens
    pub fn cached_count(&self) -> u64 {
        self.cache.entry_count()
    }

    async fn fetch_remote(&self, account: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, account);
        debug!(account = %account, url = %url, "Fetching account token");

        let response = self.http_client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ResolverError::NotFound(account.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| ResolverError::Fetch(e.to_string()))?;

        let token = response.text().await?.trim().to_string();
        if token.is_empty() {
            return Err(ResolverError::NotFound(account.to_string()));
        }
        Ok(token)
    }

    /// Start refreshing cached tokens every `interval`
    ///
    /// The task stops once the resolver is dropped.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(resolver) = weak.upgrade() else {
                    break;
                };
                resolver.refresh_cached().await;
            }
        })
    }

    /// Re-fetch every cached token once
    pub async fn refresh_cached(&self) {
        let accounts: Vec<String> = self.cache.iter().map(|(k, _)| k.as_ref().clone()).collect();
        for account in accounts {
            match self.fetch_remote(&account).await {
                Ok(token) => self.cache.insert(account, token).await,
                Err(ResolverError::NotFound(_)) => {
                    info!(account = %account, "Account removed from account server");
                    self.cache.invalidate(&account).await;
                }
                Err(e) => {
                    warn!(account = %account, error = %e, "Account refresh failed, keeping cached token");
                }
            }
        }
    }
}

#[async_trait]
impl AccountResolver for UrlResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Url
    }

    async fn fetch(&self, account: &str) -> Result<String> {
        if let Some(cached) = self.cache.get(account).await {
            debug!(account = %account, "Using cached account token");
            return Ok(cached);
        }

        let token = self.fetch_remote(account).await?;
        self.cache.insert(account.to_string(), token.clone()).await;
        Ok(token)
    }

    async fn store(&self, account: &str, _token: &str) -> Result<()> {
        warn!(account = %account, "Store rejected by read-only URL resolver");
        Err(ResolverError::Write(
            "store is not supported by the URL resolver".into(),
        ))
    }

    fn description(&self) -> String {
        format!("url resolver ({})", self.base_url)
    }
}
