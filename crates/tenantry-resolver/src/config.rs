//! Resolver configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{ResolverError, Result};
use crate::resolver::AccountResolver;
use crate::resolvers::url::{DEFAULT_CACHE_TTL, DEFAULT_MAX_ENTRIES, DEFAULT_TIMEOUT};
use crate::resolvers::{MemoryResolver, UrlResolver};

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL.as_secs()
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

/// Which resolver backend to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResolverConfig {
    /// In-memory resolver seeded from the preload table
    Memory,

    /// Remote account server
    Url {
        url: String,

        #[serde(default = "default_cache_ttl_secs")]
        cache_ttl_secs: u64,

        #[serde(default = "default_max_entries")]
        max_entries: u64,

        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,

        /// Background refresh interval; disabled when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refresh_secs: Option<u64>,
    },
}

impl ResolverConfig {
    /// URL resolver with default settings
    pub fn url(url: impl Into<String>) -> Self {
        ResolverConfig::Url {
            url: url.into(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_entries: default_max_entries(),
            timeout_ms: default_timeout_ms(),
            refresh_secs: None,
        }
    }
}

/// Build the configured resolver
///
/// The preload table only applies to the memory resolver; a URL resolver
/// with a non-empty preload table is rejected, since preloaded tokens could
/// never be stored into a read-only backend.
pub fn build_resolver(
    config: &ResolverConfig,
    preload: &HashMap<String, String>,
) -> Result<Arc<dyn AccountResolver>> {
    match config {
        ResolverConfig::Memory => {
            info!(preload = preload.len(), "Configuring memory resolver");
            Ok(Arc::new(MemoryResolver::with_preload(preload)))
        }
        ResolverConfig::Url {
            url,
            cache_ttl_secs,
            max_entries,
            timeout_ms,
            refresh_secs,
        } => {
            if !preload.is_empty() {
                return Err(ResolverError::InvalidConfig(
                    "resolver preload requires the memory resolver".into(),
                ));
            }
            info!(url = %url, "Configuring URL resolver");
            let resolver = Arc::new(UrlResolver::with_settings(
                url.clone(),
                Duration::from_secs(*cache_ttl_secs),
                *max_entries,
                Duration::from_millis(*timeout_ms),
            )?);
            if let Some(secs) = refresh_secs {
                if tokio::runtime::Handle::try_current().is_ok() {
                    resolver.spawn_refresh(Duration::from_secs(*secs));
                } else {
                    warn!(url = %url, "No async runtime, background refresh disabled");
                }
            }
            Ok(resolver)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverKind;

    #[test]
    fn test_parse_memory_config() {
        let config: ResolverConfig = serde_json::from_str(r#"{"type":"memory"}"#).unwrap();
        assert_eq!(config, ResolverConfig::Memory);
    }

    #[test]
    fn test_parse_url_config_defaults() {
        let config: ResolverConfig =
            serde_json::from_str(r#"{"type":"url","url":"http://localhost:9090/accounts"}"#)
                .unwrap();
        assert_eq!(config, ResolverConfig::url("http://localhost:9090/accounts"));
    }

    #[test]
    fn test_build_memory_with_preload() {
        let preload: HashMap<String, String> =
            [("Aone".to_string(), "t1".to_string())].into_iter().collect();
        let resolver = build_resolver(&ResolverConfig::Memory, &preload).unwrap();
        assert_eq!(resolver.kind(), ResolverKind::Memory);
    }

    #[test]
    fn test_url_with_preload_rejected() {
        let preload: HashMap<String, String> =
            [("Aone".to_string(), "t1".to_string())].into_iter().collect();
        let err = build_resolver(&ResolverConfig::url("http://localhost:1"), &preload).unwrap_err();
        assert!(matches!(err, ResolverError::InvalidConfig(_)));
    }
}
