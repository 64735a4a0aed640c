//! In-memory resolver
//!
//! Default resolver backed by a hashmap, seeded from the configured preload
//! table. Data is lost on restart and on reload, where the server rebuilds
//! the resolver from the new preload table.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

use crate::error::{ResolverError, Result};
use crate::resolver::{AccountResolver, ResolverEntry, ResolverKind};

/// In-memory account resolver
#[derive(Debug, Default)]
pub struct MemoryResolver {
    entries: RwLock<HashMap<String, ResolverEntry>>,
}

impl MemoryResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver seeded with `{account: token}` pairs
    pub fn with_preload<'a, I>(preload: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let entries: HashMap<String, ResolverEntry> = preload
            .into_iter()
            .map(|(account, token)| (account.clone(), ResolverEntry::new(account, token)))
            .collect();
        if !entries.is_empty() {
            info!(count = entries.len(), "Preloaded memory resolver");
        }
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Snapshot of a stored entry
    pub fn entry(&self, account: &str) -> Option<ResolverEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(account).cloned()
    }

    /// Remove a stored token
    pub fn remove(&self, account: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let removed = entries.remove(account).is_some();
        if removed {
            info!(account = %account, "Removed account token");
        }
        removed
    }

    /// Number of stored tokens
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored account keys
    pub fn accounts(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().cloned().collect()
    }
}

#[async_trait]
impl AccountResolver for MemoryResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Memory
    }

    async fn fetch(&self, account: &str) -> Result<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(account) {
            Some(entry) => {
                debug!(account = %account, "Memory resolver hit");
                Ok(entry.token.clone())
            }
            None => Err(ResolverError::NotFound(account.to_string())),
        }
    }

    async fn store(&self, account: &str, token: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        info!(account = %account, "Storing account token");
        entries.insert(account.to_string(), ResolverEntry::new(account, token));
        Ok(())
    }
}
