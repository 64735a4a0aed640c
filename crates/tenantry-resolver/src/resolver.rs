//! Resolver trait and shared types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::error::Result;

/// Backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    Memory,
    Url,
}

impl std::fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolverKind::Memory => write!(f, "memory"),
            ResolverKind::Url => write!(f, "url"),
        }
    }
}

/// A stored account token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverEntry {
    /// Account public key
    pub account: String,
    /// Encoded account claims token
    pub token: String,
    /// When the token was stored or last fetched
    pub fetched_at: DateTime<Utc>,
}

impl ResolverEntry {
    pub fn new(account: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            token: token.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// Maps account public keys to encoded account tokens
///
/// Implementations must be safe for concurrent use. `fetch` may block on
/// remote I/O, so callers must not hold locks across it.
#[async_trait]
pub trait AccountResolver: Send + Sync + Debug {
    /// Backend kind
    fn kind(&self) -> ResolverKind;

    /// Fetch the token stored for `account`
    ///
    /// # Returns
    /// * `Ok(token)` - the encoded claims token
    /// * `Err(ResolverError::NotFound)` - nothing is stored for the key
    async fn fetch(&self, account: &str) -> Result<String>;

    /// Store `token` for `account`, replacing any previous token
    ///
    /// # Returns
    /// * `Err(ResolverError::Write)` - the backend does not accept writes
    async fn store(&self, account: &str, token: &str) -> Result<()>;

    /// Short description for logs
    fn description(&self) -> String {
        format!("{} resolver", self.kind())
    }
}
