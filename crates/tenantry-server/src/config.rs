//! Server options and operator-mode validation
//!
//! Options are plain serde data. Operator mode is enabled whenever
//! `trusted_operators` is non-empty; the server derives `trusted_keys` from
//! the operator tokens and refuses any legacy auth configuration alongside
//! them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use tenantry_core::{unix_now, ClaimsCodec, OperatorClaims};
use tenantry_resolver::ResolverConfig;
use tracing::info;

use crate::error::ConfigError;

/// Default time allowed for a client to answer the nonce challenge
pub const DEFAULT_AUTH_TIMEOUT_MS: u64 = 2_000;

fn default_auth_timeout_ms() -> u64 {
    DEFAULT_AUTH_TIMEOUT_MS
}

/// Statically configured account (legacy auth)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticAccount {
    pub name: String,
}

/// Statically configured user/password pair (legacy auth)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticUser {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

/// Statically configured nkey user (legacy auth)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticNkeyUser {
    pub nkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

/// Cluster listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,

    #[serde(default)]
    pub routes: Vec<String>,

    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Encoded, self-signed operator tokens
    #[serde(default)]
    pub trusted_operators: Vec<String>,

    /// Derived by the server; must be empty when the options are handed to
    /// a new server
    #[serde(default)]
    pub trusted_keys: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<ResolverConfig>,

    /// `{account public key: account token}`, memory resolver only
    #[serde(default)]
    pub resolver_preload: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_account: Option<String>,

    #[serde(default)]
    pub accounts: Vec<StaticAccount>,

    #[serde(default)]
    pub users: Vec<StaticUser>,

    #[serde(default)]
    pub nkeys: Vec<StaticNkeyUser>,

    #[serde(default)]
    pub allow_new_accounts: bool,

    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterOptions>,

    /// Admin HTTP API listen address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_listen: Option<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            server_name: None,
            trusted_operators: Vec::new(),
            trusted_keys: Vec::new(),
            resolver: None,
            resolver_preload: HashMap::new(),
            system_account: None,
            accounts: Vec::new(),
            users: Vec::new(),
            nkeys: Vec::new(),
            allow_new_accounts: false,
            auth_timeout_ms: DEFAULT_AUTH_TIMEOUT_MS,
            cluster: None,
            admin_listen: None,
        }
    }
}

impl ServerOptions {
    /// Whether trusted operators are configured
    pub fn operator_mode(&self) -> bool {
        !self.trusted_operators.is_empty()
    }

    /// Parse options from JSON
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Source(e.to_string()))
    }

    /// Decode and check every trusted operator token
    ///
    /// Operator tokens must be self-signed and unexpired.
    pub fn operator_claims(
        &self,
        codec: &dyn ClaimsCodec,
    ) -> Result<Vec<OperatorClaims>, ConfigError> {
        let now = unix_now();
        self.trusted_operators
            .iter()
            .map(|token| {
                let claims = codec
                    .decode_operator(token)
                    .map_err(|e| ConfigError::InvalidOperator(e.to_string()))?;
                if claims.iss != claims.sub {
                    return Err(ConfigError::InvalidOperator(format!(
                        "operator {} is not self-signed",
                        claims.sub
                    )));
                }
                claims
                    .validate_temporal(now)
                    .map_err(|e| ConfigError::InvalidOperator(format!("{}: {}", claims.sub, e)))?;
                Ok(claims)
            })
            .collect()
    }

    /// Reject configurations that mix operator mode with legacy auth
    ///
    /// Each restriction is checked independently; any one of them is fatal.
    pub fn check_operator_restrictions(&self) -> Result<(), ConfigError> {
        if !self.operator_mode() {
            return Ok(());
        }
        if !self.trusted_keys.is_empty() {
            return Err(ConfigError::AlreadyBound);
        }
        if !self.accounts.is_empty() {
            return Err(ConfigError::StaticAccounts);
        }
        if !self.users.is_empty() {
            return Err(ConfigError::StaticUsers);
        }
        if !self.nkeys.is_empty() {
            return Err(ConfigError::StaticNkeyUsers);
        }
        if self.allow_new_accounts {
            return Err(ConfigError::AllowNewAccounts);
        }
        if self.resolver.is_none() {
            return Err(ConfigError::MissingResolver);
        }
        Ok(())
    }
}

// =============================================================================
// Options Sources
// =============================================================================

/// Where reloads read their configuration from
#[async_trait]
pub trait OptionsSource: Send + Sync + std::fmt::Debug {
    async fn load(&self) -> Result<ServerOptions, ConfigError>;

    fn description(&self) -> String;
}

/// JSON options file
#[derive(Debug, Clone)]
pub struct FileOptionsSource {
    path: PathBuf,
}

impl FileOptionsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl OptionsSource for FileOptionsSource {
    async fn load(&self) -> Result<ServerOptions, ConfigError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ConfigError::Source(format!("{}: {}", self.path.display(), e)))?;
        let options = ServerOptions::from_json(&raw)?;
        info!(path = %self.path.display(), "Loaded server options");
        Ok(options)
    }

    fn description(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// In-memory options that embedders can replace between reloads
#[derive(Debug, Default)]
pub struct StaticOptionsSource {
    options: RwLock<ServerOptions>,
}

impl StaticOptionsSource {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options: RwLock::new(options),
        }
    }

    /// Replace the options returned by the next load
    pub fn replace(&self, options: ServerOptions) {
        *self.options.write().unwrap_or_else(PoisonError::into_inner) = options;
    }
}

#[async_trait]
impl OptionsSource for StaticOptionsSource {
    async fn load(&self) -> Result<ServerOptions, ConfigError> {
        Ok(self
            .options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn description(&self) -> String {
        "static options".to_string()
    }
}
