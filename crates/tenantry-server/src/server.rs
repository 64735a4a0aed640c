//! Server facade
//!
//! Ties together the trust state, the account registry, client
//! authentication and reloads behind one handle.

use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tenantry_core::{ClaimsCodec, Ed25519Verifier, JwtCodec, SignatureVerifier};
use tenantry_resolver::{build_resolver, AccountResolver};
use tracing::info;

use crate::accounts::{Account, AccountRegistry};
use crate::auth::{
    AuthOutcome, Authenticator, ChallengeError, ConnectRequest, DisconnectReason, NonceChallenge,
    ServerChallenge,
};
use crate::config::{OptionsSource, ServerOptions};
use crate::error::{ConfigError, Result};
use crate::reload::{ReloadCoordinator, ReloadReport};
use crate::trust::{ChainValidator, TrustState, TrustedKeySet};

/// Health summary
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub server_name: Option<String>,
    pub version: &'static str,
    pub operator_mode: bool,
    pub trusted_keys: usize,
    pub accounts: usize,
    pub system_account: Option<String>,
    pub generation: u64,
    pub clustered: bool,
}

/// Builder for [`Server`]
///
/// Allows substituting the token codec and signature verifier, and attaching
/// the options source that [`Server::reload`] reads from.
pub struct ServerBuilder {
    options: ServerOptions,
    codec: Arc<dyn ClaimsCodec>,
    verifier: Arc<dyn SignatureVerifier>,
    source: Option<Arc<dyn OptionsSource>>,
}

impl ServerBuilder {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options,
            codec: Arc::new(JwtCodec),
            verifier: Arc::new(Ed25519Verifier),
            source: None,
        }
    }

    pub fn codec(mut self, codec: Arc<dyn ClaimsCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn options_source(mut self, source: Arc<dyn OptionsSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Validate the options and bind them to a new server
    pub fn build(self) -> Result<Server> {
        let mut options = self.options;
        let validator = ChainValidator::new(self.codec);

        if !options.trusted_keys.is_empty() {
            return Err(ConfigError::AlreadyBound.into());
        }

        let (keys, resolver) = if options.operator_mode() {
            options.check_operator_restrictions()?;
            let operators = options.operator_claims(validator.codec())?;
            let keys = TrustedKeySet::load(&operators)?;
            let config = options
                .resolver
                .as_ref()
                .ok_or(ConfigError::MissingResolver)?;
            let resolver = build_resolver(config, &options.resolver_preload)
                .map_err(|e| ConfigError::Resolver(e.to_string()))?;
            options.trusted_keys = keys.keys().map(String::from).collect();
            (keys, Some(resolver))
        } else {
            (TrustedKeySet::empty(), None)
        };

        info!(
            server_name = ?options.server_name,
            operator_mode = options.operator_mode(),
            trusted_keys = keys.len(),
            resolver = ?resolver.as_ref().map(|r| r.description()),
            "Server configured"
        );

        let trust = Arc::new(TrustState::new(keys, resolver));
        let registry = Arc::new(AccountRegistry::new(trust.clone(), validator.clone()));
        let authenticator = Authenticator::new(registry.clone(), validator.clone(), self.verifier);

        Ok(Server {
            options: RwLock::new(Arc::new(options)),
            trust,
            registry,
            validator,
            authenticator,
            reloader: ReloadCoordinator::new(),
            source: self.source,
        })
    }
}

/// Trust and account-resolution state of one server
#[derive(Debug)]
pub struct Server {
    options: RwLock<Arc<ServerOptions>>,
    pub(crate) trust: Arc<TrustState>,
    pub(crate) registry: Arc<AccountRegistry>,
    pub(crate) validator: ChainValidator,
    authenticator: Authenticator,
    reloader: ReloadCoordinator,
    source: Option<Arc<dyn OptionsSource>>,
}

impl Server {
    /// Validate `options` and build a server
    ///
    /// Fails with a `ConfigError` when operator mode is combined with legacy
    /// auth, lacks a resolver, or the options were already bound to another
    /// server.
    pub fn new(options: ServerOptions) -> Result<Self> {
        ServerBuilder::new(options).build()
    }

    pub fn builder(options: ServerOptions) -> ServerBuilder {
        ServerBuilder::new(options)
    }

    /// Finish startup: configure the system account
    ///
    /// The account named in the options, or else the one declared by a
    /// trusted operator, must resolve.
    pub async fn start(&self) -> Result<()> {
        let options = self.options_snapshot();
        if options.operator_mode() {
            let desired = options.system_account.clone().or_else(|| {
                self.trust
                    .current()
                    .keys
                    .declared_system_account()
                    .map(String::from)
            });
            if let Some(name) = desired {
                self.registry
                    .set_system_account(&name)
                    .await
                    .map_err(|e| ConfigError::SystemAccount(e.to_string()))?;
            }
        }
        info!(server_name = ?options.server_name, "Server started");
        Ok(())
    }

    /// Build and start a server
    pub async fn run(options: ServerOptions) -> Result<Self> {
        let server = Self::new(options)?;
        server.start().await?;
        Ok(server)
    }

    // =========================================================================
    // Options
    // =========================================================================

    /// Options in effect, with `trusted_keys` filled in
    pub fn options(&self) -> ServerOptions {
        self.options_snapshot().as_ref().clone()
    }

    pub(crate) fn options_snapshot(&self) -> Arc<ServerOptions> {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn replace_options(&self, options: ServerOptions) {
        *self.options.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(options);
    }

    pub fn operator_mode(&self) -> bool {
        self.options_snapshot().operator_mode()
    }

    /// Whether connecting clients must sign a nonce
    pub fn nonce_required(&self) -> bool {
        let options = self.options_snapshot();
        options.operator_mode() || !options.nkeys.is_empty()
    }

    pub fn trusted_keys(&self) -> Arc<TrustedKeySet> {
        self.trust.current().keys.clone()
    }

    pub fn account_resolver(&self) -> Option<Arc<dyn AccountResolver>> {
        self.trust.current().resolver.clone()
    }

    pub fn is_clustered(&self) -> bool {
        self.options_snapshot()
            .cluster
            .as_ref()
            .is_some_and(|c| c.name.is_some() || c.listen.is_some() || !c.routes.is_empty())
    }

    pub fn info(&self) -> ServerInfo {
        let options = self.options_snapshot();
        let snapshot = self.trust.current();
        ServerInfo {
            server_name: options.server_name.clone(),
            version: tenantry_core::VERSION,
            operator_mode: options.operator_mode(),
            trusted_keys: snapshot.keys.len(),
            accounts: self.registry.len(),
            system_account: self.system_account().map(|a| a.public_key().to_string()),
            generation: snapshot.generation,
            clustered: self.is_clustered(),
        }
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    pub async fn lookup_account(&self, key: &str) -> Result<Arc<Account>> {
        self.registry.lookup_account(key).await
    }

    /// Validate an account token and publish it through the resolver
    pub async fn store_account(&self, key: &str, token: &str) -> Result<Arc<Account>> {
        self.registry.store_account(key, token).await
    }

    /// Accounts currently cached
    pub fn accounts(&self) -> Vec<Arc<Account>> {
        self.registry.accounts()
    }

    pub fn system_account(&self) -> Option<Arc<Account>> {
        self.registry.system_account()
    }

    pub async fn set_system_account(&self, name: &str) -> Result<()> {
        self.registry.set_system_account(name).await.map(|_| ())
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Issue the nonce for a new connection
    pub fn issue_challenge(
        &self,
        challenge: &mut NonceChallenge,
    ) -> std::result::Result<ServerChallenge, ChallengeError> {
        challenge.issue(self.options_snapshot().server_name.clone())
    }

    pub async fn authenticate(
        &self,
        challenge: &mut NonceChallenge,
        request: &ConnectRequest,
    ) -> AuthOutcome {
        self.authenticator.authenticate(challenge, request).await
    }

    /// Authenticate within the configured `auth_timeout_ms`
    pub async fn authenticate_with_timeout<F>(
        &self,
        challenge: &mut NonceChallenge,
        response: F,
    ) -> AuthOutcome
    where
        F: std::future::Future<Output = Option<ConnectRequest>>,
    {
        let timeout = Duration::from_millis(self.options_snapshot().auth_timeout_ms);
        self.authenticator
            .authenticate_with_timeout(challenge, timeout, response)
            .await
    }

    // =========================================================================
    // Reload / Shutdown
    // =========================================================================

    /// Re-read the options source and apply it
    ///
    /// Without a source, the current options are re-applied, which
    /// re-validates every cached account.
    pub async fn reload(&self) -> Result<ReloadReport> {
        let options = match &self.source {
            Some(source) => source.load().await?,
            None => self.options(),
        };
        self.reload_with(options).await
    }

    /// Apply `options`; on error nothing changes
    pub async fn reload_with(&self, options: ServerOptions) -> Result<ReloadReport> {
        self.reloader.reload(self, options).await
    }

    /// Disconnect every client
    pub fn shutdown(&self) -> usize {
        let mut disconnected = 0;
        for account in self.registry.accounts() {
            for handle in account.drain_clients() {
                handle.disconnect(DisconnectReason::ServerShutdown);
                disconnected += 1;
            }
        }
        info!(disconnected, "Server shut down");
        disconnected
    }
}
