//! Configuration reload
//!
//! A reload validates the new options completely before touching any state,
//! then swaps the trust snapshot in one step and re-checks every cached
//! account against it:
//!
//! | resolver answer              | chain check | outcome   |
//! |------------------------------|-------------|-----------|
//! | same token                   | passes      | retained  |
//! | new token                    | passes      | refreshed |
//! | any token                    | fails       | evicted   |
//! | not found                    | -           | evicted   |
//! | fetch error, cached token ok | passes      | failed    |
//! | fetch error                  | fails       | evicted   |
//!
//! Clients of evicted accounts are told to disconnect after the swap, once
//! the reload no longer holds the serialization lock.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tenantry_resolver::{build_resolver, AccountResolver, ResolverConfig, ResolverError};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::accounts::{Account, ClientHandle};
use crate::auth::DisconnectReason;
use crate::config::ServerOptions;
use crate::error::{ConfigError, Result};
use crate::server::Server;
use crate::trust::{TrustSnapshot, TrustedKeySet};

/// What a reload did to the account cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub generation: u64,
    pub retained: Vec<String>,
    pub refreshed: Vec<String>,
    pub evicted: Vec<String>,
    /// Kept with their previous claims because the resolver was unavailable
    pub failed: Vec<String>,
    pub disconnected: usize,
    pub system_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_account_error: Option<String>,
    pub duration_ms: u64,
}

/// Serializes reloads
#[derive(Debug, Default)]
pub struct ReloadCoordinator {
    serial: Mutex<()>,
}

impl ReloadCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `next` to `server`
    ///
    /// A second caller waits for the reload in progress and then runs
    /// against the state it left behind.
    pub(crate) async fn reload(&self, server: &Server, next: ServerOptions) -> Result<ReloadReport> {
        let guard = self.serial.lock().await;
        let started = Instant::now();

        let current = server.options_snapshot();
        let mut next = next;
        next.trusted_keys.clear();

        if current.operator_mode() != next.operator_mode() {
            return Err(ConfigError::OperatorModeChange.into());
        }
        if !next.operator_mode() {
            server.replace_options(next);
            info!("Reloaded options (operator mode disabled)");
            return Ok(ReloadReport {
                generation: server.trust.generation(),
                duration_ms: started.elapsed().as_millis() as u64,
                ..ReloadReport::default()
            });
        }

        // Everything fallible happens before the swap.
        next.check_operator_restrictions()?;
        let operators = next.operator_claims(server.validator.codec())?;
        let keys = TrustedKeySet::load(&operators)?;
        let previous = server.trust.current();
        let resolver = next_resolver(&current, &next, &previous)?;

        next.trusted_keys = keys.keys().map(String::from).collect();
        let snapshot = server.trust.swap(keys, Some(resolver.clone()));
        server.replace_options(next.clone());

        let mut report = ReloadReport {
            generation: snapshot.generation,
            ..ReloadReport::default()
        };
        let mut disconnects: Vec<ClientHandle> = Vec::new();

        for account in server.registry.accounts() {
            let key = account.public_key().to_string();
            let keep = revalidate(server, &snapshot, resolver.as_ref(), &account, &mut report).await;
            if !keep {
                if let Some(clients) = server.registry.evict(&key, &account) {
                    disconnects.extend(clients);
                    report.evicted.push(key);
                }
            }
        }

        // Without a configured name, a designation made at runtime stands
        // unless its account was just evicted.
        let desired = next
            .system_account
            .clone()
            .or_else(|| snapshot.keys.declared_system_account().map(String::from));
        if let Some(name) = desired {
            let unchanged = server
                .registry
                .system_account()
                .is_some_and(|sys| sys.public_key() == name || sys.name() == name);
            if !unchanged {
                if let Err(e) = server.registry.set_system_account(&name).await {
                    warn!(account = %name, error = %e, "System account not restored after reload");
                    report.system_account_error = Some(e.to_string());
                }
            }
        }
        report.system_account = server
            .registry
            .system_account()
            .map(|sys| sys.public_key().to_string());

        drop(guard);

        report.disconnected = disconnects.len();
        for handle in disconnects {
            handle.disconnect(DisconnectReason::AuthorizationViolation);
        }
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            generation = report.generation,
            retained = report.retained.len(),
            refreshed = report.refreshed.len(),
            evicted = report.evicted.len(),
            failed = report.failed.len(),
            disconnected = report.disconnected,
            "Reload complete"
        );
        Ok(report)
    }
}

/// Check one cached account against the new trust state
///
/// Returns `false` when the account must be evicted.
async fn revalidate(
    server: &Server,
    snapshot: &TrustSnapshot,
    resolver: &dyn AccountResolver,
    account: &Arc<Account>,
    report: &mut ReloadReport,
) -> bool {
    let key = account.public_key();
    match resolver.fetch(key).await {
        Ok(token) => match server.validator.validate_account(&token, &snapshot.keys, Some(key)) {
            Ok(claims) => {
                if token == account.token() {
                    report.retained.push(key.to_string());
                } else {
                    account.replace_claims(token, claims);
                    report.refreshed.push(key.to_string());
                }
                true
            }
            Err(e) => {
                warn!(account = %key, kind = e.kind(), "Account no longer trusted");
                false
            }
        },
        Err(ResolverError::NotFound(_)) => {
            info!(account = %key, "Account no longer published");
            false
        }
        Err(e) => {
            let cached = account.token();
            match server.validator.validate_account(&cached, &snapshot.keys, Some(key)) {
                Ok(_) => {
                    warn!(account = %key, error = %e, "Account refresh failed, keeping previous claims");
                    report.failed.push(key.to_string());
                    true
                }
                Err(chain) => {
                    warn!(account = %key, kind = chain.kind(), "Cached account no longer trusted");
                    false
                }
            }
        }
    }
}

/// Resolver for the new configuration
///
/// An unchanged URL resolver is kept along with its cache. Memory resolvers
/// are rebuilt from the new preload table.
fn next_resolver(
    current: &ServerOptions,
    next: &ServerOptions,
    previous: &TrustSnapshot,
) -> std::result::Result<Arc<dyn AccountResolver>, ConfigError> {
    let config = next.resolver.as_ref().ok_or(ConfigError::MissingResolver)?;
    if matches!(config, ResolverConfig::Url { .. }) && current.resolver.as_ref() == Some(config) {
        if let Some(existing) = &previous.resolver {
            return Ok(existing.clone());
        }
    }
    build_resolver(config, &next.resolver_preload).map_err(|e| ConfigError::Resolver(e.to_string()))
}
