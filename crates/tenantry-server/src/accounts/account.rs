//! A resolved, validated account
//!
//! Accounts are shared as `Arc<Account>` between the registry and every
//! session connected to them. Claims can be refreshed in place by a reload;
//! the public key never changes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use tenantry_core::AccountClaims;
use tokio::sync::oneshot;
use tracing::debug;

use crate::auth::DisconnectReason;
use crate::error::TrustChainError;

/// Server-side half of a connected client
#[derive(Debug)]
pub struct ClientHandle {
    pub id: u64,
    pub user: String,
    pub(crate) disconnect: oneshot::Sender<DisconnectReason>,
}

impl ClientHandle {
    /// Tell the session it has been terminated
    pub fn disconnect(self, reason: DisconnectReason) {
        // The session may already be gone; nothing left to notify then.
        let _ = self.disconnect.send(reason);
    }
}

#[derive(Debug)]
struct AccountState {
    token: String,
    claims: AccountClaims,
    signing_keys: HashSet<String>,
    updated_at: DateTime<Utc>,
}

impl AccountState {
    fn new(token: String, claims: AccountClaims) -> Self {
        let signing_keys = claims.nats.signing_keys.iter().cloned().collect();
        Self {
            token,
            claims,
            signing_keys,
            updated_at: Utc::now(),
        }
    }
}

/// Account resolved from a validated token
#[derive(Debug)]
pub struct Account {
    public_key: String,
    state: RwLock<AccountState>,
    clients: RwLock<HashMap<u64, ClientHandle>>,
    resolved_at: DateTime<Utc>,
}

/// Serializable view of an account
#[derive(Debug, Clone, Serialize)]
pub struct AccountInfo {
    pub public_key: String,
    pub name: String,
    pub issuer: String,
    pub signing_keys: Vec<String>,
    pub expires: Option<i64>,
    pub clients: usize,
    pub resolved_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Build an account from a token that has already passed validation
    pub fn new(token: String, claims: AccountClaims) -> Self {
        Self {
            public_key: claims.sub.clone(),
            state: RwLock::new(AccountState::new(token, claims)),
            clients: RwLock::new(HashMap::new()),
            resolved_at: Utc::now(),
        }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Display name from the token, falling back to the public key
    pub fn name(&self) -> String {
        let state = self.read_state();
        if state.claims.name.is_empty() {
            self.public_key.clone()
        } else {
            state.claims.name.clone()
        }
    }

    /// Key that signed the current token
    pub fn issuer(&self) -> String {
        self.read_state().claims.iss.clone()
    }

    pub fn token(&self) -> String {
        self.read_state().token.clone()
    }

    pub fn claims(&self) -> AccountClaims {
        self.read_state().claims.clone()
    }

    pub fn has_signing_key(&self, key: &str) -> bool {
        self.read_state().signing_keys.contains(key)
    }

    /// Check the current token's validity window at `now`
    pub fn validate_temporal(&self, now: i64) -> Result<(), TrustChainError> {
        self.read_state()
            .claims
            .validate_temporal(now)
            .map_err(TrustChainError::from)
    }

    /// Whether a user token issued at `issued_at` has been revoked
    pub fn is_revoked(&self, user_key: &str, issued_at: i64) -> bool {
        self.read_state().claims.nats.is_revoked(user_key, issued_at)
    }

    pub fn info(&self) -> AccountInfo {
        let state = self.read_state();
        let mut signing_keys: Vec<String> = state.signing_keys.iter().cloned().collect();
        signing_keys.sort();
        AccountInfo {
            public_key: self.public_key.clone(),
            name: state.claims.name.clone(),
            issuer: state.claims.iss.clone(),
            signing_keys,
            expires: state.claims.exp,
            clients: self.client_count(),
            resolved_at: self.resolved_at,
            updated_at: state.updated_at,
        }
    }

    /// Swap in a newer validated token
    pub(crate) fn replace_claims(&self, token: String, claims: AccountClaims) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = AccountState::new(token, claims);
        debug!(account = %self.public_key, "Account claims updated");
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, AccountState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Connected Clients
    // =========================================================================

    pub fn client_count(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn register_client(&self, handle: ClientHandle) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id, handle);
    }

    pub(crate) fn deregister_client(&self, id: u64) -> Option<ClientHandle> {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// Take every registered client, leaving the account with none
    pub(crate) fn drain_clients(&self) -> Vec<ClientHandle> {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        clients.drain().map(|(_, handle)| handle).collect()
    }
}
