//! Account registry
//!
//! Cache of resolved accounts keyed by public key. Lookups that miss fetch
//! from the resolver and validate outside any lock, then install through the
//! entry API so concurrent lookups of one key converge on a single account.
//! Failures are never cached.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tenantry_core::{unix_now, KeyRole, PublicKey};
use tracing::{debug, info, warn};

use crate::accounts::account::{Account, ClientHandle};
use crate::auth::DisconnectReason;
use crate::error::{Result, ServerError, TrustChainError};
use crate::trust::{ChainValidator, TrustState};

/// Registry of resolved accounts
#[derive(Debug)]
pub struct AccountRegistry {
    accounts: DashMap<String, Arc<Account>>,
    trust: Arc<TrustState>,
    validator: ChainValidator,
    system: RwLock<Option<Arc<Account>>>,
}

impl AccountRegistry {
    pub fn new(trust: Arc<TrustState>, validator: ChainValidator) -> Self {
        Self {
            accounts: DashMap::new(),
            trust,
            validator,
            system: RwLock::new(None),
        }
    }

    /// Cached account, without consulting the resolver
    pub fn get(&self, key: &str) -> Option<Arc<Account>> {
        self.accounts.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `account` is the instance currently registered for its key
    pub fn is_current(&self, account: &Arc<Account>) -> bool {
        self.accounts
            .get(account.public_key())
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), account))
    }

    /// Snapshot of every cached account
    pub fn accounts(&self) -> Vec<Arc<Account>> {
        self.accounts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Resolve an account by public key
    ///
    /// A miss fetches the token, validates it against the current trusted
    /// keys and caches the result. If a reload swaps the trust state while
    /// the fetch is in flight, the result is discarded and the lookup runs
    /// again against the new state.
    ///
    /// A hit whose token or issuing operator has since expired is evicted,
    /// and its clients are disconnected.
    pub async fn lookup_account(&self, key: &str) -> Result<Arc<Account>> {
        if let Some(account) = self.get(key) {
            debug!(account = %key, "Account cache hit");
            self.check_cached(&account)?;
            return Ok(account);
        }

        if PublicKey::parse_with_role(key, KeyRole::Account).is_err() {
            return Err(ServerError::AccountNotFound(key.to_string()));
        }

        loop {
            let snapshot = self.trust.current();
            let resolver = snapshot
                .resolver
                .clone()
                .ok_or(ServerError::OperatorModeDisabled)?;

            let token = resolver.fetch(key).await.map_err(|e| {
                debug!(account = %key, error = %e, "Account fetch failed");
                ServerError::from(e)
            })?;
            let claims = self
                .validator
                .validate_account(&token, &snapshot.keys, Some(key))?;
            let candidate = Arc::new(Account::new(token, claims));

            match self.accounts.entry(key.to_string()) {
                Entry::Occupied(existing) => return Ok(Arc::clone(existing.get())),
                Entry::Vacant(vacant) => {
                    if self.trust.generation() != snapshot.generation {
                        debug!(account = %key, "Trust changed during lookup, retrying");
                        continue;
                    }
                    let account = vacant.insert(candidate);
                    info!(
                        account = %key,
                        issuer = %account.issuer(),
                        generation = snapshot.generation,
                        "Account registered"
                    );
                    return Ok(Arc::clone(account.value()));
                }
            }
        }
    }

    fn check_cached(&self, account: &Arc<Account>) -> Result<()> {
        let now = unix_now();
        let expired = match account.validate_temporal(now) {
            Ok(()) => self
                .trust
                .current()
                .keys
                .expired_operator(&account.issuer(), now)
                .map(TrustChainError::Expired),
            Err(e) => Some(e),
        };
        let Some(err) = expired else {
            return Ok(());
        };

        warn!(
            account = %account.public_key(),
            kind = err.kind(),
            error = %err,
            "Cached account no longer valid"
        );
        if let Some(clients) = self.evict(account.public_key(), account) {
            for handle in clients {
                handle.disconnect(DisconnectReason::AuthorizationViolation);
            }
        }
        Err(err.into())
    }

    /// Validate a token and publish it to the resolver
    ///
    /// A cached account with the same key picks up the new claims.
    pub async fn store_account(&self, key: &str, token: &str) -> Result<Arc<Account>> {
        let snapshot = self.trust.current();
        let resolver = snapshot
            .resolver
            .clone()
            .ok_or(ServerError::OperatorModeDisabled)?;

        let claims = self
            .validator
            .validate_account(token, &snapshot.keys, Some(key))?;
        resolver.store(key, token).await?;
        info!(account = %key, "Stored account token");

        match self.get(key) {
            Some(existing) => {
                existing.replace_claims(token.to_string(), claims);
                Ok(existing)
            }
            None => self.lookup_account(key).await,
        }
    }

    /// Remove `expected` if it is still the registered instance
    ///
    /// Returns the evicted account's clients so the caller can disconnect
    /// them once it no longer holds any lock.
    pub(crate) fn evict(&self, key: &str, expected: &Arc<Account>) -> Option<Vec<ClientHandle>> {
        let (_, account) = self
            .accounts
            .remove_if(key, |_, current| Arc::ptr_eq(current, expected))?;

        {
            let mut system = self.system.write().unwrap_or_else(PoisonError::into_inner);
            if system.as_ref().is_some_and(|sys| Arc::ptr_eq(sys, &account)) {
                warn!(account = %key, "System account evicted");
                *system = None;
            }
        }

        info!(account = %key, clients = account.client_count(), "Account evicted");
        Some(account.drain_clients())
    }

    // =========================================================================
    // System Account
    // =========================================================================

    pub fn system_account(&self) -> Option<Arc<Account>> {
        self.system
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Designate the system account
    ///
    /// `name` is an account public key, or the name of an account that is
    /// already cached. The account must resolve and be issued by a trusted
    /// key; on failure the previous designation stays in place.
    pub async fn set_system_account(&self, name: &str) -> Result<Arc<Account>> {
        let key = self.resolve_name(name)?;
        let account = self.lookup_account(&key).await.map_err(|e| {
            warn!(account = %name, error = %e, "System account could not be resolved");
            ServerError::InvalidSystemAccount(format!("{}: {}", name, e))
        })?;

        let issuer = account.issuer();
        if !self.trust.current().keys.contains_at(&issuer, unix_now()) {
            warn!(account = %name, issuer = %issuer, "System account issuer is not trusted");
            return Err(ServerError::InvalidSystemAccount(format!(
                "{}: issuer {} is not trusted",
                name, issuer
            )));
        }

        self.designate_system(account)
    }

    /// Install `account` as the system account if it is still cached
    ///
    /// Eviction clears the designation under the same lock, so checking
    /// here keeps an evicted account from being designated afterwards.
    fn designate_system(&self, account: Arc<Account>) -> Result<Arc<Account>> {
        let mut system = self.system.write().unwrap_or_else(PoisonError::into_inner);
        if !self.is_current(&account) {
            warn!(account = %account.public_key(), "System account evicted before designation");
            return Err(ServerError::InvalidSystemAccount(format!(
                "{}: account was evicted",
                account.public_key()
            )));
        }
        *system = Some(Arc::clone(&account));
        info!(account = %account.public_key(), "System account set");
        Ok(account)
    }

    fn resolve_name(&self, name: &str) -> Result<String> {
        if PublicKey::parse_with_role(name, KeyRole::Account).is_ok() {
            return Ok(name.to_string());
        }
        self.accounts
            .iter()
            .find(|entry| entry.value().name() == name)
            .map(|entry| entry.key().clone())
            .ok_or_else(|| {
                ServerError::InvalidSystemAccount(format!("{} is not an account key", name))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantry_core::{AccountClaims, KeyPair, OperatorClaims};
    use std::time::Duration;
    use tenantry_resolver::{AccountResolver, MemoryResolver};
    use tokio::sync::oneshot;

    use crate::trust::TrustedKeySet;

    struct Fixture {
        operator: KeyPair,
        resolver: Arc<MemoryResolver>,
        registry: Arc<AccountRegistry>,
    }

    fn fixture() -> Fixture {
        let operator = KeyPair::generate(KeyRole::Operator);
        let keys = TrustedKeySet::load(&[OperatorClaims::new(operator.public_key())]).unwrap();
        let resolver = Arc::new(MemoryResolver::new());
        let trust = Arc::new(TrustState::new(keys, Some(resolver.clone())));
        let registry = Arc::new(AccountRegistry::new(trust, ChainValidator::default()));
        Fixture {
            operator,
            resolver,
            registry,
        }
    }

    async fn publish(f: &Fixture, signer: &KeyPair) -> String {
        let akp = KeyPair::generate(KeyRole::Account);
        let token = AccountClaims::new(akp.public_key()).encode(signer).unwrap();
        f.resolver.store(akp.public_key(), &token).await.unwrap();
        akp.public_key().to_string()
    }

    #[tokio::test]
    async fn test_lookup_caches_account() {
        let f = fixture();
        let key = publish(&f, &f.operator).await;

        let first = f.registry.lookup_account(&key).await.unwrap();
        let second = f.registry.lookup_account(&key).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(f.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_converge() {
        let f = fixture();
        let key = publish(&f, &f.operator).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = f.registry.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                registry.lookup_account(&key).await.unwrap()
            }));
        }
        let mut accounts = Vec::new();
        for handle in handles {
            accounts.push(handle.await.unwrap());
        }
        assert!(accounts.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert!(f.registry.is_current(&accounts[0]));
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let f = fixture();
        let akp = KeyPair::generate(KeyRole::Account);

        let err = f.registry.lookup_account(akp.public_key()).await.unwrap_err();
        assert!(matches!(err, ServerError::AccountNotFound(_)));

        let token = AccountClaims::new(akp.public_key()).encode(&f.operator).unwrap();
        f.resolver.store(akp.public_key(), &token).await.unwrap();
        assert!(f.registry.lookup_account(akp.public_key()).await.is_ok());
    }

    #[tokio::test]
    async fn test_foreign_operator_not_cached() {
        let f = fixture();
        let foreign = KeyPair::generate(KeyRole::Operator);
        let key = publish(&f, &foreign).await;

        let err = f.registry.lookup_account(&key).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::TrustChain(TrustChainError::UnknownIssuer(_))
        ));
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_key_is_not_found() {
        let f = fixture();
        let err = f.registry.lookup_account("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, ServerError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_evict_only_expected_instance() {
        let f = fixture();
        let key = publish(&f, &f.operator).await;
        let account = f.registry.lookup_account(&key).await.unwrap();

        let stale = Arc::new(Account::new(account.token(), account.claims()));
        assert!(f.registry.evict(&key, &stale).is_none());
        assert!(f.registry.evict(&key, &account).is_some());
        assert!(f.registry.get(&key).is_none());
    }

    #[tokio::test]
    async fn test_system_account() {
        let f = fixture();
        let key = publish(&f, &f.operator).await;

        let account = f.registry.set_system_account(&key).await.unwrap();
        assert!(Arc::ptr_eq(&account, &f.registry.system_account().unwrap()));

        // Evicting the system account clears the designation.
        f.registry.evict(&key, &account);
        assert!(f.registry.system_account().is_none());
    }

    #[tokio::test]
    async fn test_system_account_from_foreign_operator() {
        let f = fixture();
        let trusted = publish(&f, &f.operator).await;
        f.registry.set_system_account(&trusted).await.unwrap();

        let foreign = KeyPair::generate(KeyRole::Operator);
        let key = publish(&f, &foreign).await;
        let err = f.registry.set_system_account(&key).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidSystemAccount(_)));

        // Previous designation is untouched.
        assert_eq!(f.registry.system_account().unwrap().public_key(), trusted);
    }

    #[tokio::test]
    async fn test_expired_cached_account_evicted() {
        let f = fixture();
        let akp = KeyPair::generate(KeyRole::Account);
        let expires = unix_now() + 2;
        let token = AccountClaims::new(akp.public_key())
            .with_expiry(expires)
            .encode(&f.operator)
            .unwrap();
        f.resolver.store(akp.public_key(), &token).await.unwrap();

        let account = f.registry.lookup_account(akp.public_key()).await.unwrap();
        let (tx, mut rx) = oneshot::channel();
        account.register_client(ClientHandle {
            id: 1,
            user: "Uclient".into(),
            disconnect: tx,
        });

        tokio::time::sleep(Duration::from_secs(3)).await;

        let err = f.registry.lookup_account(akp.public_key()).await.unwrap_err();
        assert_eq!(err, ServerError::TrustChain(TrustChainError::Expired(expires)));
        assert!(f.registry.get(akp.public_key()).is_none());
        assert_eq!(rx.try_recv(), Ok(DisconnectReason::AuthorizationViolation));
    }

    #[tokio::test]
    async fn test_evicted_account_not_designated() {
        let f = fixture();
        let key = publish(&f, &f.operator).await;
        let account = f.registry.lookup_account(&key).await.unwrap();
        f.registry.evict(&key, &account);

        let err = f.registry.designate_system(account).unwrap_err();
        assert!(matches!(err, ServerError::InvalidSystemAccount(_)));
        assert!(f.registry.system_account().is_none());
    }

    #[tokio::test]
    async fn test_store_account_validates() {
        let f = fixture();
        let akp = KeyPair::generate(KeyRole::Account);
        let foreign = KeyPair::generate(KeyRole::Operator);
        let token = AccountClaims::new(akp.public_key()).encode(&foreign).unwrap();

        assert!(f.registry.store_account(akp.public_key(), &token).await.is_err());
        assert!(f.resolver.is_empty());

        let token = AccountClaims::new(akp.public_key()).encode(&f.operator).unwrap();
        let account = f.registry.store_account(akp.public_key(), &token).await.unwrap();
        assert_eq!(account.token(), token);
    }
}
