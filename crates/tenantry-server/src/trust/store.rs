//! Trusted key set
//!
//! Holds the public keys permitted to sign account tokens:
//! - Each trusted operator's identity key
//! - Every signing key its operator token declares
//!
//! The set is immutable once built. A reload builds a new set and swaps the
//! whole `TrustSnapshot` so readers never observe a half-updated state.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};
use tenantry_core::{KeyRole, OperatorClaims, PublicKey};
use tenantry_resolver::AccountResolver;
use tracing::info;

use crate::error::ConfigError;

/// Summary of one trusted operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedOperator {
    pub public_key: String,
    pub name: String,
    pub signing_keys: Vec<String>,
    pub expires: Option<i64>,
    pub account_server_url: Option<String>,
    pub system_account: Option<String>,
}

impl TrustedOperator {
    /// Whether the operator token has expired at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires, Some(exp) if exp <= now)
    }
}

impl From<&OperatorClaims> for TrustedOperator {
    fn from(claims: &OperatorClaims) -> Self {
        Self {
            public_key: claims.sub.clone(),
            name: claims.name.clone(),
            signing_keys: claims.nats.signing_keys.clone(),
            expires: claims.exp,
            account_server_url: claims.nats.account_server_url.clone(),
            system_account: claims.nats.system_account.clone(),
        }
    }
}

/// Keys trusted to issue account tokens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedKeySet {
    keys: BTreeSet<String>,
    operators: Vec<TrustedOperator>,
}

impl TrustedKeySet {
    /// Empty set (operator mode disabled)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the set from decoded operator claims
    ///
    /// Contains each operator's identity key plus all of its signing keys.
    /// Duplicates collapse; every key must be an operator key.
    pub fn load(operators: &[OperatorClaims]) -> Result<Self, ConfigError> {
        if operators.is_empty() {
            return Err(ConfigError::NoTrustedOperators);
        }

        let mut keys = BTreeSet::new();
        for claims in operators {
            keys.insert(operator_key(&claims.sub)?);
            for signing_key in &claims.nats.signing_keys {
                keys.insert(operator_key(signing_key)?);
            }
        }

        let set = Self {
            keys,
            operators: operators.iter().map(TrustedOperator::from).collect(),
        };
        info!(
            operators = set.operators.len(),
            keys = set.keys.len(),
            "Loaded trusted operator keys"
        );
        Ok(set)
    }

    /// Whether `key` belongs to a configured operator
    ///
    /// Ignores operator expiry; use [`TrustedKeySet::contains_at`] when
    /// checking a signature at a point in time.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Whether `key` may sign account tokens at `now`
    pub fn contains_at(&self, key: &str, now: i64) -> bool {
        self.contains(key) && self.expired_operator(key, now).is_none()
    }

    /// Expiry of the operator owning `key`, if that operator has expired
    pub fn expired_operator(&self, key: &str, now: i64) -> Option<i64> {
        self.operator_for(key)
            .filter(|op| op.is_expired(now))
            .and_then(|op| op.expires)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Trusted keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn operators(&self) -> &[TrustedOperator] {
        &self.operators
    }

    /// Operator owning `key`, either as identity or as a signing key
    pub fn operator_for(&self, key: &str) -> Option<&TrustedOperator> {
        self.operators
            .iter()
            .find(|op| op.public_key == key || op.signing_keys.iter().any(|k| k == key))
    }

    /// First system account declared by a trusted operator
    pub fn declared_system_account(&self) -> Option<&str> {
        self.operators
            .iter()
            .find_map(|op| op.system_account.as_deref())
    }
}

fn operator_key(key: &str) -> Result<String, ConfigError> {
    PublicKey::parse_with_role(key, KeyRole::Operator)
        .map(|k| k.as_str().to_string())
        .map_err(|e| ConfigError::InvalidOperator(format!("{}: {}", key, e)))
}

// =============================================================================
// Trust State
// =============================================================================

/// Trust configuration in effect at one point in time
#[derive(Debug)]
pub struct TrustSnapshot {
    pub keys: Arc<TrustedKeySet>,
    pub resolver: Option<Arc<dyn AccountResolver>>,
    pub generation: u64,
}

/// Atomically swappable trust snapshot
///
/// Lookups capture a snapshot, fetch and validate without holding any lock,
/// then compare generations before installing a result.
#[derive(Debug)]
pub struct TrustState {
    current: RwLock<Arc<TrustSnapshot>>,
}

impl TrustState {
    pub fn new(keys: TrustedKeySet, resolver: Option<Arc<dyn AccountResolver>>) -> Self {
        Self {
            current: RwLock::new(Arc::new(TrustSnapshot {
                keys: Arc::new(keys),
                resolver,
                generation: 0,
            })),
        }
    }

    /// Current snapshot
    pub fn current(&self) -> Arc<TrustSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn generation(&self) -> u64 {
        self.current().generation
    }

    /// Install a new key set and resolver, returning the new snapshot
    pub fn swap(
        &self,
        keys: TrustedKeySet,
        resolver: Option<Arc<dyn AccountResolver>>,
    ) -> Arc<TrustSnapshot> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(TrustSnapshot {
            keys: Arc::new(keys),
            resolver,
            generation: current.generation + 1,
        });
        *current = next.clone();
        info!(generation = next.generation, keys = next.keys.len(), "Swapped trust state");
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantry_core::KeyPair;

    fn operator(signing_keys: usize) -> (KeyPair, OperatorClaims) {
        let okp = KeyPair::generate(KeyRole::Operator);
        let mut claims = OperatorClaims::new(okp.public_key());
        for _ in 0..signing_keys {
            claims = claims.with_signing_key(KeyPair::generate(KeyRole::Operator).public_key());
        }
        (okp, claims)
    }

    #[test]
    fn test_load_includes_signing_keys() {
        let (okp, claims) = operator(2);
        let set = TrustedKeySet::load(&[claims.clone()]).unwrap();

        assert_eq!(set.len(), 3);
        assert!(set.contains(okp.public_key()));
        for key in &claims.nats.signing_keys {
            assert!(set.contains(key));
            assert_eq!(set.operator_for(key).unwrap().public_key, okp.public_key());
        }
    }

    #[test]
    fn test_expired_operator_keys_not_trusted() {
        let (okp, claims) = operator(1);
        let signing_key = claims.nats.signing_keys[0].clone();
        let set = TrustedKeySet::load(&[claims.with_expiry(1_000)]).unwrap();

        assert!(set.contains_at(okp.public_key(), 999));
        assert!(set.contains_at(&signing_key, 999));
        assert!(!set.contains_at(okp.public_key(), 1_000));
        assert!(!set.contains_at(&signing_key, 1_000));
        assert_eq!(set.expired_operator(&signing_key, 1_000), Some(1_000));
        assert!(set.contains(&signing_key));
    }

    #[test]
    fn test_load_requires_operators() {
        assert_eq!(TrustedKeySet::load(&[]), Err(ConfigError::NoTrustedOperators));
    }

    #[test]
    fn test_load_rejects_non_operator_signing_key() {
        let okp = KeyPair::generate(KeyRole::Operator);
        let claims = OperatorClaims::new(okp.public_key())
            .with_signing_key(KeyPair::generate(KeyRole::Account).public_key());
        assert!(matches!(
            TrustedKeySet::load(&[claims]),
            Err(ConfigError::InvalidOperator(_))
        ));
    }

    #[test]
    fn test_duplicate_keys_collapse() {
        let (_, claims) = operator(1);
        let set = TrustedKeySet::load(&[claims.clone(), claims]).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_declared_system_account() {
        let (_, mut claims) = operator(0);
        claims.nats.system_account = Some("Asys".into());
        let set = TrustedKeySet::load(&[claims]).unwrap();
        assert_eq!(set.declared_system_account(), Some("Asys"));
    }

    #[test]
    fn test_swap_bumps_generation() {
        let state = TrustState::new(TrustedKeySet::empty(), None);
        assert_eq!(state.generation(), 0);

        let (_, claims) = operator(0);
        let next = state.swap(TrustedKeySet::load(&[claims]).unwrap(), None);
        assert_eq!(next.generation, 1);
        assert_eq!(state.current().keys.len(), 1);
    }
}
