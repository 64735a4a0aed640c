//! Claims carried by operator, account and user tokens
//!
//! All three token kinds share one envelope ([`Claims`]) and differ in the
//! role-specific body stored under `nats`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::error::{Result, TokenError};
use crate::keys::{KeyPair, KeyRole, PublicKey};

/// Kind of claims carried by a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Operator,
    Account,
    User,
}

impl std::fmt::Display for ClaimType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimType::Operator => write!(f, "operator"),
            ClaimType::Account => write!(f, "account"),
            ClaimType::User => write!(f, "user"),
        }
    }
}

/// Role-specific claim body
pub trait ClaimBody: Serialize + DeserializeOwned + Clone + Debug + Default {
    /// Claim type written into the envelope
    const CLAIM_TYPE: ClaimType;
    /// Role the subject key must hold
    const SUBJECT_ROLE: KeyRole;
    /// Role the signing key must hold
    const ISSUER_ROLE: KeyRole;
}

/// Common claims envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims<T> {
    /// Unique token id
    #[serde(default)]
    pub jti: String,

    /// Issued-at, unix seconds
    #[serde(default)]
    pub iat: i64,

    /// Encoded public key of the signer
    pub iss: String,

    /// Encoded public key of the subject
    pub sub: String,

    /// Human-readable name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Expiry, unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Not-before, unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Claim type tag
    #[serde(rename = "type")]
    pub claim_type: ClaimType,

    /// Role-specific body
    pub nats: T,
}

impl<T: ClaimBody> Claims<T> {
    /// Create unsigned claims for `subject`
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            jti: String::new(),
            iat: 0,
            iss: String::new(),
            sub: subject.into(),
            name: String::new(),
            exp: None,
            nbf: None,
            claim_type: T::CLAIM_TYPE,
            nats: T::default(),
        }
    }

    /// Set the human-readable name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the expiry (unix seconds)
    pub fn with_expiry(mut self, exp: i64) -> Self {
        self.exp = Some(exp);
        self
    }

    /// Sign the claims with `signer` and return the compact token
    ///
    /// Fills in `iss`, `iat` and `jti`. The signer must hold the role
    /// required for this claim type and the subject must be a valid key of
    /// the subject role.
    pub fn encode(&self, signer: &KeyPair) -> Result<String> {
        if signer.role() != T::ISSUER_ROLE {
            return Err(TokenError::RoleMismatch {
                expected: T::ISSUER_ROLE,
                actual: signer.role(),
            });
        }
        PublicKey::parse_with_role(&self.sub, T::SUBJECT_ROLE)?;

        let mut claims = self.clone();
        claims.iss = signer.public_key().to_string();
        claims.iat = crate::unix_now();
        claims.jti = uuid::Uuid::new_v4().to_string();
        claims.claim_type = T::CLAIM_TYPE;
        crate::jwt::encode(&claims, signer)
    }

    /// Check `exp` and `nbf` against `now` (unix seconds)
    pub fn validate_temporal(&self, now: i64) -> Result<()> {
        if let Some(exp) = self.exp {
            if exp <= now {
                return Err(TokenError::Expired(exp));
            }
        }
        if let Some(nbf) = self.nbf {
            if nbf > now {
                return Err(TokenError::NotYetValid(nbf));
            }
        }
        Ok(())
    }

    /// Whether the claims are expired at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.exp, Some(exp) if exp <= now)
    }
}

// =============================================================================
// Operator
// =============================================================================

/// Body of an operator token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorBody {
    /// Delegated keys whose signatures count as the operator's own
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signing_keys: Vec<String>,

    /// Account server the operator publishes account tokens to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_server_url: Option<String>,

    /// Account the operator designates as system account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_account: Option<String>,
}

impl ClaimBody for OperatorBody {
    const CLAIM_TYPE: ClaimType = ClaimType::Operator;
    const SUBJECT_ROLE: KeyRole = KeyRole::Operator;
    const ISSUER_ROLE: KeyRole = KeyRole::Operator;
}

pub type OperatorClaims = Claims<OperatorBody>;

impl OperatorClaims {
    /// Add a delegated signing key
    pub fn with_signing_key(mut self, key: impl Into<String>) -> Self {
        self.nats.signing_keys.push(key.into());
        self
    }
}

// =============================================================================
// Account
// =============================================================================

/// Body of an account token
///
/// Limits, exports and imports are carried opaquely; only signing keys and
/// revocations take part in trust decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountBody {
    /// Account signing keys allowed to mint users
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signing_keys: Vec<String>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub limits: serde_json::Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<serde_json::Value>,

    /// User public key -> unix time; users issued at or before it are revoked
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub revocations: BTreeMap<String, i64>,
}

impl ClaimBody for AccountBody {
    const CLAIM_TYPE: ClaimType = ClaimType::Account;
    const SUBJECT_ROLE: KeyRole = KeyRole::Account;
    const ISSUER_ROLE: KeyRole = KeyRole::Operator;
}

impl AccountBody {
    /// Whether a user token issued at `issued_at` has been revoked
    pub fn is_revoked(&self, user_key: &str, issued_at: i64) -> bool {
        matches!(self.revocations.get(user_key), Some(&at) if issued_at <= at)
    }
}

pub type AccountClaims = Claims<AccountBody>;

impl AccountClaims {
    /// Add an account signing key
    pub fn with_signing_key(mut self, key: impl Into<String>) -> Self {
        self.nats.signing_keys.push(key.into());
        self
    }

    /// Revoke every token of `user_key` issued at or before `at`
    pub fn revoke_user(mut self, user_key: impl Into<String>, at: i64) -> Self {
        self.nats.revocations.insert(user_key.into(), at);
        self
    }
}

// =============================================================================
// User
// =============================================================================

/// Body of a user token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserBody {
    /// Account identity when the token was signed by an account signing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_account: Option<String>,
}

impl ClaimBody for UserBody {
    const CLAIM_TYPE: ClaimType = ClaimType::User;
    const SUBJECT_ROLE: KeyRole = KeyRole::User;
    const ISSUER_ROLE: KeyRole = KeyRole::Account;
}

pub type UserClaims = Claims<UserBody>;

impl UserClaims {
    /// Mark the token as minted on behalf of `account` by a signing key
    pub fn with_issuer_account(mut self, account: impl Into<String>) -> Self {
        self.nats.issuer_account = Some(account.into());
        self
    }

    /// Account this user belongs to
    pub fn account(&self) -> &str {
        self.nats.issuer_account.as_deref().unwrap_or(&self.iss)
    }
}
