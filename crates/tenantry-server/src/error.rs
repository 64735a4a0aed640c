//! Error taxonomy for the trust subsystem
//!
//! - `ConfigError` is fatal at startup and aborts a reload before any state
//!   changes.
//! - Everything else is scoped to one lookup, one connection attempt or one
//!   administrative call.

use tenantry_core::TokenError;
use tenantry_resolver::ResolverError;
use thiserror::Error;

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Operator-mode configuration violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Operator mode requires at least one trusted operator")]
    NoTrustedOperators,

    #[error("Invalid trusted operator: {0}")]
    InvalidOperator(String),

    #[error("Options are already bound to a server (trusted keys populated)")]
    AlreadyBound,

    #[error("Operator mode does not allow statically configured accounts")]
    StaticAccounts,

    #[error("Operator mode does not allow statically configured users")]
    StaticUsers,

    #[error("Operator mode does not allow statically configured nkey users")]
    StaticNkeyUsers,

    #[error("Operator mode does not allow automatic account creation")]
    AllowNewAccounts,

    #[error("Operator mode requires an account resolver")]
    MissingResolver,

    #[error("Operator mode cannot be enabled or disabled by a reload")]
    OperatorModeChange,

    #[error("Resolver configuration error: {0}")]
    Resolver(String),

    #[error("System account could not be configured: {0}")]
    SystemAccount(String),

    #[error("Could not load options: {0}")]
    Source(String),
}

/// Why a token failed the operator → account → user chain
///
/// Callers report all kinds to peers as a generic authorization failure and
/// keep the kind for server-side logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustChainError {
    #[error("issuer {0} is not trusted")]
    UnknownIssuer(String),

    #[error("signature verification failed")]
    BadSignature,

    #[error("token expired at {0}")]
    Expired(i64),

    #[error("token not valid until {0}")]
    NotYetValid(i64),

    #[error("user {0} has been revoked")]
    Revoked(String),

    #[error("malformed token: {0}")]
    Malformed(String),
}

impl TrustChainError {
    /// Short stable name for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            TrustChainError::UnknownIssuer(_) => "unknown_issuer",
            TrustChainError::BadSignature => "bad_signature",
            TrustChainError::Expired(_) => "expired",
            TrustChainError::NotYetValid(_) => "not_yet_valid",
            TrustChainError::Revoked(_) => "revoked",
            TrustChainError::Malformed(_) => "malformed",
        }
    }
}

impl From<TokenError> for TrustChainError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::BadSignature => TrustChainError::BadSignature,
            TokenError::Expired(exp) => TrustChainError::Expired(exp),
            TokenError::NotYetValid(nbf) => TrustChainError::NotYetValid(nbf),
            TokenError::RoleMismatch { expected, actual } => TrustChainError::UnknownIssuer(
                format!("{} key used where {} key required", actual, expected),
            ),
            other => TrustChainError::Malformed(other.to_string()),
        }
    }
}

/// Errors surfaced by the server facade
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Trust chain rejected: {0}")]
    TrustChain(#[from] TrustChainError),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Resolver write rejected: {0}")]
    ResolverWrite(String),

    #[error("Resolver unavailable: {0}")]
    ResolverUnavailable(String),

    #[error("Invalid system account: {0}")]
    InvalidSystemAccount(String),

    #[error("Operator mode is not enabled")]
    OperatorModeDisabled,
}

impl From<ResolverError> for ServerError {
    fn from(err: ResolverError) -> Self {
        match err {
            ResolverError::NotFound(key) => ServerError::AccountNotFound(key),
            ResolverError::Write(msg) => ServerError::ResolverWrite(msg),
            ResolverError::Fetch(msg) => ServerError::ResolverUnavailable(msg),
            ResolverError::InvalidConfig(msg) => ServerError::Config(ConfigError::Resolver(msg)),
        }
    }
}
