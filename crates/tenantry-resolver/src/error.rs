//! Error types for account resolvers

use thiserror::Error;

/// Result type for resolver operations
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Errors that can occur while fetching or storing account tokens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// No token stored for the account
    #[error("Account not found: {0}")]
    NotFound(String),

    /// Backend refused to persist the token
    #[error("Resolver write rejected: {0}")]
    Write(String),

    /// Backend could not be reached or answered with an error
    #[error("Resolver fetch failed: {0}")]
    Fetch(String),

    /// Resolver configuration is unusable
    #[error("Invalid resolver configuration: {0}")]
    InvalidConfig(String),
}

impl ResolverError {
    /// Whether the error means the account is definitely absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolverError::NotFound(_))
    }
}

impl From<reqwest::Error> for ResolverError {
    fn from(err: reqwest::Error) -> Self {
        ResolverError::Fetch(err.to_string())
    }
}
