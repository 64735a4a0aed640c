//! Error types for keys, claims and tokens

use thiserror::Error;

use crate::keys::KeyRole;

/// Result type alias using TokenError
pub type Result<T> = std::result::Result<T, TokenError>;

/// Errors produced while handling keys and claim tokens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Public key string could not be parsed
    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    /// Seed string could not be parsed
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    /// A key was used in a role it does not hold
    #[error("Key role mismatch: expected {expected}, got {actual}")]
    RoleMismatch { expected: KeyRole, actual: KeyRole },

    /// Token structure or payload could not be decoded
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Token signature does not verify against its issuer
    #[error("Token signature verification failed")]
    BadSignature,

    /// Token carries a claim type other than the one requested
    #[error("Unexpected claim type: expected {expected}, got {actual}")]
    UnexpectedType { expected: String, actual: String },

    /// Token has expired
    #[error("Token expired at {0}")]
    Expired(i64),

    /// Token is not valid yet
    #[error("Token not valid until {0}")]
    NotYetValid(i64),

    /// Signing or key encoding failure
    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
                TokenError::Crypto(err.to_string())
            }
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}

impl From<ed25519_dalek::SignatureError> for TokenError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        TokenError::Crypto(err.to_string())
    }
}

impl From<serde_json::Error> for TokenError {
    fn from(err: serde_json::Error) -> Self {
        TokenError::Malformed(err.to_string())
    }
}
