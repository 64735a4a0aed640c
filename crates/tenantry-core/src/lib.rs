//! # Tenantry Core
//!
//! Key and token primitives for the operator-delegated trust model used by
//! multi-tenant brokers.
//!
//! ## Key Concepts
//!
//! - **Operator**: root of trust. Mints accounts and may delegate that
//!   authority to signing keys.
//! - **Account**: a tenant namespace. Mints users, optionally through its own
//!   signing keys.
//! - **User**: a client identity that proves possession of its key by signing
//!   a server-issued nonce.
//!
//! ## Encodings
//!
//! Public keys are a one-letter role prefix (`O`, `A`, `U`) followed by the
//! base64url encoding of the raw Ed25519 key. Claims travel as EdDSA-signed
//! compact JWTs whose `iss` is the encoded public key of the signer.

pub mod claims;
pub mod error;
pub mod jwt;
pub mod keys;

pub use claims::{
    AccountBody, AccountClaims, ClaimBody, ClaimType, Claims, OperatorBody, OperatorClaims,
    UserBody, UserClaims,
};
pub use error::{Result, TokenError};
pub use jwt::{ClaimsCodec, JwtCodec};
pub use keys::{Ed25519Verifier, KeyPair, KeyRole, NonceSigner, PublicKey, SignatureVerifier};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current unix time in seconds
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
