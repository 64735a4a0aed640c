//! Tenantry Server
//!
//! Operator-delegated authentication for a multi-tenant broker:
//! - Trusted operators sign accounts; accounts sign users
//! - Accounts are resolved on demand through a pluggable resolver and cached
//! - Clients prove possession of their user key by signing a server nonce
//! - Reloads swap the trusted keys atomically and evict accounts that no
//!   longer validate, disconnecting their clients
//!
//! ## Admin API Endpoints
//!
//! - `GET /healthz` - Liveness and trust summary
//! - `GET /v1/accounts` - Cached accounts
//! - `GET /v1/accounts/{key}` - Resolve an account
//! - `POST /v1/accounts/{key}` - Validate and publish an account token
//! - `GET /v1/system-account` - Current system account
//! - `PUT /v1/system-account` - Designate the system account
//! - `POST /v1/reload` - Reload configuration
//! - `GET /jwt/v1/accounts/{key}` - Raw account token (URL resolver format)

pub mod accounts;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod reload;
pub mod server;
pub mod trust;

pub use accounts::{Account, AccountInfo, AccountRegistry};
pub use api::create_router;
pub use auth::{
    AuthOutcome, ChallengeState, ClientSession, ConnectRequest, DisconnectReason,
    NonceChallenge, RejectReason, ServerChallenge,
};
pub use config::{
    ClusterOptions, FileOptionsSource, OptionsSource, ServerOptions, StaticAccount,
    StaticNkeyUser, StaticOptionsSource, StaticUser,
};
pub use error::{ConfigError, Result, ServerError, TrustChainError};
pub use reload::ReloadReport;
pub use server::{Server, ServerBuilder, ServerInfo};
pub use trust::{TrustedKeySet, TrustedOperator};
