//! Account Resolvers
//!
//! A resolver maps an account public key to the account's signed claims
//! token. The trust logic only relies on two capabilities:
//!
//! - `fetch(key)` returns the stored token or `NotFound`
//! - `store(key, token)` persists a token or fails with a write error
//!
//! Two backends are provided:
//!
//! - **Memory**: in-process map, seeded from a preload table
//! - **URL**: fetches `GET {url}/{key}` from an account server, with a
//!   bounded TTL cache and optional background refresh. Read-only.
//!
//! ## Usage
//!
//! ```ignore
//! use tenantry_resolver::{build_resolver, ResolverConfig};
//!
//! let resolver = build_resolver(&ResolverConfig::Memory, &preload)?;
//! resolver.store(&account_key, &token).await?;
//! let token = resolver.fetch(&account_key).await?;
//! ```
//!
//! Resolvers never validate what they hold; validation happens in the
//! server against its trusted keys.

pub mod config;
pub mod error;
pub mod resolver;
pub mod resolvers;

pub use config::{build_resolver, ResolverConfig};
pub use error::{ResolverError, Result};
pub use resolver::{AccountResolver, ResolverEntry, ResolverKind};
pub use resolvers::{MemoryResolver, UrlResolver};
