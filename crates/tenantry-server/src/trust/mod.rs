//! Operator trust: the trusted key set and the chain validator

pub mod store;
pub mod validator;

pub use store::{TrustSnapshot, TrustState, TrustedKeySet, TrustedOperator};
pub use validator::ChainValidator;
