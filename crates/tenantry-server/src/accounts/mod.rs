//! Resolved accounts and the account registry

pub mod account;
pub mod registry;

pub use account::{Account, AccountInfo, ClientHandle};
pub use registry::AccountRegistry;
