//! API request handlers

pub mod accounts;
pub mod admin;

pub use accounts::{get_account, get_account_jwt, list_accounts, store_account};
pub use admin::{get_system_account, health, reload, set_system_account};
