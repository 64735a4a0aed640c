//! Account Handlers
//!
//! Inspect cached accounts, publish account tokens, and serve raw tokens in
//! the format the URL resolver fetches.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::accounts::AccountInfo;
use crate::api::error::ApiError;
use crate::server::Server;

/// Request to publish an account token
#[derive(Debug, Deserialize)]
pub struct StoreAccountRequest {
    pub jwt: String,
}

/// Cached accounts
#[derive(Debug, Serialize)]
pub struct ListAccountsResponse {
    pub accounts: Vec<AccountInfo>,
    pub count: usize,
}

/// GET /v1/accounts
pub async fn list_accounts(State(server): State<Arc<Server>>) -> Json<ListAccountsResponse> {
    let accounts: Vec<AccountInfo> = server.accounts().iter().map(|a| a.info()).collect();
    Json(ListAccountsResponse {
        count: accounts.len(),
        accounts,
    })
}

/// Resolve an account
///
/// GET /v1/accounts/{key}
pub async fn get_account(
    State(server): State<Arc<Server>>,
    Path(key): Path<String>,
) -> Result<Json<AccountInfo>, ApiError> {
    let account = server.lookup_account(&key).await?;
    Ok(Json(account.info()))
}

/// Validate and publish an account token
///
/// POST /v1/accounts/{key}
pub async fn store_account(
    State(server): State<Arc<Server>>,
    Path(key): Path<String>,
    Json(request): Json<StoreAccountRequest>,
) -> Result<Json<AccountInfo>, ApiError> {
    if request.jwt.trim().is_empty() {
        return Err(ApiError::BadRequest("jwt cannot be empty".into()));
    }
    let account = server.store_account(&key, request.jwt.trim()).await?;
    info!(account = %key, "Account published through admin API");
    Ok(Json(account.info()))
}

/// Raw account token
///
/// GET /jwt/v1/accounts/{key}
pub async fn get_account_jwt(
    State(server): State<Arc<Server>>,
    Path(key): Path<String>,
) -> Result<String, ApiError> {
    let account = server.lookup_account(&key).await?;
    Ok(account.token())
}
