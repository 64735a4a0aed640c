//! Health, system account and reload handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::accounts::AccountInfo;
use crate::api::error::ApiError;
use crate::reload::ReloadReport;
use crate::server::{Server, ServerInfo};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(flatten)]
    pub info: ServerInfo,
}

#[derive(Debug, Deserialize)]
pub struct SetSystemAccountRequest {
    pub account: String,
}

/// GET /healthz
pub async fn health(State(server): State<Arc<Server>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        info: server.info(),
    })
}

/// GET /v1/system-account
pub async fn get_system_account(
    State(server): State<Arc<Server>>,
) -> Result<Json<AccountInfo>, ApiError> {
    server
        .system_account()
        .map(|account| Json(account.info()))
        .ok_or_else(|| ApiError::NotFound("no system account configured".into()))
}

/// PUT /v1/system-account
pub async fn set_system_account(
    State(server): State<Arc<Server>>,
    Json(request): Json<SetSystemAccountRequest>,
) -> Result<Json<AccountInfo>, ApiError> {
    server.set_system_account(&request.account).await?;
    get_system_account(State(server)).await
}

/// Re-read configuration and re-validate cached accounts
///
/// POST /v1/reload
pub async fn reload(State(server): State<Arc<Server>>) -> Result<Json<ReloadReport>, ApiError> {
    Ok(Json(server.reload().await?))
}
