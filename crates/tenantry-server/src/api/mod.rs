//! Admin HTTP API

pub mod error;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::server::Server;

/// Create the admin API router
pub fn create_router(server: Arc<Server>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        // Accounts
        .route("/v1/accounts", get(handlers::list_accounts))
        .route(
            "/v1/accounts/{key}",
            get(handlers::get_account).post(handlers::store_account),
        )
        .route(
            "/v1/system-account",
            get(handlers::get_system_account).put(handlers::set_system_account),
        )
        .route("/v1/reload", post(handlers::reload))
        // Raw tokens for URL resolvers on other nodes
        .route("/jwt/v1/accounts/{key}", get(handlers::get_account_jwt))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}
