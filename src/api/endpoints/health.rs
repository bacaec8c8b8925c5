//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::monitoring::normalizer::ALIAS_TABLE_VERSION;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub alias_table_version: u32,
    pub watched_scopes: usize,
    pub polling: bool,
}

/// `GET /api/health`: liveness plus poller state.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        alias_table_version: ALIAS_TABLE_VERSION,
        watched_scopes: ctx.poller.watched_count()?,
        polling: ctx.poller.is_polling(),
    }))
}
