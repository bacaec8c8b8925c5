//! `GET /api/dashboard`: everything a scope view renders, in one call.

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ScopeQuery};
use crate::dashboard::{self, DashboardView};

use super::load_scope;

pub async fn get(
    State(ctx): State<ApiContext>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<DashboardView>, ApiError> {
    let now = Utc::now();
    let limit = query.limit_or(ctx.config.alerts_limit as usize);
    let data = load_scope(&ctx, &query, now).await?;

    Ok(Json(dashboard::compose(&ctx.engine, &data, now, Some(limit))?))
}
