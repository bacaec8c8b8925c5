//! `GET /api/feed`: ranked alert feed for a scope.

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ScopeQuery};
use crate::dashboard::ResourceErrorView;
use crate::models::Alert;

use super::load_analysis;

#[derive(Serialize)]
pub struct FeedResponse {
    pub alerts: Vec<Alert>,
    pub errors: Vec<ResourceErrorView>,
}

pub async fn get(
    State(ctx): State<ApiContext>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<FeedResponse>, ApiError> {
    let limit = query.limit_or(ctx.config.alerts_limit as usize);
    let (data, analysis) = load_analysis(&ctx, &query, Utc::now(), Some(limit)).await?;

    Ok(Json(FeedResponse {
        alerts: analysis.feed,
        errors: data.errors.iter().map(ResourceErrorView::from).collect(),
    }))
}
