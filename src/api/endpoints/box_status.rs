//! `GET /api/box-status`: latest reading per box plus the raw 24h trend.

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ScopeQuery};
use crate::dashboard::{self, BoxStatusDocument};

use super::load_analysis;

pub async fn get(
    State(ctx): State<ApiContext>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<BoxStatusDocument>, ApiError> {
    let now = Utc::now();
    let (data, analysis) = load_analysis(&ctx, &query, now, None).await?;

    if data.scope.subjects.is_empty() {
        return Ok(Json(BoxStatusDocument::empty(now)));
    }
    Ok(Json(dashboard::box_status(&ctx.engine, &analysis, now)))
}
