//! `GET /api/adherence`: completion statistics for a scope.

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ScopeQuery};
use crate::dashboard::ResourceErrorView;
use crate::models::SubjectId;
use crate::monitoring::AdherenceSummary;

use super::load_analysis;

#[derive(Serialize)]
pub struct SubjectAdherence {
    pub subject_id: SubjectId,
    pub subject_name: Option<String>,
    pub summary: AdherenceSummary,
}

#[derive(Serialize)]
pub struct AdherenceResponse {
    pub summary: AdherenceSummary,
    pub subjects: Vec<SubjectAdherence>,
    pub errors: Vec<ResourceErrorView>,
}

pub async fn get(
    State(ctx): State<ApiContext>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<AdherenceResponse>, ApiError> {
    let (data, analysis) = load_analysis(&ctx, &query, Utc::now(), None).await?;

    let subjects = ctx
        .engine
        .per_subject(&analysis.doses)
        .into_iter()
        .map(|(subject_id, summary)| SubjectAdherence {
            subject_name: data.scope.name_of(&subject_id).map(str::to_string),
            subject_id,
            summary,
        })
        .collect();

    Ok(Json(AdherenceResponse {
        summary: analysis.summary,
        subjects,
        errors: data.errors.iter().map(ResourceErrorView::from).collect(),
    }))
}
