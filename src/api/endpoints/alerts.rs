//! `POST /api/alerts/:id/ack`: acknowledge a feed alert.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::SubjectId;

#[derive(Debug, Deserialize)]
pub struct AcknowledgeBody {
    pub viewer: Option<String>,
    pub note: Option<String>,
}

#[derive(Serialize)]
pub struct AcknowledgeResponse {
    pub alert_id: Uuid,
    /// False when the alert had already been acknowledged.
    pub acknowledged: bool,
}

pub async fn acknowledge(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Json(body): Json<AcknowledgeBody>,
) -> Result<Json<AcknowledgeResponse>, ApiError> {
    let alert_id = Uuid::parse_str(id.trim())
        .map_err(|_| ApiError::BadRequest(format!("invalid alert id: {id}")))?;
    let viewer = body
        .viewer
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(SubjectId::new)
        .ok_or_else(|| ApiError::BadRequest("viewer is required".into()))?;
    let note = body.note.filter(|n| !n.trim().is_empty());

    let acknowledged = ctx.engine.acknowledge(alert_id, viewer, Utc::now(), note)?;
    tracing::info!(%alert_id, acknowledged, "Alert acknowledgement");

    Ok(Json(AcknowledgeResponse {
        alert_id,
        acknowledged,
    }))
}
