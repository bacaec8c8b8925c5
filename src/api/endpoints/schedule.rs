//! `PUT /api/schedule/update`: forward a dose status correction.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::fetch::ScheduleUpdate;
use crate::models::enums::DoseStatus;
use crate::models::SubjectId;
use crate::monitoring::status::status_from_label;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleUpdateBody {
    pub schedule_id: Option<String>,
    pub status: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Serialize)]
pub struct ScheduleUpdateResponse {
    pub updated: bool,
    pub invalidated: usize,
}

impl ScheduleUpdateBody {
    fn validate(self) -> Result<ScheduleUpdate, ApiError> {
        let schedule_id = required(self.schedule_id, "scheduleId")?;
        let user_id = required(self.user_id, "userId")?;
        let label = required(self.status, "status")?;

        let status = match status_from_label(&label) {
            Some(status) if status != DoseStatus::Unknown => status,
            _ => return Err(ApiError::BadRequest(format!("unrecognized status: {label}"))),
        };

        Ok(ScheduleUpdate {
            schedule_id,
            status,
            user_id: SubjectId::new(user_id),
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{field} is required")))
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Json(body): Json<ScheduleUpdateBody>,
) -> Result<Json<ScheduleUpdateResponse>, ApiError> {
    let update = body.validate()?;
    let invalidated = ctx.monitor.apply_status_correction(&update).await?;

    Ok(Json(ScheduleUpdateResponse {
        updated: true,
        invalidated: invalidated.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(status: &str) -> ScheduleUpdateBody {
        ScheduleUpdateBody {
            schedule_id: Some("s1".into()),
            status: Some(status.into()),
            user_id: Some("u1".into()),
        }
    }

    #[test]
    fn status_labels_are_normalized() {
        assert_eq!(body("Taken").validate().unwrap().status, DoseStatus::Taken);
        assert_eq!(body("MISSED_DOSE").validate().unwrap().status, DoseStatus::Missed);
    }

    #[test]
    fn unknown_or_missing_fields_are_rejected() {
        assert!(body("eaten").validate().is_err());
        assert!(body("  ").validate().is_err());

        let mut missing_user = body("taken");
        missing_user.user_id = None;
        assert!(missing_user.validate().is_err());
    }
}
