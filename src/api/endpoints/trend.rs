//! `GET /api/trend/:metric`: one metric projected onto a chart canvas.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ScopeQuery};
use crate::config::MAX_WINDOW_HOURS;
use crate::dashboard::{self, TrendView};
use crate::models::enums::TrendMetric;
use crate::monitoring::TrendRequest;

use super::load_analysis;

/// Numeric fields stay strings so a malformed value is a JSON 400, not
/// the extractor's plain-text rejection.
#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    pub scope: Option<String>,
    pub viewer: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub window_hours: Option<String>,
}

impl TrendQuery {
    fn scope_query(&self) -> ScopeQuery {
        ScopeQuery {
            scope: self.scope.clone(),
            viewer: self.viewer.clone(),
            limit: None,
        }
    }

    fn request(&self, metric: TrendMetric, default_window: Duration) -> Result<TrendRequest, ApiError> {
        let mut request = TrendRequest::for_metric(metric, default_window);
        if let Some(width) = positive("width", self.width.as_deref())? {
            request.canvas_width = width;
        }
        if let Some(height) = positive("height", self.height.as_deref())? {
            request.canvas_height = height;
        }
        if let Some(hours) = positive("window_hours", self.window_hours.as_deref())? {
            if hours > MAX_WINDOW_HOURS as f64 {
                return Err(ApiError::BadRequest(format!(
                    "window_hours must not exceed {MAX_WINDOW_HOURS}"
                )));
            }
            request.window = Duration::try_minutes((hours * 60.0).round().max(1.0) as i64)
                .ok_or_else(|| ApiError::BadRequest("window_hours is out of range".into()))?;
        }
        Ok(request)
    }
}

fn positive(field: &str, raw: Option<&str>) -> Result<Option<f64>, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() && n > 0.0 => Ok(Some(n)),
        _ => Err(ApiError::BadRequest(format!("{field} must be a positive number"))),
    }
}

pub async fn get(
    State(ctx): State<ApiContext>,
    Path(metric): Path<String>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<TrendView>, ApiError> {
    let metric: TrendMetric = metric
        .parse()
        .map_err(|e: crate::models::enums::InvalidEnum| ApiError::BadRequest(e.to_string()))?;
    let request = query.request(metric, ctx.engine.trend_window())?;

    let now = Utc::now();
    let (_, analysis) = load_analysis(&ctx, &query.scope_query(), now, None).await?;
    Ok(Json(dashboard::trend_view(&ctx.engine, &analysis, &request, now)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(width: Option<&str>, window_hours: Option<&str>) -> TrendQuery {
        TrendQuery {
            scope: None,
            viewer: Some("u1".into()),
            width: width.map(str::to_string),
            height: None,
            window_hours: window_hours.map(str::to_string),
        }
    }

    #[test]
    fn request_defaults_to_configured_window() {
        let request = query(None, None)
            .request(TrendMetric::Humidity, Duration::hours(24))
            .unwrap();
        assert_eq!(request.window, Duration::hours(24));
        assert_eq!(request.canvas_width, 300.0);
    }

    #[test]
    fn request_applies_overrides() {
        let request = query(Some("640"), Some("1.5"))
            .request(TrendMetric::Temperature, Duration::hours(24))
            .unwrap();
        assert_eq!(request.canvas_width, 640.0);
        assert_eq!(request.window, Duration::minutes(90));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(query(Some("wide"), None)
            .request(TrendMetric::Humidity, Duration::hours(24))
            .is_err());
        assert!(query(None, Some("-2"))
            .request(TrendMetric::Humidity, Duration::hours(24))
            .is_err());
    }

    #[test]
    fn window_above_one_year_is_rejected() {
        for raw in ["8761", "1e13", "1e300"] {
            let err = query(None, Some(raw))
                .request(TrendMetric::Temperature, Duration::hours(24))
                .unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)), "{raw}");
        }
        let year = query(None, Some("8760"))
            .request(TrendMetric::Temperature, Duration::hours(24))
            .unwrap();
        assert_eq!(year.window, Duration::hours(8760));
    }
}
