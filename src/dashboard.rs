//! Scope views assembled from committed resources.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::fetch::{PartialFetchFailure, ScopeData};
use crate::models::enums::{ResourceKind, ScopeKind, TrendMetric};
use crate::models::{Alert, Subject, SubjectId};
use crate::monitoring::{
    AdherenceSummary, DeviceStatus, MonitorError, MonitoringEngine, Point, RawInputs,
    ScopeAnalysis, TrendEntry, TrendRequest,
};

// ═══════════════════════════════════════════════════════════
// box-status document
// ═══════════════════════════════════════════════════════════

/// One device row. Field names match what box-status consumers read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxDevice {
    pub user_id: SubjectId,
    pub user_name: Option<String>,
    pub humidity: Option<f64>,
    pub temperature: Option<f64>,
    pub light_duration: Option<f64>,
    /// 1 when motion was sensed, else 0.
    pub motion: u8,
    pub recorded_at: Option<DateTime<Utc>>,
    pub alerts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxTrend {
    pub temperature: Vec<TrendEntry>,
    pub humidity: Vec<TrendEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxStatusDocument {
    pub devices: Vec<BoxDevice>,
    pub trend: BoxTrend,
    pub generated_at: DateTime<Utc>,
}

impl BoxStatusDocument {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            devices: Vec::new(),
            trend: BoxTrend {
                temperature: Vec::new(),
                humidity: Vec::new(),
            },
            generated_at: now,
        }
    }
}

/// Devices with at least one reading, plus both raw trend series.
pub fn box_status(
    engine: &MonitoringEngine,
    analysis: &ScopeAnalysis,
    now: DateTime<Utc>,
) -> BoxStatusDocument {
    let devices = analysis
        .devices
        .iter()
        .filter_map(|device| {
            let reading = device.latest.as_ref()?;
            Some(BoxDevice {
                user_id: device.subject_id.clone(),
                user_name: device.subject_name.clone(),
                humidity: reading.humidity,
                temperature: reading.temperature,
                light_duration: reading.light_duration_minutes,
                motion: u8::from(reading.motion),
                recorded_at: reading.recorded_at,
                alerts: device.alerts.iter().map(|a| a.message.clone()).collect(),
            })
        })
        .collect();

    BoxStatusDocument {
        devices,
        trend: BoxTrend {
            temperature: engine.trend_entries(&analysis.readings, TrendMetric::Temperature, now),
            humidity: engine.trend_entries(&analysis.readings, TrendMetric::Humidity, now),
        },
        generated_at: now,
    }
}

// ═══════════════════════════════════════════════════════════
// Dashboard
// ═══════════════════════════════════════════════════════════

/// A resource that could not be loaded; rendered as a non-blocking
/// indicator next to whatever did load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceErrorView {
    pub resource: ResourceKind,
    pub message: String,
}

impl From<&PartialFetchFailure> for ResourceErrorView {
    fn from(failure: &PartialFetchFailure) -> Self {
        Self {
            resource: failure.resource,
            message: failure.error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeSummaryView {
    pub kind: ScopeKind,
    pub viewer: SubjectId,
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub scope: ScopeSummaryView,
    pub adherence: AdherenceSummary,
    pub devices: Vec<DeviceStatus>,
    pub box_status: BoxStatusDocument,
    pub feed: Vec<Alert>,
    pub refills: Vec<Value>,
    pub errors: Vec<ResourceErrorView>,
    /// Records dropped by normalization.
    pub dropped_records: usize,
    pub generated_at: DateTime<Utc>,
}

/// Run the pipeline over whatever resources loaded.
pub fn analyze(
    engine: &MonitoringEngine,
    data: &ScopeData,
    now: DateTime<Utc>,
    feed_limit: Option<usize>,
) -> Result<ScopeAnalysis, MonitorError> {
    let inputs = RawInputs {
        history: data.records(ResourceKind::History),
        readings: data.records(ResourceKind::Readings),
        alerts: data.records(ResourceKind::Alerts),
    };
    engine.analyze(&data.scope, inputs, now, feed_limit)
}

pub fn compose(
    engine: &MonitoringEngine,
    data: &ScopeData,
    now: DateTime<Utc>,
    feed_limit: Option<usize>,
) -> Result<DashboardView, MonitorError> {
    let analysis = analyze(engine, data, now, feed_limit)?;
    let box_status = box_status(engine, &analysis, now);

    Ok(DashboardView {
        scope: ScopeSummaryView {
            kind: data.scope.kind,
            viewer: data.scope.viewer.clone(),
            subjects: data.scope.subjects.clone(),
        },
        dropped_records: analysis.failures.len(),
        adherence: analysis.summary,
        devices: analysis.devices,
        box_status,
        feed: analysis.feed,
        refills: data.records(ResourceKind::Refills).to_vec(),
        errors: data.errors.iter().map(ResourceErrorView::from).collect(),
        generated_at: now,
    })
}

// ═══════════════════════════════════════════════════════════
// Trend
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendView {
    pub metric: TrendMetric,
    pub window_hours: i64,
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub points: Vec<Point>,
}

pub fn trend_view(
    engine: &MonitoringEngine,
    analysis: &ScopeAnalysis,
    request: &TrendRequest,
    now: DateTime<Utc>,
) -> TrendView {
    TrendView {
        metric: request.metric,
        window_hours: request.window.num_hours(),
        canvas_width: request.canvas_width,
        canvas_height: request.canvas_height,
        points: engine.trend_points(&analysis.readings, request, now),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::config::MonitorConfig;
    use crate::fetch::ResourceError;
    use crate::models::Scope;

    fn now() -> DateTime<Utc> {
        "2026-03-10T12:00:00Z".parse().unwrap()
    }

    fn scope() -> Scope {
        Scope {
            kind: ScopeKind::Household,
            viewer: SubjectId::new("fam"),
            subjects: vec![
                Subject { id: SubjectId::new("u1"), name: Some("Ana".into()) },
                Subject { id: SubjectId::new("u2"), name: Some("Ben".into()) },
            ],
        }
    }

    fn data(resources: Vec<(ResourceKind, Vec<Value>)>, errors: Vec<PartialFetchFailure>) -> ScopeData {
        ScopeData {
            scope: scope(),
            resources: resources.into_iter().collect::<HashMap<_, _>>(),
            errors,
        }
    }

    fn readings() -> Vec<Value> {
        vec![
            json!({"_id": "r1", "user_id": "u1", "humidity": 70, "temperature": 31.5,
                   "lightDuration": 12, "motion": 1,
                   "recordedAt": (now() - Duration::hours(2)).to_rfc3339()}),
            json!({"_id": "r2", "user_id": "u1", "humidity": 60, "temperature": 22,
                   "motion": 0, "recordedAt": (now() - Duration::hours(30)).to_rfc3339()}),
        ]
    }

    #[test]
    fn box_status_keeps_the_document_shape() {
        let engine = MonitoringEngine::new(&MonitorConfig::default());
        let data = data(vec![(ResourceKind::Readings, readings())], vec![]);
        let analysis = analyze(&engine, &data, now(), None).unwrap();
        let doc = box_status(&engine, &analysis, now());

        let value = serde_json::to_value(&doc).unwrap();
        let device = &value["devices"][0];
        assert_eq!(device["user_id"], "u1");
        assert_eq!(device["user_name"], "Ana");
        assert_eq!(device["light_duration"], 12.0);
        assert_eq!(device["motion"], 1);
        assert_eq!(device["alerts"].as_array().unwrap().len(), 2);
        assert!(device["alerts"][0].as_str().unwrap().starts_with("High temperature"));

        // u2 has no readings and is left out; the 30h-old reading is outside the trend.
        assert_eq!(value["devices"].as_array().unwrap().len(), 1);
        assert_eq!(value["trend"]["temperature"].as_array().unwrap().len(), 1);
        assert_eq!(value["trend"]["humidity"][0]["value"], 70.0);
        assert!(value["generated_at"].is_string());
    }

    #[test]
    fn dashboard_renders_with_partial_failure() {
        let engine = MonitoringEngine::new(&MonitorConfig::default());
        let history = vec![json!({"_id": "d1", "user_id": "u2", "status": "missed",
                                  "scheduled_time": (now() - Duration::hours(1)).to_rfc3339()})];
        let failure = PartialFetchFailure {
            resource: ResourceKind::Readings,
            error: ResourceError::Transport("connection refused".into()),
        };
        let data = data(
            vec![
                (ResourceKind::History, history),
                (ResourceKind::Refills, vec![json!({"_id": "rf1"})]),
            ],
            vec![failure],
        );

        let view = compose(&engine, &data, now(), Some(10)).unwrap();
        assert_eq!(view.adherence.missed, 1);
        assert_eq!(view.feed.len(), 1);
        assert_eq!(view.refills.len(), 1);
        assert_eq!(view.errors.len(), 1);
        assert_eq!(view.errors[0].resource, ResourceKind::Readings);
        assert!(view.errors[0].message.contains("connection refused"));
        assert!(view.devices.iter().all(|d| !d.has_data));
        assert!(view.box_status.devices.is_empty());
    }

    #[test]
    fn empty_scope_data_is_an_empty_view() {
        let engine = MonitoringEngine::new(&MonitorConfig::default());
        let view = compose(&engine, &data(vec![], vec![]), now(), None).unwrap();
        assert_eq!(view.adherence.total, 0);
        assert_eq!(view.adherence.completion_rate, 0);
        assert!(view.feed.is_empty());
        assert_eq!(view.box_status, BoxStatusDocument::empty(now()));
    }

    #[test]
    fn trend_view_projects_points() {
        let engine = MonitoringEngine::new(&MonitorConfig::default());
        let data = data(vec![(ResourceKind::Readings, readings())], vec![]);
        let analysis = analyze(&engine, &data, now(), None).unwrap();
        let request = TrendRequest::for_metric(TrendMetric::Humidity, Duration::hours(48));

        let view = trend_view(&engine, &analysis, &request, now());
        assert_eq!(view.window_hours, 48);
        assert_eq!(view.points.len(), 2);
        assert_eq!(view.points[0].x, 0.0);
        assert_eq!(view.points[1].x, 300.0);
    }
}
