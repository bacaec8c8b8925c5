use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{MonitorConfig, Thresholds};
use crate::models::enums::TrendMetric;
use crate::models::{Alert, DoseEvent, Scope, SensorReading, SubjectId};

use super::adherence::{aggregate, aggregate_by_subject, AdherencePolicy};
use super::alerts::merge;
use super::environment::evaluate_scope;
use super::normalizer::{normalize_alert_batch, normalize_dose_batch, normalize_sensor_batch};
use super::status::StatusPolicy;
use super::store::AcknowledgementLedger;
use super::trend::{sample, trend_series};
use super::types::{
    AdherenceSummary, DeviceStatus, MergeOptions, MonitorError, NormalizationFailure,
    NormalizeContext, Point, TrendEntry, TrendRequest,
};

/// Raw upstream payloads for one scope. Resources that failed to load are
/// passed as empty slices.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawInputs<'a> {
    pub history: &'a [Value],
    pub readings: &'a [Value],
    pub alerts: &'a [Value],
}

/// Everything derived from one scope's inputs at one instant.
#[derive(Debug, Clone)]
pub struct ScopeAnalysis {
    pub doses: Vec<DoseEvent>,
    pub summary: AdherenceSummary,
    pub devices: Vec<DeviceStatus>,
    pub readings: Vec<SensorReading>,
    pub feed: Vec<Alert>,
    pub failures: Vec<NormalizationFailure>,
}

/// Orchestrates the pure pipeline: normalize, aggregate, evaluate, merge.
/// Holds no scope data; every call derives from the inputs it is given.
pub struct MonitoringEngine {
    thresholds: Thresholds,
    status_policy: StatusPolicy,
    adherence_policy: AdherencePolicy,
    trend_window: chrono::Duration,
    missed_alert_window: chrono::Duration,
    pub(crate) acknowledgements: AcknowledgementLedger,
}

impl MonitoringEngine {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            thresholds: config.thresholds,
            status_policy: StatusPolicy {
                missed_grace: config.missed_grace(),
            },
            adherence_policy: AdherencePolicy {
                delayed_bucket: config.delayed_bucket,
            },
            trend_window: config.trend_window(),
            missed_alert_window: config.missed_alert_window(),
            acknowledgements: AcknowledgementLedger::new(),
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn trend_window(&self) -> chrono::Duration {
        self.trend_window
    }

    /// Run the full pipeline for one scope.
    pub fn analyze(
        &self,
        scope: &Scope,
        inputs: RawInputs<'_>,
        now: DateTime<Utc>,
        feed_limit: Option<usize>,
    ) -> Result<ScopeAnalysis, MonitorError> {
        let ctx = NormalizeContext::for_scope(scope, now, self.status_policy);

        let doses = normalize_dose_batch(inputs.history, &ctx);
        let readings = normalize_sensor_batch(inputs.readings, &ctx);
        let manual = normalize_alert_batch(inputs.alerts, &ctx);

        let summary = aggregate(&doses.records, &self.adherence_policy);
        let devices = evaluate_scope(&readings.records, scope, &self.thresholds);

        let options = MergeOptions {
            now,
            missed_window: self.missed_alert_window,
            limit: feed_limit,
        };
        let mut feed = merge(&summary, &devices, &manual.records, &options);
        self.acknowledgements.apply(&mut feed)?;

        let failures: Vec<NormalizationFailure> = doses
            .failures
            .into_iter()
            .chain(readings.failures)
            .chain(manual.failures)
            .collect();

        tracing::debug!(
            scope = scope.kind.as_str(),
            doses = summary.total,
            devices = devices.len(),
            feed = feed.len(),
            dropped = failures.len(),
            "Scope analyzed"
        );

        Ok(ScopeAnalysis {
            doses: doses.records,
            summary,
            devices,
            readings: readings.records,
            feed,
            failures,
        })
    }

    /// Adherence broken down per subject, in order of first appearance.
    pub fn per_subject(&self, doses: &[DoseEvent]) -> Vec<(SubjectId, AdherenceSummary)> {
        aggregate_by_subject(doses, &self.adherence_policy)
    }

    /// Canvas points for one metric.
    pub fn trend_points(
        &self,
        readings: &[SensorReading],
        request: &TrendRequest,
        now: DateTime<Utc>,
    ) -> Vec<Point> {
        sample(readings, request, now)
    }

    /// Raw windowed series for one metric over the configured window.
    pub fn trend_entries(
        &self,
        readings: &[SensorReading],
        metric: TrendMetric,
        now: DateTime<Utc>,
    ) -> Vec<TrendEntry> {
        trend_series(readings, metric, self.trend_window, now)
    }

    pub fn acknowledge(
        &self,
        alert_id: Uuid,
        by: SubjectId,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<bool, MonitorError> {
        self.acknowledgements.acknowledge(alert_id, by, at, note)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::models::enums::{AlertSourceKind, DeviceSeverity, ScopeKind};
    use crate::models::Subject;

    fn now() -> DateTime<Utc> {
        "2026-03-10T12:00:00Z".parse().unwrap()
    }

    fn household() -> Scope {
        Scope {
            kind: ScopeKind::Household,
            viewer: SubjectId::new("fam"),
            subjects: vec![
                Subject { id: SubjectId::new("u1"), name: Some("Ana".into()) },
                Subject { id: SubjectId::new("u2"), name: Some("Ben".into()) },
            ],
        }
    }

    #[test]
    fn analyze_runs_the_whole_pipeline() {
        let engine = MonitoringEngine::new(&MonitorConfig::default());
        let missed_at = (now() - Duration::hours(2)).to_rfc3339();
        let history = vec![
            json!({"_id": "d1", "user_id": "u1", "status": "taken", "taken_at": missed_at}),
            json!({"_id": "d2", "user_id": "u1", "status": "missed", "scheduled_time": missed_at}),
            json!("garbage"),
        ];
        let readings = vec![json!({
            "_id": "r1", "user_id": "u2", "humidity": 85, "temperature": 22,
            "recorded_at": now().to_rfc3339()
        })];

        let analysis = engine
            .analyze(
                &household(),
                RawInputs { history: &history, readings: &readings, alerts: &[] },
                now(),
                None,
            )
            .unwrap();

        assert_eq!(analysis.summary.total, 2);
        assert_eq!(analysis.summary.completion_rate, 50);
        assert_eq!(analysis.failures.len(), 1);
        assert_eq!(analysis.devices.len(), 2);
        assert!(!analysis.devices[0].has_data);
        assert_eq!(analysis.devices[1].severity, DeviceSeverity::Warning);
        assert_eq!(analysis.feed.len(), 2);
        assert_eq!(analysis.feed[0].source_kind, AlertSourceKind::Adherence);
    }

    #[test]
    fn acknowledgement_survives_regeneration() {
        let engine = MonitoringEngine::new(&MonitorConfig::default());
        let readings = vec![json!({
            "_id": "r1", "user_id": "u1", "humidity": 95,
            "recorded_at": now().to_rfc3339()
        })];
        let inputs = RawInputs { readings: &readings, ..RawInputs::default() };

        let first = engine.analyze(&household(), inputs, now(), None).unwrap();
        assert!(!first.feed[0].acknowledged);
        engine
            .acknowledge(first.feed[0].id, SubjectId::new("fam"), now(), None)
            .unwrap();

        let second = engine.analyze(&household(), inputs, now(), None).unwrap();
        assert_eq!(second.feed[0].id, first.feed[0].id);
        assert!(second.feed[0].acknowledged);
    }
}
