use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::enums::{
    DeviceSeverity, EnvironmentAlertKind, EnvironmentAlertLevel, RecordKind, TrendMetric,
};
use crate::models::{Alert, DoseEvent, Scope, SensorReading, SubjectId};

use super::status::StatusPolicy;

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Why a raw record could not be normalized. The record is dropped; the
/// batch carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationFailure {
    #[error("{kind} record is not a JSON object")]
    NotAnObject { kind: RecordKind },

    #[error("{kind} record has neither an id nor any distinguishing content")]
    Unidentifiable { kind: RecordKind },

    #[error("{kind} record {id} has no subject and the scope has no default subject")]
    MissingSubject { kind: RecordKind, id: String },
}

/// A successfully normalized record.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Dose(DoseEvent),
    Sensor(SensorReading),
    Alert(Alert),
}

/// Per-batch inputs the normalizer needs beyond the record itself.
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub now: DateTime<Utc>,
    /// Owner for records that carry none (self scope only).
    pub default_subject: Option<SubjectId>,
    /// Last-resort owner for feed alerts addressed to the whole scope.
    pub viewer: Option<SubjectId>,
    pub subject_names: HashMap<SubjectId, String>,
    pub status_policy: StatusPolicy,
}

impl NormalizeContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            default_subject: None,
            viewer: None,
            subject_names: HashMap::new(),
            status_policy: StatusPolicy::default(),
        }
    }

    /// Context for records fetched on behalf of `scope`.
    pub fn for_scope(scope: &Scope, now: DateTime<Utc>, status_policy: StatusPolicy) -> Self {
        let subject_names = scope
            .subjects
            .iter()
            .filter_map(|s| s.name.clone().map(|name| (s.id.clone(), name)))
            .collect();
        Self {
            now,
            default_subject: scope.default_subject(),
            viewer: Some(scope.viewer.clone()),
            subject_names,
            status_policy,
        }
    }

    pub fn with_default_subject(mut self, subject: SubjectId) -> Self {
        self.default_subject = Some(subject);
        self
    }
}

/// Output of a batch normalization: kept records plus what was dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch<T> {
    pub records: Vec<T>,
    pub failures: Vec<NormalizationFailure>,
}

impl<T> Default for NormalizedBatch<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            failures: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Adherence
// ---------------------------------------------------------------------------

/// Completion statistics for a set of dose events.
///
/// `completed + missed + pending == total` always holds; `delayed` is the
/// raw count of delayed events, whichever bucket they were counted in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AdherenceSummary {
    pub total: u32,
    pub completed: u32,
    pub missed: u32,
    pub delayed: u32,
    pub pending: u32,
    /// Whole percent, 0..=100. Zero when there are no events.
    pub completion_rate: u32,
    pub last_dose: Option<DoseEvent>,
    /// The events counted in `missed`, in input order.
    pub missed_events: Vec<DoseEvent>,
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// A single threshold crossing on one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentAlert {
    pub kind: EnvironmentAlertKind,
    pub level: EnvironmentAlertLevel,
    pub message: String,
}

/// Current environment state of one subject's medicine box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub subject_id: SubjectId,
    pub subject_name: Option<String>,
    pub latest: Option<SensorReading>,
    pub alerts: Vec<EnvironmentAlert>,
    pub severity: DeviceSeverity,
    /// False when no reading exists; separates "no data" from "healthy".
    pub has_data: bool,
}

// ---------------------------------------------------------------------------
// Trend
// ---------------------------------------------------------------------------

/// A chart coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Parameters for projecting one metric onto a canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendRequest {
    pub metric: TrendMetric,
    pub window: Duration,
    pub canvas_width: f64,
    pub canvas_height: f64,
    /// Nominal scale ceiling; the y-range never shrinks below it.
    pub ceiling_hint: f64,
}

/// One raw trend sample, as served in the `box-status` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendEntry {
    pub user_id: SubjectId,
    pub recorded_at: DateTime<Utc>,
    pub value: Option<f64>,
}

// ---------------------------------------------------------------------------
// Alert feed
// ---------------------------------------------------------------------------

/// Options for merging derived and manual alerts into one feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeOptions {
    pub now: DateTime<Utc>,
    /// Missed doses older than this produce no feed alert.
    pub missed_window: Duration,
    /// `None` keeps every alert.
    pub limit: Option<usize>,
}

impl MergeOptions {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            missed_window: Duration::hours(24),
            limit: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Acknowledgements
// ---------------------------------------------------------------------------

/// A persisted acknowledgement of a derived alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub alert_id: Uuid,
    pub acknowledged_by: SubjectId,
    pub acknowledged_at: DateTime<Utc>,
    pub note: Option<String>,
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Internal lock failed")]
    LockFailed,
}
