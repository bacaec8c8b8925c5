use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AlertSeverity, AlertSourceKind};
use super::scope::SubjectId;

/// What an alert was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// "dose_event", "sensor_reading", "alert", or "device".
    pub kind: String,
    pub id: String,
}

/// One entry of the ranked alert feed.
///
/// Derived alerts are regenerated on every read; `id` is stable across
/// regenerations so acknowledgements keep matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub source_kind: AlertSourceKind,
    pub severity: AlertSeverity,
    pub subject_user_id: SubjectId,
    pub subject_name: Option<String>,
    pub title: String,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub originating_entity_ref: EntityRef,
    pub acknowledged: bool,
}
