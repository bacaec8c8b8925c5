use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::DoseStatus;
use super::scope::SubjectId;

/// A normalized dose-intake record.
///
/// Immutable once recorded; only an explicit status correction upstream
/// changes it, and that shows up as a new fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseEvent {
    pub id: String,
    pub subject_user_id: SubjectId,
    pub subject_name: Option<String>,
    pub medicine_name: Option<String>,
    pub dose: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub taken_at: Option<DateTime<Utc>>,
    pub status: DoseStatus,
    pub recorded_at: Option<DateTime<Utc>>,
    /// Position in the normalization batch; later records win ties.
    pub ingest_seq: u64,
}

impl DoseEvent {
    /// Time used for "last dose" selection: intake time, else schedule time.
    pub fn activity_time(&self) -> Option<DateTime<Utc>> {
        self.taken_at.or(self.scheduled_at)
    }
}
