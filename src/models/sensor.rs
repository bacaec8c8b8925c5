use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::TrendMetric;
use super::scope::SubjectId;

/// A normalized environment reading from a medicine box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: String,
    pub device_user_id: SubjectId,
    pub subject_name: Option<String>,
    /// Relative humidity, percent.
    pub humidity: Option<f64>,
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    pub light_duration_minutes: Option<f64>,
    pub motion: bool,
    pub recorded_at: Option<DateTime<Utc>>,
    pub ingest_seq: u64,
}

impl SensorReading {
    /// Finite value of the requested metric, if present.
    pub fn metric(&self, metric: TrendMetric) -> Option<f64> {
        let value = match metric {
            TrendMetric::Temperature => self.temperature,
            TrendMetric::Humidity => self.humidity,
        };
        value.filter(|v| v.is_finite())
    }
}
