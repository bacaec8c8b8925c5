//! Environment evaluation: latest reading per box, threshold crossings,
//! device severity.

use std::collections::HashMap;

use crate::config::Thresholds;
use crate::models::enums::{DeviceSeverity, EnvironmentAlertKind, EnvironmentAlertLevel};
use crate::models::{Scope, SensorReading, SubjectId};

use super::messages::MessageTemplates;
use super::types::{DeviceStatus, EnvironmentAlert};

/// Latest reading per subject, in order of first appearance.
///
/// Single pass: ordering key is `(recorded_at, ingest_seq)`, so a reading
/// with no timestamp loses to any timestamped one and equal timestamps go
/// to the later-ingested reading.
pub fn latest_per_subject(readings: &[SensorReading]) -> Vec<&SensorReading> {
    let mut slots: HashMap<&SubjectId, usize> = HashMap::new();
    let mut latest: Vec<&SensorReading> = Vec::new();

    for reading in readings {
        match slots.get(&reading.device_user_id) {
            Some(&slot) => {
                let current = latest[slot];
                if (reading.recorded_at, reading.ingest_seq)
                    >= (current.recorded_at, current.ingest_seq)
                {
                    latest[slot] = reading;
                }
            }
            None => {
                slots.insert(&reading.device_user_id, latest.len());
                latest.push(reading);
            }
        }
    }
    latest
}

/// Independent threshold predicates over one reading. Missing or
/// non-finite values simply produce nothing.
pub fn evaluate_reading(reading: &SensorReading, thresholds: &Thresholds) -> Vec<EnvironmentAlert> {
    let mut alerts = Vec::new();

    if let Some(humidity) = reading.humidity.filter(|v| v.is_finite()) {
        if humidity > thresholds.humidity_max {
            alerts.push(EnvironmentAlert {
                kind: EnvironmentAlertKind::HighHumidity,
                level: EnvironmentAlertLevel::Warning,
                message: MessageTemplates::high_humidity(humidity, thresholds.humidity_max),
            });
        }
    }

    if let Some(temperature) = reading.temperature.filter(|v| v.is_finite()) {
        if temperature > thresholds.temperature_max {
            alerts.push(EnvironmentAlert {
                kind: EnvironmentAlertKind::HighTemperature,
                level: EnvironmentAlertLevel::Warning,
                message: MessageTemplates::high_temperature(temperature, thresholds.temperature_max),
            });
        }
    }

    if reading.motion {
        alerts.push(EnvironmentAlert {
            kind: EnvironmentAlertKind::Motion,
            level: EnvironmentAlertLevel::Info,
            message: MessageTemplates::motion(),
        });
    }

    alerts
}

/// Fixed count rule: none is ok, one is a warning, more is critical.
pub fn classify(alert_count: usize) -> DeviceSeverity {
    match alert_count {
        0 => DeviceSeverity::Ok,
        1 => DeviceSeverity::Warning,
        _ => DeviceSeverity::Critical,
    }
}

fn status_for(reading: &SensorReading, thresholds: &Thresholds) -> DeviceStatus {
    let alerts = evaluate_reading(reading, thresholds);
    DeviceStatus {
        subject_id: reading.device_user_id.clone(),
        subject_name: reading.subject_name.clone(),
        latest: Some(reading.clone()),
        severity: classify(alerts.len()),
        alerts,
        has_data: true,
    }
}

fn no_data(subject_id: SubjectId, subject_name: Option<String>) -> DeviceStatus {
    DeviceStatus {
        subject_id,
        subject_name,
        latest: None,
        alerts: Vec::new(),
        severity: DeviceSeverity::Ok,
        has_data: false,
    }
}

/// One status per subject that has readings.
pub fn evaluate(readings: &[SensorReading], thresholds: &Thresholds) -> Vec<DeviceStatus> {
    latest_per_subject(readings)
        .into_iter()
        .map(|reading| status_for(reading, thresholds))
        .collect()
}

/// One status per scope subject (in roster order), including subjects
/// with no readings. Readings from subjects outside the roster follow.
pub fn evaluate_scope(
    readings: &[SensorReading],
    scope: &Scope,
    thresholds: &Thresholds,
) -> Vec<DeviceStatus> {
    let mut by_subject: HashMap<SubjectId, DeviceStatus> = evaluate(readings, thresholds)
        .into_iter()
        .map(|status| (status.subject_id.clone(), status))
        .collect();

    let mut statuses: Vec<DeviceStatus> = scope
        .subjects
        .iter()
        .map(|subject| match by_subject.remove(&subject.id) {
            Some(mut status) => {
                if status.subject_name.is_none() {
                    status.subject_name = subject.name.clone();
                }
                status
            }
            None => no_data(subject.id.clone(), subject.name.clone()),
        })
        .collect();

    if !by_subject.is_empty() {
        tracing::debug!(
            extra = by_subject.len(),
            "Readings present for subjects outside the scope roster"
        );
        let mut extras: Vec<DeviceStatus> = by_subject.into_values().collect();
        extras.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
        statuses.extend(extras);
    }
    statuses
}
