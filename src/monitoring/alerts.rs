//! Alert aggregation: adherence- and environment-derived alerts plus the
//! upstream feed, ranked into one list per scope.
//!
//! No deduplication across source kinds: an adherence and an environment
//! alert for the same subject at the same moment both surface.

use std::cmp::Ordering;

use uuid::Uuid;

use crate::models::enums::{AlertSeverity, AlertSourceKind, DeviceSeverity};
use crate::models::{Alert, DoseEvent, EntityRef};

use super::messages::MessageTemplates;
use super::types::{AdherenceSummary, DeviceStatus, MergeOptions};

/// Namespace for derived alert ids.
const ALERT_NAMESPACE: Uuid = Uuid::from_u128(0x6d65_6469_626f_7861_6c65_7274_735f_6e73);

/// Stable id for a derived alert: same source facts, same id.
pub fn derived_alert_id(source: AlertSourceKind, entity: &EntityRef, discriminator: &str) -> Uuid {
    let name = format!("{}:{}:{}:{}", source.as_str(), entity.kind, entity.id, discriminator);
    Uuid::new_v5(&ALERT_NAMESPACE, name.as_bytes())
}

/// Feed severity for environment alerts, taken from the device as a whole.
pub fn device_alert_severity(severity: DeviceSeverity) -> AlertSeverity {
    match severity {
        DeviceSeverity::Ok => AlertSeverity::Info,
        DeviceSeverity::Warning => AlertSeverity::Medium,
        DeviceSeverity::Critical => AlertSeverity::Critical,
    }
}

/// One alert per missed dose inside the recent window. Same-day misses
/// are `high`, older ones `medium`. Misses with no time at all cannot be
/// placed in the window and are skipped.
pub fn adherence_alerts(summary: &AdherenceSummary, options: &MergeOptions) -> Vec<Alert> {
    let window_start = options.now.checked_sub_signed(options.missed_window);

    summary
        .missed_events
        .iter()
        .filter_map(|event| {
            let at = event.activity_time().or(event.recorded_at)?;
            if window_start.is_some_and(|start| at < start) {
                return None;
            }
            let severity = if at.date_naive() == options.now.date_naive() {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            };
            Some(missed_dose_alert(event, at, severity))
        })
        .collect()
}

fn missed_dose_alert(
    event: &DoseEvent,
    at: chrono::DateTime<chrono::Utc>,
    severity: AlertSeverity,
) -> Alert {
    let entity = EntityRef {
        kind: "dose_event".into(),
        id: event.id.clone(),
    };
    let who = event
        .subject_name
        .as_deref()
        .unwrap_or(event.subject_user_id.as_str());

    Alert {
        id: derived_alert_id(AlertSourceKind::Adherence, &entity, event.status.as_str()),
        source_kind: AlertSourceKind::Adherence,
        severity,
        subject_user_id: event.subject_user_id.clone(),
        subject_name: event.subject_name.clone(),
        title: MessageTemplates::missed_dose_title().to_string(),
        message: MessageTemplates::missed_dose(
            who,
            event.medicine_name.as_deref(),
            event.scheduled_at,
        ),
        timestamp: Some(at),
        originating_entity_ref: entity,
        acknowledged: false,
    }
}

/// One alert per threshold crossing on each device.
pub fn environment_alerts(devices: &[DeviceStatus]) -> Vec<Alert> {
    let mut alerts = Vec::new();
    for device in devices {
        let Some(reading) = &device.latest else {
            continue;
        };
        let severity = device_alert_severity(device.severity);
        let entity = EntityRef {
            kind: "sensor_reading".into(),
            id: reading.id.clone(),
        };
        for env in &device.alerts {
            alerts.push(Alert {
                id: derived_alert_id(AlertSourceKind::Environment, &entity, env.kind.as_str()),
                source_kind: AlertSourceKind::Environment,
                severity,
                subject_user_id: device.subject_id.clone(),
                subject_name: device.subject_name.clone(),
                title: MessageTemplates::environment_title(env.kind).to_string(),
                message: env.message.clone(),
                timestamp: reading.recorded_at,
                originating_entity_ref: entity.clone(),
                acknowledged: false,
            });
        }
    }
    alerts
}

/// Severity desc, then timestamp desc; undated alerts sink to the bottom
/// of their severity band. Stable, so ties keep input order.
pub fn rank(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| match (a.timestamp, b.timestamp) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    });
}

/// Merge everything into one ranked, optionally capped feed.
pub fn merge(
    summary: &AdherenceSummary,
    devices: &[DeviceStatus],
    manual: &[Alert],
    options: &MergeOptions,
) -> Vec<Alert> {
    let mut feed = adherence_alerts(summary, options);
    feed.extend(environment_alerts(devices));
    feed.extend(manual.iter().cloned());

    rank(&mut feed);
    if let Some(limit) = options.limit {
        feed.truncate(limit);
    }
    feed
}
