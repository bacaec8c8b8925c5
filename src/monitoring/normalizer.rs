//! Event normalizer: raw upstream records to canonical entities.
//!
//! Producers disagree on field names (`medicine` vs `medicine_name`,
//! `taken_at` vs `taken_time`, `status` vs `confirmed`...). Every canonical
//! field has an ordered alias list in `ALIAS_TABLE`; the first alias holding
//! a non-null, non-blank value wins. Bump `ALIAS_TABLE_VERSION` whenever an
//! alias list changes.
//!
//! Normalization never fails a batch: a bad record becomes a
//! `NormalizationFailure`, is counted, and the rest go through.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::enums::{AlertSeverity, AlertSourceKind, RecordKind};
use crate::models::{Alert, DoseEvent, EntityRef, SensorReading, SubjectId};

use super::status::{gather_evidence, resolve_status};
use super::types::{NormalizationFailure, Normalized, NormalizeContext, NormalizedBatch};

pub const ALIAS_TABLE_VERSION: u32 = 3;

/// Namespace for ids synthesized from record content.
const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x6d65_6469_626f_7872_6563_6f72_645f_6e73);

/// Accepted source names for one canonical field, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub canonical: &'static str,
    pub sources: &'static [&'static str],
}

pub const RECORD_ID: FieldAliases = FieldAliases {
    canonical: "id",
    sources: &["id", "_id", "schedule_id", "scheduleId", "log_id"],
};
pub const SUBJECT: FieldAliases = FieldAliases {
    canonical: "subject_user_id",
    sources: &[
        "user_id",
        "userId",
        "user",
        "device_user_id",
        "deviceUserId",
        "subject_id",
        "patient_id",
    ],
};
pub const SUBJECT_NAME: FieldAliases = FieldAliases {
    canonical: "subject_name",
    sources: &["user_name", "userName", "patient_name"],
};
pub const MEDICINE: FieldAliases = FieldAliases {
    canonical: "medicine_name",
    sources: &["medicine", "medicine_name", "medicineName", "name", "message"],
};
pub const DOSE: FieldAliases = FieldAliases {
    canonical: "dose",
    sources: &["dose", "dosage"],
};
pub const SCHEDULED_AT: FieldAliases = FieldAliases {
    canonical: "scheduled_at",
    sources: &[
        "scheduled_time",
        "scheduledTime",
        "scheduled_at",
        "reminder_time",
        "time",
    ],
};
pub const TAKEN_AT: FieldAliases = FieldAliases {
    canonical: "taken_at",
    sources: &["taken_at", "taken_time", "takenTime", "date"],
};
pub const RECORDED_AT: FieldAliases = FieldAliases {
    canonical: "recorded_at",
    sources: &["recorded_at", "recordedAt", "created_at", "createdAt", "timestamp"],
};
pub const STATUS: FieldAliases = FieldAliases {
    canonical: "status",
    sources: &["status", "state"],
};
pub const CONFIRMED: FieldAliases = FieldAliases {
    canonical: "confirmed",
    sources: &["confirmed", "is_confirmed", "taken"],
};
pub const HUMIDITY: FieldAliases = FieldAliases {
    canonical: "humidity",
    sources: &["humidity"],
};
pub const TEMPERATURE: FieldAliases = FieldAliases {
    canonical: "temperature",
    sources: &["temperature", "temp"],
};
pub const LIGHT_DURATION: FieldAliases = FieldAliases {
    canonical: "light_duration_minutes",
    sources: &["light_duration", "lightDuration", "light_duration_minutes"],
};
pub const MOTION: FieldAliases = FieldAliases {
    canonical: "motion",
    sources: &["motion", "motion_detected"],
};
pub const ALERT_TITLE: FieldAliases = FieldAliases {
    canonical: "title",
    sources: &["title", "type"],
};
pub const ALERT_MESSAGE: FieldAliases = FieldAliases {
    canonical: "message",
    sources: &["message", "details", "description"],
};
pub const ALERT_SEVERITY: FieldAliases = FieldAliases {
    canonical: "severity",
    sources: &["severity", "level", "priority"],
};
pub const ALERT_SOURCE: FieldAliases = FieldAliases {
    canonical: "source_kind",
    sources: &["source", "source_kind", "category"],
};
pub const ACKNOWLEDGED: FieldAliases = FieldAliases {
    canonical: "acknowledged",
    sources: &["acknowledged", "read", "is_read"],
};

/// Every alias list, for inspection and tests.
pub const ALIAS_TABLE: &[FieldAliases] = &[
    RECORD_ID,
    SUBJECT,
    SUBJECT_NAME,
    MEDICINE,
    DOSE,
    SCHEDULED_AT,
    TAKEN_AT,
    RECORDED_AT,
    STATUS,
    CONFIRMED,
    HUMIDITY,
    TEMPERATURE,
    LIGHT_DURATION,
    MOTION,
    ALERT_TITLE,
    ALERT_MESSAGE,
    ALERT_SEVERITY,
    ALERT_SOURCE,
    ACKNOWLEDGED,
];

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Normalize one raw record. `seq` is its position in the ingestion order.
pub fn normalize(
    raw: &Value,
    kind: RecordKind,
    ctx: &NormalizeContext,
    seq: u64,
) -> Result<Normalized, NormalizationFailure> {
    let obj = raw
        .as_object()
        .ok_or(NormalizationFailure::NotAnObject { kind })?;

    match kind {
        RecordKind::Dose => normalize_dose(obj, ctx, seq).map(Normalized::Dose),
        RecordKind::Sensor => normalize_sensor(obj, ctx, seq).map(Normalized::Sensor),
        RecordKind::Alert => normalize_alert(obj, ctx).map(Normalized::Alert),
    }
}

pub fn normalize_dose_batch(records: &[Value], ctx: &NormalizeContext) -> NormalizedBatch<DoseEvent> {
    collect_batch(records, RecordKind::Dose, ctx, |n| match n {
        Normalized::Dose(d) => Some(d),
        _ => None,
    })
}

pub fn normalize_sensor_batch(
    records: &[Value],
    ctx: &NormalizeContext,
) -> NormalizedBatch<SensorReading> {
    collect_batch(records, RecordKind::Sensor, ctx, |n| match n {
        Normalized::Sensor(s) => Some(s),
        _ => None,
    })
}

pub fn normalize_alert_batch(records: &[Value], ctx: &NormalizeContext) -> NormalizedBatch<Alert> {
    collect_batch(records, RecordKind::Alert, ctx, |n| match n {
        Normalized::Alert(a) => Some(a),
        _ => None,
    })
}

fn collect_batch<T>(
    records: &[Value],
    kind: RecordKind,
    ctx: &NormalizeContext,
    pick: impl Fn(Normalized) -> Option<T>,
) -> NormalizedBatch<T> {
    let mut batch = NormalizedBatch::default();
    for (seq, raw) in records.iter().enumerate() {
        match normalize(raw, kind, ctx, seq as u64) {
            Ok(normalized) => batch.records.extend(pick(normalized)),
            Err(failure) => {
                tracing::debug!(kind = kind.as_str(), seq, %failure, "Dropping record");
                batch.failures.push(failure);
            }
        }
    }
    if !batch.failures.is_empty() {
        tracing::info!(
            kind = kind.as_str(),
            kept = batch.records.len(),
            dropped = batch.failures.len(),
            "Normalization dropped records"
        );
    }
    batch
}

// ---------------------------------------------------------------------------
// Per-kind normalization
// ---------------------------------------------------------------------------

fn normalize_dose(
    obj: &Map<String, Value>,
    ctx: &NormalizeContext,
    seq: u64,
) -> Result<DoseEvent, NormalizationFailure> {
    let kind = RecordKind::Dose;
    let id = lookup(obj, &RECORD_ID).and_then(id_string);
    let medicine_name = lookup(obj, &MEDICINE).and_then(text);
    let dose = lookup(obj, &DOSE).and_then(text);
    let scheduled_raw = lookup(obj, &SCHEDULED_AT);
    let taken_raw = lookup(obj, &TAKEN_AT);
    let status_label = lookup(obj, &STATUS).and_then(text);
    let confirmed = lookup(obj, &CONFIRMED).and_then(flag);

    let has_content = medicine_name.is_some()
        || dose.is_some()
        || scheduled_raw.is_some()
        || taken_raw.is_some()
        || status_label.is_some()
        || confirmed.is_some();
    if id.is_none() && !has_content {
        return Err(NormalizationFailure::Unidentifiable { kind });
    }

    let id = id.unwrap_or_else(|| synthesize_id(kind, obj));
    let (subject, embedded_name) = resolve_subject(obj, ctx, kind, &id)?;
    let subject_name = subject_name(obj, ctx, &subject, embedded_name);

    let scheduled_at = scheduled_raw.and_then(parse_timestamp);
    let taken_at = taken_raw.and_then(parse_timestamp);
    let recorded_at = lookup(obj, &RECORDED_AT).and_then(parse_timestamp);

    let evidence = gather_evidence(status_label.as_deref(), confirmed, scheduled_at);
    let status = resolve_status(evidence, ctx.now, &ctx.status_policy);

    Ok(DoseEvent {
        id,
        subject_user_id: subject,
        subject_name,
        medicine_name,
        dose,
        scheduled_at,
        taken_at,
        status,
        recorded_at,
        ingest_seq: seq,
    })
}

fn normalize_sensor(
    obj: &Map<String, Value>,
    ctx: &NormalizeContext,
    seq: u64,
) -> Result<SensorReading, NormalizationFailure> {
    let kind = RecordKind::Sensor;
    let id = lookup(obj, &RECORD_ID).and_then(id_string);
    let humidity = lookup(obj, &HUMIDITY).and_then(number);
    let temperature = lookup(obj, &TEMPERATURE).and_then(number);
    let light = lookup(obj, &LIGHT_DURATION).and_then(number);
    let motion = lookup(obj, &MOTION).and_then(flag);
    let recorded_raw = lookup(obj, &RECORDED_AT);

    let has_content = humidity.is_some()
        || temperature.is_some()
        || light.is_some()
        || motion.is_some()
        || recorded_raw.is_some();
    if id.is_none() && !has_content {
        return Err(NormalizationFailure::Unidentifiable { kind });
    }

    let id = id.unwrap_or_else(|| synthesize_id(kind, obj));
    let (subject, embedded_name) = resolve_subject(obj, ctx, kind, &id)?;
    let subject_name = subject_name(obj, ctx, &subject, embedded_name);

    Ok(SensorReading {
        id,
        device_user_id: subject,
        subject_name,
        humidity,
        temperature,
        light_duration_minutes: light,
        motion: motion.unwrap_or(false),
        recorded_at: recorded_raw.and_then(parse_timestamp),
        ingest_seq: seq,
    })
}

fn normalize_alert(
    obj: &Map<String, Value>,
    ctx: &NormalizeContext,
) -> Result<Alert, NormalizationFailure> {
    let kind = RecordKind::Alert;
    let upstream_id = lookup(obj, &RECORD_ID).and_then(id_string);
    let title = lookup(obj, &ALERT_TITLE).and_then(text);
    let message = lookup(obj, &ALERT_MESSAGE).and_then(text);

    if upstream_id.is_none() && title.is_none() && message.is_none() {
        return Err(NormalizationFailure::Unidentifiable { kind });
    }

    let upstream_id = upstream_id.unwrap_or_else(|| synthesize_id(kind, obj));
    let (subject, embedded_name) = match resolve_subject(obj, ctx, kind, &upstream_id) {
        Ok(found) => found,
        // Feed alerts may address the whole scope rather than one subject.
        Err(failure) => match &ctx.viewer {
            Some(viewer) => (viewer.clone(), None),
            None => return Err(failure),
        },
    };
    let subject_name = subject_name(obj, ctx, &subject, embedded_name);

    let id = Uuid::parse_str(&upstream_id)
        .unwrap_or_else(|_| Uuid::new_v5(&RECORD_NAMESPACE, upstream_id.as_bytes()));
    let title = title.unwrap_or_else(|| "Alert".to_string());
    let message = message.unwrap_or_else(|| title.clone());

    Ok(Alert {
        id,
        source_kind: lookup(obj, &ALERT_SOURCE)
            .and_then(text)
            .map(|s| source_kind_from_label(&s))
            .unwrap_or(AlertSourceKind::Manual),
        severity: lookup(obj, &ALERT_SEVERITY)
            .and_then(text)
            .map(|s| severity_from_label(&s))
            .unwrap_or(AlertSeverity::Info),
        subject_user_id: subject,
        subject_name,
        title,
        message,
        timestamp: lookup(obj, &RECORDED_AT).and_then(parse_timestamp),
        originating_entity_ref: EntityRef {
            kind: "alert".into(),
            id: upstream_id,
        },
        acknowledged: lookup(obj, &ACKNOWLEDGED).and_then(flag).unwrap_or(false),
    })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// First alias holding a usable value. Nulls and blank strings are skipped.
pub fn lookup<'a>(obj: &'a Map<String, Value>, field: &FieldAliases) -> Option<&'a Value> {
    field.sources.iter().find_map(|name| match obj.get(*name) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(value) => Some(value),
    })
}

fn resolve_subject(
    obj: &Map<String, Value>,
    ctx: &NormalizeContext,
    kind: RecordKind,
    id: &str,
) -> Result<(SubjectId, Option<String>), NormalizationFailure> {
    if let Some(value) = lookup(obj, &SUBJECT) {
        if let Some(subject) = id_string(value) {
            // A populated user document carries its own display name.
            let embedded_name = value
                .as_object()
                .and_then(|user| user.get("name"))
                .and_then(text);
            return Ok((SubjectId(subject), embedded_name));
        }
    }
    ctx.default_subject
        .clone()
        .map(|s| (s, None))
        .ok_or_else(|| NormalizationFailure::MissingSubject {
            kind,
            id: id.to_string(),
        })
}

fn subject_name(
    obj: &Map<String, Value>,
    ctx: &NormalizeContext,
    subject: &SubjectId,
    embedded: Option<String>,
) -> Option<String> {
    lookup(obj, &SUBJECT_NAME)
        .and_then(text)
        .or(embedded)
        .or_else(|| ctx.subject_names.get(subject).cloned())
}

fn synthesize_id(kind: RecordKind, obj: &Map<String, Value>) -> String {
    // serde_json maps are key-ordered, so the rendering is canonical.
    let canonical = format!("{}:{}", kind.as_str(), Value::Object(obj.clone()));
    Uuid::new_v5(&RECORD_NAMESPACE, canonical.as_bytes()).to_string()
}

/// Identifier from a string, number, `{"$oid": ..}` or a populated document.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => ["$oid", "_id", "id"]
            .iter()
            .find_map(|key| obj.get(*key))
            .and_then(id_string),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Finite number from a JSON number or numeric string.
pub fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Boolean from `true/false`, `0/1`, or the usual string spellings.
pub fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Parse any timestamp shape producers are known to send. Unparsable
/// values come back as `None`, never as a pass-through string.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).and_then(from_epoch),
        Value::Object(obj) => obj.get("$date").and_then(parse_timestamp),
        _ => None,
    }
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<i64>().ok().and_then(from_epoch);
    }
    None
}

/// Epoch seconds or milliseconds; anything past year ~5138 in seconds is
/// taken as milliseconds.
fn from_epoch(raw: i64) -> Option<DateTime<Utc>> {
    if raw.unsigned_abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(raw)
    } else {
        DateTime::from_timestamp(raw, 0)
    }
}

pub fn severity_from_label(label: &str) -> AlertSeverity {
    match label.trim().to_ascii_lowercase().as_str() {
        "critical" | "emergency" => AlertSeverity::Critical,
        "high" | "error" | "severe" | "urgent" => AlertSeverity::High,
        "medium" | "warning" | "warn" | "moderate" => AlertSeverity::Medium,
        "low" | "notice" | "minor" => AlertSeverity::Low,
        _ => AlertSeverity::Info,
    }
}

pub fn source_kind_from_label(label: &str) -> AlertSourceKind {
    let label = label.trim().to_ascii_lowercase();
    if label.contains("adherence") || label.contains("dose") || label.contains("medication") {
        AlertSourceKind::Adherence
    } else if label.contains("environment") || label.contains("box") || label.contains("sensor") {
        AlertSourceKind::Environment
    } else {
        AlertSourceKind::Manual
    }
}
