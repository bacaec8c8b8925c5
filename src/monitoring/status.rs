//! Dose status resolution.
//!
//! Upstream producers describe a dose in one of three ways: an explicit
//! status string, a `confirmed` boolean, or only a schedule time. The
//! evidence is gathered first, then resolved by one function with a single
//! precedence order:
//!
//! 1. explicit status (case-insensitive, aliases below)
//! 2. `confirmed` flag: `true` is taken, `false` is skipped
//! 3. schedule vs now: future is pending, past within the grace window is
//!    delayed, past beyond it is missed
//! 4. nothing usable: unknown

use chrono::{DateTime, Duration, Utc};

use crate::models::enums::DoseStatus;

/// Label fragments checked in order. The first bucket with a fragment
/// contained in the label wins.
const LABEL_MARKERS: &[(&[&str], DoseStatus)] = &[
    (
        &["taken", "complete", "done", "confirmed", "on_time", "on-time", "ontime"],
        DoseStatus::Taken,
    ),
    (&["miss"], DoseStatus::Missed),
    (&["skip"], DoseStatus::Skipped),
    (&["delay", "late"], DoseStatus::Delayed),
    (&["pending", "scheduled", "upcoming"], DoseStatus::Pending),
];

/// The strongest piece of status evidence a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvidence {
    Explicit(DoseStatus),
    Confirmed(bool),
    Scheduled(DateTime<Utc>),
    Absent,
}

/// Time-based resolution knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    /// How long a past, unconfirmed dose counts as delayed before it is missed.
    pub missed_grace: Duration,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            missed_grace: Duration::minutes(60),
        }
    }
}

/// Map a free-form status label to a status. `None` for blank labels.
///
/// Every alias is a substring match so producer variants such as
/// `"MISSED_DOSE"`, `"taken_late"` or `"late_intake"` land in a bucket.
/// `"due"` alone is matched exactly since it also ends `"overdue"`.
pub fn status_from_label(label: &str) -> Option<DoseStatus> {
    let label = label.trim().to_ascii_lowercase();
    if label.is_empty() {
        return None;
    }
    if label == "due" {
        return Some(DoseStatus::Pending);
    }

    let status = LABEL_MARKERS
        .iter()
        .find(|(fragments, _)| fragments.iter().any(|f| label.contains(f)))
        .map(|(_, status)| *status)
        .unwrap_or(DoseStatus::Unknown);
    Some(status)
}

/// Pick the highest-precedence evidence available.
pub fn gather_evidence(
    status_label: Option<&str>,
    confirmed: Option<bool>,
    scheduled_at: Option<DateTime<Utc>>,
) -> StatusEvidence {
    if let Some(status) = status_label.and_then(status_from_label) {
        return StatusEvidence::Explicit(status);
    }
    if let Some(flag) = confirmed {
        return StatusEvidence::Confirmed(flag);
    }
    match scheduled_at {
        Some(at) => StatusEvidence::Scheduled(at),
        None => StatusEvidence::Absent,
    }
}

/// Resolve evidence to a status.
pub fn resolve_status(
    evidence: StatusEvidence,
    now: DateTime<Utc>,
    policy: &StatusPolicy,
) -> DoseStatus {
    match evidence {
        StatusEvidence::Explicit(status) => status,
        StatusEvidence::Confirmed(true) => DoseStatus::Taken,
        StatusEvidence::Confirmed(false) => DoseStatus::Skipped,
        StatusEvidence::Scheduled(at) if at > now => DoseStatus::Pending,
        StatusEvidence::Scheduled(at) if now - at <= policy.missed_grace => DoseStatus::Delayed,
        StatusEvidence::Scheduled(_) => DoseStatus::Missed,
        StatusEvidence::Absent => DoseStatus::Unknown,
    }
}
