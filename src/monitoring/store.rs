use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Alert, SubjectId};

use super::types::{Acknowledgement, MonitorError};

/// Acknowledgements kept before the oldest is dropped.
pub const MAX_ACKNOWLEDGEMENTS: usize = 10_000;

/// In-memory acknowledgement ledger backed by RwLock.
///
/// Derived alerts are regenerated on every read, so acknowledgement lives
/// here keyed by the alert's stable id rather than on the alert itself.
/// Bounded: at capacity the oldest acknowledgement makes room.
pub struct AcknowledgementLedger {
    entries: std::sync::RwLock<HashMap<Uuid, Acknowledgement>>,
    capacity: usize,
}

impl AcknowledgementLedger {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ACKNOWLEDGEMENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: std::sync::RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record an acknowledgement. Returns false if the alert was already
    /// acknowledged; the first acknowledgement is kept.
    pub fn acknowledge(
        &self,
        alert_id: Uuid,
        by: SubjectId,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<bool, MonitorError> {
        let mut entries = self.entries.write().map_err(|_| MonitorError::LockFailed)?;

        if entries.contains_key(&alert_id) {
            tracing::debug!(alert_id = %alert_id, "Alert already acknowledged");
            return Ok(false);
        }

        if entries.len() >= self.capacity {
            let oldest = entries
                .values()
                .min_by_key(|ack| ack.acknowledged_at)
                .map(|ack| ack.alert_id);
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                tracing::debug!(alert_id = %oldest, "Dropped oldest acknowledgement");
            }
        }

        entries.insert(
            alert_id,
            Acknowledgement {
                alert_id,
                acknowledged_by: by,
                acknowledged_at: at,
                note,
            },
        );
        tracing::info!(alert_id = %alert_id, "Alert acknowledged");
        Ok(true)
    }

    pub fn is_acknowledged(&self, alert_id: &Uuid) -> Result<bool, MonitorError> {
        let entries = self.entries.read().map_err(|_| MonitorError::LockFailed)?;
        Ok(entries.contains_key(alert_id))
    }

    pub fn get(&self, alert_id: &Uuid) -> Result<Option<Acknowledgement>, MonitorError> {
        let entries = self.entries.read().map_err(|_| MonitorError::LockFailed)?;
        Ok(entries.get(alert_id).cloned())
    }

    /// Set the `acknowledged` flag on every alert present in the ledger.
    pub fn apply(&self, alerts: &mut [Alert]) -> Result<(), MonitorError> {
        let entries = self.entries.read().map_err(|_| MonitorError::LockFailed)?;
        for alert in alerts.iter_mut() {
            if entries.contains_key(&alert.id) {
                alert.acknowledged = true;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> Result<usize, MonitorError> {
        let entries = self.entries.read().map_err(|_| MonitorError::LockFailed)?;
        Ok(entries.len())
    }
}

impl Default for AcknowledgementLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{AlertSeverity, AlertSourceKind};
    use crate::models::EntityRef;

    fn alert(id: Uuid) -> Alert {
        Alert {
            id,
            source_kind: AlertSourceKind::Environment,
            severity: AlertSeverity::Medium,
            subject_user_id: SubjectId::new("u1"),
            subject_name: None,
            title: "environment: high humidity".into(),
            message: "Too humid".into(),
            timestamp: None,
            originating_entity_ref: EntityRef {
                kind: "sensor_reading".into(),
                id: "r1".into(),
            },
            acknowledged: false,
        }
    }

    #[test]
    fn first_acknowledgement_wins() {
        let ledger = AcknowledgementLedger::new();
        let id = Uuid::new_v4();
        let now = Utc::now();

        assert!(ledger.acknowledge(id, SubjectId::new("fam"), now, Some("moved box".into())).unwrap());
        assert!(!ledger.acknowledge(id, SubjectId::new("other"), now, None).unwrap());

        let ack = ledger.get(&id).unwrap().unwrap();
        assert_eq!(ack.acknowledged_by, SubjectId::new("fam"));
        assert_eq!(ack.note.as_deref(), Some("moved box"));
        assert_eq!(ledger.len().unwrap(), 1);
    }

    #[test]
    fn apply_marks_only_known_alerts() {
        let ledger = AcknowledgementLedger::new();
        let known = Uuid::new_v4();
        ledger
            .acknowledge(known, SubjectId::new("fam"), Utc::now(), None)
            .unwrap();

        let mut alerts = vec![alert(known), alert(Uuid::new_v4())];
        ledger.apply(&mut alerts).unwrap();
        assert!(alerts[0].acknowledged);
        assert!(!alerts[1].acknowledged);
        assert!(ledger.is_acknowledged(&known).unwrap());
    }

    #[test]
    fn capacity_drops_the_oldest_acknowledgement() {
        let ledger = AcknowledgementLedger::with_capacity(2);
        let now = Utc::now();
        let (first, second, third) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        ledger.acknowledge(first, SubjectId::new("fam"), now - chrono::Duration::hours(2), None).unwrap();
        ledger.acknowledge(second, SubjectId::new("fam"), now - chrono::Duration::hours(1), None).unwrap();
        ledger.acknowledge(third, SubjectId::new("fam"), now, None).unwrap();

        assert_eq!(ledger.len().unwrap(), 2);
        assert!(!ledger.is_acknowledged(&first).unwrap());
        assert!(ledger.is_acknowledged(&second).unwrap());
        assert!(ledger.is_acknowledged(&third).unwrap());
    }
}
