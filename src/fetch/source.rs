//! The upstream collaborator and payload helpers shared by implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::enums::ScopeKind;
use crate::models::{Scope, Subject, SubjectId};
use crate::monitoring::normalizer::{id_string, lookup, FieldAliases};

use super::types::{ResourceError, ScheduleUpdate};

/// Read and write access to the system that owns dose, sensor and alert
/// records. Every method is one upstream round trip.
#[async_trait]
pub trait MonitoringSource: Send + Sync {
    /// Roster of subjects visible to `viewer` under `kind`.
    async fn resolve_scope(&self, kind: ScopeKind, viewer: &SubjectId)
        -> Result<Scope, ResourceError>;

    async fn fetch_history(&self, scope: &Scope, limit: u32) -> Result<Vec<Value>, ResourceError>;

    async fn fetch_alerts(&self, scope: &Scope, limit: u32) -> Result<Vec<Value>, ResourceError>;

    async fn fetch_readings(
        &self,
        scope: &Scope,
        since: DateTime<Utc>,
    ) -> Result<Vec<Value>, ResourceError>;

    async fn fetch_refills(&self, scope: &Scope) -> Result<Vec<Value>, ResourceError>;

    async fn update_schedule_status(&self, update: &ScheduleUpdate) -> Result<(), ResourceError>;
}

/// Collections arrive bare or wrapped in `{items}` / `{results}`.
/// `null` is an empty collection.
pub fn unwrap_collection(payload: Value) -> Result<Vec<Value>, ResourceError> {
    match payload {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut obj) => {
            for key in ["items", "results"] {
                match obj.remove(key) {
                    Some(Value::Array(items)) => return Ok(items),
                    Some(Value::Null) => return Ok(Vec::new()),
                    _ => {}
                }
            }
            Err(ResourceError::Decode(
                "object payload without an items or results array".into(),
            ))
        }
        other => Err(ResourceError::Decode(format!(
            "expected a collection, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

const ROSTER_ID: FieldAliases = FieldAliases {
    canonical: "id",
    sources: &["_id", "id", "user_id", "userId", "user"],
};
const ROSTER_NAME: FieldAliases = FieldAliases {
    canonical: "name",
    sources: &["name", "user_name", "userName"],
};

/// Build a scope from a roster payload. Entries may be bare ids or user
/// objects, and may nest the user under `user` the way monitored-user
/// links do. The viewer is always part of a self scope.
pub fn parse_roster(kind: ScopeKind, viewer: &SubjectId, payload: Value) -> Result<Scope, ResourceError> {
    let entries = match payload {
        Value::Object(mut obj) if obj.contains_key("subjects") => {
            unwrap_collection(obj.remove("subjects").unwrap_or(Value::Null))?
        }
        other => unwrap_collection(other)?,
    };

    let mut subjects: Vec<Subject> = Vec::new();
    for entry in &entries {
        let Some(subject) = roster_entry(entry) else {
            tracing::debug!("Skipping roster entry without an id");
            continue;
        };
        if !subjects.iter().any(|s| s.id == subject.id) {
            subjects.push(subject);
        }
    }

    if kind == ScopeKind::SelfOnly {
        let name = subjects
            .iter()
            .find(|s| &s.id == viewer)
            .and_then(|s| s.name.clone());
        return Ok(Scope::self_only(viewer.clone(), name));
    }

    Ok(Scope {
        kind,
        viewer: viewer.clone(),
        subjects,
    })
}

fn roster_entry(entry: &Value) -> Option<Subject> {
    match entry {
        Value::Object(obj) => {
            if let Some(Value::Object(user)) = obj.get("user") {
                return roster_entry(&Value::Object(user.clone()));
            }
            let id = lookup(obj, &ROSTER_ID).and_then(id_string)?;
            let name = lookup(obj, &ROSTER_NAME)
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(Subject {
                id: SubjectId::new(id),
                name,
            })
        }
        other => id_string(other).map(|id| Subject {
            id: SubjectId::new(id),
            name: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unwraps_bare_and_wrapped_collections() {
        assert_eq!(unwrap_collection(json!([1, 2])).unwrap().len(), 2);
        assert_eq!(unwrap_collection(json!({"items": [1]})).unwrap().len(), 1);
        assert_eq!(unwrap_collection(json!({"results": [1, 2, 3]})).unwrap().len(), 3);
        assert!(unwrap_collection(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn rejects_non_collections() {
        assert!(matches!(
            unwrap_collection(json!({"count": 3})),
            Err(ResourceError::Decode(_))
        ));
        assert!(matches!(unwrap_collection(json!("nope")), Err(ResourceError::Decode(_))));
    }

    #[test]
    fn roster_accepts_mixed_entries() {
        let payload = json!({"subjects": [
            {"_id": "u1", "name": "Ana"},
            {"user": {"_id": "u2", "name": "Ben"}},
            "u3",
            {"name": "nobody"},
            {"_id": "u1", "name": "Ana again"}
        ]});
        let scope = parse_roster(ScopeKind::Household, &SubjectId::new("fam"), payload).unwrap();

        let ids: Vec<&str> = scope.subjects.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2", "u3"]);
        assert_eq!(scope.subjects[1].name.as_deref(), Some("Ben"));
        assert_eq!(scope.viewer, SubjectId::new("fam"));
    }

    #[test]
    fn self_roster_is_always_the_viewer() {
        let payload = json!([{"_id": "me", "name": "Cleo"}, {"_id": "other"}]);
        let scope = parse_roster(ScopeKind::SelfOnly, &SubjectId::new("me"), payload).unwrap();
        assert_eq!(scope.subjects.len(), 1);
        assert_eq!(scope.subjects[0].name.as_deref(), Some("Cleo"));

        let empty = parse_roster(ScopeKind::SelfOnly, &SubjectId::new("me"), json!([])).unwrap();
        assert_eq!(empty.subject_ids(), vec![SubjectId::new("me")]);
    }
}
