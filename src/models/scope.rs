use serde::{Deserialize, Serialize};

use super::enums::ScopeKind;

/// Identifier of a monitored user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A monitored user as known to the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: Option<String>,
}

/// The resolved set of subjects visible to one viewer.
///
/// Membership comes from the roster collaborator; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub viewer: SubjectId,
    pub subjects: Vec<Subject>,
}

impl Scope {
    /// Self scope: the viewer is the only subject.
    pub fn self_only(viewer: SubjectId, name: Option<String>) -> Self {
        Self {
            kind: ScopeKind::SelfOnly,
            viewer: viewer.clone(),
            subjects: vec![Subject { id: viewer, name }],
        }
    }

    pub fn contains(&self, subject: &SubjectId) -> bool {
        self.subjects.iter().any(|s| &s.id == subject)
    }

    pub fn subject_ids(&self) -> Vec<SubjectId> {
        self.subjects.iter().map(|s| s.id.clone()).collect()
    }

    pub fn name_of(&self, subject: &SubjectId) -> Option<&str> {
        self.subjects
            .iter()
            .find(|s| &s.id == subject)
            .and_then(|s| s.name.as_deref())
    }

    /// Subject used when a record carries no owner: the viewer for self
    /// scope, nobody otherwise.
    pub fn default_subject(&self) -> Option<SubjectId> {
        match self.kind {
            ScopeKind::SelfOnly => Some(self.viewer.clone()),
            _ => None,
        }
    }
}
