use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::enums::{DoseStatus, ResourceKind, ScopeKind};
use crate::models::{Scope, SubjectId};

// ═══════════════════════════════════════════════════════════
// Keys
// ═══════════════════════════════════════════════════════════

/// Identity of a scope independent of its roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub kind: ScopeKind,
    pub viewer: SubjectId,
}

impl ScopeKey {
    pub fn new(kind: ScopeKind, viewer: SubjectId) -> Self {
        Self { kind, viewer }
    }

    pub fn of(scope: &Scope) -> Self {
        Self {
            kind: scope.kind,
            viewer: scope.viewer.clone(),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.viewer)
    }
}

/// Where a committed resource lives in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub scope: ScopeKey,
    pub resource: ResourceKind,
}

impl ResourceKey {
    pub fn new(scope: ScopeKey, resource: ResourceKind) -> Self {
        Self { scope, resource }
    }
}

/// Who owns an in-flight fetch. Only the newest fetch per slot may commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchSlot {
    /// A viewer's interactive view: one active scope at a time, so
    /// switching scope supersedes the previous scope's fetches.
    View {
        viewer: SubjectId,
        resource: ResourceKind,
    },
    /// Background refresh of one scope, independent of any view.
    Poll {
        scope: ScopeKey,
        resource: ResourceKind,
    },
}

impl FetchSlot {
    pub fn resource(&self) -> ResourceKind {
        match self {
            FetchSlot::View { resource, .. } | FetchSlot::Poll { resource, .. } => *resource,
        }
    }
}

/// Which slot family a refresh runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    View,
    Poll,
}

impl RefreshMode {
    pub fn slot(self, scope: &Scope, resource: ResourceKind) -> FetchSlot {
        match self {
            RefreshMode::View => FetchSlot::View {
                viewer: scope.viewer.clone(),
                resource,
            },
            RefreshMode::Poll => FetchSlot::Poll {
                scope: ScopeKey::of(scope),
                resource,
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Stored data
// ═══════════════════════════════════════════════════════════

/// A committed upstream payload, kept raw so it can be re-derived at any
/// instant (status resolution depends on "now").
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResource {
    pub records: Vec<Value>,
    /// Roster of the scope the payload was fetched for; drives invalidation.
    pub subjects: Vec<SubjectId>,
    pub fetched_at: DateTime<Utc>,
    pub fingerprint: u64,
}

/// Store change notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Committed(ResourceKey),
    Invalidated {
        subject: SubjectId,
        keys: Vec<ResourceKey>,
    },
    /// Entries dropped for age.
    Evicted(Vec<ResourceKey>),
}

/// A status correction forwarded upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleUpdate {
    pub schedule_id: String,
    pub status: DoseStatus,
    /// Subject whose cached aggregates the correction invalidates.
    pub user_id: SubjectId,
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

/// Failure of a single resource fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Upstream unreachable: {0}")]
    Transport(String),

    #[error("Upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed upstream payload: {0}")]
    Decode(String),

    #[error("Fetch cancelled")]
    Cancelled,

    /// A newer request from the same viewer took over this resource.
    #[error("Superseded by a newer request from the same viewer")]
    Superseded,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// One resource failed while its siblings carried on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{resource} fetch failed: {error}")]
pub struct PartialFetchFailure {
    pub resource: ResourceKind,
    pub error: ResourceError,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Stale {resource} result discarded (fingerprint {fingerprint}, latest {latest:?})")]
    StaleResultDiscarded {
        resource: ResourceKind,
        fingerprint: u64,
        latest: Option<u64>,
    },

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("Internal lock failed")]
    LockFailed,
}

// ═══════════════════════════════════════════════════════════
// Refresh outcome
// ═══════════════════════════════════════════════════════════

/// What happened to one resource during a refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceOutcome {
    Committed { records: usize },
    Failed(ResourceError),
    /// Superseded by a newer fetch; dropped silently.
    Stale,
}

/// Per-resource results of one refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub scope: ScopeKey,
    pub committed: Vec<ResourceKind>,
    pub stale: Vec<ResourceKind>,
    pub failures: Vec<PartialFetchFailure>,
}

impl RefreshReport {
    pub fn new(scope: ScopeKey) -> Self {
        Self {
            scope,
            committed: Vec::new(),
            stale: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, resource: ResourceKind, outcome: ResourceOutcome) {
        match outcome {
            ResourceOutcome::Committed { .. } => self.committed.push(resource),
            ResourceOutcome::Stale => self.stale.push(resource),
            ResourceOutcome::Failed(error) => {
                self.failures.push(PartialFetchFailure { resource, error })
            }
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty() && !self.committed.is_empty()
    }

    pub fn failure_for(&self, resource: ResourceKind) -> Option<&PartialFetchFailure> {
        self.failures.iter().find(|f| f.resource == resource)
    }
}
