use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::{MonitorConfig, MAX_POLL_INTERVAL_SECS};
use crate::models::enums::{ResourceKind, ScopeKind};
use crate::models::{Scope, SubjectId};

use super::ledger::FetchLedger;
use super::source::MonitoringSource;
use super::store::MonitorStore;
use super::types::{
    CachedResource, FetchError, PartialFetchFailure, RefreshMode, RefreshReport, ResourceError,
    ResourceKey, ResourceOutcome, ScheduleUpdate, ScopeKey,
};

/// Fetch parameters derived from configuration.
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub history_limit: u32,
    pub alerts_limit: u32,
    /// How far back readings are requested.
    pub readings_window: chrono::Duration,
    /// Committed entries younger than this are served without refetching.
    pub max_age: chrono::Duration,
}

impl FetchSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            history_limit: config.history_limit,
            alerts_limit: config.alerts_limit,
            readings_window: config.trend_window(),
            max_age: chrono::Duration::seconds(
                config.poll_interval_secs.min(MAX_POLL_INTERVAL_SECS) as i64,
            ),
        }
    }
}

/// Raw resources for one scope, as committed in the store, plus the
/// resources that could not be loaded.
#[derive(Debug, Clone)]
pub struct ScopeData {
    pub scope: Scope,
    pub resources: HashMap<ResourceKind, Vec<Value>>,
    pub errors: Vec<PartialFetchFailure>,
}

impl ScopeData {
    /// Records for `resource`; empty when it failed or was never loaded.
    pub fn records(&self, resource: ResourceKind) -> &[Value] {
        self.resources
            .get(&resource)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Coordinates parallel resource fetches for scopes and commits the
/// results into a shared store.
pub struct ScopeMonitor {
    source: Arc<dyn MonitoringSource>,
    store: Arc<dyn MonitorStore>,
    ledger: FetchLedger,
    settings: FetchSettings,
}

impl ScopeMonitor {
    pub fn new(
        source: Arc<dyn MonitoringSource>,
        store: Arc<dyn MonitorStore>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            source,
            store,
            ledger: FetchLedger::new(),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn MonitorStore> {
        &self.store
    }

    pub fn ledger(&self) -> &FetchLedger {
        &self.ledger
    }

    pub async fn resolve(&self, kind: ScopeKind, viewer: &SubjectId) -> Result<Scope, ResourceError> {
        self.source.resolve_scope(kind, viewer).await
    }

    /// Fetch every resource for `scope` in parallel.
    pub async fn refresh(&self, scope: &Scope) -> RefreshReport {
        self.refresh_resources(scope, &ResourceKind::ALL, RefreshMode::View)
            .await
    }

    /// Background readings refresh for `scope`.
    pub async fn poll_readings(&self, scope: &Scope) -> RefreshReport {
        self.refresh_resources(scope, &[ResourceKind::Readings], RefreshMode::Poll)
            .await
    }

    /// Fetch the requested resources in parallel. A failing resource is
    /// reported and never blocks its siblings.
    pub async fn refresh_resources(
        &self,
        scope: &Scope,
        wanted: &[ResourceKind],
        mode: RefreshMode,
    ) -> RefreshReport {
        let fetch_if_wanted = |resource: ResourceKind| async move {
            if wanted.contains(&resource) {
                Some(self.run(scope, resource, mode).await)
            } else {
                None
            }
        };

        let (history, alerts, readings, refills) = tokio::join!(
            fetch_if_wanted(ResourceKind::History),
            fetch_if_wanted(ResourceKind::Alerts),
            fetch_if_wanted(ResourceKind::Readings),
            fetch_if_wanted(ResourceKind::Refills),
        );

        let mut report = RefreshReport::new(ScopeKey::of(scope));
        for (resource, outcome) in [
            (ResourceKind::History, history),
            (ResourceKind::Alerts, alerts),
            (ResourceKind::Readings, readings),
            (ResourceKind::Refills, refills),
        ] {
            if let Some(outcome) = outcome {
                report.record(resource, outcome);
            }
        }

        if !report.failures.is_empty() {
            tracing::warn!(
                scope = %report.scope,
                failed = report.failures.len(),
                committed = report.committed.len(),
                "Refresh completed with failures"
            );
        }
        report
    }

    async fn run(&self, scope: &Scope, resource: ResourceKind, mode: RefreshMode) -> ResourceOutcome {
        let ticket = match self.ledger.begin(mode.slot(scope, resource)) {
            Ok(ticket) => ticket,
            Err(e) => return ResourceOutcome::Failed(ResourceError::Internal(e.to_string())),
        };

        let result = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => Err(ResourceError::Cancelled),
            result = self.fetch(scope, resource) => result,
        };

        match self.ledger.finish(&ticket) {
            Ok(()) => {}
            Err(FetchError::StaleResultDiscarded { .. }) => {
                tracing::debug!(
                    resource = resource.as_str(),
                    fingerprint = ticket.fingerprint,
                    "Discarding superseded fetch result"
                );
                return ResourceOutcome::Stale;
            }
            Err(e) => return ResourceOutcome::Failed(ResourceError::Internal(e.to_string())),
        }

        let records = match result {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(resource = resource.as_str(), error = %error, "Resource fetch failed");
                return ResourceOutcome::Failed(error);
            }
        };

        let count = records.len();
        let entry = CachedResource {
            records,
            subjects: scope.subject_ids(),
            fetched_at: Utc::now(),
            fingerprint: ticket.fingerprint,
        };
        match self
            .store
            .set(ResourceKey::new(ScopeKey::of(scope), resource), entry)
        {
            Ok(()) => ResourceOutcome::Committed { records: count },
            Err(e) => ResourceOutcome::Failed(ResourceError::Internal(e.to_string())),
        }
    }

    async fn fetch(&self, scope: &Scope, resource: ResourceKind) -> Result<Vec<Value>, ResourceError> {
        match resource {
            ResourceKind::History => {
                self.source
                    .fetch_history(scope, self.settings.history_limit)
                    .await
            }
            ResourceKind::Alerts => {
                self.source
                    .fetch_alerts(scope, self.settings.alerts_limit)
                    .await
            }
            ResourceKind::Readings => {
                let now = Utc::now();
                let since = now
                    .checked_sub_signed(self.settings.readings_window)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                self.source.fetch_readings(scope, since).await
            }
            ResourceKind::Refills => self.source.fetch_refills(scope).await,
        }
    }

    /// Resolve the scope and return its committed resources, refreshing
    /// whatever is missing or older than the configured max age.
    pub async fn load(
        &self,
        kind: ScopeKind,
        viewer: &SubjectId,
        now: DateTime<Utc>,
    ) -> Result<ScopeData, ResourceError> {
        let scope = self.resolve(kind, viewer).await?;
        let key = ScopeKey::of(&scope);

        let stale: Vec<ResourceKind> = ResourceKind::ALL
            .iter()
            .copied()
            .filter(|resource| !self.is_fresh(&key, *resource, now))
            .collect();

        let mut errors = Vec::new();
        if !stale.is_empty() {
            let report = self
                .refresh_resources(&scope, &stale, RefreshMode::View)
                .await;
            errors = report.failures;
            // Superseded resources still serve whatever older entry the
            // store holds, but the view must say it may be out of date.
            errors.extend(report.stale.into_iter().map(|resource| PartialFetchFailure {
                resource,
                error: ResourceError::Superseded,
            }));
        }

        let mut resources = HashMap::new();
        for resource in ResourceKind::ALL {
            let failed = errors
                .iter()
                .any(|f| f.resource == resource && !matches!(f.error, ResourceError::Superseded));
            if failed {
                continue;
            }
            let cached = self
                .store
                .get(&ResourceKey::new(key.clone(), resource))
                .map_err(|e| ResourceError::Internal(e.to_string()))?;
            if let Some(entry) = cached {
                resources.insert(resource, entry.records);
            }
        }

        Ok(ScopeData {
            scope,
            resources,
            errors,
        })
    }

    fn is_fresh(&self, key: &ScopeKey, resource: ResourceKind, now: DateTime<Utc>) -> bool {
        match self.store.get(&ResourceKey::new(key.clone(), resource)) {
            Ok(Some(entry)) => now - entry.fetched_at < self.settings.max_age,
            _ => false,
        }
    }

    /// Drop cached resources fetched before `cutoff`.
    pub fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, FetchError> {
        Ok(self.store.evict_older_than(cutoff)?.len())
    }

    /// Cancel every in-flight fetch. Late responses are discarded.
    pub fn shutdown(&self) -> Result<usize, FetchError> {
        let cancelled = self.ledger.cancel_all()?;
        tracing::info!(cancelled, "Cancelled in-flight fetches");
        Ok(cancelled)
    }

    /// Forward a status correction upstream, then drop every cached
    /// resource whose scope includes the corrected subject.
    pub async fn apply_status_correction(
        &self,
        update: &ScheduleUpdate,
    ) -> Result<Vec<ResourceKey>, FetchError> {
        self.source.update_schedule_status(update).await?;
        let removed = self.store.invalidate_subject(&update.user_id)?;
        tracing::info!(
            subject = %update.user_id,
            invalidated = removed.len(),
            "Status correction applied"
        );
        Ok(removed)
    }
}
