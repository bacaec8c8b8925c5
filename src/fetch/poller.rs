//! Background status poller.
//!
//! Ticks on a fixed interval and refreshes readings for every watched
//! scope. Polls never overlap: a tick that finds the previous poll still
//! running is skipped, not queued. Scopes nobody has viewed for
//! `IDLE_TICKS` intervals drop out of the poll set, and cached resources
//! older than that are evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::models::Scope;

use super::monitor::ScopeMonitor;
use super::types::{FetchError, ScopeKey};

/// Intervals a scope may go unviewed before it stops being polled.
pub const IDLE_TICKS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Started,
    Skipped,
}

struct WatchedScope {
    scope: Scope,
    last_viewed: Instant,
}

pub struct StatusPoller {
    monitor: Arc<ScopeMonitor>,
    interval: Duration,
    in_flight: AtomicBool,
    watched: RwLock<HashMap<ScopeKey, WatchedScope>>,
}

/// Clears the in-flight flag however the poll ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl StatusPoller {
    pub fn new(monitor: Arc<ScopeMonitor>, interval: Duration) -> Self {
        Self {
            monitor,
            interval,
            in_flight: AtomicBool::new(false),
            watched: RwLock::new(HashMap::new()),
        }
    }

    /// How long a scope stays in the poll set without being viewed.
    pub fn idle_ttl(&self) -> Duration {
        self.interval * IDLE_TICKS
    }

    /// Add or replace a scope in the poll set and mark it as just viewed.
    pub fn watch(&self, scope: Scope) -> Result<(), FetchError> {
        let mut watched = self.watched.write().map_err(|_| FetchError::LockFailed)?;
        watched.insert(
            ScopeKey::of(&scope),
            WatchedScope {
                scope,
                last_viewed: Instant::now(),
            },
        );
        Ok(())
    }

    /// Remove a scope and cancel its in-flight polls.
    pub fn unwatch(&self, key: &ScopeKey) -> Result<bool, FetchError> {
        let removed = {
            let mut watched = self.watched.write().map_err(|_| FetchError::LockFailed)?;
            watched.remove(key).is_some()
        };
        if removed {
            self.monitor.ledger().cancel_poll(key)?;
        }
        Ok(removed)
    }

    /// Drop every scope last viewed more than `idle_ttl` before `now`.
    pub fn expire_idle(&self, now: Instant) -> Result<Vec<ScopeKey>, FetchError> {
        let ttl = self.idle_ttl();
        let expired: Vec<ScopeKey> = {
            let mut watched = self.watched.write().map_err(|_| FetchError::LockFailed)?;
            let keys: Vec<ScopeKey> = watched
                .iter()
                .filter(|(_, w)| now.saturating_duration_since(w.last_viewed) > ttl)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                watched.remove(key);
            }
            keys
        };

        for key in &expired {
            self.monitor.ledger().cancel_poll(key)?;
            tracing::debug!(scope = %key, "Stopped polling idle scope");
        }
        Ok(expired)
    }

    pub fn watched_count(&self) -> Result<usize, FetchError> {
        let watched = self.watched.read().map_err(|_| FetchError::LockFailed)?;
        Ok(watched.len())
    }

    pub fn is_polling(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Start a poll unless one is already running.
    pub fn tick(self: &Arc<Self>) -> TickOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("Previous poll still running, skipping tick");
            return TickOutcome::Skipped;
        }

        let poller = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = InFlightGuard(&poller.in_flight);
            poller.poll_once().await;
        });
        TickOutcome::Started
    }

    async fn poll_once(&self) {
        if let Err(e) = self.expire_idle(Instant::now()) {
            tracing::error!(error = %e, "Cannot expire idle scopes");
        }
        let cutoff = chrono::Duration::from_std(self.idle_ttl())
            .ok()
            .and_then(|ttl| chrono::Utc::now().checked_sub_signed(ttl));
        if let Some(cutoff) = cutoff {
            if let Err(e) = self.monitor.evict_older_than(cutoff) {
                tracing::error!(error = %e, "Cannot evict expired resources");
            }
        }

        let scopes: Vec<Scope> = match self.watched.read() {
            Ok(watched) => watched.values().map(|w| w.scope.clone()).collect(),
            Err(_) => {
                tracing::error!("Poll set lock poisoned");
                return;
            }
        };

        for scope in &scopes {
            let report = self.monitor.poll_readings(scope).await;
            if let Some(failure) = report.failures.first() {
                tracing::warn!(scope = %report.scope, error = %failure, "Status poll failed");
            }
        }
        tracing::debug!(scopes = scopes.len(), "Status poll complete");
    }

    /// Tick until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_secs = self.interval.as_secs(), "Status poller started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Status poller shutting down");
                    break;
                }
            }
        }
    }

    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::fetch::monitor::tests::{household, wait_parked, FakeSource};
    use crate::fetch::monitor::FetchSettings;
    use crate::fetch::store::{InMemoryStore, MonitorStore};
    use crate::fetch::types::ResourceKey;
    use crate::models::enums::{ResourceKind, ScopeKind};

    fn poller_with(source: FakeSource) -> (Arc<StatusPoller>, Arc<FakeSource>, Arc<InMemoryStore>) {
        let source = Arc::new(source);
        let store = Arc::new(InMemoryStore::new());
        let monitor = Arc::new(ScopeMonitor::new(
            source.clone(),
            store.clone(),
            FetchSettings::from_config(&MonitorConfig::default()),
        ));
        let poller = Arc::new(StatusPoller::new(monitor, Duration::from_secs(30)));
        (poller, source, store)
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let mut source = FakeSource::new();
        source.gated = Some(ScopeKind::Household);
        let (poller, source, store) = poller_with(source);
        poller.watch(household()).unwrap();

        assert_eq!(poller.tick(), TickOutcome::Started);
        wait_parked(&source.parked, 1).await;
        assert!(poller.is_polling());
        assert_eq!(poller.tick(), TickOutcome::Skipped);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        source.gate.notify_waiters();
        while poller.is_polling() {
            tokio::task::yield_now().await;
        }
        let key = ResourceKey::new(ScopeKey::of(&household()), ResourceKind::Readings);
        assert!(store.get(&key).unwrap().is_some());

        // A fresh tick runs once the previous poll resolved.
        assert_eq!(poller.tick(), TickOutcome::Started);
    }

    #[tokio::test]
    async fn poll_refreshes_only_readings() {
        let (poller, source, store) = poller_with(FakeSource::new());
        poller.watch(household()).unwrap();

        poller.tick();
        while source.calls.load(Ordering::SeqCst) < 1 || poller.is_polling() {
            tokio::task::yield_now().await;
        }

        let scope = ScopeKey::of(&household());
        assert!(store
            .get(&ResourceKey::new(scope.clone(), ResourceKind::Readings))
            .unwrap()
            .is_some());
        assert!(store
            .get(&ResourceKey::new(scope, ResourceKind::History))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (poller, _source, _store) = poller_with(FakeSource::new());
        let cancel = CancellationToken::new();
        let handle = poller.spawn(cancel.clone());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn idle_scopes_leave_the_poll_set() {
        let (poller, _source, _store) = poller_with(FakeSource::new());
        poller.watch(household()).unwrap();
        let own = Scope::self_only(crate::models::SubjectId::new("u1"), None);
        poller.watch(own).unwrap();

        assert!(poller.expire_idle(Instant::now()).unwrap().is_empty());
        assert_eq!(poller.watched_count().unwrap(), 2);

        let later = Instant::now() + poller.idle_ttl() + Duration::from_secs(1);
        let expired = poller.expire_idle(later).unwrap();
        assert_eq!(expired.len(), 2);
        assert_eq!(poller.watched_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn unwatch_cancels_in_flight_poll() {
        let mut source = FakeSource::new();
        source.gated = Some(ScopeKind::Household);
        let (poller, source, store) = poller_with(source);
        poller.watch(household()).unwrap();

        assert_eq!(poller.tick(), TickOutcome::Started);
        wait_parked(&source.parked, 1).await;
        assert!(poller.unwatch(&ScopeKey::of(&household())).unwrap());

        // The cancelled poll ends without the gate ever opening.
        while poller.is_polling() {
            tokio::task::yield_now().await;
        }
        let key = ResourceKey::new(ScopeKey::of(&household()), ResourceKind::Readings);
        assert!(store.get(&key).unwrap().is_none());
    }

    #[test]
    fn watch_replaces_same_scope() {
        let (poller, _source, _store) = poller_with(FakeSource::new());
        poller.watch(household()).unwrap();
        poller.watch(household()).unwrap();
        assert_eq!(poller.watched_count().unwrap(), 1);
        assert!(poller.unwatch(&ScopeKey::of(&household())).unwrap());
        assert_eq!(poller.watched_count().unwrap(), 0);
    }
}
