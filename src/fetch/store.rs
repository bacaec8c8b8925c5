use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::models::SubjectId;

use super::types::{CachedResource, FetchError, ResourceKey, StoreEvent};

/// Capacity of the change-notification channel. Slow subscribers lag and
/// skip ahead rather than blocking writers.
const EVENT_CAPACITY: usize = 64;

/// Injectable store for committed resources.
pub trait MonitorStore: Send + Sync {
    fn get(&self, key: &ResourceKey) -> Result<Option<CachedResource>, FetchError>;

    fn set(&self, key: ResourceKey, entry: CachedResource) -> Result<(), FetchError>;

    /// Drop every entry whose scope roster contains `subject`.
    /// Returns the keys that were removed.
    fn invalidate_subject(&self, subject: &SubjectId) -> Result<Vec<ResourceKey>, FetchError>;

    /// Drop every entry fetched before `cutoff`.
    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<ResourceKey>, FetchError>;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// Process-local `MonitorStore`.
pub struct InMemoryStore {
    entries: RwLock<HashMap<ResourceKey, CachedResource>>,
    events: broadcast::Sender<StoreEvent>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn len(&self) -> Result<usize, FetchError> {
        let entries = self.entries.read().map_err(|_| FetchError::LockFailed)?;
        Ok(entries.len())
    }

    fn notify(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorStore for InMemoryStore {
    fn get(&self, key: &ResourceKey) -> Result<Option<CachedResource>, FetchError> {
        let entries = self.entries.read().map_err(|_| FetchError::LockFailed)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: ResourceKey, entry: CachedResource) -> Result<(), FetchError> {
        {
            let mut entries = self.entries.write().map_err(|_| FetchError::LockFailed)?;
            entries.insert(key.clone(), entry);
        }
        self.notify(StoreEvent::Committed(key));
        Ok(())
    }

    fn invalidate_subject(&self, subject: &SubjectId) -> Result<Vec<ResourceKey>, FetchError> {
        let removed: Vec<ResourceKey> = {
            let mut entries = self.entries.write().map_err(|_| FetchError::LockFailed)?;
            let keys: Vec<ResourceKey> = entries
                .iter()
                .filter(|(_, entry)| entry.subjects.contains(subject))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                entries.remove(key);
            }
            keys
        };

        tracing::debug!(
            subject = %subject,
            removed = removed.len(),
            "Invalidated cached resources"
        );
        self.notify(StoreEvent::Invalidated {
            subject: subject.clone(),
            keys: removed.clone(),
        });
        Ok(removed)
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<ResourceKey>, FetchError> {
        let evicted: Vec<ResourceKey> = {
            let mut entries = self.entries.write().map_err(|_| FetchError::LockFailed)?;
            let keys: Vec<ResourceKey> = entries
                .iter()
                .filter(|(_, entry)| entry.fetched_at < cutoff)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                entries.remove(key);
            }
            keys
        };

        if !evicted.is_empty() {
            tracing::debug!(evicted = evicted.len(), "Evicted expired resources");
            self.notify(StoreEvent::Evicted(evicted.clone()));
        }
        Ok(evicted)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
