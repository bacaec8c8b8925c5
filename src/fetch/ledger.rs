use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::models::SubjectId;

use super::types::{FetchError, FetchSlot, ScopeKey};

/// Handle for one in-flight fetch.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    pub slot: FetchSlot,
    pub fingerprint: u64,
    pub token: CancellationToken,
}

struct InFlight {
    fingerprint: u64,
    token: CancellationToken,
}

/// Tracks the newest fetch per slot.
///
/// Fingerprints increase monotonically across the whole ledger. Beginning a
/// fetch cancels whatever was in flight for the same slot, and only the
/// newest fingerprint may finish successfully.
pub struct FetchLedger {
    next: AtomicU64,
    in_flight: Mutex<HashMap<FetchSlot, InFlight>>,
}

impl FetchLedger {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn begin(&self, slot: FetchSlot) -> Result<FetchTicket, FetchError> {
        let fingerprint = self.next.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let mut in_flight = self.in_flight.lock().map_err(|_| FetchError::LockFailed)?;
        if let Some(previous) = in_flight.insert(
            slot.clone(),
            InFlight {
                fingerprint,
                token: token.clone(),
            },
        ) {
            tracing::debug!(
                resource = slot.resource().as_str(),
                superseded = previous.fingerprint,
                fingerprint,
                "Superseding in-flight fetch"
            );
            previous.token.cancel();
        }

        Ok(FetchTicket {
            slot,
            fingerprint,
            token,
        })
    }

    /// Newest fingerprint in flight for `slot`, if any.
    pub fn latest(&self, slot: &FetchSlot) -> Result<Option<u64>, FetchError> {
        let in_flight = self.in_flight.lock().map_err(|_| FetchError::LockFailed)?;
        Ok(in_flight.get(slot).map(|f| f.fingerprint))
    }

    /// Close out a fetch. Fails with `StaleResultDiscarded` unless the
    /// ticket is still the newest for its slot.
    pub fn finish(&self, ticket: &FetchTicket) -> Result<(), FetchError> {
        let mut in_flight = self.in_flight.lock().map_err(|_| FetchError::LockFailed)?;
        let latest = in_flight.get(&ticket.slot).map(|f| f.fingerprint);

        if latest != Some(ticket.fingerprint) {
            return Err(FetchError::StaleResultDiscarded {
                resource: ticket.slot.resource(),
                fingerprint: ticket.fingerprint,
                latest,
            });
        }
        in_flight.remove(&ticket.slot);
        Ok(())
    }

    /// Cancel every view fetch owned by `viewer`.
    pub fn cancel_viewer(&self, viewer: &SubjectId) -> Result<usize, FetchError> {
        self.cancel_where(|slot| matches!(slot, FetchSlot::View { viewer: v, .. } if v == viewer))
    }

    /// Cancel every background fetch for `scope`.
    pub fn cancel_poll(&self, scope: &ScopeKey) -> Result<usize, FetchError> {
        self.cancel_where(|slot| matches!(slot, FetchSlot::Poll { scope: s, .. } if s == scope))
    }

    pub fn cancel_all(&self) -> Result<usize, FetchError> {
        self.cancel_where(|_| true)
    }

    fn cancel_where(&self, pred: impl Fn(&FetchSlot) -> bool) -> Result<usize, FetchError> {
        let mut in_flight = self.in_flight.lock().map_err(|_| FetchError::LockFailed)?;
        let mut cancelled = 0;
        in_flight.retain(|slot, fetch| {
            if pred(slot) {
                fetch.token.cancel();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        Ok(cancelled)
    }
}

impl Default for FetchLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{ResourceKind, ScopeKind};

    fn view_slot(viewer: &str) -> FetchSlot {
        FetchSlot::View {
            viewer: SubjectId::new(viewer),
            resource: ResourceKind::History,
        }
    }

    #[test]
    fn only_latest_fingerprint_commits() {
        let ledger = FetchLedger::new();
        let a = ledger.begin(view_slot("fam")).unwrap();
        let b = ledger.begin(view_slot("fam")).unwrap();

        assert!(b.fingerprint > a.fingerprint);
        assert!(a.token.is_cancelled());
        assert!(!b.token.is_cancelled());

        assert!(ledger.finish(&b).is_ok());
        match ledger.finish(&a) {
            Err(FetchError::StaleResultDiscarded { fingerprint, .. }) => {
                assert_eq!(fingerprint, a.fingerprint)
            }
            other => panic!("expected stale, got {other:?}"),
        }
    }

    #[test]
    fn late_result_after_newer_start_is_stale() {
        let ledger = FetchLedger::new();
        let a = ledger.begin(view_slot("fam")).unwrap();
        let b = ledger.begin(view_slot("fam")).unwrap();

        // A's response lands first but B is already the latest.
        assert!(ledger.finish(&a).is_err());
        assert_eq!(ledger.latest(&b.slot).unwrap(), Some(b.fingerprint));
        assert!(ledger.finish(&b).is_ok());
        assert_eq!(ledger.latest(&b.slot).unwrap(), None);
    }

    #[test]
    fn slots_are_independent() {
        let ledger = FetchLedger::new();
        let fam = ledger.begin(view_slot("fam")).unwrap();
        let other = ledger.begin(view_slot("other")).unwrap();
        let poll = ledger
            .begin(FetchSlot::Poll {
                scope: ScopeKey::new(ScopeKind::Household, SubjectId::new("fam")),
                resource: ResourceKind::History,
            })
            .unwrap();

        assert!(!fam.token.is_cancelled());
        assert!(ledger.finish(&fam).is_ok());
        assert!(ledger.finish(&other).is_ok());
        assert!(ledger.finish(&poll).is_ok());
    }

    #[test]
    fn cancel_viewer_leaves_others_running() {
        let ledger = FetchLedger::new();
        let fam = ledger.begin(view_slot("fam")).unwrap();
        let other = ledger.begin(view_slot("other")).unwrap();

        assert_eq!(ledger.cancel_viewer(&SubjectId::new("fam")).unwrap(), 1);
        assert!(fam.token.is_cancelled());
        assert!(!other.token.is_cancelled());
        assert!(ledger.finish(&fam).is_err());
    }

    #[test]
    fn cancel_poll_and_cancel_all() {
        let ledger = FetchLedger::new();
        let household = ScopeKey::new(ScopeKind::Household, SubjectId::new("fam"));
        let poll = ledger
            .begin(FetchSlot::Poll {
                scope: household.clone(),
                resource: ResourceKind::Readings,
            })
            .unwrap();
        let view = ledger.begin(view_slot("fam")).unwrap();

        assert_eq!(ledger.cancel_poll(&household).unwrap(), 1);
        assert!(poll.token.is_cancelled());
        assert!(!view.token.is_cancelled());

        assert_eq!(ledger.cancel_all().unwrap(), 1);
        assert!(view.token.is_cancelled());
        assert!(ledger.finish(&view).is_err());
    }
}
