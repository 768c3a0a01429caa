//! Keyed snapshot cache with stale-while-revalidate checkout
//!
//! The cache never runs aggregation itself. [`SnapshotCache::checkout`] decides,
//! under one lock acquisition, whether the caller gets a fresh entry, a stale
//! entry plus (at most once per key) a [`RefreshTicket`] obliging it to start a
//! refresh, or a [`RefreshWaiter`] for the first snapshot. Ticket holders report
//! back through [`SnapshotCache::complete`] or [`SnapshotCache::abandon`].

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::debug;

use super::clock::Clock;
use crate::domain::{CacheState, DashboardSnapshot};
use crate::error::{KpiError, Result};

/// Identifies one cached dashboard
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub const DASHBOARD: &'static str = "admin-dashboard";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The single process-wide admin dashboard
    pub fn dashboard() -> Self {
        Self::new(Self::DASHBOARD)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cached snapshot with the time it was computed
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub snapshot: Arc<DashboardSnapshot>,
    pub computed_at: DateTime<Utc>,
    cycle: u64,
}

impl CacheEntry {
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.computed_at < ttl
    }
}

/// Progress of an in-flight refresh as seen by waiters
#[derive(Debug, Clone)]
pub enum RefreshStatus {
    Pending,
    Ready(Arc<DashboardSnapshot>),
    Failed(String),
}

/// Obligation to run one aggregation cycle for `key`
///
/// Dropping a ticket without completing or abandoning it is tolerated: waiters
/// observe the closed channel and the next checkout clears the marker.
#[derive(Debug)]
pub struct RefreshTicket {
    key: CacheKey,
    cycle: u64,
    status: watch::Sender<RefreshStatus>,
}

impl RefreshTicket {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }
}

/// Handle for awaiting the outcome of an in-flight refresh
#[derive(Debug, Clone)]
pub struct RefreshWaiter {
    status: watch::Receiver<RefreshStatus>,
    superseded: bool,
}

impl RefreshWaiter {
    /// The awaited cycle was claimed before an invalidation and will not be
    /// installed; callers wanting current data should wait for it to
    /// [`settle`](Self::settle) and check out again
    pub fn is_superseded(&self) -> bool {
        self.superseded
    }

    /// Wait until the refresh finishes or its ticket is dropped
    pub async fn settle(mut self) {
        let _ = self
            .status
            .wait_for(|s| !matches!(s, RefreshStatus::Pending))
            .await;
    }

    pub async fn wait(mut self) -> Result<Arc<DashboardSnapshot>> {
        let status = self
            .status
            .wait_for(|s| !matches!(s, RefreshStatus::Pending))
            .await
            .map_err(|_| KpiError::CycleFailed("refresh ended without a result".to_string()))?;

        match &*status {
            RefreshStatus::Ready(snapshot) => Ok(snapshot.clone()),
            RefreshStatus::Failed(reason) => Err(KpiError::CycleFailed(reason.clone())),
            RefreshStatus::Pending => Err(KpiError::CycleFailed(
                "refresh still pending".to_string(),
            )),
        }
    }
}

/// Result of [`SnapshotCache::checkout`]
#[derive(Debug)]
pub enum Checkout {
    /// Entry within TTL, no I/O needed
    Fresh(CacheEntry),
    /// Entry past TTL; `refresh` is set for exactly one caller per refresh
    Stale {
        entry: CacheEntry,
        refresh: Option<RefreshTicket>,
    },
    /// No entry; `refresh` is set for the caller that must start the first cycle
    Miss {
        refresh: Option<RefreshTicket>,
        waiter: RefreshWaiter,
    },
}

struct InFlight {
    cycle: u64,
    status: watch::Receiver<RefreshStatus>,
}

#[derive(Default)]
struct Slot {
    entry: Option<CacheEntry>,
    in_flight: Option<InFlight>,
    next_cycle: u64,
    /// Tickets numbered below this were claimed before an invalidation
    floor: u64,
}

impl Slot {
    fn reap_orphaned(&mut self, key: &CacheKey) {
        let orphaned = self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.status.has_changed().is_err());
        if orphaned {
            debug!(key = %key, "clearing refresh marker left by a dropped ticket");
            self.in_flight = None;
        }
    }

    fn claim(&mut self, key: &CacheKey) -> (RefreshTicket, RefreshWaiter) {
        self.next_cycle += 1;
        let cycle = self.next_cycle;
        let (tx, rx) = watch::channel(RefreshStatus::Pending);
        self.in_flight = Some(InFlight {
            cycle,
            status: rx.clone(),
        });
        (
            RefreshTicket {
                key: key.clone(),
                cycle,
                status: tx,
            },
            RefreshWaiter {
                status: rx,
                superseded: false,
            },
        )
    }

    fn waiter(&self) -> Option<RefreshWaiter> {
        self.in_flight.as_ref().map(|f| RefreshWaiter {
            status: f.status.clone(),
            superseded: f.cycle < self.floor,
        })
    }

    fn release(&mut self, cycle: u64) {
        if self.in_flight.as_ref().is_some_and(|f| f.cycle == cycle) {
            self.in_flight = None;
        }
    }

    fn state(&self, now: DateTime<Utc>, ttl: Duration) -> CacheState {
        let refreshing = self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.status.has_changed().is_ok());

        match &self.entry {
            None => CacheState::Empty,
            Some(_) if refreshing => CacheState::Refreshing,
            Some(entry) if entry.is_fresh(now, ttl) => CacheState::Fresh,
            Some(_) => CacheState::Stale,
        }
    }
}

fn debug_check_transition(key: &CacheKey, from: CacheState, to: CacheState) {
    debug_assert!(
        from == to || from.can_transition_to(to),
        "illegal cache transition for {}: {} -> {}",
        key,
        from,
        to
    );
}

/// Time-bounded snapshot store keyed by [`CacheKey`]
pub struct SnapshotCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slots: RwLock<HashMap<CacheKey, Slot>>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Read path: classify the entry and hand out at most one refresh ticket
    pub async fn checkout(&self, key: &CacheKey) -> Checkout {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;
        let slot = slots.entry(key.clone()).or_default();
        slot.reap_orphaned(key);

        if let Some(entry) = slot.entry.clone() {
            if entry.is_fresh(now, self.ttl) {
                return Checkout::Fresh(entry);
            }
            let refresh = match slot.in_flight {
                Some(_) => None,
                None => Some(slot.claim(key).0),
            };
            return Checkout::Stale { entry, refresh };
        }

        match slot.waiter() {
            Some(waiter) => Checkout::Miss {
                refresh: None,
                waiter,
            },
            None => {
                let (ticket, waiter) = slot.claim(key);
                Checkout::Miss {
                    refresh: Some(ticket),
                    waiter,
                }
            }
        }
    }

    /// Join the running refresh for `key`, or claim a new one regardless of freshness
    pub async fn claim_refresh(&self, key: &CacheKey) -> (Option<RefreshTicket>, RefreshWaiter) {
        let mut slots = self.slots.write().await;
        let slot = slots.entry(key.clone()).or_default();
        slot.reap_orphaned(key);

        match slot.waiter() {
            Some(waiter) => (None, waiter),
            None => {
                let (ticket, waiter) = slot.claim(key);
                (Some(ticket), waiter)
            }
        }
    }

    /// Install the snapshot produced for `ticket` and wake its waiters
    ///
    /// A result is installed only if no newer cycle has already replaced the
    /// entry and the key was not invalidated after the ticket was claimed.
    /// Returns the snapshot waiters received and whether it was installed.
    pub async fn complete(
        &self,
        ticket: RefreshTicket,
        snapshot: DashboardSnapshot,
    ) -> (Arc<DashboardSnapshot>, bool) {
        let snapshot = Arc::new(snapshot);
        let now = self.clock.now();
        let mut slots = self.slots.write().await;
        let slot = slots.entry(ticket.key.clone()).or_default();
        let before = slot.state(now, self.ttl);
        slot.release(ticket.cycle);

        let superseded = ticket.cycle < slot.floor
            || slot
                .entry
                .as_ref()
                .is_some_and(|e| e.cycle > ticket.cycle);

        let delivered = if superseded {
            debug!(
                key = %ticket.key,
                cycle = ticket.cycle,
                "discarding result of superseded cycle"
            );
            slot.entry
                .as_ref()
                .map(|e| e.snapshot.clone())
                .unwrap_or_else(|| snapshot.clone())
        } else {
            slot.entry = Some(CacheEntry {
                snapshot: snapshot.clone(),
                computed_at: snapshot.computed_at,
                cycle: ticket.cycle,
            });
            snapshot
        };
        debug_check_transition(&ticket.key, before, slot.state(now, self.ttl));

        ticket
            .status
            .send_replace(RefreshStatus::Ready(delivered.clone()));
        (delivered, !superseded)
    }

    /// Give up on `ticket`; the existing entry (if any) stays untouched
    pub async fn abandon(&self, ticket: RefreshTicket, reason: impl Into<String>) {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(&ticket.key) {
            let before = slot.state(now, self.ttl);
            slot.release(ticket.cycle);
            debug_check_transition(&ticket.key, before, slot.state(now, self.ttl));
        }
        ticket.status.send_replace(RefreshStatus::Failed(reason.into()));
    }

    /// Drop the entry for `key`; cycles claimed before this call are never installed
    ///
    /// A running cycle keeps its marker until it finishes, so no second cycle
    /// can start for `key` in the meantime. Readers arriving before it
    /// finishes get a superseded waiter.
    pub async fn invalidate(&self, key: &CacheKey) {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(key) {
            let before = slot.state(now, self.ttl);
            slot.entry = None;
            slot.floor = slot.next_cycle + 1;
            debug_check_transition(key, before, CacheState::Empty);
            debug!(key = %key, "snapshot cache entry invalidated");
        }
    }

    /// Current entry regardless of age
    pub async fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        let slots = self.slots.read().await;
        slots.get(key).and_then(|s| s.entry.clone())
    }

    pub async fn state(&self, key: &CacheKey) -> CacheState {
        let now = self.clock.now();
        let slots = self.slots.read().await;
        slots
            .get(key)
            .map_or(CacheState::Empty, |slot| slot.state(now, self.ttl))
    }
}
