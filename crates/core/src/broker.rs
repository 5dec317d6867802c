//! Fan-out of ledger mutations to watch subscribers.
//!
//! Every published [`WatchEvent`] is appended to a fixed-size replay ring and
//! offered to each subscriber's bounded queue. Publishing never waits: a
//! subscriber whose queue is full is dropped from the broker, which closes its
//! queue once drained and forces the owner to reconnect and re-snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use metrics::{counter, gauge};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::job::Version;
use crate::protocol::WatchEvent;

/// Identifier handed to each subscription.
pub type SubscriberId = u64;

/// Default number of events retained for resume.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1024;

/// Default per-subscriber queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Arena of the most recent events, indexed by `version % capacity`.
///
/// Versions in the ring are always contiguous: `oldest..=newest`.
#[derive(Debug)]
pub struct ReplayRing {
    slots: Vec<Option<WatchEvent>>,
    oldest: Version,
    newest: Version,
}

impl ReplayRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            oldest: 0,
            newest: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Oldest retained version, `None` while empty.
    pub fn oldest(&self) -> Option<Version> {
        (self.oldest > 0).then_some(self.oldest)
    }

    /// Newest retained version, 0 while empty.
    pub fn newest(&self) -> Version {
        self.newest
    }

    pub fn len(&self) -> usize {
        if self.oldest == 0 {
            0
        } else {
            (self.newest - self.oldest + 1) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, version: Version) -> usize {
        (version % self.slots.len() as u64) as usize
    }

    /// Append an event. A version that does not directly follow `newest`
    /// restarts coverage at that event.
    pub fn push(&mut self, event: WatchEvent) {
        let version = event.version;
        if version == 0 || (self.oldest != 0 && version <= self.newest) {
            tracing::error!(
                version,
                newest = self.newest,
                "replay ring rejected non-increasing version"
            );
            return;
        }
        if self.oldest == 0 || version != self.newest + 1 {
            self.slots.iter_mut().for_each(|slot| *slot = None);
            self.oldest = version;
        }
        let idx = self.slot(version);
        self.slots[idx] = Some(event);
        self.newest = version;
        if self.len() > self.slots.len() {
            self.oldest = self.newest + 1 - self.slots.len() as u64;
        }
    }

    /// Whether every event after `since` is still retained.
    pub fn covers(&self, since: Version) -> bool {
        since > 0 && self.oldest > 0 && since + 1 >= self.oldest && since <= self.newest
    }

    /// Retained events with a version greater than `since`, oldest first.
    pub fn events_after(&self, since: Version) -> Vec<WatchEvent> {
        if self.oldest == 0 {
            return Vec::new();
        }
        let from = since.saturating_add(1).max(self.oldest);
        (from..=self.newest)
            .filter_map(|v| self.slots[self.slot(v)].clone())
            .collect()
    }
}

struct BrokerInner {
    ring: ReplayRing,
    subscribers: HashMap<SubscriberId, mpsc::Sender<WatchEvent>>,
    next_id: SubscriberId,
}

/// Broadcasts ledger mutations to subscribers with best-effort replay.
pub struct WatchBroker {
    inner: Mutex<BrokerInner>,
    queue_capacity: usize,
}

impl WatchBroker {
    pub fn new(replay_capacity: usize, queue_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BrokerInner {
                ring: ReplayRing::new(replay_capacity),
                subscribers: HashMap::new(),
                next_id: 1,
            }),
            queue_capacity: queue_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerInner> {
        self.inner.lock().unwrap_or_else(|e: PoisonError<_>| {
            tracing::error!("broker mutex poisoned, recovering");
            e.into_inner()
        })
    }

    /// Register a subscriber resuming after `since`.
    ///
    /// When `since` is inside the replay ring the queue is pre-filled with
    /// every retained event newer than `since` and `resume_ok()` is true.
    /// Otherwise the queue only receives events published from now on and the
    /// caller must cover the gap with a snapshot.
    pub fn subscribe(self: &Arc<Self>, since: Version) -> Subscription {
        let mut inner = self.lock();
        let resume_ok = inner.ring.covers(since);
        let replay = if resume_ok {
            inner.ring.events_after(since)
        } else {
            Vec::new()
        };

        let (tx, rx) = mpsc::channel(self.queue_capacity + replay.len());
        for event in replay {
            // Capacity was sized for the replay; this cannot be full.
            let _ = tx.try_send(event);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, tx);
        gauge!("jobwatch_broker_subscribers").set(inner.subscribers.len() as f64);

        tracing::debug!(
            subscriber_id = id,
            since,
            resume_ok,
            oldest = ?inner.ring.oldest(),
            newest = inner.ring.newest(),
            "watch subscriber registered"
        );

        Subscription {
            id,
            rx,
            resume_ok,
            broker: Arc::clone(self),
        }
    }

    /// Publish one mutation. Never blocks on subscribers.
    pub fn publish(&self, event: WatchEvent) {
        let mut inner = self.lock();
        inner.ring.push(event.clone());

        let mut evicted = Vec::new();
        for (id, tx) in inner.subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        subscriber_id = *id,
                        version = event.version,
                        "watch subscriber queue full, disconnecting slow subscriber"
                    );
                    counter!("jobwatch_broker_subscribers_evicted_total").increment(1);
                    evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => evicted.push(*id),
            }
        }

        if !evicted.is_empty() {
            for id in evicted {
                inner.subscribers.remove(&id);
            }
            gauge!("jobwatch_broker_subscribers").set(inner.subscribers.len() as f64);
        }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut inner = self.lock();
        let removed = inner.subscribers.remove(&id).is_some();
        if removed {
            gauge!("jobwatch_broker_subscribers").set(inner.subscribers.len() as f64);
            tracing::debug!(subscriber_id = id, "watch subscriber unregistered");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn oldest_retained(&self) -> Option<Version> {
        self.lock().ring.oldest()
    }

    pub fn newest(&self) -> Version {
        self.lock().ring.newest()
    }
}

impl Default for WatchBroker {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_CAPACITY, DEFAULT_QUEUE_CAPACITY)
    }
}

/// A registered subscriber's queue. Dropping it unregisters the subscriber.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<WatchEvent>,
    resume_ok: bool,
    broker: Arc<WatchBroker>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether the replay ring covered the requested resume point.
    pub fn resume_ok(&self) -> bool {
        self.resume_ok
    }

    /// Next event. `None` once the broker has disconnected this subscriber
    /// and the remaining queue is drained.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<WatchEvent> {
        self.rx.try_recv().ok()
    }

    /// Unregister and release the queue.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broker.unsubscribe(self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("resume_ok", &self.resume_ok)
            .finish()
    }
}
