//! Periodic snapshot publisher and subscriber fan-out.
//!
//! Each tick sweeps the store, takes an ordered snapshot copy, and pushes
//! one immutable payload to every registered subscriber. Fan-out uses
//! bounded per-subscriber buffers with `try_send`: a subscriber that cannot
//! keep up is skipped for the tick, a closed one is pruned. The store lock
//! is released before any payload leaves the hub.

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};

use sbs_core::filter;
use sbs_core::payload::{AircraftView, OutboundMessage};
use sbs_core::store::AircraftStore;

/// The single shared mutable structure between ingestion and publishing.
pub type SharedStore = Arc<RwLock<AircraftStore>>;

/// Per-subscriber buffer depth; a subscriber further behind than this is
/// skipped until it drains.
const SUBSCRIBER_BUFFER: usize = 32;

pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

// ---------------------------------------------------------------------------
// Subscriber hub
// ---------------------------------------------------------------------------

/// Registry of subscriber channels. Registration hands back the receiving
/// end; the session task forwarding to the transport owns it from there.
pub struct SubscriberHub {
    senders: Mutex<Vec<mpsc::Sender<Arc<OutboundMessage>>>>,
}

impl SubscriberHub {
    pub fn new() -> Self {
        SubscriberHub {
            senders: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self) -> mpsc::Receiver<Arc<OutboundMessage>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.senders.lock().unwrap().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().unwrap().len()
    }

    /// Push one payload to every registered subscriber without blocking.
    /// Returns the number of subscribers that accepted it.
    pub fn broadcast(&self, msg: Arc<OutboundMessage>) -> usize {
        let mut senders = self.senders.lock().unwrap();
        let mut delivered = 0;
        senders.retain(|tx| match tx.try_send(msg.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            // Buffer full: skip this tick, keep the subscriber.
            Err(mpsc::error::TrySendError::Full(_)) => true,
            // Receiver gone: deregister.
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        delivered
    }
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Timer-driven snapshot broadcaster.
pub struct Publisher {
    pub store: SharedStore,
    pub hub: Arc<SubscriberHub>,
    pub interval: Duration,
    pub expiry_secs: f64,
    pub trusted_only: bool,
}

impl Publisher {
    /// Run until the shutdown flag flips. The timer fires on every tick;
    /// whether anything is sent is up to `tick`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(now());
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    /// One publish cycle with an injected clock. Sweeps expired records,
    /// snapshots, and broadcasts. An empty snapshot suppresses the
    /// broadcast entirely — subscribers only hear from the publisher when
    /// there is aircraft data to show.
    pub fn tick(&self, now: f64) -> Option<Arc<OutboundMessage>> {
        let views: Vec<AircraftView> = {
            let mut store = self.store.write().unwrap();
            store.sweep_expired(now, self.expiry_secs);
            let snap = if self.trusted_only {
                filter::trusted_snapshot(&store, now, self.expiry_secs)
            } else {
                store.snapshot(now, self.expiry_secs)
            };
            snap.iter()
                .map(|r| AircraftView::from_record(r, now))
                .collect()
        }; // store lock dropped before fan-out

        if views.is_empty() {
            return None;
        }

        let msg = Arc::new(OutboundMessage::snapshot(views, now));
        self.hub.broadcast(msg.clone());
        Some(msg)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
