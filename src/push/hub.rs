//! In-process fan-out of change events to subscribers.

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use crate::error::Result;
use crate::events::ChangeEvent;

use super::types::{PushTransport, StreamFilter, SubscriptionHandle, SubscriptionId, Topic};

/// Default per-subscription event buffer.
const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Internal subscription state.
struct Subscription {
    topic: Topic,
    filter: StreamFilter,
    sender: Sender<ChangeEvent>,
}

impl Subscription {
    fn wants(&self, topic: Topic, event: &ChangeEvent) -> bool {
        self.topic == topic && self.filter.matches(event)
    }
}

/// Bridges a backend push callback into per-subscriber bounded channels.
///
/// The publishing side calls [`EventHub::publish`] once per inbound event;
/// each engine drains its own [`SubscriptionHandle`] at its own pace. A full
/// buffer drops that subscriber's copy of the event (missed events are
/// tolerated by contract), never the subscription itself.
pub struct EventHub {
    /// Active subscriptions by id.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription ids.
    next_id: AtomicU64,
    /// Per-subscription channel capacity.
    buffer_size: usize,
    /// Events dropped due to full buffers.
    dropped: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer_size,
            dropped: AtomicU64::new(0),
        }
    }

    /// Fan an event out to every matching subscriber.
    ///
    /// Returns the number of subscribers the event was delivered to.
    pub fn publish(&self, topic: Topic, event: &ChangeEvent) -> usize {
        let mut stale = Vec::new();
        let mut delivered = 0;

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if !sub.wants(topic, event) {
                    continue;
                }
                match sub.sender.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            subscription = id.0,
                            topic = ?topic,
                            "subscriber buffer full, event dropped"
                        );
                    }
                    Err(TrySendError::Disconnected(_)) => stale.push(*id),
                }
            }
        }

        // Receivers dropped without release are pruned lazily.
        if !stale.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in stale {
                subs.remove(&id);
            }
        }

        delivered
    }

    /// Number of open subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Total events dropped because a subscriber's buffer was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl PushTransport for EventHub {
    fn subscribe(&self, topic: Topic, filter: StreamFilter) -> Result<SubscriptionHandle> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.buffer_size);

        self.subscriptions.write().insert(
            id,
            Subscription {
                topic,
                filter,
                sender,
            },
        );

        Ok(SubscriptionHandle { id, receiver })
    }

    fn release(&self, id: SubscriptionId) {
        self.subscriptions.write().remove(&id);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
