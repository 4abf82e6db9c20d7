//! Broadcast Bus
//!
//! Multicast channel with one logical producer side and any number of
//! independent subscribers. Each subscriber sees every item sent after it
//! attached, in send order. The buffer is a bounded ring
//! (`tokio::sync::broadcast`) with a cursor per subscriber: a subscriber
//! that falls more than `capacity` items behind loses its oldest items, which
//! are counted in [`BusMetrics::lagged`]. The sender and the other
//! subscribers are never stalled by a slow one.
//!
//! # Lock Ordering
//!
//! `send` holds the sender slot for reading while it counts and enqueues,
//! `subscribe` and `close` take it for writing. A subscriber's baseline (the
//! number of items sent before it attached) is therefore exact, which is what
//! transformers rely on to know when they have drained their input.

use crate::error::{Result, TransmissionError};
use futures::stream::{self, Stream};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

/// Per-bus counters
#[derive(Debug, Default)]
pub struct BusMetrics {
    /// Items accepted by `send`
    pub sent: AtomicU64,
    /// Items skipped by lagging subscribers
    pub lagged: AtomicU64,
}

/// Snapshot of [`BusMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub sent: u64,
    pub lagged: u64,
}

impl BusMetrics {
    pub fn snapshot(&self) -> BusStats {
        BusStats {
            sent: self.sent.load(Ordering::SeqCst),
            lagged: self.lagged.load(Ordering::Relaxed),
        }
    }
}

struct BusShared<T> {
    name: &'static str,
    sender: RwLock<Option<broadcast::Sender<T>>>,
    metrics: Arc<BusMetrics>,
}

/// Create a bus, returning its producer and output sides
pub fn channel<T: Clone + Send + 'static>(
    name: &'static str,
    capacity: usize,
) -> (BusProducer<T>, BusOutput<T>) {
    let (sender, _) = broadcast::channel(capacity.max(1));
    let shared = Arc::new(BusShared {
        name,
        sender: RwLock::new(Some(sender)),
        metrics: Arc::new(BusMetrics::default()),
    });
    (
        BusProducer {
            shared: shared.clone(),
        },
        BusOutput { shared },
    )
}

/// Sending side of a bus
pub struct BusProducer<T> {
    shared: Arc<BusShared<T>>,
}

impl<T> Clone for BusProducer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> BusProducer<T> {
    /// Enqueue an item for every current subscriber.
    ///
    /// Returns how many subscribers will see it; zero subscribers is not an
    /// error. Fails only once the bus is closed.
    pub fn send(&self, item: T) -> Result<usize> {
        let guard = self.shared.sender.read();
        let sender = guard
            .as_ref()
            .ok_or(TransmissionError::BusClosed(self.shared.name))?;
        self.shared.metrics.sent.fetch_add(1, Ordering::SeqCst);
        match sender.send(item) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                debug!(bus = self.shared.name, "No subscribers for item");
                Ok(0)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    pub fn is_closed(&self) -> bool {
        self.shared.sender.read().is_none()
    }
}

/// Subscribable side of a bus
pub struct BusOutput<T> {
    shared: Arc<BusShared<T>>,
}

impl<T> Clone for BusOutput<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> BusOutput<T> {
    /// Attach a new subscriber. It sees only items sent from now on.
    ///
    /// Subscribing to a closed bus yields a subscriber that is already finished.
    pub fn subscribe(&self) -> BusSubscriber<T> {
        let guard = self.shared.sender.write();
        let baseline = self.shared.metrics.sent.load(Ordering::SeqCst);
        let receiver = match guard.as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(1);
                drop(sender);
                receiver
            }
        };
        BusSubscriber {
            name: self.shared.name,
            receiver,
            metrics: self.shared.metrics.clone(),
            baseline,
            position: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.shared.name
    }
}

/// Receiving view of a bus with its own cursor
pub struct BusSubscriber<T> {
    name: &'static str,
    receiver: broadcast::Receiver<T>,
    metrics: Arc<BusMetrics>,
    baseline: u64,
    position: u64,
}

impl<T: Clone + Send + 'static> BusSubscriber<T> {
    /// Next item in send order, or `None` once the bus is closed and drained
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(item) => {
                    self.position += 1;
                    return Some(item);
                }
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next item if one is already buffered
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.try_recv() {
                Ok(item) => {
                    self.position += 1;
                    return Some(item);
                }
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = T> + Send + Unpin
    where
        T: Sync,
    {
        Box::pin(stream::unfold(self, |mut subscriber| async move {
            subscriber.recv().await.map(|item| (item, subscriber))
        }))
    }

    /// Items sent on the bus before this subscriber attached
    pub fn baseline(&self) -> u64 {
        self.baseline
    }

    /// Items this subscriber has moved past, received or skipped
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn metrics(&self) -> Arc<BusMetrics> {
        self.metrics.clone()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn record_lag(&mut self, skipped: u64) {
        self.position += skipped;
        self.metrics.lagged.fetch_add(skipped, Ordering::Relaxed);
        warn!(bus = self.name, skipped, "Subscriber lagged, oldest items dropped");
    }
}

/// Owning handle for one bus
pub struct Broadcast<T> {
    producer: BusProducer<T>,
    output: BusOutput<T>,
}

impl<T: Clone + Send + 'static> Broadcast<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (producer, output) = channel(name, capacity);
        Self { producer, output }
    }

    pub fn producer(&self) -> BusProducer<T> {
        self.producer.clone()
    }

    pub fn output(&self) -> BusOutput<T> {
        self.output.clone()
    }

    pub fn send(&self, item: T) -> Result<usize> {
        self.producer.send(item)
    }

    pub fn subscribe(&self) -> BusSubscriber<T> {
        self.output.subscribe()
    }

    /// Stop accepting items. Subscribers drain what they hold, then finish.
    pub fn close(&self) {
        let sender = self.producer.shared.sender.write().take();
        if sender.is_some() {
            debug!(bus = self.producer.shared.name, "Bus closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.producer.is_closed()
    }

    pub fn name(&self) -> &'static str {
        self.producer.shared.name
    }

    pub fn stats(&self) -> BusStats {
        self.producer.shared.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_without_subscribers_is_ok() {
        let bus: Broadcast<u32> = Broadcast::new("test", 8);
        assert_eq!(bus.send(1).unwrap(), 0);
        assert_eq!(bus.stats().sent, 1);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_drops_oldest() {
        let bus: Broadcast<u32> = Broadcast::new("test", 2);
        let mut slow = bus.subscribe();
        for i in 0..5 {
            bus.send(i).unwrap();
        }
        // Capacity 2: items 0..=2 were overwritten before the first read
        assert_eq!(slow.recv().await, Some(3));
        assert_eq!(slow.recv().await, Some(4));
        assert_eq!(bus.stats().lagged, 3);
        assert_eq!(slow.position(), 5);
    }

    #[tokio::test]
    async fn test_closed_bus_rejects_send_and_finishes_subscribers() {
        let bus: Broadcast<u32> = Broadcast::new("test", 8);
        let mut early = bus.subscribe();
        bus.send(7).unwrap();
        bus.close();
        bus.close();

        assert!(matches!(bus.send(8), Err(TransmissionError::BusClosed("test"))));
        assert_eq!(early.recv().await, Some(7));
        assert_eq!(early.recv().await, None);

        let mut late = bus.subscribe();
        assert_eq!(late.recv().await, None);
    }

    #[tokio::test]
    async fn test_baseline_counts_earlier_items() {
        let bus: Broadcast<u32> = Broadcast::new("test", 8);
        bus.send(1).unwrap();
        bus.send(2).unwrap();
        let mut subscriber = bus.subscribe();
        assert_eq!(subscriber.baseline(), 2);
        assert_eq!(subscriber.try_recv(), None);
    }
}
