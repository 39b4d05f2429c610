//! Fan-out hub for job lifecycle events.
//!
//! One dispatcher task drains a bounded broadcast channel and forwards
//! each event into every subscriber's own bounded buffer. Subscribers are
//! untrusted network clients: a slow consumer gets evicted, never lets it
//! stall publishers, and no subscriber I/O ever happens while the
//! subscriber set is locked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::events::JobEvent;

/// Events buffered between publishers and the dispatcher.
const BROADCAST_BUFFER: usize = 256;
/// Events buffered per subscriber before eviction.
const SUBSCRIBER_BUFFER: usize = 64;

/// A registered subscriber's receiving end. Dropping the receiver gets the
/// subscriber evicted on the next delivery.
pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<JobEvent>,
}

#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    subscribers: RwLock<HashMap<u64, mpsc::Sender<JobEvent>>>,
    broadcast_tx: mpsc::Sender<JobEvent>,
    broadcast_rx: Mutex<Option<mpsc::Receiver<JobEvent>>>,
    next_id: AtomicU64,
    done: CancellationToken,
    subscriber_buffer: usize,
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacities(BROADCAST_BUFFER, SUBSCRIBER_BUFFER)
    }

    /// Hub with explicit channel capacities (tests shrink them to force
    /// the overflow paths).
    pub fn with_capacities(broadcast_buffer: usize, subscriber_buffer: usize) -> Self {
        let (broadcast_tx, broadcast_rx) = mpsc::channel(broadcast_buffer.max(1));
        Self {
            inner: Arc::new(HubInner {
                subscribers: RwLock::new(HashMap::new()),
                broadcast_tx,
                broadcast_rx: Mutex::new(Some(broadcast_rx)),
                next_id: AtomicU64::new(1),
                done: CancellationToken::new(),
                subscriber_buffer: subscriber_buffer.max(1),
            }),
        }
    }

    /// Queue an event for delivery. Never blocks: delivery is best-effort,
    /// and a backed-up dispatcher drops the event with a warning.
    pub fn broadcast(&self, event: JobEvent) {
        match self.inner.broadcast_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    kind = event.kind.as_str(),
                    "event hub broadcast buffer full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Register a subscriber with its own bounded outbound buffer.
    pub async fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.subscriber_buffer);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.write().await.insert(id, tx);
        debug!(subscriber_id = id, "event hub subscriber registered");
        Subscription { id, receiver: rx }
    }

    pub async fn unsubscribe(&self, id: u64) {
        if self.inner.subscribers.write().await.remove(&id).is_some() {
            debug!(subscriber_id = id, "event hub subscriber removed");
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().await.len()
    }

    /// Stop the dispatcher. Idempotent.
    pub fn stop(&self) {
        self.inner.done.cancel();
    }

    /// Dispatcher loop; the manager spawns exactly one per hub. A second
    /// call returns immediately.
    pub async fn run(self) {
        let mut broadcast_rx = match self.inner.broadcast_rx.lock().await.take() {
            Some(rx) => rx,
            None => return,
        };

        loop {
            tokio::select! {
                _ = self.inner.done.cancelled() => break,
                event = broadcast_rx.recv() => match event {
                    Some(event) => self.deliver(event).await,
                    None => break,
                },
            }
        }

        debug!("event hub dispatcher stopped");
    }

    async fn deliver(&self, event: JobEvent) {
        // try_send only under the read guard; stale subscribers are
        // collected here and removed under the write guard afterwards,
        // never by upgrading mid-iteration.
        let mut stale = Vec::new();
        {
            let subscribers = self.inner.subscribers.read().await;
            for (id, tx) in subscribers.iter() {
                if tx.try_send(event.clone()).is_err() {
                    stale.push(*id);
                }
            }
        }

        if stale.is_empty() {
            return;
        }
        let mut subscribers = self.inner.subscribers.write().await;
        for id in stale {
            subscribers.remove(&id);
            warn!(subscriber_id = id, "evicting slow event hub subscriber");
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::kernel::scheduler::events::JobEventKind;
    use crate::kernel::scheduler::job::{Job, JobType};

    fn event(n: i64) -> JobEvent {
        JobEvent::new(
            JobEventKind::JobQueued,
            Job::new(JobType::Eod, "BHP.AU", 10, 3),
            n,
        )
    }

    async fn recv_with_timeout(sub: &mut Subscription) -> Option<JobEvent> {
        tokio::time::timeout(Duration::from_secs(1), sub.receiver.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber_in_order() {
        let hub = EventHub::new();
        let dispatcher = tokio::spawn(hub.clone().run());

        let mut first = hub.subscribe().await;
        let mut second = hub.subscribe().await;

        hub.broadcast(event(1));
        hub.broadcast(event(2));

        for sub in [&mut first, &mut second] {
            let a = recv_with_timeout(sub).await.unwrap();
            let b = recv_with_timeout(sub).await.unwrap();
            assert_eq!(a.queue_size, 1);
            assert_eq!(b.queue_size, 2);
        }

        hub.stop();
        dispatcher.await.unwrap();
    }

    #[tokio::test]
    async fn slow_subscriber_is_evicted() {
        let hub = EventHub::with_capacities(16, 1);
        let dispatcher = tokio::spawn(hub.clone().run());

        let mut fast = hub.subscribe().await;
        let slow = hub.subscribe().await;

        // the slow subscriber never drains: its one-slot buffer fills on
        // the first event and the second broadcast evicts it. Draining
        // `fast` between broadcasts keeps its buffer clear and proves the
        // first delivery finished before the second begins.
        hub.broadcast(event(1));
        assert!(recv_with_timeout(&mut fast).await.is_some());
        hub.broadcast(event(2));
        assert!(recv_with_timeout(&mut fast).await.is_some());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while hub.subscriber_count().await > 1 {
            assert!(tokio::time::Instant::now() < deadline, "eviction timed out");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // later broadcasts no longer reach the evicted subscriber
        hub.broadcast(event(3));
        assert!(recv_with_timeout(&mut fast).await.is_some());
        drop(slow);

        hub.stop();
        dispatcher.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_receiver_is_cleaned_up_on_delivery() {
        let hub = EventHub::new();
        let dispatcher = tokio::spawn(hub.clone().run());

        let sub = hub.subscribe().await;
        drop(sub);
        assert_eq!(hub.subscriber_count().await, 1);

        hub.broadcast(event(1));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while hub.subscriber_count().await > 0 {
            assert!(tokio::time::Instant::now() < deadline, "cleanup timed out");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        hub.stop();
        dispatcher.await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_bounded() {
        let hub = EventHub::new();
        let dispatcher = tokio::spawn(hub.clone().run());

        hub.stop();
        hub.stop();

        tokio::time::timeout(Duration::from_secs(1), dispatcher)
            .await
            .expect("dispatcher exits after stop")
            .unwrap();

        // broadcasting into a stopped hub must not panic
        hub.broadcast(event(1));
    }

    #[tokio::test]
    async fn second_run_returns_immediately() {
        let hub = EventHub::new();
        let dispatcher = tokio::spawn(hub.clone().run());
        tokio::task::yield_now().await;

        // the receiver is already taken, so this is a no-op
        hub.clone().run().await;

        hub.stop();
        dispatcher.await.unwrap();
    }

    #[tokio::test]
    async fn unsubscribe_removes_subscriber() {
        let hub = EventHub::new();
        let sub = hub.subscribe().await;
        assert_eq!(hub.subscriber_count().await, 1);

        hub.unsubscribe(sub.id).await;
        assert_eq!(hub.subscriber_count().await, 0);
    }
}
