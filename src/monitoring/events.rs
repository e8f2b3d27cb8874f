use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Buffer depth granted to every stream subscriber.
pub const SUBSCRIBER_BUFFER: usize = 16;

pub const EVENT_STATUS_CHANGE: &str = "status_change";
pub const EVENT_SSL_EXPIRY: &str = "ssl_expiry";

/// One live update pushed to stream subscribers. A plain probe carries an
/// empty `event_type`; transitions and certificate indications set it.
#[derive(Debug, Clone, Serialize)]
pub struct Update {
    pub monitor_id: i64,
    pub checked_at: DateTime<Utc>,
    pub online: bool,
    pub status_code: i32,
    pub response_ms: i32,
    pub error: String,
    pub event_type: String,
    pub message: String,
    pub monitor_name: String,
}

/// In-process fan-out from the probe pipeline to any number of stream
/// subscribers. Publishing never blocks: a subscriber whose buffer is full
/// simply misses that update, everyone else is unaffected.
pub struct EventBus {
    inner: Mutex<BusInner>,
}

struct BusInner {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::Sender<Update>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(EventBus {
            inner: Mutex::new(BusInner {
                next_id: 0,
                subscribers: HashMap::new(),
            }),
        })
    }

    /// Registers a subscriber and hands back its receiving end wrapped in a
    /// guard that deregisters on drop.
    pub fn subscribe(self: &Arc<Self>) -> EventSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = {
            let mut inner = self.inner.lock().unwrap();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.subscribers.insert(id, tx);
            id
        };
        EventSubscription {
            bus: Arc::clone(self),
            id,
            rx,
        }
    }

    pub fn publish(&self, update: Update) {
        let inner = self.inner.lock().unwrap();
        for (id, tx) in inner.subscribers.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(update.clone()) {
                debug!(subscriber = id, monitor_id = update.monitor_id, "事件缓冲已满，丢弃更新");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }

    fn unsubscribe(&self, id: u64) {
        self.inner.lock().unwrap().subscribers.remove(&id);
    }
}

/// Receiving side of a bus registration. Dropping it releases the
/// subscriber's slot deterministically.
pub struct EventSubscription {
    bus: Arc<EventBus>,
    id: u64,
    rx: mpsc::Receiver<Update>,
}

impl EventSubscription {
    pub async fn recv(&mut self) -> Option<Update> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Update, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
        debug!(subscriber = self.id, "事件订阅已释放");
    }
}

impl tokio_stream::Stream for EventSubscription {
    type Item = Update;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Update>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Update {
    /// A plain per-probe update with no event annotation.
    pub fn probe(
        monitor_id: i64,
        monitor_name: &str,
        checked_at: DateTime<Utc>,
        online: bool,
        status_code: Option<i32>,
        response_ms: i32,
        error: &str,
    ) -> Self {
        Update {
            monitor_id,
            checked_at,
            online,
            status_code: status_code.unwrap_or(0),
            response_ms,
            error: error.to_string(),
            event_type: String::new(),
            message: String::new(),
            monitor_name: monitor_name.to_string(),
        }
    }

    pub fn with_event(mut self, event_type: &str, message: &str) -> Self {
        self.event_type = event_type.to_string();
        self.message = message.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(id: i64) -> Update {
        Update::probe(id, "demo", Utc::now(), true, Some(200), 12, "")
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.publish(update(1));
        bus.publish(update(2));
        assert_eq!(sub.recv().await.unwrap().monitor_id, 1);
        assert_eq!(sub.recv().await.unwrap().monitor_id, 2);
    }

    #[tokio::test]
    async fn overflow_drops_only_for_the_slow_subscriber() {
        let bus = EventBus::new();
        let mut slow = bus.subscribe();
        let mut fast = bus.subscribe();

        for i in 0..(SUBSCRIBER_BUFFER as i64 + 4) {
            bus.publish(update(i));
            // Keep the fast subscriber drained so its buffer never fills.
            while fast.try_recv().is_ok() {}
        }

        let mut received = 0;
        while slow.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_BUFFER);
    }

    #[tokio::test]
    async fn drop_releases_the_slot() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn update_with_space_is_always_delivered() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        for i in 0..SUBSCRIBER_BUFFER as i64 {
            bus.publish(update(i));
        }
        for i in 0..SUBSCRIBER_BUFFER as i64 {
            assert_eq!(sub.recv().await.unwrap().monitor_id, i);
        }
    }
}
