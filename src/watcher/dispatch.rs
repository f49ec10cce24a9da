//! Event delivery.
//!
//! The tracker only sees the [`Dispatcher`] trait. [`EventBus`] is the stock
//! implementation: an ordered list of awaited [`Subscriber`]s plus a
//! broadcast channel for listeners that only want to observe.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::{OraError, OraResult};
use crate::watcher::event::{Event, EventKind};

pub type SubscriptionId = Uuid;

/// Delivers one event to every interested party.
///
/// The returned future resolves once delivery is complete; its value is the
/// number of subscribers that handled the event.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, event: Event) -> OraResult<usize>;
}

#[async_trait]
impl<T: Dispatcher + ?Sized> Dispatcher for Arc<T> {
    async fn dispatch(&self, event: Event) -> OraResult<usize> {
        (**self).dispatch(event).await
    }
}

/// A downstream consumer of change events (indexer, UI refresher, sync agent).
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn handle(&self, event: &Event) -> OraResult<()>;
}

pub struct EventBus {
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn Subscriber>)>>,
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a bus whose broadcast channel buffers `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            subscribers: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// Registers a subscriber; it runs after every subscriber registered
    /// before it.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, subscriber));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Opens a passive receiver. It sees every event that all subscribers
    /// accepted; a lagging receiver loses the oldest events.
    pub fn listen(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    fn current_subscribers(&self) -> Vec<(SubscriptionId, Arc<dyn Subscriber>)> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Dispatcher for EventBus {
    async fn dispatch(&self, event: Event) -> OraResult<usize> {
        debug!(kind = %event.kind(), entry = ?event.name(), "dispatching event");

        let subscribers = self.current_subscribers();
        for (id, subscriber) in &subscribers {
            subscriber
                .handle(&event)
                .await
                .map_err(|source| OraError::Dispatch {
                    subscriber: *id,
                    source: Box::new(source),
                })?;
        }

        // No receivers is not an error.
        let _ = self.sender.send(event);
        Ok(subscribers.len())
    }
}

/// A subscriber that records every event it sees.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Event::kind)
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl Subscriber for EventLog {
    async fn handle(&self, event: &Event) -> OraResult<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
