//! Fan-out of portal events to scoped listeners.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tracing::debug;

/// Handle of a browsing context opened for a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

/// Something the requesting application observes while a portal is open.
#[derive(Clone, Debug, PartialEq)]
pub enum PortalEvent {
    /// A posted message, with the context that sent it and its origin.
    Message {
        source: ContextId,
        origin: String,
        data: JsonValue,
    },
    /// The user closed the portal context.
    Closed { source: ContextId },
}

/// Delivers every posted event to every live [`Subscription`].
///
/// Clones share the same listener table. A listener is registered by
/// [`MessageHub::subscribe`] and removed when its subscription is dropped.
#[derive(Clone, Default)]
pub struct MessageHub {
    inner: Arc<HubInner>,
}

type Listeners = HashMap<u64, mpsc::UnboundedSender<PortalEvent>>;

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    listeners: Mutex<Listeners>,
}

impl HubInner {
    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MessageHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.listeners().insert(id, tx);
        debug!(listener = id, "registered portal listener");
        Subscription {
            id,
            rx,
            hub: Arc::clone(&self.inner),
        }
    }

    /// Deliver `event` to every registered listener.
    pub fn post(&self, event: PortalEvent) {
        let mut listeners = self.inner.listeners();
        listeners.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }
}

/// A registered listener. Dropping it deregisters the listener.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<PortalEvent>,
    hub: Arc<HubInner>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<PortalEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.listeners().remove(&self.id);
        debug!(listener = self.id, "deregistered portal listener");
    }
}
