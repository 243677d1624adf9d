//! Notification hub: per-request and per-collection subscriptions.
//!
//! Deliveries go through unbounded channels so publishing never waits on a
//! slow subscriber. The store publishes while it still holds its write lock,
//! which keeps every subscriber's view in transition order.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use vproc_models::{Request, RequestId, RequestStatus, StatusFilter};

/// Identifier of an open subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Delivery on a single-request subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestEvent {
    /// New snapshot after a transition (or the initial snapshot)
    Updated(Request),
    /// The request was deleted; the subscription ends after this
    Removed(Request),
}

impl RequestEvent {
    pub fn request(&self) -> &Request {
        match self {
            RequestEvent::Updated(request) | RequestEvent::Removed(request) => request,
        }
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, RequestEvent::Removed(_))
    }
}

struct Slot<T> {
    tx: mpsc::UnboundedSender<T>,
    closed: Arc<AtomicBool>,
}

impl<T> Slot<T> {
    fn deliver(&self, item: T) -> bool {
        !self.closed.load(Ordering::Acquire) && self.tx.send(item).is_ok()
    }
}

#[derive(Default)]
struct Registry {
    by_request: HashMap<SubscriptionId, (RequestId, Slot<RequestEvent>)>,
    by_filter: HashMap<SubscriptionId, (StatusFilter, Slot<Vec<Request>>)>,
}

#[derive(Default)]
struct HubInner {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl HubInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: SubscriptionId) {
        let mut registry = self.registry();
        registry.by_request.remove(&id);
        registry.by_filter.remove(&id);
    }
}

/// Registry of open subscriptions.
#[derive(Clone, Default)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn handle<T>(&self, id: SubscriptionId) -> (Slot<T>, Subscription<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let slot = Slot {
            tx,
            closed: closed.clone(),
        };
        let subscription = Subscription {
            id,
            rx,
            closed,
            hub: Arc::downgrade(&self.inner),
        };
        (slot, subscription)
    }

    /// Register interest in one request, delivering `initial` first.
    pub(crate) fn subscribe_request(
        &self,
        request_id: &RequestId,
        initial: Request,
    ) -> Subscription<RequestEvent> {
        let id = self.next_id();
        let (slot, subscription) = self.handle(id);
        slot.deliver(RequestEvent::Updated(initial));

        self.inner
            .registry()
            .by_request
            .insert(id, (request_id.clone(), slot));

        debug!(subscription_id = %id, request_id = %request_id, "Request subscription opened");
        subscription
    }

    /// Register interest in a filtered collection, delivering `initial` first.
    pub(crate) fn subscribe_collection(
        &self,
        filter: StatusFilter,
        initial: Vec<Request>,
    ) -> Subscription<Vec<Request>> {
        let id = self.next_id();
        let (slot, subscription) = self.handle(id);
        slot.deliver(initial);

        self.inner.registry().by_filter.insert(id, (filter, slot));

        debug!(subscription_id = %id, filter = %filter, "Collection subscription opened");
        subscription
    }

    /// Deliver a changed request.
    ///
    /// `previous` is the status before the change (`None` for a new request)
    /// and `current` the status after it (`None` when removed). A collection
    /// subscriber is refreshed when either side matches its filter.
    pub(crate) fn publish<F>(
        &self,
        event: RequestEvent,
        previous: Option<RequestStatus>,
        current: Option<RequestStatus>,
        collection: F,
    ) where
        F: Fn(StatusFilter) -> Vec<Request>,
    {
        let mut registry = self.inner.registry();
        let request_id = event.request().id.clone();
        let removed = event.is_removed();

        let mut dropped = Vec::new();
        for (sub_id, (wanted, slot)) in registry.by_request.iter() {
            if *wanted == request_id && (!slot.deliver(event.clone()) || removed) {
                dropped.push(*sub_id);
            }
        }

        for (sub_id, (filter, slot)) in registry.by_filter.iter() {
            let affected = [previous, current]
                .into_iter()
                .flatten()
                .any(|status| filter.matches(status));

            if affected && !slot.deliver(collection(*filter)) {
                dropped.push(*sub_id);
            }
        }

        for sub_id in dropped {
            trace!(subscription_id = %sub_id, "Subscription released");
            registry.by_request.remove(&sub_id);
            registry.by_filter.remove(&sub_id);
        }
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let registry = self.inner.registry();
        registry.by_request.len() + registry.by_filter.len()
    }
}

impl fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle for an open subscription.
///
/// Closing (or dropping) the handle stops delivery immediately, including
/// for items that were already queued.
pub struct Subscription<T> {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<T>,
    closed: Arc<AtomicBool>,
    hub: Weak<HubInner>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next delivery. `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<T> {
        if self.is_closed() {
            return None;
        }
        let item = self.rx.recv().await?;
        (!self.is_closed()).then_some(item)
    }

    /// Take a queued delivery without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        if self.is_closed() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Stop delivery and unregister from the hub.
    pub fn close(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.rx.close();
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
        debug!(subscription_id = %self.id, "Subscription closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T> Subscription<T> {
    /// Handle that closes this subscription from another task.
    pub fn closer(&self) -> SubscriptionCloser {
        SubscriptionCloser {
            id: self.id,
            closed: self.closed.clone(),
            hub: self.hub.clone(),
        }
    }
}

/// Closes a [`Subscription`] without owning it.
///
/// Once closed, the owner's `recv` yields `None`, including for items that
/// were already queued.
#[derive(Clone)]
pub struct SubscriptionCloser {
    id: SubscriptionId,
    closed: Arc<AtomicBool>,
    hub: Weak<HubInner>,
}

impl SubscriptionCloser {
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
        debug!(subscription_id = %self.id, "Subscription closed remotely");
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for SubscriptionCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionCloser")
            .field("id", &self.id)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
