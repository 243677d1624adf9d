//! Request store: the single owner of every request and the only place
//! where status transitions happen.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use vproc_models::{NewRequest, Request, RequestId, RequestStatus, StatusFilter};

use crate::error::{StoreError, StoreResult};
use crate::hub::{NotificationHub, RequestEvent, Subscription};

struct Entry {
    request: Request,
    /// Insertion order, breaks `created_at` ties
    seq: u64,
}

#[derive(Default)]
struct Inner {
    requests: HashMap<RequestId, Entry>,
    next_seq: u64,
}

impl Inner {
    fn collect(&self, filter: StatusFilter) -> Vec<Request> {
        let mut entries: Vec<&Entry> = self
            .requests
            .values()
            .filter(|e| filter.matches(e.request.status))
            .collect();
        entries.sort_by(|a, b| {
            a.request
                .created_at
                .cmp(&b.request.created_at)
                .then(a.seq.cmp(&b.seq))
        });
        entries.into_iter().map(|e| e.request.clone()).collect()
    }

    fn entry_mut(&mut self, id: &RequestId) -> StoreResult<&mut Entry> {
        self.requests
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

/// In-memory registry of requests.
///
/// Every mutation publishes the new snapshot through the attached
/// [`NotificationHub`] before the write lock is released.
#[derive(Default)]
pub struct RequestStore {
    inner: RwLock<Inner>,
    hub: NotificationHub,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new idle request.
    pub fn create(&self, draft: NewRequest) -> Request {
        let request = Request::new(draft);
        let mut inner = self.write();

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.requests.insert(
            request.id.clone(),
            Entry {
                request: request.clone(),
                seq,
            },
        );

        info!(
            request_id = %request.id,
            request_type = %request.request_type,
            inputs = request.inputs.len(),
            "Request created"
        );

        self.hub.publish(
            RequestEvent::Updated(request.clone()),
            None,
            Some(request.status),
            |filter| inner.collect(filter),
        );
        request
    }

    pub fn get(&self, id: &RequestId) -> StoreResult<Request> {
        self.read()
            .requests
            .get(id)
            .map(|e| e.request.clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Snapshot ordered by creation time.
    pub fn list(&self, filter: StatusFilter) -> Vec<Request> {
        self.read().collect(filter)
    }

    pub fn len(&self) -> usize {
        self.read().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `IDLE -> PROCESSING`. Any other starting status is rejected, which
    /// also guarantees at most one engine delegation per request.
    pub fn begin_processing(&self, id: &RequestId) -> StoreResult<Request> {
        self.apply(id, "process", |request| {
            request.transition(RequestStatus::Processing).is_ok()
        })
    }

    /// `IDLE | PROCESSING -> CANCELED`.
    pub fn cancel(&self, id: &RequestId) -> StoreResult<Request> {
        self.apply(id, "cancel", |request| {
            request.transition(RequestStatus::Canceled).is_ok()
        })
    }

    /// Record the engine outcome for a processing request.
    ///
    /// Outcomes for unknown (deleted) or no longer processing (canceled)
    /// requests are discarded and `None` is returned.
    pub fn finish(&self, id: &RequestId, outcome: Result<(), String>) -> Option<Request> {
        let mut inner = self.write();

        let Some(entry) = inner.requests.get_mut(id) else {
            debug!(request_id = %id, "Discarding engine outcome for unknown request");
            return None;
        };
        if entry.request.status != RequestStatus::Processing {
            debug!(
                request_id = %id,
                status = %entry.request.status,
                "Discarding engine outcome for request no longer processing"
            );
            return None;
        }

        let applied = match &outcome {
            Ok(()) => entry.request.transition(RequestStatus::Completed),
            Err(message) => entry.request.fail(message.clone()),
        };
        // Processing always reaches both outcomes
        applied.ok()?;

        let request = entry.request.clone();
        match &outcome {
            Ok(()) => info!(request_id = %id, "Request completed"),
            Err(message) => info!(request_id = %id, error = %message, "Request failed"),
        }

        self.hub.publish(
            RequestEvent::Updated(request.clone()),
            Some(RequestStatus::Processing),
            Some(request.status),
            |filter| inner.collect(filter),
        );
        Some(request)
    }

    /// Remove a request in any status, returning its last snapshot.
    pub fn delete(&self, id: &RequestId) -> StoreResult<Request> {
        let mut inner = self.write();
        let entry = inner
            .requests
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let request = entry.request;

        info!(request_id = %id, status = %request.status, "Request deleted");

        self.hub.publish(
            RequestEvent::Removed(request.clone()),
            Some(request.status),
            None,
            |filter| inner.collect(filter),
        );
        Ok(request)
    }

    /// Follow one request. The current snapshot is delivered first.
    pub fn subscribe_request(&self, id: &RequestId) -> StoreResult<Subscription<RequestEvent>> {
        // Held across registration so no transition slips in between
        let inner = self.read();
        let request = inner
            .requests
            .get(id)
            .map(|e| e.request.clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        Ok(self.hub.subscribe_request(id, request))
    }

    /// Follow a filtered collection. The current collection is delivered first.
    pub fn subscribe_collection(&self, filter: StatusFilter) -> Subscription<Vec<Request>> {
        let inner = self.read();
        self.hub.subscribe_collection(filter, inner.collect(filter))
    }

    /// Run a guarded transition and publish it.
    fn apply<F>(&self, id: &RequestId, operation: &'static str, transition: F) -> StoreResult<Request>
    where
        F: FnOnce(&mut Request) -> bool,
    {
        let mut inner = self.write();
        let entry = inner.entry_mut(id)?;
        let previous = entry.request.status;

        if !transition(&mut entry.request) {
            return Err(StoreError::invalid_state(id, previous, operation));
        }

        let request = entry.request.clone();
        info!(
            request_id = %id,
            from = %previous,
            to = %request.status,
            "Request {}",
            operation
        );

        self.hub.publish(
            RequestEvent::Updated(request.clone()),
            Some(previous),
            Some(request.status),
            |filter| inner.collect(filter),
        );
        Ok(request)
    }
}

impl std::fmt::Debug for RequestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestStore")
            .field("requests", &self.len())
            .field("hub", &self.hub)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vproc_models::RequestType;

    fn concat() -> NewRequest {
        NewRequest {
            request_type: RequestType::Concat,
            inputs: vec!["a.mp4".into(), "b.mp4".into()],
            output: "out.mp4".into(),
            config: None,
        }
    }

    #[test]
    fn test_create_get_list() {
        let store = RequestStore::new();
        let first = store.create(concat());
        let second = store.create(concat());

        assert_eq!(store.get(&first.id).unwrap(), first);
        let ids: Vec<_> = store.list(StatusFilter::All).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first.id.clone(), second.id]);

        store.begin_processing(&first.id).unwrap();
        assert_eq!(store.list(StatusFilter::Only(RequestStatus::Idle)).len(), 1);
        assert_eq!(store.list(StatusFilter::Only(RequestStatus::Processing)).len(), 1);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let store = RequestStore::new();
        let missing = RequestId::from("missing");

        assert_eq!(store.get(&missing), Err(StoreError::NotFound(missing.clone())));
        assert!(matches!(store.cancel(&missing), Err(StoreError::NotFound(_))));
        assert!(matches!(store.subscribe_request(&missing), Err(StoreError::NotFound(_))));
        assert_eq!(store.finish(&missing, Ok(())), None);
    }

    #[test]
    fn test_double_process_is_invalid_state() {
        let store = RequestStore::new();
        let request = store.create(concat());

        store.begin_processing(&request.id).unwrap();
        let err = store.begin_processing(&request.id).unwrap_err();
        assert_eq!(
            err,
            StoreError::invalid_state(&request.id, RequestStatus::Processing, "process")
        );
    }

    #[test]
    fn test_cancel_rules() {
        let store = RequestStore::new();
        let idle = store.create(concat());
        assert_eq!(store.cancel(&idle.id).unwrap().status, RequestStatus::Canceled);
        assert!(matches!(store.cancel(&idle.id), Err(StoreError::InvalidState { .. })));

        let running = store.create(concat());
        store.begin_processing(&running.id).unwrap();
        store.cancel(&running.id).unwrap();

        // Late engine outcome is ignored
        assert_eq!(store.finish(&running.id, Ok(())), None);
        assert_eq!(store.get(&running.id).unwrap().status, RequestStatus::Canceled);
    }

    #[test]
    fn test_finish_records_outcome() {
        let store = RequestStore::new();
        let ok = store.create(concat());
        let bad = store.create(concat());
        store.begin_processing(&ok.id).unwrap();
        store.begin_processing(&bad.id).unwrap();

        let done = store.finish(&ok.id, Ok(())).unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert!(done.updated_at > ok.updated_at);

        let failed = store.finish(&bad.id, Err("no space left".into())).unwrap();
        assert_eq!(failed.status, RequestStatus::Error);
        assert_eq!(failed.error_message.as_deref(), Some("no space left"));

        // Terminal requests cannot be processed or finished again
        assert!(store.begin_processing(&ok.id).is_err());
        assert_eq!(store.finish(&ok.id, Err("late".into())), None);
    }

    #[test]
    fn test_idle_cannot_finish() {
        let store = RequestStore::new();
        let request = store.create(concat());

        assert_eq!(store.finish(&request.id, Ok(())), None);
        assert_eq!(store.get(&request.id).unwrap().status, RequestStatus::Idle);
    }

    #[tokio::test]
    async fn test_delete_notifies_and_removes() {
        let store = RequestStore::new();
        let request = store.create(concat());
        let mut sub = store.subscribe_request(&request.id).unwrap();
        assert_eq!(sub.recv().await, Some(RequestEvent::Updated(request.clone())));

        let deleted = store.delete(&request.id).unwrap();
        assert_eq!(deleted.id, request.id);

        assert!(sub.recv().await.unwrap().is_removed());
        assert_eq!(sub.recv().await, None);
        assert!(store.get(&request.id).is_err());
        assert!(store.list(StatusFilter::All).is_empty());
        assert!(matches!(store.delete(&request.id), Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_collection_snapshots_follow_membership() {
        let store = RequestStore::new();
        let mut processing = store.subscribe_collection(StatusFilter::Only(RequestStatus::Processing));
        assert_eq!(processing.recv().await, Some(vec![]));

        // Creating an idle request does not touch the processing collection
        let request = store.create(concat());
        assert_eq!(processing.try_recv(), None);

        store.begin_processing(&request.id).unwrap();
        let entered = processing.recv().await.unwrap();
        assert_eq!(entered.len(), 1);
        assert_eq!(entered[0].status, RequestStatus::Processing);

        store.finish(&request.id, Ok(()));
        assert_eq!(processing.recv().await, Some(vec![]));
    }

    #[test]
    fn test_concurrent_process_delegates_once() {
        let store = Arc::new(RequestStore::new());
        let request = store.create(concat());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let id = request.id.clone();
                std::thread::spawn(move || store.begin_processing(&id).is_ok())
            })
            .collect();

        let started = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(started, 1);
    }
}
