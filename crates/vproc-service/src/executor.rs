//! Process executor: turns `process` calls into engine delegations and
//! drives the resulting status transitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, Instrument};

use vproc_media::{EngineJob, MediaError, TransformEngine};
use vproc_models::{Request, RequestId, RequestStatus};
use vproc_store::RequestStore;

use crate::error::ServiceResult;
use crate::logging::RequestLogger;

type CancelSenders = HashMap<RequestId, watch::Sender<bool>>;

/// Runs engine delegations with bounded concurrency.
#[derive(Clone)]
pub struct ProcessExecutor {
    store: Arc<RequestStore>,
    engine: Arc<dyn TransformEngine>,
    /// Engine delegation slots
    permits: Arc<Semaphore>,
    /// Cancel signals for requests that have been handed to a task
    in_flight: Arc<Mutex<CancelSenders>>,
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    pub fn new(
        store: Arc<RequestStore>,
        engine: Arc<dyn TransformEngine>,
        max_concurrent_jobs: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            engine,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, CancelSenders> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the request to PROCESSING and start the engine in the background.
    ///
    /// Returns the PROCESSING snapshot without waiting for the engine.
    pub fn process(&self, id: &RequestId) -> ServiceResult<Request> {
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // Registering under the same lock as the transition keeps a racing
        // cancel from missing the signal.
        let request = {
            let mut in_flight = self.in_flight();
            let request = self.store.begin_processing(id)?;
            in_flight.insert(id.clone(), cancel_tx);
            request
        };

        let job = EngineJob {
            request_id: request.id.clone(),
            kind: request.request_type,
            inputs: request.inputs.clone(),
            output: request.output.clone(),
            config: request.config.unwrap_or_default(),
        };

        let logger = RequestLogger::new(&request.id, request.request_type);
        let span = logger.create_span();
        let executor = self.clone();
        tokio::spawn(async move { executor.run(job, cancel_rx, logger).await }.instrument(span));

        Ok(request)
    }

    /// Move the request to CANCELED and signal the engine if it is running.
    pub fn cancel(&self, id: &RequestId) -> ServiceResult<Request> {
        let (request, signal) = {
            let mut in_flight = self.in_flight();
            let request = self.store.cancel(id)?;
            (request, in_flight.remove(id))
        };

        if let Some(tx) = signal {
            debug!(request_id = %id, "Signalling engine to abort");
            let _ = tx.send(true);
        }
        Ok(request)
    }

    /// Number of delegations that have not reported back yet.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight().len()
    }

    async fn run(self, job: EngineJob, cancel_rx: watch::Receiver<bool>, logger: RequestLogger) {
        let id = job.request_id.clone();

        if self.permits.available_permits() == 0 {
            logger.log_progress("queued, waiting for an engine slot");
        }
        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => permit,
            _ = wait_for_cancel(cancel_rx.clone()) => {
                logger.log_warning("canceled before the engine started");
                self.in_flight().remove(&id);
                return;
            }
        };
        let _permit = match permit {
            Ok(permit) => permit,
            Err(_) => {
                logger.log_error("engine pool closed");
                self.finish(&id, Err("engine pool closed".to_string()), &logger);
                return;
            }
        };

        // Deleted while queued: only calls already in flight are kept
        match self.store.get(&id) {
            Ok(request) if request.status == RequestStatus::Processing => {}
            _ => {
                logger.log_warning("request removed before the engine started");
                self.in_flight().remove(&id);
                return;
            }
        }

        logger.log_start(&format!("{} input(s) -> {}", job.inputs.len(), job.output.display()));

        let delegation = self.engine.run(&job, cancel_rx);
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, delegation).await {
                Ok(result) => result,
                Err(_) => Err(MediaError::Timeout(limit)),
            },
            None => delegation.await,
        };

        let outcome = result.map_err(|e| e.detail());
        self.finish(&id, outcome, &logger);
    }

    fn finish(&self, id: &RequestId, outcome: Result<(), String>, logger: &RequestLogger) {
        self.in_flight().remove(id);

        let failure = outcome.as_ref().err().cloned();
        match (self.store.finish(id, outcome), failure) {
            (Some(_), None) => logger.log_completion("engine reported success"),
            (Some(_), Some(message)) => logger.log_error(&message),
            (None, _) => logger.log_warning("engine outcome discarded, request canceled or deleted"),
        }
    }
}

async fn wait_for_cancel(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped without cancelling: never fires
            std::future::pending::<()>().await;
        }
    }
}

impl std::fmt::Debug for ProcessExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessExecutor")
            .field("available_permits", &self.permits.available_permits())
            .field("in_flight", &self.in_flight_count())
            .field("timeout", &self.timeout)
            .finish()
    }
}
