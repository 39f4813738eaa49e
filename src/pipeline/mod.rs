//! Ingestion pipeline.
//!
//! A reading moves `Received -> Stored -> Evaluated -> (AlertRaised | NoAlert)`.
//! The store step completes inside [`Pipeline::ingest`], so the caller can
//! read its own write as soon as the call returns. Evaluation is handed to a
//! bounded worker pool and never blocks on, or fails, the ingest call.

mod worker;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{Backpressure, Config, StoreConfig, WorkerConfig};
use crate::detect::engine::{AnomalyEngine, EvaluationJob};
use crate::detect::evaluator::{AnomalyScorer, ThresholdScorer};
use crate::detect::ledger::{Alert, AlertError, NewAlert};
use crate::detect::Prediction;
use crate::query::{self, AlertQuery, FleetSummary, PredictionQuery, ReadingQuery, RiskEntry};
use crate::storage::{StoreError, TimeSeriesStore};
use crate::telemetry::clock::{Clock, SystemClock};
use crate::telemetry::{Machine, MachineId, NewMachine, NewReading, Reading, Thresholds};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("pipeline is shut down")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Queued,
    /// Queue full under the `reject` policy; the reading is stored but will
    /// not be scored.
    Dropped,
}

/// Acknowledgement for a stored reading.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub machine_id: MachineId,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub evaluation: EvaluationStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub scorer: &'static str,
    pub pending_evaluations: usize,
    pub evaluation_failures: u64,
    pub dropped_evaluations: u64,
}

/// State shared between the pipeline handle and its workers.
pub(crate) struct Shared {
    pub(crate) store: TimeSeriesStore,
    pub(crate) engine: AnomalyEngine,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) failures: AtomicU64,
    dropped: AtomicU64,
    pending: AtomicUsize,
    idle: Notify,
}

impl Shared {
    pub(crate) fn finish_job(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// One unit of `pending`, released on drop unless handed to a worker. Keeps
/// `wait_idle` accurate when an ingest blocked on a full queue is cancelled.
struct PendingSlot<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl<'a> PendingSlot<'a> {
    fn claim(shared: &'a Shared) -> Self {
        shared.pending.fetch_add(1, Ordering::SeqCst);
        Self { shared, armed: true }
    }

    /// The worker now owns the slot and calls `finish_job` itself.
    fn hand_off(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.finish_job();
        }
    }
}

pub struct PipelineBuilder {
    store: StoreConfig,
    workers: WorkerConfig,
    scorer: Arc<dyn AnomalyScorer>,
    clock: Arc<dyn Clock>,
}

impl PipelineBuilder {
    pub fn scorer(mut self, scorer: Arc<dyn AnomalyScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ring_capacity(mut self, capacity: usize) -> Self {
        self.store.ring_capacity = capacity;
        self
    }

    pub fn workers(mut self, count: usize) -> Self {
        self.workers.count = count;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.workers.queue_capacity = capacity;
        self
    }

    pub fn backpressure(mut self, policy: Backpressure) -> Self {
        self.workers.backpressure = policy;
        self
    }

    /// Spawn the worker pool. Must be called inside a tokio runtime.
    pub fn start(self) -> Pipeline {
        let shared = Arc::new(Shared {
            store: TimeSeriesStore::new(self.store.ring_capacity),
            engine: AnomalyEngine::new(self.scorer, self.store.prediction_capacity),
            clock: self.clock,
            failures: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let (tx, rx) = mpsc::channel(self.workers.queue_capacity.max(1));
        let handles = worker::spawn_pool(self.workers.count, rx, shared.clone());
        info!(
            workers = handles.len(),
            queue_capacity = self.workers.queue_capacity,
            backpressure = ?self.workers.backpressure,
            scorer = shared.engine.scorer_name(),
            "ingestion pipeline started"
        );

        Pipeline {
            shared,
            queue: RwLock::new(Some(tx)),
            workers: Mutex::new(handles),
            backpressure: self.workers.backpressure,
        }
    }
}

/// Owns the store, the detection engine and the evaluation workers. Several
/// independent pipelines can live in one process.
pub struct Pipeline {
    shared: Arc<Shared>,
    queue: RwLock<Option<mpsc::Sender<EvaluationJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    backpressure: Backpressure,
}

impl Pipeline {
    pub fn builder(config: &Config) -> PipelineBuilder {
        PipelineBuilder {
            store: config.store.clone(),
            workers: config.workers.clone(),
            scorer: Arc::new(ThresholdScorer),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn start(config: &Config) -> Self {
        Self::builder(config).start()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.shared.clock.now()
    }

    // -- machines -----------------------------------------------------------

    pub async fn register_machine(&self, new: NewMachine) -> Result<Machine, StoreError> {
        self.shared.store.register(new, self.now()).await
    }

    pub async fn get_machine(&self, id: MachineId) -> Result<Machine, StoreError> {
        self.shared
            .store
            .registry()
            .get(id)
            .await
            .ok_or(StoreError::UnknownMachine(id))
    }

    pub async fn list_machines(&self, offset: usize, limit: usize) -> Vec<Machine> {
        self.shared.store.registry().list(offset, limit).await
    }

    pub async fn machine_count(&self) -> usize {
        self.shared.store.registry().len().await
    }

    /// Takes effect for readings ingested after the call.
    pub async fn update_thresholds(&self, id: MachineId, thresholds: Thresholds) -> Result<Machine, StoreError> {
        self.shared
            .store
            .registry()
            .update_thresholds(id, thresholds, self.now())
            .await
    }

    // -- ingestion ----------------------------------------------------------

    pub async fn ingest(&self, new: NewReading) -> Result<Ack, IngestError> {
        let sender = self.queue.read().await.clone().ok_or(IngestError::Closed)?;
        let appended = self.shared.store.append(new, self.now()).await?;

        let ack = Ack {
            machine_id: appended.reading.machine_id,
            sequence: appended.sequence,
            timestamp: appended.reading.timestamp,
            evaluation: EvaluationStatus::Queued,
        };
        let job = EvaluationJob {
            sequence: appended.sequence,
            reading: appended.reading,
            thresholds: appended.thresholds,
        };

        let mut slot = PendingSlot::claim(&self.shared);
        let queued = match self.backpressure {
            Backpressure::Block => sender.send(job).await.is_ok(),
            Backpressure::Reject => match sender.try_send(job) {
                Ok(()) => true,
                Err(TrySendError::Full(job)) => {
                    warn!(
                        machine_id = %job.reading.machine_id,
                        sequence = job.sequence,
                        "evaluation queue full, skipping evaluation"
                    );
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
        };

        if queued {
            slot.hand_off();
            Ok(ack)
        } else {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            drop(slot);
            Ok(Ack {
                evaluation: EvaluationStatus::Dropped,
                ..ack
            })
        }
    }

    /// Each item is handled independently; results keep input order.
    pub async fn ingest_batch(&self, batch: Vec<NewReading>) -> Vec<Result<Ack, IngestError>> {
        let mut results = Vec::with_capacity(batch.len());
        for reading in batch {
            results.push(self.ingest(reading).await);
        }
        results
    }

    // -- queries ------------------------------------------------------------

    pub async fn query_readings(&self, id: MachineId, q: &ReadingQuery) -> Result<Vec<Reading>, StoreError> {
        self.shared.store.query(id, q).await
    }

    pub async fn query_predictions(&self, id: MachineId, q: &PredictionQuery) -> Result<Vec<Prediction>, StoreError> {
        if !self.shared.store.contains(id).await {
            return Err(StoreError::UnknownMachine(id));
        }
        Ok(self
            .shared
            .engine
            .predictions()
            .list(id, q.anomalous, query::clamp_limit(q.limit))
            .await)
    }

    pub async fn query_alerts(&self, q: &AlertQuery) -> Result<Vec<Alert>, AlertError> {
        let limit = query::clamp_limit(q.limit);
        let ledger = self.shared.engine.ledger();
        match q.machine_id {
            Some(id) => {
                if !self.shared.store.contains(id).await {
                    return Err(AlertError::UnknownMachine(id));
                }
                Ok(ledger.list(id, q.resolved, limit).await)
            }
            None => Ok(ledger.list_all(q.resolved, limit).await),
        }
    }

    // -- alerts -------------------------------------------------------------

    /// Raise an alert on behalf of a collaborator (e.g. an external model).
    pub async fn raise_alert(&self, new: NewAlert) -> Result<Alert, AlertError> {
        if !self.shared.store.contains(new.machine_id).await {
            return Err(AlertError::UnknownMachine(new.machine_id));
        }
        Ok(self.shared.engine.ledger().raise(new, self.now()).await)
    }

    pub async fn resolve_alert(&self, id: Uuid, resolved_by: Option<String>) -> Result<Alert, AlertError> {
        self.shared
            .engine
            .ledger()
            .resolve(id, resolved_by, self.now())
            .await
    }

    // -- fleet views --------------------------------------------------------

    pub async fn most_at_risk(&self) -> Option<RiskEntry> {
        let machines = self.list_machines(0, usize::MAX).await;
        let unresolved = self.shared.engine.ledger().unresolved().await;
        query::most_at_risk(&machines, &unresolved)
    }

    pub async fn fleet_summary(&self) -> FleetSummary {
        let mut summary = FleetSummary {
            machines: self.shared.store.registry().len().await,
            stored_readings: self.shared.store.total_len().await,
            ..FleetSummary::default()
        };
        for (_, severity) in self.shared.engine.ledger().unresolved().await {
            summary.count_unresolved(severity);
        }
        summary
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            scorer: self.shared.engine.scorer_name(),
            pending_evaluations: self.shared.pending.load(Ordering::SeqCst),
            evaluation_failures: self.shared.failures.load(Ordering::Relaxed),
            dropped_evaluations: self.shared.dropped.load(Ordering::Relaxed),
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Resolve once every queued evaluation has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting readings, drain the queue and join the workers.
    /// Queries keep working afterwards.
    pub async fn shutdown(&self) {
        let Some(sender) = self.queue.write().await.take() else {
            return;
        };
        drop(sender);

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "evaluation worker ended abnormally");
            }
        }
        info!("ingestion pipeline stopped");
    }
}
