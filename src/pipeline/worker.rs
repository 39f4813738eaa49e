//! Evaluation worker pool.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::Shared;
use crate::detect::engine::{EvaluationJob, EvaluationOutcome};

/// Spawn `count` workers draining a shared bounded queue. Each worker exits
/// once the queue is closed and empty.
pub(crate) fn spawn_pool(
    count: usize,
    rx: mpsc::Receiver<EvaluationJob>,
    shared: Arc<Shared>,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    (0..count.max(1))
        .map(|worker_id| {
            let rx = rx.clone();
            let shared = shared.clone();
            tokio::spawn(run_worker(worker_id, rx, shared))
        })
        .collect()
}

async fn run_worker(worker_id: usize, rx: Arc<Mutex<mpsc::Receiver<EvaluationJob>>>, shared: Arc<Shared>) {
    debug!(worker_id, "evaluation worker started");

    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };

        let now = shared.clock.now();
        match shared.engine.process(&job, now).await {
            Ok(EvaluationOutcome::AlertRaised(alert_id)) => {
                debug!(worker_id, machine_id = %job.reading.machine_id, sequence = job.sequence, %alert_id, "evaluated, alert raised");
            }
            Ok(EvaluationOutcome::NoAlert) => {}
            Err(e) => {
                error!(
                    worker_id,
                    machine_id = %job.reading.machine_id,
                    sequence = job.sequence,
                    error = %e,
                    "evaluation failed, reading kept without prediction"
                );
                shared.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        shared.finish_job();
    }

    info!(worker_id, "evaluation worker stopped");
}
