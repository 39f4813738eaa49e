//! Scoring stage: runs the configured scorer on a stored reading, logs the
//! prediction and raises a threshold alert when the verdict is anomalous.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::evaluator::AnomalyScorer;
use super::ledger::{AlertKind, AlertLedger, NewAlert};
use super::predictions::PredictionLog;
use super::{EvaluateError, Prediction, PredictionLabel, Verdict};
use crate::telemetry::{Reading, Thresholds};

/// One stored reading waiting to be scored.
#[derive(Debug, Clone)]
pub struct EvaluationJob {
    pub sequence: u64,
    pub reading: Reading,
    pub thresholds: Arc<Thresholds>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationOutcome {
    AlertRaised(Uuid),
    NoAlert,
}

/// Scores readings and records the resulting predictions and alerts.
pub struct AnomalyEngine {
    scorer: Arc<dyn AnomalyScorer>,
    ledger: AlertLedger,
    predictions: PredictionLog,
}

impl AnomalyEngine {
    pub fn new(scorer: Arc<dyn AnomalyScorer>, prediction_capacity: usize) -> Self {
        Self {
            scorer,
            ledger: AlertLedger::new(),
            predictions: PredictionLog::new(prediction_capacity),
        }
    }

    pub fn ledger(&self) -> &AlertLedger {
        &self.ledger
    }

    pub fn predictions(&self) -> &PredictionLog {
        &self.predictions
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    /// Score the job's reading, then record a prediction and, when
    /// anomalous, raise a threshold alert. A scorer error or panic records
    /// nothing.
    pub async fn process(&self, job: &EvaluationJob, now: DateTime<Utc>) -> Result<EvaluationOutcome, EvaluateError> {
        let verdict = self.score_guarded(job)?;
        let reading = &job.reading;

        self.predictions
            .record(Prediction {
                machine_id: reading.machine_id,
                timestamp: reading.timestamp,
                anomaly_score: verdict.score,
                is_anomaly: verdict.anomalous,
                label: if verdict.anomalous {
                    PredictionLabel::Anomaly
                } else {
                    PredictionLabel::Normal
                },
                explanation: verdict.explanation.clone(),
                reading: reading.clone(),
            })
            .await;

        if !verdict.anomalous {
            debug!(machine_id = %reading.machine_id, sequence = job.sequence, "reading normal");
            return Ok(EvaluationOutcome::NoAlert);
        }

        let alert = self
            .ledger
            .raise(
                NewAlert {
                    machine_id: reading.machine_id,
                    kind: AlertKind::ThresholdExceeded,
                    severity: verdict.severity,
                    message: format!(
                        "{} on machine {}: {}",
                        verdict.severity, reading.machine_id, verdict.explanation
                    ),
                    details: serde_json::json!({
                        "anomaly_score": verdict.score.as_f64(),
                        "violated": verdict.violated,
                        "reading": reading,
                    }),
                },
                now,
            )
            .await;
        Ok(EvaluationOutcome::AlertRaised(alert.id))
    }

    fn score_guarded(&self, job: &EvaluationJob) -> Result<Verdict, EvaluateError> {
        match catch_unwind(AssertUnwindSafe(|| self.scorer.score(&job.reading, &job.thresholds))) {
            Ok(result) => result,
            Err(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(EvaluateError::Panicked(msg))
            }
        }
    }
}
