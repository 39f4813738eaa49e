//! Anomaly detection, severity escalation and alert tracking.

pub mod engine;
pub mod evaluator;
pub mod ledger;
pub mod predictions;
pub mod rules;
pub mod severity;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::rules::AnomalyScore;
use crate::telemetry::{Channel, MachineId, Reading};

/// Internal fault while scoring a reading. Recovered locally by the
/// pipeline: logged, no prediction or alert is produced.
#[derive(Debug, Error)]
pub enum EvaluateError {
    #[error("threshold '{key}' has non-finite limit {value}")]
    InvalidLimit { key: String, value: f64 },
    #[error("scorer failed: {0}")]
    Scorer(String),
    #[error("scorer panicked: {0}")]
    Panicked(String),
}

/// Alert urgency, ordered `Warning < Critical < Emergency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Critical,
    Emergency,
}

impl Severity {
    /// Weight used when ranking machines by unresolved alerts.
    pub fn weight(self) -> u32 {
        match self {
            Severity::Warning => 1,
            Severity::Critical => 2,
            Severity::Emergency => 3,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "Warning"),
            Severity::Critical => write!(f, "Critical"),
            Severity::Emergency => write!(f, "Emergency"),
        }
    }
}

/// Scoring outcome for one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub score: AnomalyScore,
    pub anomalous: bool,
    pub severity: Severity,
    /// Violated channels in rule order.
    pub violated: Vec<Channel>,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionLabel {
    Normal,
    Anomaly,
}

/// Recorded verdict for one evaluated reading. Never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub machine_id: MachineId,
    pub timestamp: DateTime<Utc>,
    pub anomaly_score: AnomalyScore,
    pub is_anomaly: bool,
    pub label: PredictionLabel,
    pub explanation: String,
    pub reading: Reading,
}
