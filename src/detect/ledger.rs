//! Alert ledger: append-only collection of alerts, resolvable by id.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::Severity;
use crate::telemetry::MachineId;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert not found: {0}")]
    AlertNotFound(Uuid),
    #[error("alert {id} already resolved at {resolved_at}")]
    AlreadyResolved { id: Uuid, resolved_at: DateTime<Utc> },
    #[error("unknown machine: {0}")]
    UnknownMachine(MachineId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ThresholdExceeded,
    AnomalyDetection,
    PredictiveWarning,
    SensorFailure,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::ThresholdExceeded => write!(f, "threshold_exceeded"),
            AlertKind::AnomalyDetection => write!(f, "anomaly_detection"),
            AlertKind::PredictiveWarning => write!(f, "predictive_warning"),
            AlertKind::SensorFailure => write!(f, "sensor_failure"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: Uuid,
    pub machine_id: MachineId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub is_resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub details: serde_json::Value,
}

/// Everything needed to raise an alert; id and timestamp are assigned by the
/// ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlert {
    pub machine_id: MachineId,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

struct LedgerInner {
    /// Insertion order.
    alerts: Vec<Alert>,
    index: HashMap<Uuid, usize>,
}

pub struct AlertLedger {
    inner: RwLock<LedgerInner>,
}

impl Default for AlertLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertLedger {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerInner {
                alerts: Vec::new(),
                index: HashMap::new(),
            }),
        }
    }

    /// Store a new alert. The caller is responsible for checking the machine
    /// exists.
    pub async fn raise(&self, new: NewAlert, now: DateTime<Utc>) -> Alert {
        let alert = Alert {
            id: Uuid::new_v4(),
            machine_id: new.machine_id,
            timestamp: now,
            kind: new.kind,
            severity: new.severity,
            message: new.message,
            is_resolved: false,
            resolved_by: None,
            resolved_at: None,
            details: new.details,
        };

        let mut inner = self.inner.write().await;
        let slot = inner.alerts.len();
        inner.index.insert(alert.id, slot);
        inner.alerts.push(alert.clone());
        drop(inner);

        warn!(
            alert_id = %alert.id,
            machine_id = %alert.machine_id,
            severity = %alert.severity,
            kind = %alert.kind,
            "alert raised: {}",
            alert.message
        );
        alert
    }

    /// Mark an alert resolved. Lookup is global by id. Resolving twice fails
    /// with [`AlertError::AlreadyResolved`] and leaves the alert untouched;
    /// the write lock makes the check-and-set atomic.
    pub async fn resolve(
        &self,
        id: Uuid,
        resolved_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Alert, AlertError> {
        let mut inner = self.inner.write().await;
        let slot = *inner.index.get(&id).ok_or(AlertError::AlertNotFound(id))?;
        let alert = &mut inner.alerts[slot];

        if alert.is_resolved {
            return Err(AlertError::AlreadyResolved {
                id,
                resolved_at: alert.resolved_at.unwrap_or(now),
            });
        }

        alert.is_resolved = true;
        alert.resolved_at = Some(now);
        alert.resolved_by = resolved_by;
        info!(alert_id = %id, machine_id = %alert.machine_id, resolved_by = ?alert.resolved_by, "alert resolved");
        Ok(alert.clone())
    }

    pub async fn get(&self, id: Uuid) -> Option<Alert> {
        let inner = self.inner.read().await;
        inner.index.get(&id).map(|&slot| inner.alerts[slot].clone())
    }

    /// Alerts for one machine, newest first.
    pub async fn list(&self, machine_id: MachineId, resolved: Option<bool>, limit: usize) -> Vec<Alert> {
        self.collect(|a| a.machine_id == machine_id, resolved, limit).await
    }

    /// Alerts across the fleet, newest first.
    pub async fn list_all(&self, resolved: Option<bool>, limit: usize) -> Vec<Alert> {
        self.collect(|_| true, resolved, limit).await
    }

    async fn collect<F>(&self, scope: F, resolved: Option<bool>, limit: usize) -> Vec<Alert>
    where
        F: Fn(&Alert) -> bool,
    {
        let inner = self.inner.read().await;
        // Newest insertion first so equal timestamps keep recency order
        // through the stable sort.
        let mut out: Vec<Alert> = inner
            .alerts
            .iter()
            .rev()
            .filter(|a| scope(a))
            .filter(|a| resolved.map_or(true, |r| a.is_resolved == r))
            .cloned()
            .collect();
        drop(inner);
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out.truncate(limit);
        out
    }

    /// `(machine, severity)` for every unresolved alert, in insertion order.
    pub async fn unresolved(&self) -> Vec<(MachineId, Severity)> {
        let inner = self.inner.read().await;
        inner
            .alerts
            .iter()
            .filter(|a| !a.is_resolved)
            .map(|a| (a.machine_id, a.severity))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.alerts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
