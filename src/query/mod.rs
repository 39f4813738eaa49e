//! Query layer: time-range filtering, ordering, pagination and fleet views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detect::Severity;
use crate::storage::SequencedReading;
use crate::telemetry::{Machine, MachineId, Reading};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

/// Clamp a caller-supplied limit into `[1, MAX_LIMIT]`.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Reading history query. Open bounds are unbounded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadingQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    /// Entries skipped from the most recent end before `limit` applies.
    pub offset: Option<usize>,
}

impl ReadingQuery {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts <= e)
    }

    pub fn limit(&self) -> usize {
        clamp_limit(self.limit)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

/// Sort ascending by (timestamp, arrival) and keep the `limit` most recent
/// entries after skipping `offset` from the newest end.
pub fn select_window(mut entries: Vec<SequencedReading>, limit: usize, offset: usize) -> Vec<Reading> {
    entries.sort_by(|a, b| {
        a.reading
            .timestamp
            .cmp(&b.reading.timestamp)
            .then(a.sequence.cmp(&b.sequence))
    });
    let end = entries.len().saturating_sub(offset);
    let start = end.saturating_sub(limit);
    entries.drain(start..end).map(|e| e.reading).collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertQuery {
    pub machine_id: Option<MachineId>,
    pub resolved: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionQuery {
    pub anomalous: Option<bool>,
    pub limit: Option<usize>,
}

/// A machine's accumulated unresolved-alert weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskEntry {
    pub machine_id: MachineId,
    pub name: String,
    pub risk_score: u32,
    pub unresolved_alerts: usize,
}

/// Pick the machine with the highest unresolved severity weight. `machines`
/// must be in registration order; equal scores go to the earlier machine.
pub fn most_at_risk(machines: &[Machine], unresolved: &[(MachineId, Severity)]) -> Option<RiskEntry> {
    let mut best: Option<RiskEntry> = None;
    for machine in machines {
        let mine: Vec<Severity> = unresolved
            .iter()
            .filter(|(id, _)| *id == machine.id)
            .map(|(_, s)| *s)
            .collect();
        if mine.is_empty() {
            continue;
        }
        let score: u32 = mine.iter().map(|s| s.weight()).sum();
        if best.as_ref().map_or(true, |b| score > b.risk_score) {
            best = Some(RiskEntry {
                machine_id: machine.id,
                name: machine.name.clone(),
                risk_score: score,
                unresolved_alerts: mine.len(),
            });
        }
    }
    best
}

/// Fleet-wide counters for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetSummary {
    pub machines: usize,
    pub stored_readings: usize,
    pub unresolved_warning: usize,
    pub unresolved_critical: usize,
    pub unresolved_emergency: usize,
}

impl FleetSummary {
    pub fn count_unresolved(&mut self, severity: Severity) {
        match severity {
            Severity::Warning => self.unresolved_warning += 1,
            Severity::Critical => self.unresolved_critical += 1,
            Severity::Emergency => self.unresolved_emergency += 1,
        }
    }
}
