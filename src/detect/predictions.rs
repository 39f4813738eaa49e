//! Per-machine prediction history, capped like the reading store.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::Prediction;
use crate::storage::ring::RingBuffer;
use crate::telemetry::MachineId;

pub struct PredictionLog {
    inner: RwLock<HashMap<MachineId, RingBuffer<Prediction>>>,
    capacity: usize,
}

impl PredictionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn record(&self, prediction: Prediction) {
        let mut inner = self.inner.write().await;
        inner
            .entry(prediction.machine_id)
            .or_insert_with(|| RingBuffer::new(self.capacity))
            .push(prediction);
    }

    /// Newest first, optionally filtered on the anomaly flag.
    pub async fn list(&self, machine_id: MachineId, anomalous: Option<bool>, limit: usize) -> Vec<Prediction> {
        let inner = self.inner.read().await;
        let Some(ring) = inner.get(&machine_id) else {
            return Vec::new();
        };
        ring.iter()
            .rev()
            .filter(|p| anomalous.map_or(true, |a| p.is_anomaly == a))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self, machine_id: MachineId) -> usize {
        self.inner.read().await.get(&machine_id).map_or(0, |r| r.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::rules::AnomalyScore;
    use crate::detect::PredictionLabel;
    use crate::telemetry::Reading;
    use chrono::Utc;
    use uuid::Uuid;

    fn prediction(machine_id: MachineId, temperature: f64, is_anomaly: bool) -> Prediction {
        let reading = Reading {
            machine_id,
            timestamp: Utc::now(),
            temperature,
            vibration: 0.0,
            pressure: 0.0,
            current: 0.0,
            operating_hours: None,
            labels: vec![],
        };
        Prediction {
            machine_id,
            timestamp: reading.timestamp,
            anomaly_score: if is_anomaly {
                AnomalyScore::from_hundredths(40)
            } else {
                AnomalyScore::ZERO
            },
            is_anomaly,
            label: if is_anomaly {
                PredictionLabel::Anomaly
            } else {
                PredictionLabel::Normal
            },
            explanation: String::new(),
            reading,
        }
    }

    #[tokio::test]
    async fn test_capped_and_newest_first() {
        let log = PredictionLog::new(3);
        let m = Uuid::new_v4();
        for i in 0..5 {
            log.record(prediction(m, i as f64, i % 2 == 0)).await;
        }
        assert_eq!(log.len(m).await, 3);
        let temps: Vec<f64> = log.list(m, None, 10).await.iter().map(|p| p.reading.temperature).collect();
        assert_eq!(temps, vec![4.0, 3.0, 2.0]);

        let anomalies: Vec<f64> = log
            .list(m, Some(true), 10)
            .await
            .iter()
            .map(|p| p.reading.temperature)
            .collect();
        assert_eq!(anomalies, vec![4.0, 2.0]);
    }

    #[tokio::test]
    async fn test_unknown_machine_is_empty() {
        let log = PredictionLog::new(3);
        assert!(log.list(Uuid::new_v4(), None, 10).await.is_empty());
    }
}
