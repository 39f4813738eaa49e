//! In-memory time-series store -- per-machine bounded reading history.
//!
//! Each registered machine owns a [`RingBuffer`] of readings behind its own
//! lock, so appends to different machines never contend and appends to the
//! same machine are serialized in arrival order.

pub mod registry;
pub mod ring;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use self::registry::MachineRegistry;
use self::ring::RingBuffer;
use crate::query::{self, ReadingQuery};
use crate::telemetry::{MachineId, NewReading, Reading, ReadingError, Thresholds};

/// Readings retained per machine unless configured otherwise.
pub const DEFAULT_RING_CAPACITY: usize = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown machine: {0}")]
    UnknownMachine(MachineId),
    #[error("machine with serial number '{0}' already registered")]
    DuplicateSerial(String),
    #[error("invalid reading: {0}")]
    InvalidReading(#[from] ReadingError),
}

/// A stored reading together with its per-machine arrival sequence number.
#[derive(Debug, Clone)]
pub struct SequencedReading {
    pub sequence: u64,
    pub reading: Reading,
}

/// Result of a successful append.
#[derive(Debug, Clone)]
pub struct Appended {
    pub sequence: u64,
    pub reading: Reading,
    /// Machine thresholds as they were when the reading arrived.
    pub thresholds: Arc<Thresholds>,
}

struct MachineSeries {
    ring: RingBuffer<SequencedReading>,
    next_sequence: u64,
}

pub struct TimeSeriesStore {
    registry: MachineRegistry,
    series: RwLock<HashMap<MachineId, Arc<RwLock<MachineSeries>>>>,
    capacity: usize,
}

impl TimeSeriesStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: MachineRegistry::new(),
            series: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn registry(&self) -> &MachineRegistry {
        &self.registry
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn register(
        &self,
        new: crate::telemetry::NewMachine,
        now: DateTime<Utc>,
    ) -> Result<crate::telemetry::Machine, StoreError> {
        let machine = self.registry.register(new, now).await?;
        let series = MachineSeries {
            ring: RingBuffer::new(self.capacity),
            next_sequence: 0,
        };
        self.series
            .write()
            .await
            .insert(machine.id, Arc::new(RwLock::new(series)));
        Ok(machine)
    }

    async fn series_for(&self, id: MachineId) -> Option<Arc<RwLock<MachineSeries>>> {
        self.series.read().await.get(&id).cloned()
    }

    pub async fn contains(&self, id: MachineId) -> bool {
        self.series.read().await.contains_key(&id)
    }

    /// Validate and append a reading, evicting the oldest entry at capacity.
    ///
    /// Nothing is stored unless the machine is known and the reading valid.
    pub async fn append(&self, new: NewReading, now: DateTime<Utc>) -> Result<Appended, StoreError> {
        let machine_id = new.machine_id;
        let series = self
            .series_for(machine_id)
            .await
            .ok_or(StoreError::UnknownMachine(machine_id))?;
        new.validate()?;
        let thresholds = self
            .registry
            .thresholds(machine_id)
            .await
            .ok_or(StoreError::UnknownMachine(machine_id))?;

        let reading = new.into_reading(now);
        let mut series = series.write().await;
        let sequence = series.next_sequence;
        series.next_sequence += 1;
        let evicted = series.ring.push(SequencedReading {
            sequence,
            reading: reading.clone(),
        });
        if let Some(old) = evicted {
            debug!(machine_id = %machine_id, evicted_sequence = old.sequence, "ring full, evicted oldest reading");
        }

        Ok(Appended {
            sequence,
            reading,
            thresholds,
        })
    }

    /// Readings in `[start, end]`, ascending by timestamp (ties by arrival),
    /// truncated to the most recent `limit` after skipping `offset` from the
    /// newest end.
    pub async fn query(&self, id: MachineId, q: &ReadingQuery) -> Result<Vec<Reading>, StoreError> {
        let series = self.series_for(id).await.ok_or(StoreError::UnknownMachine(id))?;
        let matching: Vec<SequencedReading> = {
            let series = series.read().await;
            series
                .ring
                .iter()
                .filter(|e| q.contains(e.reading.timestamp))
                .cloned()
                .collect()
        };
        Ok(query::select_window(matching, q.limit(), q.offset()))
    }

    pub async fn len(&self, id: MachineId) -> Result<usize, StoreError> {
        let series = self.series_for(id).await.ok_or(StoreError::UnknownMachine(id))?;
        let len = series.read().await.ring.len();
        Ok(len)
    }

    /// Total readings held across all machines.
    pub async fn total_len(&self) -> usize {
        let all: Vec<_> = self.series.read().await.values().cloned().collect();
        let mut total = 0;
        for series in all {
            total += series.read().await.ring.len();
        }
        total
    }
}
