//! Machine registry: provisioning, lookup and threshold updates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::StoreError;
use crate::telemetry::{Machine, MachineId, NewMachine, Thresholds};

struct RegistryInner {
    /// Registration order.
    machines: Vec<Machine>,
    index: HashMap<MachineId, usize>,
    serials: HashMap<String, MachineId>,
}

pub struct MachineRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for MachineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                machines: Vec::new(),
                index: HashMap::new(),
                serials: HashMap::new(),
            }),
        }
    }

    pub async fn register(&self, new: NewMachine, now: DateTime<Utc>) -> Result<Machine, StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(serial) = &new.serial_number {
            if inner.serials.contains_key(serial) {
                return Err(StoreError::DuplicateSerial(serial.clone()));
            }
        }

        let machine = Machine {
            id: Uuid::new_v4(),
            name: new.name,
            location: new.location,
            machine_type: new.machine_type,
            model_number: new.model_number,
            serial_number: new.serial_number,
            installation_date: new.installation_date,
            last_maintenance_date: new.last_maintenance_date,
            thresholds: new.thresholds,
            created_at: now,
            updated_at: now,
        };

        if let Some(serial) = &machine.serial_number {
            inner.serials.insert(serial.clone(), machine.id);
        }
        let slot = inner.machines.len();
        inner.index.insert(machine.id, slot);
        inner.machines.push(machine.clone());

        info!(machine_id = %machine.id, name = %machine.name, "machine registered");
        Ok(machine)
    }

    pub async fn get(&self, id: MachineId) -> Option<Machine> {
        let inner = self.inner.read().await;
        inner.index.get(&id).map(|&slot| inner.machines[slot].clone())
    }

    pub async fn contains(&self, id: MachineId) -> bool {
        self.inner.read().await.index.contains_key(&id)
    }

    /// Snapshot of the machine's threshold map.
    pub async fn thresholds(&self, id: MachineId) -> Option<Arc<Thresholds>> {
        let inner = self.inner.read().await;
        inner
            .index
            .get(&id)
            .map(|&slot| Arc::new(inner.machines[slot].thresholds.clone()))
    }

    pub async fn update_thresholds(
        &self,
        id: MachineId,
        thresholds: Thresholds,
        now: DateTime<Utc>,
    ) -> Result<Machine, StoreError> {
        let mut inner = self.inner.write().await;
        let slot = *inner.index.get(&id).ok_or(StoreError::UnknownMachine(id))?;
        let machine = &mut inner.machines[slot];
        machine.thresholds = thresholds;
        machine.updated_at = now;
        info!(machine_id = %id, "machine thresholds updated");
        Ok(machine.clone())
    }

    /// Machines in registration order.
    pub async fn list(&self, offset: usize, limit: usize) -> Vec<Machine> {
        let inner = self.inner.read().await;
        inner.machines.iter().skip(offset).take(limit).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.machines.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
