//! Synthetic telemetry generator.
//!
//! Provisions a small fleet with per-type threshold presets and feeds drifting
//! sensor values, with occasional injected faults, through the same ingestion
//! path live sensors use.

use std::time::Duration;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SimulatorConfig;
use crate::detect::rules::rule_for;
use crate::pipeline::{EvaluationStatus, Pipeline};
use crate::telemetry::{Channel, Machine, MachineId, NewMachine, NewReading, Thresholds};

/// Machine type with its default thresholds and nominal operating point.
#[derive(Debug, Clone, Copy)]
pub struct MachinePreset {
    pub machine_type: &'static str,
    pub thresholds: &'static [(&'static str, f64)],
    /// Nominal temperature, vibration, pressure, current.
    pub nominal: [f64; 4],
}

pub const PRESETS: [MachinePreset; 3] = [
    MachinePreset {
        machine_type: "Grinder",
        thresholds: &[
            ("temperature_critical", 120.0),
            ("vibration_max", 35.0),
            ("pressure_max", 5.0),
        ],
        nominal: [75.0, 12.0, 3.0, 15.0],
    },
    MachinePreset {
        machine_type: "Hydraulic Press",
        thresholds: &[
            ("temperature_critical", 90.0),
            ("vibration_max", 20.0),
            ("pressure_max", 50.0),
        ],
        nominal: [65.0, 8.0, 30.0, 18.0],
    },
    MachinePreset {
        machine_type: "Conveyor",
        thresholds: &[("vibration_max", 25.0), ("current_max", 22.0)],
        nominal: [45.0, 10.0, 2.0, 14.0],
    },
];

const LOCATIONS: [&str; 4] = ["Workshop 1", "Production Line A", "Storage Zone B", "Line 3"];

/// Kinds of injected fault. Each pushes one channel past its machine's
/// limit, so every injected fault is detectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    HighTemperature,
    HighVibration,
    HighPressure,
    HighCurrent,
}

impl Fault {
    pub fn channel(self) -> Channel {
        match self {
            Fault::HighTemperature => Channel::Temperature,
            Fault::HighVibration => Channel::Vibration,
            Fault::HighPressure => Channel::Pressure,
            Fault::HighCurrent => Channel::Current,
        }
    }

    fn index(self) -> usize {
        match self {
            Fault::HighTemperature => 0,
            Fault::HighVibration => 1,
            Fault::HighPressure => 2,
            Fault::HighCurrent => 3,
        }
    }
}

struct SimulatedMachine {
    id: MachineId,
    thresholds: Thresholds,
    values: [f64; 4],
    operating_hours: f64,
}

pub struct SensorSimulator {
    rng: StdRng,
    machines: Vec<SimulatedMachine>,
    anomaly_chance: f64,
    interval: Duration,
}

impl SensorSimulator {
    pub fn new(config: &SimulatorConfig, fleet: &[(Machine, MachinePreset)]) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let machines = fleet
            .iter()
            .map(|(m, preset)| SimulatedMachine {
                id: m.id,
                thresholds: m.thresholds.clone(),
                values: preset.nominal,
                operating_hours: 0.0,
            })
            .collect();
        Self {
            rng,
            machines,
            anomaly_chance: config.anomaly_chance.clamp(0.0, 1.0),
            interval: Duration::from_millis(config.interval_ms),
        }
    }

    /// One reading per machine, drifting each channel by up to 2% and
    /// occasionally replacing one channel with a fault value. Readings carry
    /// no timestamp; the pipeline clock stamps them on ingest.
    pub fn next_round(&mut self) -> Vec<NewReading> {
        let hours_per_round = self.interval.as_secs_f64() / 3600.0;
        let mut out = Vec::with_capacity(self.machines.len());

        for i in 0..self.machines.len() {
            let mut values = self.machines[i].values;
            for v in values.iter_mut() {
                *v *= 1.0 + self.rng.gen_range(-0.02..=0.02);
            }
            self.machines[i].values = values;
            self.machines[i].operating_hours += hours_per_round;

            let mut emitted = values;
            if self.rng.gen_bool(self.anomaly_chance) {
                let fault = self.pick_fault();
                debug!(machine_id = %self.machines[i].id, ?fault, "injecting fault");
                self.apply_fault(i, fault, &mut emitted);
            }

            let m = &self.machines[i];
            out.push(NewReading {
                machine_id: m.id,
                timestamp: None,
                temperature: round2(emitted[0]),
                vibration: round2(emitted[1]),
                pressure: round2(emitted[2]),
                current: round2(emitted[3]),
                operating_hours: Some(round2(m.operating_hours)),
                labels: Vec::new(),
            });
        }
        out
    }

    fn pick_fault(&mut self) -> Fault {
        match self.rng.gen_range(0..4) {
            0 => Fault::HighTemperature,
            1 => Fault::HighVibration,
            2 => Fault::HighPressure,
            _ => Fault::HighCurrent,
        }
    }

    /// Set the faulted channel to 110-160% of the machine's limit for it.
    fn apply_fault(&mut self, machine: usize, fault: Fault, values: &mut [f64; 4]) {
        let limit = rule_for(fault.channel()).limit(&self.machines[machine].thresholds);
        values[fault.index()] = limit * self.rng.gen_range(1.1..1.6);
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Register `count` machines, cycling through [`PRESETS`].
pub async fn provision_fleet(pipeline: &Pipeline, count: usize) -> Result<Vec<(Machine, MachinePreset)>> {
    let mut fleet = Vec::with_capacity(count);
    for i in 0..count {
        let preset = PRESETS[i % PRESETS.len()];
        let mut new = NewMachine {
            name: format!("{} {}", preset.machine_type, i + 1),
            location: Some(LOCATIONS[i % LOCATIONS.len()].to_string()),
            machine_type: Some(preset.machine_type.to_string()),
            serial_number: Some(format!("SN-{}-{}", 1000 + i, (b'A' + (i % 6) as u8) as char)),
            ..NewMachine::default()
        };
        for (key, limit) in preset.thresholds {
            new.thresholds.insert(key.to_string(), *limit);
        }
        let machine = pipeline.register_machine(new).await?;
        fleet.push((machine, preset));
    }
    info!(machines = fleet.len(), "simulated fleet provisioned");
    Ok(fleet)
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SimulationReport {
    pub rounds: usize,
    pub readings_accepted: usize,
    pub readings_rejected: usize,
    pub evaluations_dropped: usize,
}

/// Emit `rounds` rounds of readings, one round every configured interval.
pub async fn run(pipeline: &Pipeline, simulator: &mut SensorSimulator, rounds: usize) -> SimulationReport {
    let mut report = SimulationReport::default();
    let mut ticker = tokio::time::interval(simulator.interval.max(Duration::from_millis(1)));

    for _ in 0..rounds {
        ticker.tick().await;
        for result in pipeline.ingest_batch(simulator.next_round()).await {
            match result {
                Ok(ack) => {
                    report.readings_accepted += 1;
                    if ack.evaluation == EvaluationStatus::Dropped {
                        report.evaluations_dropped += 1;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "simulated reading rejected");
                    report.readings_rejected += 1;
                }
            }
        }
        report.rounds += 1;
    }
    report
}
