//! Telemetry domain types: machines, readings and their sensor channels.

pub mod clock;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque machine identity.
pub type MachineId = Uuid;

/// Threshold name -> numeric limit, e.g. `temperature_critical = 85.0`.
pub type Thresholds = BTreeMap<String, f64>;

/// Lowest physically meaningful temperature, in Celsius.
pub const ABSOLUTE_ZERO_C: f64 = -273.15;

/// The fixed set of numeric sensor channels carried by every reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Temperature,
    Vibration,
    Pressure,
    Current,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Temperature,
        Channel::Vibration,
        Channel::Pressure,
        Channel::Current,
    ];

    /// Value of this channel in `reading`.
    pub fn value(self, reading: &Reading) -> f64 {
        match self {
            Channel::Temperature => reading.temperature,
            Channel::Vibration => reading.vibration,
            Channel::Pressure => reading.pressure,
            Channel::Current => reading.current,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Temperature => write!(f, "temperature"),
            Channel::Vibration => write!(f, "vibration"),
            Channel::Pressure => write!(f, "pressure"),
            Channel::Current => write!(f, "current"),
        }
    }
}

/// A registered machine and its threshold configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub name: String,
    pub location: Option<String>,
    #[serde(rename = "type")]
    pub machine_type: Option<String>,
    pub model_number: Option<String>,
    pub serial_number: Option<String>,
    pub installation_date: Option<DateTime<Utc>>,
    pub last_maintenance_date: Option<DateTime<Utc>>,
    pub thresholds: Thresholds,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Provisioning request for a new machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMachine {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, rename = "type")]
    pub machine_type: Option<String>,
    #[serde(default)]
    pub model_number: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub installation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_maintenance_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub thresholds: Thresholds,
}

impl NewMachine {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, key: impl Into<String>, limit: f64) -> Self {
        self.thresholds.insert(key.into(), limit);
        self
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }
}

/// One timestamped multi-channel sample, as accepted into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub machine_id: MachineId,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub vibration: f64,
    pub pressure: f64,
    pub current: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

/// A reading as submitted by a producer. The timestamp is optional and is
/// filled from the pipeline clock when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    pub machine_id: MachineId,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub temperature: f64,
    pub vibration: f64,
    pub pressure: f64,
    pub current: f64,
    #[serde(default)]
    pub operating_hours: Option<f64>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Reasons a submitted reading is rejected before it reaches the store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadingError {
    #[error("{channel} value {value} is not a finite number")]
    NonFinite { channel: String, value: f64 },
    #[error("temperature {0} is below absolute zero")]
    BelowAbsoluteZero(f64),
}

impl NewReading {
    pub fn new(
        machine_id: MachineId,
        temperature: f64,
        vibration: f64,
        pressure: f64,
        current: f64,
    ) -> Self {
        Self {
            machine_id,
            timestamp: None,
            temperature,
            vibration,
            pressure,
            current,
            operating_hours: None,
            labels: Vec::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn validate(&self) -> Result<(), ReadingError> {
        let channels = [
            ("temperature", self.temperature),
            ("vibration", self.vibration),
            ("pressure", self.pressure),
            ("current", self.current),
        ];
        for (channel, value) in channels {
            if !value.is_finite() {
                return Err(ReadingError::NonFinite {
                    channel: channel.to_string(),
                    value,
                });
            }
        }
        if let Some(hours) = self.operating_hours {
            if !hours.is_finite() {
                return Err(ReadingError::NonFinite {
                    channel: "operating_hours".to_string(),
                    value: hours,
                });
            }
        }
        if self.temperature < ABSOLUTE_ZERO_C {
            return Err(ReadingError::BelowAbsoluteZero(self.temperature));
        }
        Ok(())
    }

    /// Fix the timestamp, defaulting to `now`, and produce the stored form.
    pub fn into_reading(self, now: DateTime<Utc>) -> Reading {
        Reading {
            machine_id: self.machine_id,
            timestamp: self.timestamp.unwrap_or(now),
            temperature: self.temperature,
            vibration: self.vibration,
            pressure: self.pressure,
            current: self.current,
            operating_hours: self.operating_hours,
            labels: self.labels,
        }
    }
}
