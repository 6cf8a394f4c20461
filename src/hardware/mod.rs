//! Sensor and actuator seams.
//!
//! The controller only talks to the outside world through [`StateSource`] and
//! [`Actuator`]. A simulated backend is available behind the `sim` feature.

#[cfg(feature = "sim")]
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{LoadConfig, Power, PowerUnit, SwitchState};

#[cfg(feature = "sim")]
pub use simulated::{SimulatedHouse, SimulatedHouseConfig, SimulatedLoad, SimulatedLoadKind};

/// Errors raised while reading sensors
#[derive(Debug, Error)]
pub enum ReadingError {
    #[error("Sensor unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid value for {entity}: {value:?}")]
    Parse { entity: String, value: String },
    #[error("Communication error: {0}")]
    Communication(String),
}

/// Errors raised by actuators
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("Unknown load: {0}")]
    UnknownLoad(String),
    #[error("Command rejected by {load}: {reason}")]
    Rejected { load: String, reason: String },
    #[error("Communication error: {0}")]
    Communication(String),
}

/// Raw power value together with the unit it was reported in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerReading {
    pub value: f64,
    pub unit: PowerUnit,
}

impl PowerReading {
    pub fn watts(value: f64) -> Self {
        Self {
            value,
            unit: PowerUnit::Watt,
        }
    }

    pub fn kilowatts(value: f64) -> Self {
        Self {
            value,
            unit: PowerUnit::Kilowatt,
        }
    }

    pub fn to_power(self) -> Power {
        Power::from_reading(self.value, self.unit)
    }

    pub fn as_kilowatts(self) -> f64 {
        self.to_power().as_kilowatts()
    }
}

/// States a sensor reports when it has no value
const NO_VALUE_STATES: [&str; 3] = ["", "unknown", "unavailable"];

/// Interpret a raw enable-signal state
///
/// Only on/true/1 enable. A sensor without a value yields `None`.
pub fn parse_enable_signal(raw: &str) -> Option<bool> {
    let raw = raw.trim().to_ascii_lowercase();
    if NO_VALUE_STATES.contains(&raw.as_str()) {
        return None;
    }
    Some(matches!(raw.as_str(), "on" | "true" | "1"))
}

/// One tick's readings for a single load; every field may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReading {
    pub enable_signal: Option<bool>,
    pub switch_state: Option<SwitchState>,
    pub current_amps: Option<f64>,
    /// Current limits reported by the device; they may change at runtime
    pub min_amps: Option<f64>,
    pub max_amps: Option<f64>,
    pub power: Option<PowerReading>,
}

/// Source of live energy and load readings
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateSource: Send + Sync {
    /// Energy consumed so far in the current budget period (kWh)
    async fn period_energy_kwh(&self) -> Result<f64, ReadingError>;

    /// Instantaneous house power, if a sensor is configured
    async fn house_power(&self) -> Result<Option<PowerReading>, ReadingError>;

    async fn read_load(&self, load: &LoadConfig) -> Result<LoadReading, ReadingError>;
}

/// Commands sent to controllable loads
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn set_current(&self, load: &str, amps: f64) -> Result<(), ActuatorError>;

    async fn set_switch(&self, load: &str, state: SwitchState) -> Result<(), ActuatorError>;
}
