//! In-memory house with controllable loads, for development and tests.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    parse_enable_signal, Actuator, ActuatorError, LoadReading, PowerReading, ReadingError,
    StateSource,
};
use crate::domain::{BudgetPeriod, LoadConfig, LoadKind, SwitchState};

/// How a simulated load draws power
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimulatedLoadKind {
    Switch {
        state: SwitchState,
        power_kw: f64,
        /// Draws power while OFF
        inverted: bool,
    },
    Current {
        amps: f64,
        kw_per_amp: f64,
        min_amps: f64,
        max_amps: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedLoad {
    pub name: String,
    pub kind: SimulatedLoadKind,
    /// Raw state of the enable sensor, e.g. `"on"` or `"unavailable"`
    pub enable_state: Option<String>,
}

impl SimulatedLoad {
    pub fn switch(name: impl Into<String>, power_kw: f64) -> Self {
        Self {
            name: name.into(),
            kind: SimulatedLoadKind::Switch {
                state: SwitchState::On,
                power_kw,
                inverted: false,
            },
            enable_state: None,
        }
    }

    pub fn current(name: impl Into<String>, amps: f64, kw_per_amp: f64) -> Self {
        Self {
            name: name.into(),
            kind: SimulatedLoadKind::Current {
                amps,
                kw_per_amp,
                min_amps: 6.0,
                max_amps: 32.0,
            },
            enable_state: None,
        }
    }

    /// Simulated counterpart of a configured load, drawing full power
    pub fn from_config(config: &LoadConfig) -> Self {
        let enable_state = config.follows_enable_signal.then(|| "on".to_string());
        match &config.kind {
            LoadKind::DiscreteSwitch(settings) => Self {
                name: config.name.clone(),
                kind: SimulatedLoadKind::Switch {
                    state: settings.consuming_state(),
                    power_kw: config.assumed_power_kw.unwrap_or(1.0),
                    inverted: settings.inverted,
                },
                enable_state,
            },
            LoadKind::ContinuousCurrent(settings) => Self {
                name: config.name.clone(),
                kind: SimulatedLoadKind::Current {
                    amps: settings.max_amps,
                    kw_per_amp: settings.nominal_kw_per_amp(),
                    min_amps: settings.min_amps,
                    max_amps: settings.max_amps,
                },
                enable_state,
            },
        }
    }

    pub fn power_kw(&self) -> f64 {
        match &self.kind {
            SimulatedLoadKind::Switch {
                state,
                power_kw,
                inverted,
            } => {
                if state.is_on() != *inverted {
                    *power_kw
                } else {
                    0.0
                }
            }
            SimulatedLoadKind::Current {
                amps, kw_per_amp, ..
            } => amps * kw_per_amp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedHouseConfig {
    /// Uncontrolled consumption (kW)
    pub base_load_kw: f64,
    /// Noise amplitude as a fraction of the base load
    pub noise_fraction: f64,
    /// Random seed for reproducibility (None = random)
    pub random_seed: Option<u64>,
    pub loads: Vec<SimulatedLoad>,
}

impl Default for SimulatedHouseConfig {
    fn default() -> Self {
        Self {
            base_load_kw: 0.8,
            noise_fraction: 0.1,
            random_seed: None,
            loads: Vec::new(),
        }
    }
}

struct HouseState {
    base_load_kw: f64,
    noise_fraction: f64,
    noise_kw: f64,
    loads: Vec<SimulatedLoad>,
    period_energy_kwh: f64,
    last_step: Option<NaiveDateTime>,
    rng: rand::rngs::StdRng,
}

impl HouseState {
    fn total_power_kw(&self) -> f64 {
        let loads: f64 = self.loads.iter().map(SimulatedLoad::power_kw).sum();
        (self.base_load_kw + self.noise_kw + loads).max(0.0)
    }

    fn load_mut(&mut self, name: &str) -> Result<&mut SimulatedLoad, ActuatorError> {
        self.loads
            .iter_mut()
            .find(|l| l.name == name)
            .ok_or_else(|| ActuatorError::UnknownLoad(name.to_string()))
    }
}

/// Simulated house implementing both [`StateSource`] and [`Actuator`]
#[derive(Clone)]
pub struct SimulatedHouse {
    state: Arc<RwLock<HouseState>>,
    period: BudgetPeriod,
}

impl SimulatedHouse {
    pub fn new(config: SimulatedHouseConfig, period: BudgetPeriod) -> Self {
        use rand::SeedableRng;

        let rng = match config.random_seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_entropy(),
        };

        Self {
            state: Arc::new(RwLock::new(HouseState {
                base_load_kw: config.base_load_kw,
                noise_fraction: config.noise_fraction,
                noise_kw: 0.0,
                loads: config.loads,
                period_energy_kwh: 0.0,
                last_step: None,
                rng,
            })),
            period,
        }
    }

    /// Integrate consumption up to `now`, resetting at each period boundary
    pub async fn step(&self, now: NaiveDateTime) {
        let mut st = self.state.write().await;

        if let Some(last) = st.last_step {
            let power_kw = st.total_power_kw();
            if self.period.index(now) != self.period.index(last) {
                // Only the part of the step inside the new period counts
                let into_period =
                    self.period.length_seconds() as f64 - self.period.remaining_seconds(now);
                st.period_energy_kwh = power_kw * into_period.max(0.0) / 3600.0;
            } else {
                let elapsed_s = (now - last).num_milliseconds() as f64 / 1000.0;
                st.period_energy_kwh += power_kw * elapsed_s.max(0.0) / 3600.0;
            }
        }
        st.last_step = Some(now);

        let amplitude = st.base_load_kw * st.noise_fraction;
        let noise_kw = if amplitude > 0.0 {
            st.rng.gen_range(-amplitude..=amplitude)
        } else {
            0.0
        };
        st.noise_kw = noise_kw;

        debug!(
            energy_kwh = st.period_energy_kwh,
            power_kw = st.total_power_kw(),
            "simulated house step"
        );
    }

    pub async fn power_kw(&self) -> f64 {
        self.state.read().await.total_power_kw()
    }

    pub async fn set_period_energy(&self, energy_kwh: f64) {
        self.state.write().await.period_energy_kwh = energy_kwh;
    }

    pub async fn set_enable_state(
        &self,
        load: &str,
        state: Option<&str>,
    ) -> Result<(), ActuatorError> {
        self.state.write().await.load_mut(load)?.enable_state = state.map(str::to_string);
        Ok(())
    }

    /// Change the current limits a charger advertises
    pub async fn set_current_limits(
        &self,
        load: &str,
        min: f64,
        max: f64,
    ) -> Result<(), ActuatorError> {
        let mut st = self.state.write().await;
        match &mut st.load_mut(load)?.kind {
            SimulatedLoadKind::Current {
                min_amps, max_amps, ..
            } => {
                *min_amps = min;
                *max_amps = max;
                Ok(())
            }
            SimulatedLoadKind::Switch { .. } => Err(ActuatorError::Rejected {
                load: load.to_string(),
                reason: "switch has no current limits".to_string(),
            }),
        }
    }

    pub async fn load(&self, name: &str) -> Option<SimulatedLoad> {
        self.state
            .read()
            .await
            .loads
            .iter()
            .find(|l| l.name == name)
            .cloned()
    }
}

#[async_trait]
impl StateSource for SimulatedHouse {
    async fn period_energy_kwh(&self) -> Result<f64, ReadingError> {
        Ok(self.state.read().await.period_energy_kwh)
    }

    async fn house_power(&self) -> Result<Option<PowerReading>, ReadingError> {
        let kw = self.state.read().await.total_power_kw();
        Ok(Some(PowerReading::watts(kw * 1000.0)))
    }

    async fn read_load(&self, load: &LoadConfig) -> Result<LoadReading, ReadingError> {
        let st = self.state.read().await;
        let Some(sim) = st.loads.iter().find(|l| l.name == load.name) else {
            return Ok(LoadReading::default());
        };

        let enable_signal = sim.enable_state.as_deref().and_then(parse_enable_signal);
        let reading = match &sim.kind {
            SimulatedLoadKind::Switch { state, .. } => LoadReading {
                enable_signal,
                switch_state: Some(*state),
                power: Some(PowerReading::kilowatts(sim.power_kw())),
                ..Default::default()
            },
            SimulatedLoadKind::Current {
                amps,
                min_amps,
                max_amps,
                ..
            } => LoadReading {
                enable_signal,
                current_amps: Some(*amps),
                min_amps: Some(*min_amps),
                max_amps: Some(*max_amps),
                power: Some(PowerReading::watts(sim.power_kw() * 1000.0)),
                ..Default::default()
            },
        };
        Ok(reading)
    }
}

#[async_trait]
impl Actuator for SimulatedHouse {
    async fn set_current(&self, load: &str, amps: f64) -> Result<(), ActuatorError> {
        let mut st = self.state.write().await;
        match &mut st.load_mut(load)?.kind {
            SimulatedLoadKind::Current { amps: current, .. } => {
                *current = amps.max(0.0);
                Ok(())
            }
            SimulatedLoadKind::Switch { .. } => Err(ActuatorError::Rejected {
                load: load.to_string(),
                reason: "switch does not accept a current setpoint".to_string(),
            }),
        }
    }

    async fn set_switch(&self, load: &str, state: SwitchState) -> Result<(), ActuatorError> {
        let mut st = self.state.write().await;
        match &mut st.load_mut(load)?.kind {
            SimulatedLoadKind::Switch { state: current, .. } => {
                *current = state;
                Ok(())
            }
            SimulatedLoadKind::Current { .. } => Err(ActuatorError::Rejected {
                load: load.to_string(),
                reason: "current-controlled load has no switch".to_string(),
            }),
        }
    }
}
