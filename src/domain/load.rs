use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};
use thiserror::Error;

use super::types::SwitchState;

/// Cooldown applied when a load does not configure its own (seconds)
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 120;

/// Measured power must exceed this before a kW/A ratio is learned from it
pub const LEARN_MIN_POWER_KW: f64 = 0.1;

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Load model errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Duplicate load name: {0}")]
    DuplicateName(String),
    #[error("Unknown load: {0}")]
    UnknownLoad(String),
}

/// Control family of a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoadType {
    /// Adjustable current draw, e.g. an EV charger
    ContinuousCurrent,
    /// On/off relay
    DiscreteSwitch,
}

/// Static electrical parameters of a current-controlled load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSettings {
    pub min_amps: f64,
    pub max_amps: f64,
    pub phases: u8,
    pub voltage_v: f64,
}

impl Default for CurrentSettings {
    fn default() -> Self {
        Self {
            min_amps: 6.0,
            max_amps: 32.0,
            phases: 3,
            voltage_v: 400.0,
        }
    }
}

impl CurrentSettings {
    /// kW drawn per ampere according to the nameplate wiring
    ///
    /// 1-phase: `V·I/1000`, 3-phase: `√3·V·I/1000`
    pub fn nominal_kw_per_amp(&self) -> f64 {
        if self.phases == 3 {
            SQRT_3 * self.voltage_v / 1000.0
        } else {
            self.voltage_v / 1000.0
        }
    }
}

/// Static parameters of a switched load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwitchSettings {
    /// The load consumes power while the switch is OFF
    pub inverted: bool,
}

impl SwitchSettings {
    /// Switch position in which the load draws power
    pub fn consuming_state(&self) -> SwitchState {
        if self.inverted {
            SwitchState::Off
        } else {
            SwitchState::On
        }
    }

    /// Switch position in which the load is curtailed
    pub fn reduced_state(&self) -> SwitchState {
        if self.inverted {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoadKind {
    ContinuousCurrent(CurrentSettings),
    DiscreteSwitch(SwitchSettings),
}

impl LoadKind {
    pub fn load_type(&self) -> LoadType {
        match self {
            LoadKind::ContinuousCurrent(_) => LoadType::ContinuousCurrent,
            LoadKind::DiscreteSwitch(_) => LoadType::DiscreteSwitch,
        }
    }
}

/// Immutable description of one controllable load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    pub name: String,
    /// Lower values are curtailed first
    pub priority: i32,
    pub enabled: bool,
    /// When set, the external enable signal decides whether the load is active
    pub follows_enable_signal: bool,
    pub cooldown_seconds: u64,
    pub assumed_power_kw: Option<f64>,
    pub kind: LoadKind,
}

impl LoadConfig {
    pub fn switch(name: impl Into<String>, priority: i32, assumed_power_kw: Option<f64>) -> Self {
        Self {
            name: name.into(),
            priority,
            enabled: true,
            follows_enable_signal: false,
            cooldown_seconds: DEFAULT_COOLDOWN_SECONDS,
            assumed_power_kw,
            kind: LoadKind::DiscreteSwitch(SwitchSettings::default()),
        }
    }

    pub fn continuous(name: impl Into<String>, priority: i32, settings: CurrentSettings) -> Self {
        Self {
            name: name.into(),
            priority,
            enabled: true,
            follows_enable_signal: false,
            cooldown_seconds: DEFAULT_COOLDOWN_SECONDS,
            assumed_power_kw: None,
            kind: LoadKind::ContinuousCurrent(settings),
        }
    }

    pub fn with_cooldown(mut self, seconds: u64) -> Self {
        self.cooldown_seconds = seconds;
        self
    }

    pub fn inverted(mut self) -> Self {
        if let LoadKind::DiscreteSwitch(settings) = &mut self.kind {
            settings.inverted = true;
        }
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn load_type(&self) -> LoadType {
        self.kind.load_type()
    }
}

/// Live, per-tick state of a load
///
/// Written by the refresh step and by the executor, never by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadRuntimeState {
    /// Epoch seconds of the last executed action, 0 if never acted on
    pub last_action_time: i64,
    pub switch_state: Option<SwitchState>,
    pub current_amps: Option<f64>,
    pub measured_power_kw: Option<f64>,
    pub learned_kw_per_amp: Option<f64>,
    pub enable_signal: Option<bool>,
    /// Current limits last reported by the device
    pub device_min_amps: Option<f64>,
    pub device_max_amps: Option<f64>,
}

impl LoadRuntimeState {
    /// Learn kW/A from simultaneous current and power readings
    ///
    /// Returns the new ratio when one was recorded.
    pub fn learn_ratio(&mut self) -> Option<f64> {
        match (self.current_amps, self.measured_power_kw) {
            (Some(amps), Some(kw)) if amps > 0.0 && kw > LEARN_MIN_POWER_KW => {
                let ratio = kw / amps;
                self.learned_kw_per_amp = Some(ratio);
                Some(ratio)
            }
            _ => None,
        }
    }

    /// Measured power when it is present and positive
    pub fn positive_measured_power_kw(&self) -> Option<f64> {
        self.measured_power_kw.filter(|kw| *kw > 0.0)
    }
}

/// Borrowed view pairing a load's configuration with its runtime state
#[derive(Debug, Clone, Copy)]
pub struct LoadRef<'a> {
    pub config: &'a LoadConfig,
    pub state: &'a LoadRuntimeState,
}

impl<'a> LoadRef<'a> {
    pub fn new(config: &'a LoadConfig, state: &'a LoadRuntimeState) -> Self {
        Self { config, state }
    }

    pub fn name(&self) -> &'a str {
        &self.config.name
    }

    pub fn priority(&self) -> i32 {
        self.config.priority
    }

    pub fn load_type(&self) -> LoadType {
        self.config.load_type()
    }

    /// Effective enabled flag, honouring the external enable signal
    ///
    /// An unknown signal disables the load.
    pub fn is_enabled(&self) -> bool {
        if self.config.follows_enable_signal {
            self.state.enable_signal.unwrap_or(false)
        } else {
            self.config.enabled
        }
    }

    pub fn seconds_since_action(&self, now: i64) -> i64 {
        now - self.state.last_action_time
    }

    pub fn in_cooldown(&self, now: i64) -> bool {
        self.seconds_since_action(now) < self.config.cooldown_seconds as i64
    }

    /// Seconds until the cooldown expires, 0 if already expired
    pub fn cooldown_remaining(&self, now: i64) -> i64 {
        (self.config.cooldown_seconds as i64 - self.seconds_since_action(now)).max(0)
    }

    /// kW per ampere, learned ratio first, nameplate formula otherwise
    pub fn kw_per_amp(&self) -> Option<f64> {
        match &self.config.kind {
            LoadKind::ContinuousCurrent(settings) => Some(
                self.state
                    .learned_kw_per_amp
                    .unwrap_or_else(|| settings.nominal_kw_per_amp()),
            ),
            LoadKind::DiscreteSwitch(_) => None,
        }
    }

    /// Current limits for setpoints, `(min, max)` in amperes
    ///
    /// Limits reported by the device win over the configured ones. A
    /// reported pair with `min > max` is ignored.
    pub fn current_limits(&self) -> Option<(f64, f64)> {
        let LoadKind::ContinuousCurrent(settings) = &self.config.kind else {
            return None;
        };
        let min = self.state.device_min_amps.unwrap_or(settings.min_amps);
        let max = self.state.device_max_amps.unwrap_or(settings.max_amps);
        if min <= max {
            Some((min, max))
        } else {
            Some((settings.min_amps, settings.max_amps))
        }
    }

    /// Whether the load is known to be drawing power right now
    ///
    /// Unknown switch position or current reads as not consuming.
    pub fn is_consuming(&self) -> bool {
        match &self.config.kind {
            LoadKind::DiscreteSwitch(settings) => {
                self.state.switch_state == Some(settings.consuming_state())
            }
            LoadKind::ContinuousCurrent(_) => self.state.current_amps.is_some_and(|a| a > 0.0),
        }
    }
}

/// Ordered set of loads for one budget instance
///
/// Configuration keeps its original order; runtime state is keyed by name.
#[derive(Debug, Clone, Default)]
pub struct LoadBank {
    configs: Vec<LoadConfig>,
    runtime: HashMap<String, LoadRuntimeState>,
}

impl LoadBank {
    pub fn new(configs: Vec<LoadConfig>) -> Result<Self, LoadError> {
        let mut runtime = HashMap::with_capacity(configs.len());
        for config in &configs {
            if runtime
                .insert(config.name.clone(), LoadRuntimeState::default())
                .is_some()
            {
                return Err(LoadError::DuplicateName(config.name.clone()));
            }
        }
        Ok(Self { configs, runtime })
    }

    /// Replace the whole load set, dropping all runtime state
    pub fn reconfigure(&mut self, configs: Vec<LoadConfig>) -> Result<(), LoadError> {
        *self = Self::new(configs)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn configs(&self) -> &[LoadConfig] {
        &self.configs
    }

    /// Views over every load in configuration order
    pub fn loads(&self) -> Vec<LoadRef<'_>> {
        self.configs
            .iter()
            .filter_map(|config| {
                self.runtime
                    .get(&config.name)
                    .map(|state| LoadRef::new(config, state))
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<LoadRef<'_>> {
        let config = self.configs.iter().find(|c| c.name == name)?;
        let state = self.runtime.get(name)?;
        Some(LoadRef::new(config, state))
    }

    pub fn state(&self, name: &str) -> Option<&LoadRuntimeState> {
        self.runtime.get(name)
    }

    pub fn state_mut(&mut self, name: &str) -> Result<&mut LoadRuntimeState, LoadError> {
        self.runtime
            .get_mut(name)
            .ok_or_else(|| LoadError::UnknownLoad(name.to_string()))
    }

    /// Stamp an executed action on a load
    pub fn mark_action(&mut self, name: &str, now: i64) -> Result<(), LoadError> {
        self.state_mut(name)?.last_action_time = now;
        Ok(())
    }
}
