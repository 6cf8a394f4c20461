use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum::{Display, EnumString};
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::domain::{
    BudgetPeriod, CurrentSettings, LoadConfig, LoadKind, SwitchSettings, DEFAULT_COOLDOWN_SECONDS,
};
use crate::regulation::{TargetStrategy, DEFAULT_RESTORE_MARGIN_KWH};

/// Configuration errors beyond what serde and validator catch
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("Invalid load {name}: {reason}")]
    InvalidLoad { name: String, reason: String },
    #[error("Duplicate load name: {0}")]
    DuplicateLoad(String),
}

/// What the controller does with its decisions
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OperationMode {
    /// Restore every load to full consumption
    Off,
    /// Compute and log decisions without acting
    #[default]
    Monitor,
    /// Execute decisions
    Control,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub budget: BudgetConfig,
    #[validate(nested)]
    pub controller: ControllerConfig,
    #[serde(default)]
    #[validate(nested)]
    pub loads: Vec<LoadEntry>,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_period_minutes"))]
pub struct BudgetConfig {
    #[validate(range(min = 0.1, max = 100.0))]
    pub max_energy_kwh: f64,
    /// Must divide a day so periods stay aligned to midnight
    #[serde(default = "default_period_minutes")]
    pub period_minutes: u32,
    #[serde(default = "default_base_fraction")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub base_fraction: f64,
    #[serde(default = "default_ramp_start_minutes")]
    #[validate(range(min = 0.0, max = 1440.0))]
    pub ramp_start_minutes: f64,
    #[serde(default = "default_restore_margin_kwh")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub restore_margin_kwh: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ControllerConfig {
    #[serde(default)]
    pub mode: OperationMode,
    #[serde(default = "default_tick_seconds")]
    #[validate(range(min = 1, max = 3600))]
    pub tick_seconds: u64,
    #[serde(default = "default_cooldown_seconds")]
    #[validate(range(max = 3600))]
    pub default_cooldown_seconds: u64,
}

/// One configured load as written in the config file
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoadEntry {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(range(min = 1, max = 100))]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub follows_enable_signal: bool,
    #[validate(range(max = 3600))]
    pub cooldown_seconds: Option<u64>,
    #[validate(range(min = 0.0, max = 50.0))]
    pub assumed_power_kw: Option<f64>,
    #[serde(flatten)]
    pub kind: LoadKindEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadKindEntry {
    ContinuousCurrent {
        #[serde(default = "default_min_amps")]
        min_amps: f64,
        #[serde(default = "default_max_amps")]
        max_amps: f64,
        #[serde(default = "default_phases")]
        phases: u8,
        #[serde(default = "default_voltage_v")]
        voltage_v: f64,
    },
    DiscreteSwitch {
        #[serde(default)]
        inverted: bool,
    },
}

/// Parameters of the simulated house used by the default backend
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_base_load_kw")]
    pub base_load_kw: f64,
    #[serde(default = "default_noise_fraction")]
    pub noise_fraction: f64,
    pub random_seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base_load_kw: default_base_load_kw(),
            noise_fraction: default_noise_fraction(),
            random_seed: None,
        }
    }
}

/// Log output format
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `"info,energy_budget_controller=debug"`
    pub filter: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_period_minutes() -> u32 {
    60
}
fn default_base_fraction() -> f64 {
    0.75
}
fn default_ramp_start_minutes() -> f64 {
    15.0
}
fn default_restore_margin_kwh() -> f64 {
    DEFAULT_RESTORE_MARGIN_KWH
}
fn default_tick_seconds() -> u64 {
    30
}
fn default_cooldown_seconds() -> u64 {
    DEFAULT_COOLDOWN_SECONDS
}
fn default_min_amps() -> f64 {
    6.0
}
fn default_max_amps() -> f64 {
    32.0
}
fn default_phases() -> u8 {
    3
}
fn default_voltage_v() -> f64 {
    400.0
}
fn default_base_load_kw() -> f64 {
    0.8
}
fn default_noise_fraction() -> f64 {
    0.1
}

fn validate_period_minutes(budget: &BudgetConfig) -> Result<(), ValidationError> {
    let minutes = budget.period_minutes;
    if minutes == 0 || 1440 % minutes != 0 {
        return Err(ValidationError::new("period_minutes_must_divide_day"));
    }
    Ok(())
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("EBC__").split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Self = figment.extract()?;
        cfg.validate().map_err(ConfigError::from)?;
        Ok(cfg)
    }

    pub fn period(&self) -> BudgetPeriod {
        BudgetPeriod::from_minutes(self.budget.period_minutes)
    }

    pub fn target_strategy(&self) -> TargetStrategy {
        TargetStrategy {
            base_fraction: self.budget.base_fraction,
            ramp_start_minutes: self.budget.ramp_start_minutes,
        }
    }

    /// Convert the configured loads, rejecting duplicates and bad wiring
    pub fn load_configs(&self) -> Result<Vec<LoadConfig>, ConfigError> {
        let mut seen = HashSet::new();
        self.loads
            .iter()
            .map(|entry| {
                if !seen.insert(entry.name.as_str()) {
                    return Err(ConfigError::DuplicateLoad(entry.name.clone()));
                }
                entry.to_load_config(self.controller.default_cooldown_seconds)
            })
            .collect()
    }
}

impl LoadEntry {
    pub fn to_load_config(
        &self,
        default_cooldown_seconds: u64,
    ) -> Result<LoadConfig, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidLoad {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        let kind = match &self.kind {
            LoadKindEntry::ContinuousCurrent {
                min_amps,
                max_amps,
                phases,
                voltage_v,
            } => {
                if !matches!(*phases, 1 | 3) {
                    return Err(invalid("phases must be 1 or 3"));
                }
                if *min_amps < 0.0 || min_amps > max_amps {
                    return Err(invalid("min_amps must be between 0 and max_amps"));
                }
                if *voltage_v <= 0.0 {
                    return Err(invalid("voltage_v must be positive"));
                }
                LoadKind::ContinuousCurrent(CurrentSettings {
                    min_amps: *min_amps,
                    max_amps: *max_amps,
                    phases: *phases,
                    voltage_v: *voltage_v,
                })
            }
            LoadKindEntry::DiscreteSwitch { inverted } => {
                LoadKind::DiscreteSwitch(SwitchSettings { inverted: *inverted })
            }
        };

        Ok(LoadConfig {
            name: self.name.clone(),
            priority: self.priority,
            enabled: self.enabled,
            follows_enable_signal: self.follows_enable_signal,
            cooldown_seconds: self.cooldown_seconds.unwrap_or(default_cooldown_seconds),
            assumed_power_kw: self.assumed_power_kw,
            kind,
        })
    }
}
