pub mod executor;
pub mod report;

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{Config, OperationMode};
use crate::domain::{
    needed_reduction_kw, project_end_energy_kwh, BudgetPeriod, BudgetState, LoadBank, LoadConfig,
    LoadError, LoadRuntimeState, LoadType,
};
use crate::hardware::{Actuator, LoadReading, PowerReading, ReadingError, StateSource};
use crate::regulation::{
    decide, estimate_down_capacity, Action, RegulationInput, TargetStrategy,
    DEFAULT_RESTORE_MARGIN_KWH,
};

pub use executor::{ExecutionReport, Executor, LoadEffect};
pub use report::TickReport;

/// Errors that abort a single tick
#[derive(Debug, Error)]
pub enum TickError {
    #[error("Input unavailable: {0}")]
    InputUnavailable(#[from] ReadingError),
}

/// Runtime parameters of one budget instance
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub mode: OperationMode,
    pub period: BudgetPeriod,
    pub max_energy_kwh: f64,
    pub strategy: TargetStrategy,
    pub restore_margin_kwh: f64,
    pub tick_seconds: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            mode: OperationMode::Monitor,
            period: BudgetPeriod::hourly(),
            max_energy_kwh: 5.0,
            strategy: TargetStrategy::default(),
            restore_margin_kwh: DEFAULT_RESTORE_MARGIN_KWH,
            tick_seconds: 30,
        }
    }
}

impl ControllerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            mode: cfg.controller.mode,
            period: cfg.period(),
            max_energy_kwh: cfg.budget.max_energy_kwh,
            strategy: cfg.target_strategy(),
            restore_margin_kwh: cfg.budget.restore_margin_kwh,
            tick_seconds: cfg.controller.tick_seconds,
        }
    }
}

/// Last executed action, kept across ticks until the next one or a rollover
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub last_action: String,
    pub last_action_reason: String,
    pub period_index: Option<i64>,
}

impl Default for ControllerStatus {
    fn default() -> Self {
        Self {
            last_action: "Initialized".to_string(),
            last_action_reason: String::new(),
            period_index: None,
        }
    }
}

pub struct BudgetController {
    source: Arc<dyn StateSource>,
    executor: Executor,
    settings: RwLock<ControllerSettings>,
    loads: RwLock<LoadBank>,
    status: RwLock<ControllerStatus>,
}

impl BudgetController {
    pub fn new(
        settings: ControllerSettings,
        loads: Vec<LoadConfig>,
        source: Arc<dyn StateSource>,
        actuator: Arc<dyn Actuator>,
    ) -> Result<Self, LoadError> {
        Ok(Self {
            source,
            executor: Executor::new(actuator),
            settings: RwLock::new(settings),
            loads: RwLock::new(LoadBank::new(loads)?),
            status: RwLock::new(ControllerStatus::default()),
        })
    }

    pub async fn settings(&self) -> ControllerSettings {
        self.settings.read().await.clone()
    }

    pub async fn status(&self) -> ControllerStatus {
        self.status.read().await.clone()
    }

    pub async fn load_state(&self, name: &str) -> Option<LoadRuntimeState> {
        self.loads.read().await.state(name).cloned()
    }

    /// Replace the load set; all runtime state starts over
    pub async fn reconfigure(&self, loads: Vec<LoadConfig>) -> Result<(), LoadError> {
        let count = loads.len();
        self.loads.write().await.reconfigure(loads)?;
        info!(loads = count, "configuration updated, reloaded loads");
        Ok(())
    }

    /// Replace mode, budget and timing; takes effect on the next tick
    pub async fn reconfigure_settings(&self, settings: ControllerSettings) {
        info!(
            mode = %settings.mode,
            max_energy_kwh = settings.max_energy_kwh,
            period_minutes = settings.period.length_seconds() / 60,
            "controller settings updated"
        );
        *self.settings.write().await = settings;
    }

    pub async fn run(&self) -> Result<()> {
        let mut tick_seconds = self.settings.read().await.tick_seconds.max(1);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(tick_seconds));
        loop {
            interval.tick().await;
            if let Err(e) = self.tick(Local::now()).await {
                warn!(error = %e, "tick aborted");
            }

            let configured = self.settings.read().await.tick_seconds.max(1);
            if configured != tick_seconds {
                debug!(from = tick_seconds, to = configured, "tick interval changed");
                tick_seconds = configured;
                interval = tokio::time::interval(std::time::Duration::from_secs(tick_seconds));
                interval.tick().await;
            }
        }
    }

    /// Run one regulation cycle at `now`
    ///
    /// Periods follow the local wall clock of `now`; cooldowns use its epoch
    /// seconds, so they are unaffected by offset changes.
    pub async fn tick<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Result<TickReport, TickError> {
        let epoch = now.timestamp();
        let local = now.naive_local();
        let settings = self.settings().await;
        let period = settings.period;
        let period_index = period.index(local);
        self.check_rollover(period_index).await;

        let consumed_kwh = self.source.period_energy_kwh().await?;
        if !consumed_kwh.is_finite() {
            return Err(ReadingError::Parse {
                entity: "period energy".to_string(),
                value: consumed_kwh.to_string(),
            }
            .into());
        }
        let power_kw = match self.source.house_power().await {
            Ok(reading) => reading
                .map(PowerReading::as_kilowatts)
                .filter(|kw| kw.is_finite()),
            Err(e) => {
                debug!(error = %e, "house power unavailable");
                None
            }
        };

        let mut bank = self.loads.write().await;
        self.refresh_loads(&mut bank).await;

        let remaining_seconds = period.remaining_seconds(local);
        let remaining_minutes = (remaining_seconds / 60.0).max(0.0);

        let (budget, decision) = {
            let loads = bank.loads();
            let down_capacity_kw = estimate_down_capacity(&loads);
            let target = settings.strategy.effective_target(
                settings.max_energy_kwh,
                remaining_minutes,
                Some(down_capacity_kw),
                power_kw,
            );
            let projected_end_kwh =
                project_end_energy_kwh(consumed_kwh, power_kw, remaining_seconds);
            let needed_kw =
                needed_reduction_kw(projected_end_kwh, target.energy_kwh, remaining_seconds);

            debug!(
                max_kwh = settings.max_energy_kwh,
                effective_kwh = target.energy_kwh,
                fraction = target.fraction,
                down_capacity_kw,
                "target strategy"
            );

            let input = RegulationInput {
                loads: &loads,
                needed_reduction_kw: needed_kw,
                projected_end_kwh,
                max_energy_kwh: target.energy_kwh,
                now: epoch,
                current_power_kw: power_kw,
                remaining_minutes: Some(remaining_minutes),
                restore_margin_kwh: settings.restore_margin_kwh,
                period_hours: period.hours(),
            };
            let decision = decide(&input);

            let budget = BudgetState {
                consumed_kwh,
                power_kw,
                remaining_seconds,
                max_energy_kwh: settings.max_energy_kwh,
                effective_target_kwh: target.energy_kwh,
                target_fraction: target.fraction,
                down_capacity_kw,
                projected_end_kwh,
                needed_reduction_kw: needed_kw,
            };
            (budget, decision)
        };

        debug!(action = %decision.action, reason = %decision.reason, "regulation decision");

        let execution = match settings.mode {
            OperationMode::Off => {
                self.executor
                    .restore_all(&mut bank, remaining_seconds, "Mode is off")
                    .await
            }
            OperationMode::Monitor => {
                info!(
                    action = %decision.action,
                    reason = %decision.reason,
                    "monitor mode, decision not executed"
                );
                ExecutionReport::default()
            }
            OperationMode::Control => match decision.action {
                Action::Reduce => {
                    self.executor
                        .execute_reductions(&mut bank, &decision.reductions, epoch)
                        .await
                }
                Action::Restore => {
                    self.executor
                        .execute_restoration(
                            &mut bank,
                            &decision.restorations,
                            budget.margin_kwh(),
                            remaining_seconds,
                            epoch,
                        )
                        .await
                }
                Action::None => ExecutionReport::default(),
            },
        };
        drop(bank);

        let status = {
            let mut status = self.status.write().await;
            if let (Some(action), Some(reason)) = (&execution.action, &execution.reason) {
                status.last_action = action.clone();
                status.last_action_reason = reason.clone();
            }
            status.clone()
        };

        info!(
            mode = %settings.mode,
            consumed_kwh,
            projected_kwh = budget.projected_end_kwh,
            needed_kw = budget.needed_reduction_kw,
            target_kwh = budget.effective_target_kwh,
            remaining_s = remaining_seconds,
            action = %decision.action,
            "control tick"
        );

        Ok(TickReport {
            mode: settings.mode,
            period_index,
            budget,
            decision,
            execution,
            last_action: status.last_action,
            last_action_reason: status.last_action_reason,
        })
    }

    async fn check_rollover(&self, period_index: i64) {
        let mut status = self.status.write().await;
        if let Some(previous) = status.period_index {
            if previous != period_index {
                info!(from = previous, to = period_index, "period rollover");
                status.last_action = "Period rollover".to_string();
                status.last_action_reason =
                    "New period started, resetting calculations".to_string();
            }
        }
        status.period_index = Some(period_index);
    }

    async fn refresh_loads(&self, bank: &mut LoadBank) {
        let configs = bank.configs().to_vec();
        for config in &configs {
            let reading = match self.source.read_load(config).await {
                Ok(reading) => reading,
                Err(e) => {
                    warn!(load = %config.name, error = %e, "load readings unavailable");
                    LoadReading::default()
                }
            };

            let Ok(state) = bank.state_mut(&config.name) else {
                continue;
            };
            apply_reading(state, reading);

            if config.load_type() == LoadType::ContinuousCurrent {
                if let Some(ratio) = state.learn_ratio() {
                    debug!(load = %config.name, kw_per_amp = ratio, "learned power ratio");
                }
            }
            debug!(
                load = %config.name,
                switch_state = ?state.switch_state,
                current_amps = ?state.current_amps,
                measured_kw = ?state.measured_power_kw,
                enable_signal = ?state.enable_signal,
                "load refreshed"
            );
        }
    }
}

fn apply_reading(state: &mut LoadRuntimeState, reading: LoadReading) {
    state.enable_signal = reading.enable_signal;
    state.switch_state = reading.switch_state;
    state.current_amps = reading.current_amps.filter(|a| a.is_finite());
    state.device_min_amps = reading.min_amps.filter(|a| a.is_finite() && *a >= 0.0);
    state.device_max_amps = reading.max_amps.filter(|a| a.is_finite() && *a > 0.0);
    state.measured_power_kw = reading
        .power
        .map(PowerReading::as_kilowatts)
        .filter(|kw| kw.is_finite());
}

pub fn spawn_controller(controller: Arc<BudgetController>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = controller.run().await {
            warn!(error = %e, "controller loop stopped");
        }
    })
}
