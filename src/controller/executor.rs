//! Applies regulation decisions to the actuators.
//!
//! Setpoints for current-controlled loads are computed here from the
//! readings of the current tick. Effects are written back into the
//! [`LoadBank`] so the next tick starts from what was actually commanded.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::{LoadBank, LoadKind, SwitchState};
use crate::hardware::Actuator;
use crate::regulation::{
    reduced_current, restored_current, switch_restore_target, ReductionAction, ReductionPlan,
    RestoreCandidate,
};

/// Margin handed to restoration when everything is restored unconditionally (kWh)
pub const RESTORE_ALL_MARGIN_KWH: f64 = 999.0;

/// Effect of one executed command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadEffect {
    pub load: String,
    pub achieved_kw: f64,
}

/// What the executor did during one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub action: Option<String>,
    pub reason: Option<String>,
    pub effects: Vec<LoadEffect>,
    /// Loads that were planned but produced no effect
    pub failed: Vec<String>,
}

enum ReductionStep {
    Current { from: f64, to: f64, kw_per_amp: f64 },
    Switch { to: SwitchState, expected_kw: f64 },
}

enum RestoreStep {
    Current { from: f64, to: f64 },
    Switch { to: SwitchState },
}

pub struct Executor {
    actuator: Arc<dyn Actuator>,
}

impl Executor {
    pub fn new(actuator: Arc<dyn Actuator>) -> Self {
        Self { actuator }
    }

    /// Apply every reduction plan in order
    ///
    /// Loads whose reduction had an effect get their cooldown started.
    pub async fn execute_reductions(
        &self,
        bank: &mut LoadBank,
        plans: &[ReductionPlan],
        now: i64,
    ) -> ExecutionReport {
        let names: Vec<&str> = plans.iter().map(|p| p.load.as_str()).collect();
        info!(count = plans.len(), loads = ?names, "executing reduction plans");

        let mut report = ExecutionReport::default();
        for plan in plans {
            let achieved_kw = self.reduce_load(bank, plan).await;
            if achieved_kw > 0.0 {
                if let Err(e) = bank.mark_action(&plan.load, now) {
                    warn!(error = %e, "could not record action time");
                }
                report.effects.push(LoadEffect {
                    load: plan.load.clone(),
                    achieved_kw,
                });
            } else {
                warn!(
                    load = %plan.load,
                    "planned for reduction but achieved 0 kW (already reduced, unavailable, or failed)"
                );
                report.failed.push(plan.load.clone());
            }
        }

        if report.effects.is_empty() {
            report.action = Some("Cannot reduce further".to_string());
            report.reason = Some("No loads could be reduced".to_string());
            warn!("no loads could be reduced");
        } else {
            let actions = report
                .effects
                .iter()
                .map(|e| format!("{}: -{:.2}kW", e.load, e.achieved_kw))
                .collect::<Vec<_>>()
                .join(", ");
            report.action = Some("Reduced loads".to_string());
            report.reason = Some(format!("Actions: {actions}"));
            info!(actions = %actions, "reduction actions");
        }
        report
    }

    /// Restore the first candidate that can take more power
    ///
    /// At most one load is restored per tick to avoid overshooting.
    pub async fn execute_restoration(
        &self,
        bank: &mut LoadBank,
        candidates: &[RestoreCandidate],
        margin_kwh: f64,
        remaining_seconds: f64,
        now: i64,
    ) -> ExecutionReport {
        debug!(
            candidates = candidates.len(),
            margin_kwh, "executing restoration"
        );

        let mut report = ExecutionReport::default();
        for candidate in candidates {
            if self
                .restore_load(bank, &candidate.load, margin_kwh, remaining_seconds)
                .await
            {
                if let Err(e) = bank.mark_action(&candidate.load, now) {
                    warn!(error = %e, "could not record action time");
                }
                report.effects.push(LoadEffect {
                    load: candidate.load.clone(),
                    achieved_kw: 0.0,
                });
                report.action = Some("Restored loads".to_string());
                report.reason = Some(format!("Sufficient margin, restored: {}", candidate.load));
                info!(load = %candidate.load, "restored load");
                break;
            }
            debug!(load = %candidate.load, "not restored (already at max or restore failed)");
        }
        report
    }

    /// Bring every configured load back to full consumption
    ///
    /// Cooldowns are not touched.
    pub async fn restore_all(
        &self,
        bank: &mut LoadBank,
        remaining_seconds: f64,
        reason: &str,
    ) -> ExecutionReport {
        let names: Vec<String> = bank.configs().iter().map(|c| c.name.clone()).collect();

        let mut report = ExecutionReport::default();
        for name in names {
            if self
                .restore_load(bank, &name, RESTORE_ALL_MARGIN_KWH, remaining_seconds)
                .await
            {
                report.effects.push(LoadEffect {
                    load: name,
                    achieved_kw: 0.0,
                });
            }
        }

        if !report.effects.is_empty() {
            let restored = report
                .effects
                .iter()
                .map(|e| e.load.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            report.action = Some("Restored all loads".to_string());
            report.reason = Some(format!("{reason}. Restored: {restored}"));
            info!(restored = %restored, "restored all loads");
        }
        report
    }

    async fn reduce_load(&self, bank: &mut LoadBank, plan: &ReductionPlan) -> f64 {
        let step = {
            let Some(load) = bank.get(&plan.load) else {
                warn!(load = %plan.load, "planned load no longer configured");
                return 0.0;
            };

            match (&load.config.kind, plan.action) {
                (LoadKind::ContinuousCurrent(settings), _) => {
                    let Some(current) = load.state.current_amps else {
                        warn!(load = %plan.load, "current reading unavailable, cannot reduce");
                        return 0.0;
                    };
                    let kw_per_amp = load
                        .kw_per_amp()
                        .unwrap_or_else(|| settings.nominal_kw_per_amp());
                    let (min_amps, max_amps) = load
                        .current_limits()
                        .unwrap_or((settings.min_amps, settings.max_amps));
                    let Some(to) = reduced_current(
                        current,
                        plan.needed_reduction_kw,
                        kw_per_amp,
                        min_amps,
                        max_amps,
                    ) else {
                        debug!(
                            load = %plan.load,
                            current_amps = current,
                            min_amps,
                            "already at minimum current"
                        );
                        return 0.0;
                    };
                    ReductionStep::Current {
                        from: current,
                        to,
                        kw_per_amp,
                    }
                }
                (LoadKind::DiscreteSwitch(settings), ReductionAction::Switch(to)) => {
                    if let Some(state) = load.state.switch_state {
                        if state != settings.consuming_state() {
                            debug!(load = %plan.load, %state, "switch already in reduced state");
                            return 0.0;
                        }
                    }
                    ReductionStep::Switch {
                        to,
                        expected_kw: plan.expected_reduction_kw,
                    }
                }
                (LoadKind::DiscreteSwitch(_), ReductionAction::LowerCurrent) => {
                    warn!(load = %plan.load, "current reduction planned for a switch");
                    return 0.0;
                }
            }
        };

        match step {
            ReductionStep::Current { from, to, kw_per_amp } => {
                if let Err(e) = self.actuator.set_current(&plan.load, to).await {
                    error!(load = %plan.load, error = %e, "failed to reduce current");
                    return 0.0;
                }
                let achieved_kw = (from - to) * kw_per_amp;
                info!(
                    load = %plan.load,
                    from_amps = from,
                    to_amps = to,
                    needed_kw = plan.needed_reduction_kw,
                    achieved_kw,
                    "reduced current"
                );
                if let Ok(state) = bank.state_mut(&plan.load) {
                    state.current_amps = Some(to);
                }
                achieved_kw
            }
            ReductionStep::Switch { to, expected_kw } => {
                if let Err(e) = self.actuator.set_switch(&plan.load, to).await {
                    error!(load = %plan.load, error = %e, "failed to switch");
                    return 0.0;
                }
                info!(
                    load = %plan.load,
                    state = %to,
                    estimated_kw = expected_kw,
                    "switched load"
                );
                if let Ok(state) = bank.state_mut(&plan.load) {
                    state.switch_state = Some(to);
                }
                expected_kw
            }
        }
    }

    async fn restore_load(
        &self,
        bank: &mut LoadBank,
        name: &str,
        margin_kwh: f64,
        remaining_seconds: f64,
    ) -> bool {
        let step = {
            let Some(load) = bank.get(name) else {
                return false;
            };

            match &load.config.kind {
                LoadKind::ContinuousCurrent(settings) => {
                    let Some(current) = load.state.current_amps else {
                        debug!(load = name, "current reading unavailable, cannot restore");
                        return false;
                    };
                    let kw_per_amp = load
                        .kw_per_amp()
                        .unwrap_or_else(|| settings.nominal_kw_per_amp());
                    let (min_amps, max_amps) = load
                        .current_limits()
                        .unwrap_or((settings.min_amps, settings.max_amps));
                    match restored_current(
                        current,
                        margin_kwh,
                        remaining_seconds,
                        kw_per_amp,
                        min_amps,
                        max_amps,
                    ) {
                        Some(to) => RestoreStep::Current { from: current, to },
                        None => {
                            debug!(
                                load = name,
                                current_amps = current,
                                max_amps,
                                "already at or above target"
                            );
                            return false;
                        }
                    }
                }
                LoadKind::DiscreteSwitch(_) => match switch_restore_target(&load) {
                    Some(to) => RestoreStep::Switch { to },
                    None => return false,
                },
            }
        };

        match step {
            RestoreStep::Current { from, to } => {
                if let Err(e) = self.actuator.set_current(name, to).await {
                    error!(load = name, error = %e, "failed to restore current");
                    return false;
                }
                info!(
                    load = name,
                    from_amps = from,
                    to_amps = to,
                    margin_kwh,
                    "restored current"
                );
                if let Ok(state) = bank.state_mut(name) {
                    state.current_amps = Some(to);
                }
            }
            RestoreStep::Switch { to } => {
                if let Err(e) = self.actuator.set_switch(name, to).await {
                    error!(load = name, error = %e, "failed to restore switch");
                    return false;
                }
                info!(load = name, state = %to, "restored switch to max consumption");
                if let Ok(state) = bank.state_mut(name) {
                    state.switch_state = Some(to);
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CurrentSettings, LoadConfig, LoadType};
    use crate::hardware::{ActuatorError, MockActuator};

    const NOW: i64 = 1_700_000_000;

    fn ev_settings() -> CurrentSettings {
        CurrentSettings {
            min_amps: 6.0,
            max_amps: 32.0,
            phases: 1,
            voltage_v: 230.0,
        }
    }

    fn bank() -> LoadBank {
        let mut bank = LoadBank::new(vec![
            LoadConfig::switch("Heater", 30, Some(3.0)),
            LoadConfig::continuous("EV", 50, ev_settings()),
        ])
        .unwrap();
        bank.state_mut("Heater").unwrap().switch_state = Some(SwitchState::On);
        let ev = bank.state_mut("EV").unwrap();
        ev.current_amps = Some(16.0);
        ev.learned_kw_per_amp = Some(0.5);
        bank
    }

    fn switch_plan(load: &str, expected_kw: f64) -> ReductionPlan {
        ReductionPlan {
            load: load.to_string(),
            priority: 30,
            load_type: LoadType::DiscreteSwitch,
            needed_reduction_kw: 2.0,
            expected_reduction_kw: expected_kw,
            action: ReductionAction::Switch(SwitchState::Off),
        }
    }

    fn current_plan(load: &str, needed_kw: f64) -> ReductionPlan {
        ReductionPlan {
            load: load.to_string(),
            priority: 50,
            load_type: LoadType::ContinuousCurrent,
            needed_reduction_kw: needed_kw,
            expected_reduction_kw: 0.0,
            action: ReductionAction::LowerCurrent,
        }
    }

    fn candidate(load: &str, load_type: LoadType) -> RestoreCandidate {
        RestoreCandidate {
            load: load.to_string(),
            priority: 10,
            load_type,
        }
    }

    #[tokio::test]
    async fn test_reductions_apply_all_plans_and_start_cooldowns() {
        let mut mock = MockActuator::new();
        mock.expect_set_switch()
            .withf(|load, state| load == "Heater" && *state == SwitchState::Off)
            .times(1)
            .returning(|_, _| Ok(()));
        mock.expect_set_current()
            .withf(|load, amps| load == "EV" && *amps == 10.0)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut bank = bank();
        let executor = Executor::new(Arc::new(mock));
        let plans = [switch_plan("Heater", 3.0), current_plan("EV", 3.0)];
        let report = executor.execute_reductions(&mut bank, &plans, NOW).await;

        assert_eq!(report.action.as_deref(), Some("Reduced loads"));
        assert_eq!(report.effects.len(), 2);
        assert_eq!(report.effects[1].achieved_kw, 3.0);
        assert_eq!(
            report.reason.as_deref(),
            Some("Actions: Heater: -3.00kW, EV: -3.00kW")
        );

        let heater = bank.state("Heater").unwrap();
        assert_eq!(heater.switch_state, Some(SwitchState::Off));
        assert_eq!(heater.last_action_time, NOW);
        let ev = bank.state("EV").unwrap();
        assert_eq!(ev.current_amps, Some(10.0));
        assert_eq!(ev.last_action_time, NOW);
    }

    #[tokio::test]
    async fn test_setpoints_follow_device_reported_limits() {
        let mut mock = MockActuator::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_set_current()
            .withf(|load, amps| load == "EV" && *amps == 12.0)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock.expect_set_current()
            .withf(|load, amps| load == "EV" && *amps == 20.0)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let mut bank = bank();
        let ev = bank.state_mut("EV").unwrap();
        ev.device_min_amps = Some(12.0);
        ev.device_max_amps = Some(20.0);

        let executor = Executor::new(Arc::new(mock));
        executor
            .execute_reductions(&mut bank, &[current_plan("EV", 8.0)], NOW)
            .await;
        assert_eq!(bank.state("EV").unwrap().current_amps, Some(12.0));

        executor
            .execute_restoration(
                &mut bank,
                &[candidate("EV", LoadType::ContinuousCurrent)],
                RESTORE_ALL_MARGIN_KWH,
                1800.0,
                NOW + 600,
            )
            .await;
        assert_eq!(bank.state("EV").unwrap().current_amps, Some(20.0));
    }

    #[tokio::test]
    async fn test_failed_actuation_achieves_nothing() {
        let mut mock = MockActuator::new();
        mock.expect_set_switch()
            .times(1)
            .returning(|_, _| Err(ActuatorError::Communication("timeout".into())));

        let mut bank = bank();
        let executor = Executor::new(Arc::new(mock));
        let report = executor
            .execute_reductions(&mut bank, &[switch_plan("Heater", 3.0)], NOW)
            .await;

        assert_eq!(report.action.as_deref(), Some("Cannot reduce further"));
        assert_eq!(report.failed, vec!["Heater".to_string()]);
        let heater = bank.state("Heater").unwrap();
        assert_eq!(heater.last_action_time, 0);
        assert_eq!(heater.switch_state, Some(SwitchState::On));
    }

    #[tokio::test]
    async fn test_zero_power_switch_is_commanded_without_cooldown() {
        let mut mock = MockActuator::new();
        mock.expect_set_switch().times(1).returning(|_, _| Ok(()));

        let mut bank = bank();
        let executor = Executor::new(Arc::new(mock));
        let report = executor
            .execute_reductions(&mut bank, &[switch_plan("Heater", 0.0)], NOW)
            .await;

        assert!(report.effects.is_empty());
        assert_eq!(bank.state("Heater").unwrap().last_action_time, 0);
    }

    #[tokio::test]
    async fn test_current_at_minimum_is_not_commanded() {
        let mut mock = MockActuator::new();
        mock.expect_set_current().never();

        let mut bank = bank();
        bank.state_mut("EV").unwrap().current_amps = Some(6.0);
        let executor = Executor::new(Arc::new(mock));
        let report = executor
            .execute_reductions(&mut bank, &[current_plan("EV", 2.0)], NOW)
            .await;
        assert_eq!(report.failed, vec!["EV".to_string()]);
    }

    #[tokio::test]
    async fn test_restoration_stops_at_first_success() {
        let mut mock = MockActuator::new();
        mock.expect_set_current()
            .withf(|load, amps| load == "EV" && *amps == 18.0)
            .times(1)
            .returning(|_, _| Ok(()));
        mock.expect_set_switch().never();

        let mut bank = bank();
        bank.state_mut("Heater").unwrap().switch_state = Some(SwitchState::Off);
        let executor = Executor::new(Arc::new(mock));
        let candidates = [
            candidate("EV", LoadType::ContinuousCurrent),
            candidate("Heater", LoadType::DiscreteSwitch),
        ];
        // 0.5 kWh over 30 minutes is 1 kW, 2 A at 0.5 kW/A
        let report = executor
            .execute_restoration(&mut bank, &candidates, 0.5, 1800.0, NOW)
            .await;

        assert_eq!(report.action.as_deref(), Some("Restored loads"));
        assert_eq!(report.effects.len(), 1);
        assert_eq!(bank.state("EV").unwrap().last_action_time, NOW);
        assert_eq!(bank.state("Heater").unwrap().last_action_time, 0);
    }

    #[tokio::test]
    async fn test_restoration_falls_through_to_next_candidate() {
        let mut mock = MockActuator::new();
        mock.expect_set_current().never();
        mock.expect_set_switch()
            .withf(|load, state| load == "Heater" && *state == SwitchState::On)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut bank = bank();
        bank.state_mut("EV").unwrap().current_amps = Some(32.0);
        bank.state_mut("Heater").unwrap().switch_state = Some(SwitchState::Off);
        let executor = Executor::new(Arc::new(mock));
        let candidates = [
            candidate("EV", LoadType::ContinuousCurrent),
            candidate("Heater", LoadType::DiscreteSwitch),
        ];
        let report = executor
            .execute_restoration(&mut bank, &candidates, 0.5, 1800.0, NOW)
            .await;

        assert_eq!(
            report.reason.as_deref(),
            Some("Sufficient margin, restored: Heater")
        );
        assert_eq!(bank.state("Heater").unwrap().switch_state, Some(SwitchState::On));
    }

    #[tokio::test]
    async fn test_restore_all_maximises_every_load() {
        let mut mock = MockActuator::new();
        mock.expect_set_switch()
            .withf(|load, state| load == "Heater" && *state == SwitchState::On)
            .times(1)
            .returning(|_, _| Ok(()));
        mock.expect_set_current()
            .withf(|load, amps| load == "EV" && *amps == 32.0)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut bank = bank();
        bank.state_mut("Heater").unwrap().switch_state = Some(SwitchState::Off);
        let executor = Executor::new(Arc::new(mock));
        let report = executor.restore_all(&mut bank, 1800.0, "Mode is off").await;

        assert_eq!(report.action.as_deref(), Some("Restored all loads"));
        assert_eq!(
            report.reason.as_deref(),
            Some("Mode is off. Restored: Heater, EV")
        );
        // Cooldowns are left alone
        assert_eq!(bank.state("EV").unwrap().last_action_time, 0);
    }
}
