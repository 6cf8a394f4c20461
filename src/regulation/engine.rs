//! Regulation decision engine.
//!
//! One decision per tick: reduce, restore or hold. The engine is pure and
//! total; every input, including an empty load list, yields a decision.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use super::capacity::reduction_potential_kw;
use super::planner::{plan_reduction, ReductionPlan, RestoreCandidate};
use crate::domain::LoadRef;

/// Reductions at or below this are treated as satisfied (kW)
pub const REDUCTION_EPSILON_KW: f64 = 0.01;

/// Restoration is blocked at high power within this many minutes of period end
pub const END_OF_PERIOD_SAFETY_MINUTES: f64 = 5.0;

pub const DEFAULT_RESTORE_MARGIN_KWH: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Action {
    Reduce,
    Restore,
    None,
}

/// Engine output for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulationDecision {
    pub action: Action,
    /// Ordered by ascending priority
    pub reductions: Vec<ReductionPlan>,
    /// Ordered by descending priority; the executor commits at most one
    pub restorations: Vec<RestoreCandidate>,
    /// Reduction left unaccounted for after the planned actions (kW)
    pub remaining_reduction_kw: f64,
    pub reason: String,
}

impl RegulationDecision {
    fn hold(reason: String) -> Self {
        Self {
            action: Action::None,
            reductions: Vec::new(),
            restorations: Vec::new(),
            remaining_reduction_kw: 0.0,
            reason,
        }
    }
}

/// Everything the engine looks at for one decision
#[derive(Debug, Clone, Copy)]
pub struct RegulationInput<'a> {
    pub loads: &'a [LoadRef<'a>],
    pub needed_reduction_kw: f64,
    pub projected_end_kwh: f64,
    /// Budget the decision is made against
    pub max_energy_kwh: f64,
    /// Epoch seconds, for cooldown checks
    pub now: i64,
    pub current_power_kw: Option<f64>,
    pub remaining_minutes: Option<f64>,
    pub restore_margin_kwh: f64,
    /// Period length, used to turn the energy budget into a power limit
    pub period_hours: f64,
}

impl<'a> RegulationInput<'a> {
    /// Input with default margin and an hourly period
    pub fn new(
        loads: &'a [LoadRef<'a>],
        needed_reduction_kw: f64,
        projected_end_kwh: f64,
        max_energy_kwh: f64,
        now: i64,
    ) -> Self {
        Self {
            loads,
            needed_reduction_kw,
            projected_end_kwh,
            max_energy_kwh,
            now,
            current_power_kw: None,
            remaining_minutes: None,
            restore_margin_kwh: DEFAULT_RESTORE_MARGIN_KWH,
            period_hours: 1.0,
        }
    }

    pub fn with_power(mut self, current_power_kw: f64, remaining_minutes: f64) -> Self {
        self.current_power_kw = Some(current_power_kw);
        self.remaining_minutes = Some(remaining_minutes);
        self
    }

    pub fn with_restore_margin(mut self, restore_margin_kwh: f64) -> Self {
        self.restore_margin_kwh = restore_margin_kwh;
        self
    }

    fn budget_power_kw(&self) -> f64 {
        if self.period_hours > 0.0 {
            self.max_energy_kwh / self.period_hours
        } else {
            self.max_energy_kwh
        }
    }

    /// Near period end while already drawing at least the budget rate
    fn end_of_period_safety(&self) -> bool {
        match (self.current_power_kw, self.remaining_minutes) {
            (Some(power), Some(minutes)) => {
                minutes < END_OF_PERIOD_SAFETY_MINUTES && power >= self.budget_power_kw()
            }
            _ => false,
        }
    }
}

/// Decide what to do this tick
pub fn decide(input: &RegulationInput<'_>) -> RegulationDecision {
    if input.needed_reduction_kw > REDUCTION_EPSILON_KW {
        return decide_reduction(input);
    }

    let restore_threshold = input.max_energy_kwh - input.restore_margin_kwh;
    if input.projected_end_kwh < restore_threshold {
        return decide_restoration(input);
    }

    RegulationDecision::hold(within_safe_range(input))
}

fn within_safe_range(input: &RegulationInput<'_>) -> String {
    format!(
        "Within safe range (projected: {:.2}kWh, max: {:.2}kWh)",
        input.projected_end_kwh, input.max_energy_kwh
    )
}

/// Pass-one classification of a load considered for reduction
#[derive(Debug, Clone, Copy)]
pub enum ReductionCandidate<'a> {
    /// May be acted on this tick
    Selectable(LoadRef<'a>),
    /// Blocked by its cooldown; `potential_kw` is what it could shed once free
    CoolingDown {
        load: LoadRef<'a>,
        potential_kw: f64,
        remaining_seconds: i64,
    },
}

/// Pass one: enabled loads in ascending priority, split by cooldown
///
/// The sort is stable, so equal priorities keep configuration order.
pub fn classify_for_reduction<'a>(
    loads: &[LoadRef<'a>],
    now: i64,
) -> Vec<ReductionCandidate<'a>> {
    loads
        .iter()
        .filter(|load| load.is_enabled())
        .sorted_by_key(|load| load.priority())
        .map(|load| {
            if load.in_cooldown(now) {
                ReductionCandidate::CoolingDown {
                    load: *load,
                    potential_kw: reduction_potential_kw(load),
                    remaining_seconds: load.cooldown_remaining(now),
                }
            } else {
                ReductionCandidate::Selectable(*load)
            }
        })
        .collect()
}

/// A cooling-down load whose potential the engine chose to wait for
#[derive(Debug, Clone, PartialEq)]
pub struct CooldownWait {
    pub load: String,
    pub potential_kw: f64,
    pub remaining_seconds: i64,
}

/// Outcome of pass two
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReductionSelection {
    pub plans: Vec<ReductionPlan>,
    pub waiting: Vec<CooldownWait>,
    pub remaining_kw: f64,
}

impl ReductionSelection {
    pub fn waiting_potential_kw(&self) -> f64 {
        self.waiting.iter().map(|w| w.potential_kw).sum()
    }
}

/// Pass two: walk the candidates in order and pick plans
///
/// A selectable load is skipped when the loads already seen on cooldown
/// could cover the outstanding need by themselves, so a higher-priority
/// load is not sacrificed for a shortfall that lower-priority loads will
/// cover once their cooldown ends.
pub fn select_reductions(
    candidates: &[ReductionCandidate<'_>],
    needed_kw: f64,
) -> ReductionSelection {
    let mut selection = ReductionSelection {
        remaining_kw: needed_kw,
        ..Default::default()
    };

    for candidate in candidates {
        if selection.remaining_kw <= REDUCTION_EPSILON_KW {
            debug!(remaining_kw = selection.remaining_kw, "reduction satisfied");
            break;
        }

        match candidate {
            ReductionCandidate::CoolingDown {
                load,
                potential_kw,
                remaining_seconds,
            } => {
                if *potential_kw > 0.0 {
                    debug!(
                        load = load.name(),
                        remaining_seconds,
                        potential_kw,
                        "load in cooldown with reduction potential"
                    );
                    selection.waiting.push(CooldownWait {
                        load: load.name().to_string(),
                        potential_kw: *potential_kw,
                        remaining_seconds: *remaining_seconds,
                    });
                } else {
                    debug!(load = load.name(), "load in cooldown, nothing to shed");
                }
            }
            ReductionCandidate::Selectable(load) => {
                let Some(plan) = plan_reduction(load, selection.remaining_kw) else {
                    debug!(
                        load = load.name(),
                        priority = load.priority(),
                        "cannot reduce, already at minimum or unavailable"
                    );
                    continue;
                };

                let waiting_kw = selection.waiting_potential_kw();
                if waiting_kw >= selection.remaining_kw {
                    debug!(
                        load = load.name(),
                        priority = load.priority(),
                        waiting_kw,
                        remaining_kw = selection.remaining_kw,
                        "skipping, lower priority loads on cooldown cover the need"
                    );
                    continue;
                }

                debug!(
                    load = load.name(),
                    priority = load.priority(),
                    expected_kw = plan.expected_reduction_kw,
                    remaining_kw = selection.remaining_kw,
                    "planned reduction"
                );
                selection.remaining_kw -= plan.expected_reduction_kw;
                selection.plans.push(plan);
            }
        }
    }

    selection
}

fn decide_reduction(input: &RegulationInput<'_>) -> RegulationDecision {
    let needed = input.needed_reduction_kw;
    let candidates = classify_for_reduction(input.loads, input.now);
    let selection = select_reductions(&candidates, needed);
    let waiting_kw = selection.waiting_potential_kw();

    if !selection.plans.is_empty() {
        let reason = format!(
            "Need {:.2}kW reduction, planning to reduce {} load(s)",
            needed,
            selection.plans.len()
        );
        return RegulationDecision {
            action: Action::Reduce,
            reductions: selection.plans,
            restorations: Vec::new(),
            remaining_reduction_kw: selection.remaining_kw,
            reason,
        };
    }

    if !selection.waiting.is_empty() && waiting_kw >= needed {
        let names = selection.waiting.iter().map(|w| w.load.as_str()).join(", ");
        let next_available = selection
            .waiting
            .iter()
            .map(|w| w.remaining_seconds)
            .min()
            .unwrap_or(0);
        return RegulationDecision {
            action: Action::None,
            reductions: Vec::new(),
            restorations: Vec::new(),
            remaining_reduction_kw: selection.remaining_kw,
            reason: format!(
                "Need {:.2}kW reduction, waiting for cooldown on {} (potential: {:.2}kW, next available in {}s)",
                needed, names, waiting_kw, next_available
            ),
        };
    }

    RegulationDecision {
        action: Action::Reduce,
        reductions: Vec::new(),
        restorations: Vec::new(),
        remaining_reduction_kw: selection.remaining_kw,
        reason: format!("Need {:.2}kW but no loads available to reduce", needed),
    }
}

fn decide_restoration(input: &RegulationInput<'_>) -> RegulationDecision {
    let margin = input.max_energy_kwh - input.projected_end_kwh;

    if input.end_of_period_safety() {
        return RegulationDecision::hold(format!(
            "Margin available ({:.2}kWh), but holding due to high power ({:.2}kW >= {:.2}kW) near end of period",
            margin,
            input.current_power_kw.unwrap_or_default(),
            input.budget_power_kw()
        ));
    }

    let enabled: Vec<_> = input.loads.iter().filter(|load| load.is_enabled()).collect();
    debug!(
        enabled = enabled.len(),
        margin_kwh = margin,
        restore_margin_kwh = input.restore_margin_kwh,
        "restore check"
    );
    if enabled.is_empty() {
        return RegulationDecision::hold(within_safe_range(input));
    }

    let eligible: Vec<RestoreCandidate> = enabled
        .into_iter()
        .sorted_by_key(|load| std::cmp::Reverse(load.priority()))
        .filter(|load| {
            let cooling = load.in_cooldown(input.now);
            if cooling {
                debug!(
                    load = load.name(),
                    remaining_seconds = load.cooldown_remaining(input.now),
                    "load in cooldown for restore"
                );
            }
            !cooling
        })
        .map(RestoreCandidate::from_load)
        .collect();

    if eligible.is_empty() {
        return RegulationDecision::hold("Margin available but all loads in cooldown".to_string());
    }

    let reason = format!(
        "Sufficient margin ({:.2}kWh), eligible loads (by priority): {}",
        margin,
        eligible.iter().map(|c| c.load.as_str()).join(", ")
    );
    RegulationDecision {
        action: Action::Restore,
        reductions: Vec::new(),
        restorations: eligible,
        remaining_reduction_kw: 0.0,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CurrentSettings, LoadConfig, LoadRuntimeState, LoadType, SwitchState};
    use rstest::rstest;

    const NOW: i64 = 1_700_000_000;

    fn idle() -> LoadRuntimeState {
        LoadRuntimeState::default()
    }

    fn on(last_action_time: i64) -> LoadRuntimeState {
        LoadRuntimeState {
            switch_state: Some(SwitchState::On),
            last_action_time,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_action_within_safe_range() {
        let config = LoadConfig::switch("Load", 50, Some(2.0));
        let state = idle();
        let loads = [LoadRef::new(&config, &state)];
        let input = RegulationInput::new(&loads, 0.0, 4.8, 5.0, NOW).with_restore_margin(0.3);

        let decision = decide(&input);
        assert_eq!(decision.action, Action::None);
        assert!(decision.reductions.is_empty());
        assert!(decision.restorations.is_empty());
        assert!(decision.reason.contains("Within safe range"));
    }

    #[test]
    fn test_small_need_does_not_reduce() {
        let config = LoadConfig::switch("Load", 50, Some(2.0));
        let state = idle();
        let loads = [LoadRef::new(&config, &state)];
        let decision = decide(&RegulationInput::new(&loads, 0.005, 5.0, 5.0, NOW));
        assert_eq!(decision.action, Action::None);
    }

    #[test]
    fn test_multiple_loads_reduced_in_priority_order() {
        let configs = [
            LoadConfig::switch("Low", 10, Some(1.0)),
            LoadConfig::switch("High", 90, Some(1.0)),
            LoadConfig::switch("Med", 50, Some(1.0)),
        ];
        let states = [idle(), idle(), idle()];
        let loads: Vec<_> = configs
            .iter()
            .zip(&states)
            .map(|(c, s)| LoadRef::new(c, s))
            .collect();

        let decision = decide(&RegulationInput::new(&loads, 2.5, 6.0, 5.0, NOW));
        assert_eq!(decision.action, Action::Reduce);
        let names: Vec<_> = decision.reductions.iter().map(|p| p.load.as_str()).collect();
        assert_eq!(names, vec!["Low", "Med", "High"]);
        assert!(decision.remaining_reduction_kw <= REDUCTION_EPSILON_KW);
    }

    #[test]
    fn test_equal_priorities_keep_configuration_order() {
        let configs = [
            LoadConfig::switch("First", 10, Some(1.0)),
            LoadConfig::switch("Second", 10, Some(1.0)),
        ];
        let states = [idle(), idle()];
        let loads: Vec<_> = configs
            .iter()
            .zip(&states)
            .map(|(c, s)| LoadRef::new(c, s))
            .collect();

        let decision = decide(&RegulationInput::new(&loads, 0.5, 6.0, 5.0, NOW));
        assert_eq!(decision.reductions.len(), 1);
        assert_eq!(decision.reductions[0].load, "First");
    }

    #[test]
    fn test_insufficient_reduction_leaves_remainder() {
        let config = LoadConfig::switch("Only", 10, Some(2.0));
        let state = idle();
        let loads = [LoadRef::new(&config, &state)];

        let decision = decide(&RegulationInput::new(&loads, 5.0, 8.0, 5.0, NOW));
        assert_eq!(decision.action, Action::Reduce);
        assert_eq!(decision.reductions.len(), 1);
        assert_eq!(decision.remaining_reduction_kw, 3.0);
    }

    #[test]
    fn test_zero_kw_switch_plan_keeps_need_outstanding() {
        let config = LoadConfig::switch("Unmetered", 1, None);
        let state = on(0);
        let loads = [LoadRef::new(&config, &state)];

        let decision = decide(&RegulationInput::new(&loads, 2.0, 6.0, 5.0, NOW));
        assert_eq!(decision.action, Action::Reduce);
        assert_eq!(decision.reductions.len(), 1);
        assert_eq!(decision.reductions[0].expected_reduction_kw, 0.0);
        assert_eq!(decision.remaining_reduction_kw, 2.0);
    }

    #[test]
    fn test_placeholder_plans_do_not_stop_the_walk() {
        let ev = CurrentSettings {
            phases: 3,
            voltage_v: 400.0,
            ..CurrentSettings::default()
        };
        let configs = [
            LoadConfig::continuous("EV Charger 1", 1, ev.clone()),
            LoadConfig::continuous("EV Charger 2", 2, ev),
            LoadConfig::switch("Heat Pump", 3, None).inverted(),
        ];
        let heat_pump = LoadRuntimeState {
            switch_state: Some(SwitchState::Off),
            measured_power_kw: Some(2.0),
            ..Default::default()
        };
        let states = [idle(), idle(), heat_pump];
        let loads: Vec<_> = configs
            .iter()
            .zip(&states)
            .map(|(c, s)| LoadRef::new(c, s))
            .collect();

        let decision = decide(&RegulationInput::new(&loads, 3.0, 6.0, 5.0, NOW));
        assert_eq!(decision.action, Action::Reduce);
        let names: Vec<_> = decision.reductions.iter().map(|p| p.load.as_str()).collect();
        assert_eq!(names, vec!["EV Charger 1", "EV Charger 2", "Heat Pump"]);
        assert_eq!(decision.reductions[0].load_type, LoadType::ContinuousCurrent);
        assert_eq!(decision.reductions[2].expected_reduction_kw, 2.0);
        assert_eq!(decision.remaining_reduction_kw, 1.0);
    }

    #[test]
    fn test_waits_for_cooldown_instead_of_sacrificing_higher_priority() {
        let configs = [
            LoadConfig::switch("Pump", 10, Some(2.0)).with_cooldown(300),
            LoadConfig::switch("Heater", 30, Some(3.0)),
        ];
        let states = [on(NOW - 60), on(0)];
        let loads: Vec<_> = configs
            .iter()
            .zip(&states)
            .map(|(c, s)| LoadRef::new(c, s))
            .collect();

        let decision = decide(&RegulationInput::new(&loads, 1.5, 6.0, 5.0, NOW));
        assert_eq!(decision.action, Action::None);
        assert!(decision.reductions.is_empty());
        assert!(decision.reason.contains("waiting for cooldown on Pump"));
        assert!(decision.reason.contains("next available in 240s"));
    }

    #[test]
    fn test_cooldown_potential_too_small_reduces_next_load() {
        let configs = [
            LoadConfig::switch("Pump", 10, Some(2.0)).with_cooldown(300),
            LoadConfig::switch("Heater", 30, Some(3.0)),
        ];
        let states = [on(NOW - 60), on(0)];
        let loads: Vec<_> = configs
            .iter()
            .zip(&states)
            .map(|(c, s)| LoadRef::new(c, s))
            .collect();

        let decision = decide(&RegulationInput::new(&loads, 3.0, 6.0, 5.0, NOW));
        assert_eq!(decision.action, Action::Reduce);
        assert_eq!(decision.reductions.len(), 1);
        assert_eq!(decision.reductions[0].load, "Heater");
    }

    #[test]
    fn test_cooldown_without_potential_does_not_block() {
        // Unknown switch state means no known potential
        let configs = [
            LoadConfig::switch("Recent Action", 10, Some(2.0)).with_cooldown(300),
            LoadConfig::switch("Old Action", 20, Some(2.0)).with_cooldown(300),
        ];
        let recent = LoadRuntimeState {
            last_action_time: NOW - 60,
            ..Default::default()
        };
        let old = LoadRuntimeState {
            last_action_time: NOW - 400,
            ..Default::default()
        };
        let states = [recent, old];
        let loads: Vec<_> = configs
            .iter()
            .zip(&states)
            .map(|(c, s)| LoadRef::new(c, s))
            .collect();

        let decision = decide(&RegulationInput::new(&loads, 1.0, 6.0, 5.0, NOW));
        assert_eq!(decision.action, Action::Reduce);
        assert_eq!(decision.reductions.len(), 1);
        assert_eq!(decision.reductions[0].load, "Old Action");
    }

    #[test]
    fn test_classification_is_sorted_and_split() {
        let configs = [
            LoadConfig::switch("C", 30, Some(1.0)),
            LoadConfig::switch("A", 10, Some(1.0)).with_cooldown(300),
            LoadConfig::switch("B", 20, Some(1.0)).disabled(),
        ];
        let states = [on(0), on(NOW - 10), on(0)];
        let loads: Vec<_> = configs
            .iter()
            .zip(&states)
            .map(|(c, s)| LoadRef::new(c, s))
            .collect();

        let candidates = classify_for_reduction(&loads, NOW);
        assert_eq!(candidates.len(), 2);
        assert!(matches!(
            candidates[0],
            ReductionCandidate::CoolingDown {
                potential_kw,
                remaining_seconds: 290,
                ..
            } if potential_kw == 1.0
        ));
        assert!(matches!(
            candidates[1],
            ReductionCandidate::Selectable(load) if load.name() == "C"
        ));
    }

    #[test]
    fn test_disabled_loads_are_ignored() {
        let configs = [
            LoadConfig::switch("Enabled", 10, Some(2.0)),
            LoadConfig::switch("Disabled", 5, Some(2.0)).disabled(),
        ];
        let states = [idle(), idle()];
        let loads: Vec<_> = configs
            .iter()
            .zip(&states)
            .map(|(c, s)| LoadRef::new(c, s))
            .collect();

        let decision = decide(&RegulationInput::new(&loads, 1.0, 6.0, 5.0, NOW));
        assert_eq!(decision.reductions.len(), 1);
        assert_eq!(decision.reductions[0].load, "Enabled");

        let decision = decide(&RegulationInput::new(&loads, 0.0, 3.0, 5.0, NOW));
        assert_eq!(decision.action, Action::Restore);
        assert!(decision.restorations.iter().all(|c| c.load != "Disabled"));
    }

    #[test]
    fn test_restore_orders_by_descending_priority() {
        let configs = [
            LoadConfig::switch("Load 1", 10, Some(2.0)),
            LoadConfig::switch("Load 2", 20, Some(3.0)),
        ];
        let states = [idle(), idle()];
        let loads: Vec<_> = configs
            .iter()
            .zip(&states)
            .map(|(c, s)| LoadRef::new(c, s))
            .collect();

        let decision =
            decide(&RegulationInput::new(&loads, 0.0, 4.0, 5.0, NOW).with_restore_margin(0.5));
        assert_eq!(decision.action, Action::Restore);
        let names: Vec<_> = decision.restorations.iter().map(|c| c.load.as_str()).collect();
        assert_eq!(names, vec!["Load 2", "Load 1"]);
        assert!(decision.reason.contains("Load 2, Load 1"));
    }

    #[test]
    fn test_restore_skips_loads_in_cooldown() {
        let configs = [
            LoadConfig::switch("Fresh", 10, Some(2.0)),
            LoadConfig::switch("Cooling", 20, Some(3.0)).with_cooldown(300),
        ];
        let states = [idle(), on(NOW - 30)];
        let loads: Vec<_> = configs
            .iter()
            .zip(&states)
            .map(|(c, s)| LoadRef::new(c, s))
            .collect();

        let decision = decide(&RegulationInput::new(&loads, 0.0, 4.0, 5.0, NOW));
        assert_eq!(decision.action, Action::Restore);
        assert_eq!(decision.restorations.len(), 1);
        assert_eq!(decision.restorations[0].load, "Fresh");
    }

    #[test]
    fn test_restore_holds_when_all_loads_cooling() {
        let config = LoadConfig::switch("Cooling", 20, Some(3.0)).with_cooldown(300);
        let state = on(NOW - 30);
        let loads = [LoadRef::new(&config, &state)];

        let decision = decide(&RegulationInput::new(&loads, 0.0, 4.0, 5.0, NOW));
        assert_eq!(decision.action, Action::None);
        assert_eq!(decision.reason, "Margin available but all loads in cooldown");
    }

    #[test]
    fn test_end_of_period_high_power_blocks_restore() {
        let config = LoadConfig::switch("Load", 50, Some(2.0));
        let state = idle();
        let loads = [LoadRef::new(&config, &state)];

        let input = RegulationInput::new(&loads, 0.0, 2.0, 5.0, NOW)
            .with_restore_margin(0.5)
            .with_power(6.0, 2.0);
        let decision = decide(&input);
        assert_eq!(decision.action, Action::None);
        assert!(decision.reason.contains("holding due to high power"));

        // Same power with time to spare restores
        let decision = decide(&input.with_power(6.0, 10.0));
        assert_eq!(decision.action, Action::Restore);
    }

    #[test]
    fn test_end_of_period_safety_scales_with_period_length() {
        let config = LoadConfig::switch("Load", 50, Some(2.0));
        let state = idle();
        let loads = [LoadRef::new(&config, &state)];

        // 2 kWh per quarter hour is an 8 kW rate; 6 kW is below it
        let mut input = RegulationInput::new(&loads, 0.0, 1.0, 2.0, NOW).with_power(6.0, 2.0);
        input.period_hours = 0.25;
        assert_eq!(decide(&input).action, Action::Restore);
    }

    #[rstest]
    #[case(4.5, Action::None)]
    #[case(4.49, Action::Restore)]
    #[case(4.6, Action::None)]
    fn test_restore_margin_boundary(#[case] projected: f64, #[case] expected: Action) {
        let config = LoadConfig::switch("Load", 50, Some(2.0));
        let state = idle();
        let loads = [LoadRef::new(&config, &state)];

        let input =
            RegulationInput::new(&loads, 0.0, projected, 5.0, NOW).with_restore_margin(0.5);
        assert_eq!(decide(&input).action, expected);
    }

    #[test]
    fn test_empty_loads() {
        let decision = decide(&RegulationInput::new(&[], 2.0, 6.0, 5.0, NOW));
        assert_eq!(decision.action, Action::Reduce);
        assert!(decision.reductions.is_empty());
        assert!(decision.reason.to_lowercase().contains("no loads available"));

        let decision = decide(&RegulationInput::new(&[], 0.0, 2.0, 5.0, NOW));
        assert_eq!(decision.action, Action::None);
        assert!(decision.reason.contains("Within safe range"));
    }
}
