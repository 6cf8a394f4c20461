//! Per-load-type translation of a power delta into a control value.
//!
//! Planning records intent only. Concrete current setpoints depend on live
//! readings and are computed at execution time through [`reduced_current`]
//! and [`restored_current`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{LoadKind, LoadRef, LoadType, SwitchState};

/// What executing a reduction plan does to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionAction {
    /// Lower the current setpoint; the value is computed from live readings
    LowerCurrent,
    /// Move the switch to this position
    Switch(SwitchState),
}

/// Intent to curtail one load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionPlan {
    pub load: String,
    pub priority: i32,
    pub load_type: LoadType,
    /// Reduction still outstanding when this load was selected (kW)
    pub needed_reduction_kw: f64,
    /// Reduction this plan is expected to deliver (kW); 0 when unknown
    pub expected_reduction_kw: f64,
    pub action: ReductionAction,
}

/// A load eligible for restoration this tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreCandidate {
    pub load: String,
    pub priority: i32,
    pub load_type: LoadType,
}

impl RestoreCandidate {
    pub fn from_load(load: &LoadRef<'_>) -> Self {
        Self {
            load: load.name().to_string(),
            priority: load.priority(),
            load_type: load.load_type(),
        }
    }
}

/// Plan a reduction of `needed_kw` on a single load
///
/// Switches already in their reduced position are not reducible; an unknown
/// position is assumed reducible. Current-controlled loads always yield a
/// placeholder plan because the achievable reduction needs live readings.
pub fn plan_reduction(load: &LoadRef<'_>, needed_kw: f64) -> Option<ReductionPlan> {
    match &load.config.kind {
        LoadKind::ContinuousCurrent(_) => Some(ReductionPlan {
            load: load.name().to_string(),
            priority: load.priority(),
            load_type: LoadType::ContinuousCurrent,
            needed_reduction_kw: needed_kw,
            expected_reduction_kw: 0.0,
            action: ReductionAction::LowerCurrent,
        }),
        LoadKind::DiscreteSwitch(settings) => {
            let reduced = settings.reduced_state();
            if let Some(state) = load.state.switch_state {
                if state != settings.consuming_state() {
                    debug!(load = load.name(), %state, "switch already in reduced state");
                    return None;
                }
            }

            let expected = load
                .state
                .positive_measured_power_kw()
                .or(load.config.assumed_power_kw)
                .unwrap_or(0.0);

            Some(ReductionPlan {
                load: load.name().to_string(),
                priority: load.priority(),
                load_type: LoadType::DiscreteSwitch,
                needed_reduction_kw: needed_kw,
                expected_reduction_kw: expected,
                action: ReductionAction::Switch(reduced),
            })
        }
    }
}

/// Switch position that restores full consumption, if a change is needed
///
/// Unknown positions cannot be restored.
pub fn switch_restore_target(load: &LoadRef<'_>) -> Option<SwitchState> {
    match &load.config.kind {
        LoadKind::DiscreteSwitch(settings) => {
            let consuming = settings.consuming_state();
            match load.state.switch_state {
                Some(state) if state != consuming => Some(consuming),
                _ => None,
            }
        }
        LoadKind::ContinuousCurrent(_) => None,
    }
}

/// New current setpoint that sheds roughly `needed_kw`
///
/// The proportional target is rounded to whole amperes and clamped to the
/// device range. When it would not lower the setpoint, a 1 A step is taken
/// instead. Returns `None` when the load is already at its minimum.
pub fn reduced_current(
    current_amps: f64,
    needed_kw: f64,
    kw_per_amp: f64,
    min_amps: f64,
    max_amps: f64,
) -> Option<f64> {
    if current_amps <= min_amps {
        return None;
    }

    let target_power_kw = (current_amps * kw_per_amp - needed_kw).max(0.0);
    let target_amps = if kw_per_amp > 0.0 {
        target_power_kw / kw_per_amp
    } else {
        min_amps
    };

    let mut new_amps = target_amps.round().max(min_amps);
    if new_amps >= current_amps {
        new_amps = (current_amps - 1.0).max(min_amps);
    }
    let new_amps = new_amps.clamp(min_amps, max_amps);

    (new_amps < current_amps).then_some(new_amps)
}

/// New current setpoint that spends `margin_kwh` over the remaining period
///
/// `additional_kw = margin_kwh * 3600 / remaining_seconds`, converted to
/// amperes, clamped to the device range and rounded. Returns `None` unless
/// the setpoint actually increases.
pub fn restored_current(
    current_amps: f64,
    margin_kwh: f64,
    remaining_seconds: f64,
    kw_per_amp: f64,
    min_amps: f64,
    max_amps: f64,
) -> Option<f64> {
    let remaining_seconds = if remaining_seconds > 0.0 {
        remaining_seconds
    } else {
        3600.0
    };
    let additional_kw = margin_kwh * 3600.0 / remaining_seconds;

    let target_amps = if kw_per_amp > 0.0 {
        current_amps + additional_kw / kw_per_amp
    } else {
        max_amps
    };

    let new_amps = target_amps.clamp(min_amps, max_amps).round().clamp(min_amps, max_amps);
    debug!(
        current_amps,
        additional_kw,
        target_amps,
        new_amps,
        "restore current calculation"
    );

    (new_amps > current_amps).then_some(new_amps)
}
