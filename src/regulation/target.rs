use serde::{Deserialize, Serialize};
use tracing::debug;

/// Down-capacity to power ratio below which the target is derated
pub const LOW_CAPACITY_RATIO: f64 = 0.2;

/// Ceiling applied to the base fraction when control headroom is low
pub const DERATED_FRACTION: f64 = 0.70;

/// Conservative-target strategy parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetStrategy {
    /// Fraction of the budget aimed for early in the period
    pub base_fraction: f64,
    /// Minutes before period end at which the ramp towards 100% starts
    pub ramp_start_minutes: f64,
}

impl Default for TargetStrategy {
    fn default() -> Self {
        Self {
            base_fraction: 0.75,
            ramp_start_minutes: 15.0,
        }
    }
}

/// Result of the target calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveTarget {
    pub energy_kwh: f64,
    pub fraction: f64,
}

impl TargetStrategy {
    /// Effective energy target for the current point in the period
    ///
    /// Starts at `base_fraction` of `max_energy_kwh`, derated to at most
    /// [`DERATED_FRACTION`] when less than [`LOW_CAPACITY_RATIO`] of the current
    /// power could be shed, then ramps linearly to the full budget over the
    /// final `ramp_start_minutes`.
    pub fn effective_target(
        &self,
        max_energy_kwh: f64,
        minutes_remaining: f64,
        down_capacity_kw: Option<f64>,
        current_power_kw: Option<f64>,
    ) -> EffectiveTarget {
        let mut base = self.base_fraction;

        if let (Some(capacity), Some(power)) = (down_capacity_kw, current_power_kw) {
            if power > 0.0 {
                let ratio = capacity / power;
                if ratio < LOW_CAPACITY_RATIO {
                    base = base.min(DERATED_FRACTION);
                    debug!(
                        capacity_ratio = ratio,
                        fraction = base,
                        "low down capacity, derating target"
                    );
                }
            }
        }

        let in_ramp = self.ramp_start_minutes > 0.0 && minutes_remaining <= self.ramp_start_minutes;
        let fraction = if in_ramp {
            let progress = 1.0 - minutes_remaining.max(0.0) / self.ramp_start_minutes;
            let ramped = base + (1.0 - base) * progress;
            debug!(minutes_remaining, progress, fraction = ramped, "ramp period");
            ramped
        } else {
            base
        };

        EffectiveTarget {
            energy_kwh: max_energy_kwh * fraction,
            fraction,
        }
    }
}
