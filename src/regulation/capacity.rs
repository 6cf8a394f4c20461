use tracing::debug;

use crate::domain::{LoadKind, LoadRef};

/// Power this load would shed if curtailed right now (kW)
///
/// Measured power wins when positive. Otherwise switches fall back to their
/// assumed power and current-controlled loads to `amps × kW/A`. Loads that
/// are not known to be consuming contribute nothing.
pub fn reduction_potential_kw(load: &LoadRef<'_>) -> f64 {
    if !load.is_consuming() {
        return 0.0;
    }

    if let Some(measured) = load.state.positive_measured_power_kw() {
        debug!(load = load.name(), measured_kw = measured, "using measured power for capacity");
        return measured;
    }

    match &load.config.kind {
        LoadKind::DiscreteSwitch(_) => load.config.assumed_power_kw.unwrap_or(0.0),
        LoadKind::ContinuousCurrent(_) => {
            let amps = load.state.current_amps.unwrap_or(0.0);
            amps * load.kw_per_amp().unwrap_or(0.0)
        }
    }
}

/// Total downward control capacity across enabled loads (kW)
pub fn estimate_down_capacity(loads: &[LoadRef<'_>]) -> f64 {
    loads
        .iter()
        .filter(|load| load.is_enabled())
        .map(reduction_potential_kw)
        .sum()
}
