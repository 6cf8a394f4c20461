use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;

/// Recurring budget window aligned to local midnight
///
/// The default is the clock hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetPeriod {
    length_seconds: i64,
}

impl Default for BudgetPeriod {
    fn default() -> Self {
        Self::hourly()
    }
}

impl BudgetPeriod {
    pub fn hourly() -> Self {
        Self {
            length_seconds: 3600,
        }
    }

    /// Period of `minutes` length; zero is treated as one minute
    pub fn from_minutes(minutes: u32) -> Self {
        Self {
            length_seconds: i64::from(minutes.max(1)) * 60,
        }
    }

    pub fn length_seconds(&self) -> i64 {
        self.length_seconds
    }

    pub fn hours(&self) -> f64 {
        self.length_seconds as f64 / 3600.0
    }

    /// Seconds left until the end of the period containing `now`
    pub fn remaining_seconds(&self, now: NaiveDateTime) -> f64 {
        let elapsed = i64::from(now.num_seconds_from_midnight()) % self.length_seconds;
        let into_second = f64::from(now.nanosecond() % 1_000_000_000) / 1e9;
        (self.length_seconds - elapsed) as f64 - into_second
    }

    /// Monotonic identifier of the period containing `now`, used for rollover detection
    pub fn index(&self, now: NaiveDateTime) -> i64 {
        let periods_per_day = (SECONDS_PER_DAY + self.length_seconds - 1) / self.length_seconds;
        let day = i64::from(now.date().num_days_from_ce());
        day * periods_per_day + i64::from(now.num_seconds_from_midnight()) / self.length_seconds
    }
}

/// Energy at the end of the period if current power holds
///
/// Without a power reading, or with no time left, the consumed energy is final.
pub fn project_end_energy_kwh(
    consumed_kwh: f64,
    power_kw: Option<f64>,
    remaining_seconds: f64,
) -> f64 {
    match power_kw {
        Some(kw) if remaining_seconds > 0.0 => consumed_kwh + kw * remaining_seconds / 3600.0,
        _ => consumed_kwh,
    }
}

/// Power that must be shed now so the projection lands on `target_kwh`
pub fn needed_reduction_kw(projected_kwh: f64, target_kwh: f64, remaining_seconds: f64) -> f64 {
    if remaining_seconds > 0.0 {
        ((projected_kwh - target_kwh) * 3600.0 / remaining_seconds).max(0.0)
    } else {
        0.0
    }
}

/// Per-tick snapshot of the budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub consumed_kwh: f64,
    pub power_kw: Option<f64>,
    pub remaining_seconds: f64,
    pub max_energy_kwh: f64,
    pub effective_target_kwh: f64,
    pub target_fraction: f64,
    pub down_capacity_kw: f64,
    pub projected_end_kwh: f64,
    pub needed_reduction_kw: f64,
}

impl BudgetState {
    pub fn remaining_minutes(&self) -> f64 {
        (self.remaining_seconds / 60.0).max(0.0)
    }

    /// Energy still available below the effective target
    pub fn margin_kwh(&self) -> f64 {
        self.effective_target_kwh - self.projected_end_kwh
    }
}
