use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Power in Watts (W)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Power(pub f64);

impl Power {
    pub fn watts(w: f64) -> Self {
        Self(w)
    }

    pub fn kilowatts(kw: f64) -> Self {
        Self(kw * 1000.0)
    }

    /// Build from a raw sensor value expressed in `unit`
    pub fn from_reading(value: f64, unit: PowerUnit) -> Self {
        match unit {
            PowerUnit::Watt => Self::watts(value),
            PowerUnit::Kilowatt => Self::kilowatts(value),
        }
    }

    pub fn as_watts(&self) -> f64 {
        self.0
    }

    pub fn as_kilowatts(&self) -> f64 {
        self.0 / 1000.0
    }
}

impl std::fmt::Display for Power {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.abs() >= 1000.0 {
            write!(f, "{:.2} kW", self.as_kilowatts())
        } else {
            write!(f, "{:.1} W", self.0)
        }
    }
}

/// Unit attached to a raw power reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum PowerUnit {
    #[strum(to_string = "W", serialize = "w")]
    #[serde(rename = "W")]
    Watt,
    #[strum(to_string = "kW", serialize = "kw")]
    #[serde(rename = "kW")]
    Kilowatt,
}

/// Switch position as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn is_on(&self) -> bool {
        matches!(self, SwitchState::On)
    }
}
