//! Climate vocabulary: operating modes, reported actions, setpoints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operating mode of a thermostat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    Auto,
    HeatCool,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::Heat => "heat",
            HvacMode::Cool => "cool",
            HvacMode::Auto => "auto",
            HvacMode::HeatCool => "heat_cool",
        }
    }

    /// Lenient parse for state values read from other entities:
    /// anything unrecognized counts as off.
    pub fn from_state(state: &str) -> Self {
        state.parse().unwrap_or(HvacMode::Off)
    }

    /// True when the two modes drive opposite directions (heating one
    /// side of a duct run while the other cools it).
    pub fn opposes(self, other: HvacMode) -> bool {
        matches!(
            (self, other),
            (HvacMode::Heat, HvacMode::Cool) | (HvacMode::Cool, HvacMode::Heat)
        )
    }
}

impl FromStr for HvacMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(HvacMode::Off),
            "heat" => Ok(HvacMode::Heat),
            "cool" => Ok(HvacMode::Cool),
            "auto" => Ok(HvacMode::Auto),
            "heat_cool" => Ok(HvacMode::HeatCool),
            _ => Err(()),
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action a climate entity reports it is currently performing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacAction {
    Off,
    Heating,
    Cooling,
    Idle,
    Fan,
    Preheating,
}

impl HvacAction {
    pub fn as_str(self) -> &'static str {
        match self {
            HvacAction::Off => "off",
            HvacAction::Heating => "heating",
            HvacAction::Cooling => "cooling",
            HvacAction::Idle => "idle",
            HvacAction::Fan => "fan",
            HvacAction::Preheating => "preheating",
        }
    }

    /// Lenient parse for attribute values: missing or unrecognized
    /// actions count as off.
    pub fn from_attr(value: Option<&str>) -> Self {
        match value {
            Some("heating") => HvacAction::Heating,
            Some("cooling") => HvacAction::Cooling,
            Some("idle") => HvacAction::Idle,
            Some("fan") => HvacAction::Fan,
            Some("preheating") => HvacAction::Preheating,
            _ => HvacAction::Off,
        }
    }

    /// True while the upstream is actively pushing warm air.
    pub fn is_heating(self) -> bool {
        matches!(self, HvacAction::Heating | HvacAction::Preheating)
    }

    /// True while the upstream is actively pushing cool air.
    pub fn is_cooling(self) -> bool {
        self == HvacAction::Cooling
    }
}

impl fmt::Display for HvacAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target temperature: a single setpoint, or a low/high band for the
/// auto and heat_cool modes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Setpoint {
    Single(f64),
    Range { low: f64, high: f64 },
}

impl Setpoint {
    /// The temperature heating works toward: the single setpoint, or
    /// the low edge of a band.
    pub fn heat_target(self) -> f64 {
        match self {
            Setpoint::Single(t) => t,
            Setpoint::Range { low, .. } => low,
        }
    }

    /// The temperature cooling works toward: the single setpoint, or
    /// the high edge of a band.
    pub fn cool_target(self) -> f64 {
        match self {
            Setpoint::Single(t) => t,
            Setpoint::Range { high, .. } => high,
        }
    }

    /// Clamp the setpoint into the configured bounds.
    pub fn clamped(self, min: f64, max: f64) -> Self {
        match self {
            Setpoint::Single(t) => Setpoint::Single(t.clamp(min, max)),
            Setpoint::Range { low, high } => Setpoint::Range {
                low: low.clamp(min, max),
                high: high.clamp(min, max),
            },
        }
    }
}
