//! Thermostat configuration.
//!
//! A [`ThermostatConfig`] is immutable once created; reconfiguration
//! through the setup flow produces a new effective config and a new
//! control task. Structural validation lives here, entity-existence
//! checks in [`crate::flow`] where the host registry is at hand.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use damper_core::{EntityId, HvacMode, Setpoint};

/// Hysteresis margin used when none is configured.
pub const DEFAULT_TOLERANCE: f64 = 0.3;

/// Lowest selectable target temperature.
pub const DEFAULT_MIN_TEMP: f64 = 7.0;

/// Highest selectable target temperature.
pub const DEFAULT_MAX_TEMP: f64 = 35.0;

/// Default target temperature step.
pub const DEFAULT_PRECISION: f64 = 0.5;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("{0} must reference entities in the {1} domain")]
    WrongDomain(&'static str, &'static str),

    #[error("min_temp ({min}) must be below max_temp ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("{0} must not be negative")]
    NegativeTolerance(&'static str),

    #[error("precision must be one of 0.1, 0.5, 1.0")]
    InvalidPrecision,

    #[error("target band low ({low}) must be below high ({high})")]
    InvalidBand { low: f64, high: f64 },

    #[error("group ceiling must be at least 1")]
    ZeroCeiling,

    #[error("invalid config file: {0}")]
    Parse(String),
}

/// Membership of a named actuator group with a shared
/// "max simultaneously off" ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    pub max_off: usize,
}

/// Immutable descriptor of one thermostat instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermostatConfig {
    /// Display name; the climate entity id is derived from it.
    pub name: String,

    /// Temperature sensors; readings are averaged.
    pub temperature_sensors: Vec<EntityId>,

    /// Humidity sensors; readings are averaged.
    #[serde(default)]
    pub humidity_sensors: Vec<EntityId>,

    /// Actuator switches commanded by the control loop.
    pub actuators: Vec<EntityId>,

    /// Upstream climate entity whose action/mode gates the loop.
    #[serde(default)]
    pub main_thermostat: Option<EntityId>,

    /// Margin below target before heating engages.
    #[serde(default = "default_tolerance")]
    pub cold_tolerance: f64,

    /// Margin above target before cooling engages.
    #[serde(default = "default_tolerance")]
    pub hot_tolerance: f64,

    #[serde(default = "default_min_temp")]
    pub min_temp: f64,

    #[serde(default = "default_max_temp")]
    pub max_temp: f64,

    /// Initial target; when absent the persisted target is restored,
    /// falling back to the min/max bound for the initial mode.
    #[serde(default)]
    pub target: Option<Setpoint>,

    /// Initial mode; when absent the persisted mode is restored,
    /// falling back to off.
    #[serde(default)]
    pub initial_mode: Option<HvacMode>,

    /// Target temperature step.
    #[serde(default = "default_precision")]
    pub precision: f64,

    /// Actuator group membership.
    #[serde(default)]
    pub group: Option<GroupConfig>,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_min_temp() -> f64 {
    DEFAULT_MIN_TEMP
}

fn default_max_temp() -> f64 {
    DEFAULT_MAX_TEMP
}

fn default_precision() -> f64 {
    DEFAULT_PRECISION
}

impl ThermostatConfig {
    /// Structural validation; does not consult the host registry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyField("name"));
        }
        if self.temperature_sensors.is_empty() {
            return Err(ConfigError::EmptyField("temperature_sensors"));
        }
        if self.actuators.is_empty() {
            return Err(ConfigError::EmptyField("actuators"));
        }
        if self.actuators.iter().any(|id| id.domain() != "switch") {
            return Err(ConfigError::WrongDomain("actuators", "switch"));
        }
        if let Some(main) = &self.main_thermostat {
            if main.domain() != "climate" {
                return Err(ConfigError::WrongDomain("main_thermostat", "climate"));
            }
        }
        if self.min_temp >= self.max_temp {
            return Err(ConfigError::InvalidBounds {
                min: self.min_temp,
                max: self.max_temp,
            });
        }
        if self.cold_tolerance < 0.0 {
            return Err(ConfigError::NegativeTolerance("cold_tolerance"));
        }
        if self.hot_tolerance < 0.0 {
            return Err(ConfigError::NegativeTolerance("hot_tolerance"));
        }
        if ![0.1, 0.5, 1.0].contains(&self.precision) {
            return Err(ConfigError::InvalidPrecision);
        }
        if let Some(Setpoint::Range { low, high }) = self.target {
            if low >= high {
                return Err(ConfigError::InvalidBand { low, high });
            }
        }
        if let Some(group) = &self.group {
            if group.name.trim().is_empty() {
                return Err(ConfigError::EmptyField("group.name"));
            }
            if group.max_off == 0 {
                return Err(ConfigError::ZeroCeiling);
            }
        }
        Ok(())
    }

    /// All entity ids whose change events re-run the control loop.
    pub fn tracked_entities(&self) -> Vec<EntityId> {
        self.temperature_sensors
            .iter()
            .chain(self.humidity_sensors.iter())
            .chain(self.actuators.iter())
            .chain(self.main_thermostat.iter())
            .cloned()
            .collect()
    }

    /// Parse a YAML document holding a list of thermostat definitions.
    pub fn load_yaml(source: &str) -> Result<Vec<Self>, ConfigError> {
        let configs: Vec<Self> =
            serde_yaml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        for config in &configs {
            config.validate()?;
        }
        Ok(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> ThermostatConfig {
        ThermostatConfig {
            name: "Bedroom".to_string(),
            temperature_sensors: vec!["sensor.bedroom_temp".parse().unwrap()],
            humidity_sensors: vec![],
            actuators: vec!["switch.bedroom_damper".parse().unwrap()],
            main_thermostat: None,
            cold_tolerance: DEFAULT_TOLERANCE,
            hot_tolerance: DEFAULT_TOLERANCE,
            min_temp: DEFAULT_MIN_TEMP,
            max_temp: DEFAULT_MAX_TEMP,
            target: None,
            initial_mode: None,
            precision: DEFAULT_PRECISION,
            group: None,
        }
    }

    #[test]
    fn minimal_config_is_valid() {
        assert_eq!(minimal().validate(), Ok(()));
    }

    #[test]
    fn rejects_missing_sensors_and_actuators() {
        let mut config = minimal();
        config.temperature_sensors.clear();
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyField("temperature_sensors"))
        );

        let mut config = minimal();
        config.actuators.clear();
        assert_eq!(config.validate(), Err(ConfigError::EmptyField("actuators")));
    }

    #[test]
    fn rejects_wrong_domains() {
        let mut config = minimal();
        config.actuators = vec!["light.lamp".parse().unwrap()];
        assert_eq!(
            config.validate(),
            Err(ConfigError::WrongDomain("actuators", "switch"))
        );

        let mut config = minimal();
        config.main_thermostat = Some("sensor.nope".parse().unwrap());
        assert_eq!(
            config.validate(),
            Err(ConfigError::WrongDomain("main_thermostat", "climate"))
        );
    }

    #[test]
    fn rejects_inverted_bounds_and_band() {
        let mut config = minimal();
        config.min_temp = 30.0;
        config.max_temp = 20.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBounds { .. })
        ));

        let mut config = minimal();
        config.target = Some(Setpoint::Range { low: 24.0, high: 19.0 });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBand { .. })
        ));
    }

    #[test]
    fn rejects_zero_group_ceiling() {
        let mut config = minimal();
        config.group = Some(GroupConfig {
            name: "upstairs".to_string(),
            max_off: 0,
        });
        assert_eq!(config.validate(), Err(ConfigError::ZeroCeiling));
    }

    #[test]
    fn loads_yaml_definitions() {
        let yaml = r#"
- name: Bedroom
  temperature_sensors: [sensor.bedroom_temp, sensor.bedroom_temp_2]
  actuators: [switch.bedroom_damper]
  main_thermostat: climate.hallway
  cold_tolerance: 0.5
  target: 21.0
  initial_mode: heat
  group:
    name: upstairs
    max_off: 2
"#;
        let configs = ThermostatConfig::load_yaml(yaml).unwrap();
        assert_eq!(configs.len(), 1);
        let config = &configs[0];
        assert_eq!(config.temperature_sensors.len(), 2);
        assert_eq!(config.cold_tolerance, 0.5);
        assert_eq!(config.hot_tolerance, DEFAULT_TOLERANCE);
        assert_eq!(config.target, Some(Setpoint::Single(21.0)));
        assert_eq!(config.initial_mode, Some(HvacMode::Heat));
        assert_eq!(config.group.as_ref().unwrap().max_off, 2);
        assert_eq!(config.tracked_entities().len(), 4);
    }

    #[test]
    fn invalid_yaml_surfaces_as_parse_error() {
        assert!(matches!(
            ThermostatConfig::load_yaml("- name: [broken"),
            Err(ConfigError::Parse(_))
        ));
    }
}
