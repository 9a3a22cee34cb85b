//! Setup and reconfigure wizard glue.
//!
//! The wizard itself (rendering, translations) belongs to the host;
//! this module supplies the ordered field schema and the submit-time
//! validation that turns raw form input into a [`ThermostatConfig`].
//! Entity-id fields are checked against the host's live state table,
//! and failures come back as a field-to-code map rather than an error
//! chain, so the caller can mark individual form fields.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use damper_core::EntityId;
use damper_host::Host;

use crate::config::{
    ConfigError, ThermostatConfig, DEFAULT_MAX_TEMP, DEFAULT_MIN_TEMP, DEFAULT_PRECISION,
    DEFAULT_TOLERANCE,
};

pub const ERR_REQUIRED: &str = "required";
pub const ERR_INVALID_VALUE: &str = "invalid_value";
pub const ERR_ENTITY_NOT_FOUND: &str = "entity_not_found";

/// Non-field errors (e.g. unparseable input) are keyed under this.
pub const FIELD_BASE: &str = "base";

/// Widget hint for one form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Text,
    /// Entity picker restricted to one domain, multi-select or not.
    Entity {
        domain: &'static str,
        multiple: bool,
    },
    Number,
    Mode,
    Group,
}

/// One entry of the ordered form schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: &'static str,
    pub required: bool,
    pub selector: Selector,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlowError {
    /// One code per failed field; the form is re-shown with these.
    #[error("form validation failed for {} field(s)", .0.len())]
    Invalid(BTreeMap<String, &'static str>),
}

impl FlowError {
    /// The code recorded for `key`, if that field failed.
    pub fn code(&self, key: &str) -> Option<&'static str> {
        let FlowError::Invalid(errors) = self;
        errors.get(key).copied()
    }
}

/// Stateless entry points for the setup wizard.
pub struct SetupFlow;

impl SetupFlow {
    /// Ordered field descriptors for the user step.
    pub fn schema() -> Vec<Field> {
        vec![
            Field {
                key: "name",
                required: true,
                selector: Selector::Text,
                default: None,
            },
            Field {
                key: "temperature_sensors",
                required: true,
                selector: Selector::Entity {
                    domain: "sensor",
                    multiple: true,
                },
                default: None,
            },
            Field {
                key: "humidity_sensors",
                required: false,
                selector: Selector::Entity {
                    domain: "sensor",
                    multiple: true,
                },
                default: None,
            },
            Field {
                key: "actuators",
                required: true,
                selector: Selector::Entity {
                    domain: "switch",
                    multiple: true,
                },
                default: None,
            },
            Field {
                key: "main_thermostat",
                required: false,
                selector: Selector::Entity {
                    domain: "climate",
                    multiple: false,
                },
                default: None,
            },
            Field {
                key: "cold_tolerance",
                required: false,
                selector: Selector::Number,
                default: Some(json!(DEFAULT_TOLERANCE)),
            },
            Field {
                key: "hot_tolerance",
                required: false,
                selector: Selector::Number,
                default: Some(json!(DEFAULT_TOLERANCE)),
            },
            Field {
                key: "min_temp",
                required: false,
                selector: Selector::Number,
                default: Some(json!(DEFAULT_MIN_TEMP)),
            },
            Field {
                key: "max_temp",
                required: false,
                selector: Selector::Number,
                default: Some(json!(DEFAULT_MAX_TEMP)),
            },
            Field {
                key: "target",
                required: false,
                selector: Selector::Number,
                default: None,
            },
            Field {
                key: "initial_mode",
                required: false,
                selector: Selector::Mode,
                default: Some(json!("off")),
            },
            Field {
                key: "precision",
                required: false,
                selector: Selector::Number,
                default: Some(json!(DEFAULT_PRECISION)),
            },
            Field {
                key: "group",
                required: false,
                selector: Selector::Group,
                default: None,
            },
        ]
    }

    /// Validate submitted form input against the schema and the host's
    /// live entity registry. Nothing is created on failure.
    pub fn submit(host: &Host, input: &Value) -> Result<ThermostatConfig, FlowError> {
        let mut errors: BTreeMap<String, &'static str> = BTreeMap::new();

        for field in Self::schema() {
            if field.required && input.get(field.key).is_none() {
                errors.insert(field.key.to_string(), ERR_REQUIRED);
            }
        }
        if !errors.is_empty() {
            return Err(FlowError::Invalid(errors));
        }

        let config: ThermostatConfig = match serde_json::from_value(input.clone()) {
            Ok(config) => config,
            Err(e) => {
                debug!(error = %e, "setup form input did not parse");
                errors.insert(FIELD_BASE.to_string(), ERR_INVALID_VALUE);
                return Err(FlowError::Invalid(errors));
            }
        };

        if let Err(e) = config.validate() {
            errors.insert(config_error_field(&e).to_string(), ERR_INVALID_VALUE);
        }

        check_entities(host, "temperature_sensors", &config.temperature_sensors, &mut errors);
        check_entities(host, "humidity_sensors", &config.humidity_sensors, &mut errors);
        check_entities(host, "actuators", &config.actuators, &mut errors);
        if let Some(main) = &config.main_thermostat {
            check_entities(host, "main_thermostat", std::slice::from_ref(main), &mut errors);
        }

        if errors.is_empty() {
            Ok(config)
        } else {
            Err(FlowError::Invalid(errors))
        }
    }

    /// Merge changed fields over the existing config and re-validate.
    /// Produces the new effective config; the caller swaps the running
    /// instance for one spawned from it.
    pub fn reconfigure(
        host: &Host,
        existing: &ThermostatConfig,
        changes: &Value,
    ) -> Result<ThermostatConfig, FlowError> {
        let mut merged = match serde_json::to_value(existing) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "existing config did not serialize");
                return Err(FlowError::Invalid(BTreeMap::from([(
                    FIELD_BASE.to_string(),
                    ERR_INVALID_VALUE,
                )])));
            }
        };
        if let (Some(base), Some(overlay)) = (merged.as_object_mut(), changes.as_object()) {
            for (key, value) in overlay {
                base.insert(key.clone(), value.clone());
            }
        }
        Self::submit(host, &merged)
    }
}

fn check_entities(
    host: &Host,
    field: &str,
    entities: &[EntityId],
    errors: &mut BTreeMap<String, &'static str>,
) {
    for entity_id in entities {
        if host.get(entity_id).is_none() {
            debug!(field, entity_id = %entity_id, "form references unknown entity");
            errors.insert(field.to_string(), ERR_ENTITY_NOT_FOUND);
            return;
        }
    }
}

fn config_error_field(error: &ConfigError) -> &'static str {
    match error {
        ConfigError::EmptyField(field) | ConfigError::WrongDomain(field, _) => *field,
        ConfigError::NegativeTolerance(field) => *field,
        ConfigError::InvalidBounds { .. } => "max_temp",
        ConfigError::InvalidPrecision => "precision",
        ConfigError::InvalidBand { .. } => "target",
        ConfigError::ZeroCeiling => "group",
        ConfigError::Parse(_) => FIELD_BASE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use damper_host::Host;
    use std::collections::HashMap;

    fn host_with(entities: &[&str]) -> damper_host::SharedHost {
        let host = Host::new();
        for id in entities {
            host.set(id.parse().unwrap(), "ok", HashMap::new());
        }
        host
    }

    fn valid_input() -> Value {
        json!({
            "name": "Bedroom",
            "temperature_sensors": ["sensor.bedroom_temp"],
            "actuators": ["switch.bedroom_damper"],
        })
    }

    #[test]
    fn submit_accepts_valid_input() {
        let host = host_with(&["sensor.bedroom_temp", "switch.bedroom_damper"]);
        let config = SetupFlow::submit(&host, &valid_input()).unwrap();
        assert_eq!(config.name, "Bedroom");
        assert_eq!(config.cold_tolerance, DEFAULT_TOLERANCE);
    }

    #[test]
    fn submit_flags_missing_required_fields() {
        let host = host_with(&[]);
        let err = SetupFlow::submit(&host, &json!({ "name": "X" })).unwrap_err();
        assert_eq!(err.code("temperature_sensors"), Some(ERR_REQUIRED));
        assert_eq!(err.code("actuators"), Some(ERR_REQUIRED));
        assert_eq!(err.code("name"), None);
    }

    #[test]
    fn submit_flags_unknown_entities_per_field() {
        let host = host_with(&["switch.bedroom_damper"]);
        let err = SetupFlow::submit(&host, &valid_input()).unwrap_err();
        assert_eq!(err.code("temperature_sensors"), Some(ERR_ENTITY_NOT_FOUND));
        assert_eq!(err.code("actuators"), None);
    }

    #[test]
    fn submit_flags_structural_errors_on_their_field() {
        let host = host_with(&["sensor.bedroom_temp", "switch.bedroom_damper"]);
        let mut input = valid_input();
        input["min_temp"] = json!(30.0);
        input["max_temp"] = json!(20.0);
        let err = SetupFlow::submit(&host, &input).unwrap_err();
        assert_eq!(err.code("max_temp"), Some(ERR_INVALID_VALUE));
    }

    #[test]
    fn submit_rejects_unparseable_input_without_creating() {
        let host = host_with(&[]);
        let input = json!({
            "name": "Bedroom",
            "temperature_sensors": "not-a-list",
            "actuators": ["switch.bedroom_damper"],
        });
        let err = SetupFlow::submit(&host, &input).unwrap_err();
        assert_eq!(err.code(FIELD_BASE), Some(ERR_INVALID_VALUE));
    }

    #[test]
    fn reconfigure_merges_changes_over_existing() {
        let host = host_with(&["sensor.bedroom_temp", "switch.bedroom_damper"]);
        let existing = SetupFlow::submit(&host, &valid_input()).unwrap();
        let updated = SetupFlow::reconfigure(
            &host,
            &existing,
            &json!({ "cold_tolerance": 0.7, "target": 21.5 }),
        )
        .unwrap();
        assert_eq!(updated.cold_tolerance, 0.7);
        assert_eq!(updated.name, "Bedroom");
        assert_eq!(
            updated.target,
            Some(damper_core::Setpoint::Single(21.5))
        );
    }

    #[test]
    fn schema_lists_required_fields_first_class() {
        let schema = SetupFlow::schema();
        let required: Vec<&str> = schema
            .iter()
            .filter(|f| f.required)
            .map(|f| f.key)
            .collect();
        assert_eq!(required, vec!["name", "temperature_sensors", "actuators"]);
    }
}
