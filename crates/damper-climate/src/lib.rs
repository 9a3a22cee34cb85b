//! Virtual damper thermostat.
//!
//! Each thermostat instance watches its temperature (and optionally
//! humidity) sensors, an actuator switch or list of switches, and an
//! optional upstream "main" thermostat, and decides when to open or
//! close the actuator to satisfy a target temperature or band. Turning
//! an actuator off goes through a group arbiter that caps how many
//! members of a named group may be closed at once, handing the slot to
//! a lower-priority member when the cap is reached.
//!
//! The host runtime (state table, change events, service calls,
//! restore store) is consumed through [`damper_host::Host`].

pub mod config;
pub mod engine;
pub mod flow;
pub mod group;
pub mod sensor;
pub mod thermostat;
pub mod upstream;

pub use config::{ConfigError, GroupConfig, ThermostatConfig};
pub use engine::{decide, Decision, EngineInput};
pub use flow::{FlowError, SetupFlow};
pub use group::{GroupRegistry, OffOutcome};
pub use thermostat::{Thermostat, ThermostatHandle};

use damper_host::SharedHost;
use std::sync::Arc;

/// Validate a config, enroll its actuators in their group (when one is
/// configured), and spawn the control task.
pub fn setup_thermostat(
    host: SharedHost,
    groups: Arc<GroupRegistry>,
    config: ThermostatConfig,
) -> Result<ThermostatHandle, ConfigError> {
    config.validate()?;
    if let Some(group) = &config.group {
        groups.enroll(&group.name, &config.actuators, group.max_off);
    }
    Ok(Thermostat::spawn(host, groups, config))
}
