//! Core types shared by the damper thermostat host and plugin crates:
//! entity identifiers, state snapshots, change events, and the climate
//! vocabulary (modes, actions, setpoints).

mod climate;
mod context;
mod entity_id;
mod state;

pub use climate::{HvacAction, HvacMode, Setpoint};
pub use context::CallContext;
pub use entity_id::{EntityId, EntityIdError};
pub use state::{StateChanged, StateSnapshot};

/// Well-known state values and attribute keys.
pub mod consts {
    /// Switch/actuator in the on position.
    pub const STATE_ON: &str = "on";

    /// Switch/actuator in the off position.
    pub const STATE_OFF: &str = "off";

    /// Entity exists but its value is not known.
    pub const STATE_UNKNOWN: &str = "unknown";

    /// Entity is unreachable.
    pub const STATE_UNAVAILABLE: &str = "unavailable";

    /// Current action reported by a climate entity.
    pub const ATTR_HVAC_ACTION: &str = "hvac_action";

    /// Single target temperature of a climate entity.
    pub const ATTR_TEMPERATURE: &str = "temperature";

    /// Lower edge of a target temperature band.
    pub const ATTR_TARGET_TEMP_LOW: &str = "target_temp_low";

    /// Upper edge of a target temperature band.
    pub const ATTR_TARGET_TEMP_HIGH: &str = "target_temp_high";

    /// Measured temperature displayed by a climate entity.
    pub const ATTR_CURRENT_TEMPERATURE: &str = "current_temperature";

    /// Measured humidity displayed by a climate entity.
    pub const ATTR_CURRENT_HUMIDITY: &str = "current_humidity";

    /// Display name of an entity.
    pub const ATTR_FRIENDLY_NAME: &str = "friendly_name";

    /// Icon hint for frontends.
    pub const ATTR_ICON: &str = "icon";
}
