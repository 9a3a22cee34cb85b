//! Upstream "main" thermostat adapter.
//!
//! Reads the external climate entity the local loop follows when one
//! is configured. A missing or unreadable upstream yields no snapshot
//! at all; the control loop then holds the actuator as-is rather than
//! acting on fabricated "off" data. Only an actual reading of the
//! upstream's mode and action drives the engine's gate.

use damper_host::Host;
use tracing::{debug, warn};

use damper_core::consts::{ATTR_HVAC_ACTION, ATTR_TEMPERATURE};
use damper_core::{EntityId, HvacAction, HvacMode};

/// What the upstream thermostat last reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpstreamSnapshot {
    /// Operating mode (the entity's state value); unparsable reads as off.
    pub mode: HvacMode,

    /// Reported action; a missing attribute reads as off.
    pub action: HvacAction,

    /// The upstream's own target temperature, when it exposes one.
    pub target: Option<f64>,
}

/// Read the upstream entity's current snapshot from the host.
///
/// `None` when the entity is missing or reports unknown/unavailable.
pub fn read(host: &Host, entity_id: &EntityId) -> Option<UpstreamSnapshot> {
    let Some(state) = host.get(entity_id) else {
        warn!(upstream = %entity_id, "main thermostat entity not found");
        return None;
    };
    if state.is_unavailable() || state.is_unknown() {
        debug!(upstream = %entity_id, state = %state.state, "main thermostat not ready");
        return None;
    }

    let action: Option<String> = state.attribute(ATTR_HVAC_ACTION);
    Some(UpstreamSnapshot {
        mode: HvacMode::from_state(&state.state),
        action: HvacAction::from_attr(action.as_deref()),
        target: state.numeric_attribute(ATTR_TEMPERATURE),
    })
}
