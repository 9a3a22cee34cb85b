//! Actuator decision engine.
//!
//! Bang-bang control with hysteresis, unified across modes and
//! upstream presence. The engine is a pure function from the cached
//! readings to a desired actuator transition; command execution and
//! group arbitration happen in [`crate::thermostat`] and
//! [`crate::group`].
//!
//! Tolerance comparisons are inclusive throughout: a reading exactly
//! at a threshold drives the actuator toward the setpoint instead of
//! sitting in the ambiguous zone.

use damper_core::{HvacMode, Setpoint};

use crate::upstream::UpstreamSnapshot;

/// The transition the actuator(s) should make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    TurnOn,
    TurnOff,
    /// Inside the hysteresis band; keep the current actuator state.
    Hold,
}

/// Everything one control pass feeds the engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineInput<'a> {
    pub mode: HvacMode,
    pub setpoint: Setpoint,
    /// Aggregated current temperature.
    pub current: f64,
    pub cold_tolerance: f64,
    pub hot_tolerance: f64,
    /// Current upstream reading, when a main thermostat is configured
    /// and readable. The caller holds the pass entirely when a
    /// configured upstream has no readable data.
    pub upstream: Option<&'a UpstreamSnapshot>,
}

/// Decide the desired actuator transition for the current readings.
pub fn decide(input: &EngineInput) -> Decision {
    let EngineInput {
        mode,
        setpoint,
        current,
        cold_tolerance: cold,
        hot_tolerance: hot,
        upstream,
    } = *input;

    if mode == HvacMode::Off {
        return Decision::TurnOff;
    }

    // Never heat against a cooling duct run or vice versa.
    if let Some(up) = upstream {
        if mode.opposes(up.mode) {
            return Decision::TurnOff;
        }
    }

    match (mode, upstream) {
        (HvacMode::Heat, None) => heat_side(current, setpoint.heat_target(), cold, hot),
        (HvacMode::Cool, None) => cool_side(current, setpoint.cool_target(), cold, hot),
        (HvacMode::Auto | HvacMode::HeatCool, None) => {
            // Off as soon as neither demand holds; auto carries no
            // hysteresis band of its own.
            let too_cold = current <= setpoint.heat_target() - cold;
            let too_hot = current >= setpoint.cool_target() + hot;
            if too_cold || too_hot {
                Decision::TurnOn
            } else {
                Decision::TurnOff
            }
        }
        (HvacMode::Heat, Some(up)) => {
            if up.action.is_heating() {
                heat_side(current, setpoint.heat_target(), cold, hot)
            } else {
                Decision::TurnOff
            }
        }
        (HvacMode::Cool, Some(up)) => {
            if up.action.is_cooling() {
                cool_side(current, setpoint.cool_target(), cold, hot)
            } else {
                Decision::TurnOff
            }
        }
        (HvacMode::Auto | HvacMode::HeatCool, Some(up)) => {
            banded_follow(up, setpoint, current, cold, hot)
        }
        (HvacMode::Off, _) => Decision::TurnOff,
    }
}

/// Heating demand against a single target: open at or below
/// `target - cold`, close at or above `target + hot`.
fn heat_side(current: f64, target: f64, cold: f64, hot: f64) -> Decision {
    if current <= target - cold {
        Decision::TurnOn
    } else if current >= target + hot {
        Decision::TurnOff
    } else {
        Decision::Hold
    }
}

/// Cooling demand, mirrored.
fn cool_side(current: f64, target: f64, cold: f64, hot: f64) -> Decision {
    if current >= target + hot {
        Decision::TurnOn
    } else if current <= target - cold {
        Decision::TurnOff
    } else {
        Decision::Hold
    }
}

/// Band logic for auto/heat_cool with an upstream: the upstream picks
/// the direction, the band edge for that direction gates the damper.
/// The direction comes from the upstream's mode, falling back to its
/// action when the upstream itself is in a dual-direction mode.
fn banded_follow(
    up: &UpstreamSnapshot,
    setpoint: Setpoint,
    current: f64,
    cold: f64,
    hot: f64,
) -> Decision {
    let heating = match up.mode {
        HvacMode::Heat => up.action.is_heating(),
        HvacMode::Auto | HvacMode::HeatCool => up.action.is_heating(),
        _ => false,
    };
    let cooling = match up.mode {
        HvacMode::Cool => up.action.is_cooling(),
        HvacMode::Auto | HvacMode::HeatCool => up.action.is_cooling(),
        _ => false,
    };

    if heating {
        heat_side(current, setpoint.heat_target(), cold, hot)
    } else if cooling {
        cool_side(current, setpoint.cool_target(), cold, hot)
    } else {
        // Upstream idle or off: nothing is moving through the duct.
        Decision::TurnOff
    }
}
