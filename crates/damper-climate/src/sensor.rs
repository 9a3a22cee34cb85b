//! Sensor aggregation.
//!
//! Readings are always pulled fresh from the host; the control loop
//! keeps its own cache and only overwrites it when an aggregate is
//! produced, so a transiently unavailable sensor never reads as
//! "reached setpoint".

use damper_host::Host;
use tracing::{debug, warn};

use damper_core::EntityId;

/// Arithmetic mean of all currently valid numeric readings.
///
/// Sensors reporting unknown/unavailable (or missing entirely) are
/// skipped quietly; a present but non-numeric reading is logged and
/// excluded. Returns `None` when no sensor yields a valid reading.
pub fn aggregate(host: &Host, sensors: &[EntityId]) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;

    for sensor in sensors {
        let Some(snapshot) = host.get(sensor) else {
            debug!(sensor = %sensor, "sensor missing, skipped");
            continue;
        };
        if snapshot.is_unknown() || snapshot.is_unavailable() {
            debug!(sensor = %sensor, state = %snapshot.state, "sensor not ready, skipped");
            continue;
        }
        match snapshot.numeric() {
            Some(value) => {
                sum += value;
                count += 1;
            }
            None => {
                warn!(sensor = %sensor, state = %snapshot.state, "non-numeric sensor reading excluded");
            }
        }
    }

    (count > 0).then(|| sum / count as f64)
}
