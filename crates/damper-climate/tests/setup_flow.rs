//! Setup wizard to running instance, end to end.

mod common;

use serde_json::json;

use damper_climate::flow::{SetupFlow, ERR_ENTITY_NOT_FOUND};
use damper_climate::{setup_thermostat, GroupRegistry};

use common::{id, set_sensor, set_switch, switch_is_on, test_host, wait_for};

#[tokio::test]
async fn submitted_form_becomes_a_running_thermostat() {
    let host = test_host();
    set_sensor(&host, "sensor.bedroom_temp", 60.0);
    set_switch(&host, "switch.bedroom_damper", false);
    host.mark_started();

    let config = SetupFlow::submit(
        &host,
        &json!({
            "name": "Bedroom",
            "temperature_sensors": ["sensor.bedroom_temp"],
            "actuators": ["switch.bedroom_damper"],
            "target": 70.0,
            "initial_mode": "heat",
            "max_temp": 90.0,
        }),
    )
    .unwrap();

    let handle = setup_thermostat(host.clone(), GroupRegistry::new(), config).unwrap();
    wait_for(&host, "damper on", |h| switch_is_on(h, "switch.bedroom_damper")).await;
    assert_eq!(
        host.state_of(&id("climate.bedroom")).as_deref(),
        Some("heat")
    );

    handle.shutdown().await;
}

#[tokio::test]
async fn unknown_entities_fail_the_form_without_side_effects() {
    let host = test_host();
    set_switch(&host, "switch.bedroom_damper", false);

    let err = SetupFlow::submit(
        &host,
        &json!({
            "name": "Bedroom",
            "temperature_sensors": ["sensor.missing"],
            "actuators": ["switch.bedroom_damper"],
        }),
    )
    .unwrap_err();
    assert_eq!(err.code("temperature_sensors"), Some(ERR_ENTITY_NOT_FOUND));

    // Nothing was created.
    assert!(host.get(&id("climate.bedroom")).is_none());
}
