//! Shared harness for the control-loop integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Once;
use std::time::Duration;

use serde_json::json;

use damper_core::consts::{ATTR_HVAC_ACTION, STATE_OFF, STATE_ON};
use damper_core::EntityId;
use damper_host::{switch, Host, SharedHost};

static INIT: Once = Once::new();

/// A host with the built-in switch services registered and test
/// logging initialized.
pub fn test_host() -> SharedHost {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
    let host = Host::new();
    switch::register(&host);
    host
}

pub fn id(raw: &str) -> EntityId {
    raw.parse().unwrap()
}

pub fn set_sensor(host: &Host, entity_id: &str, value: f64) {
    host.set(id(entity_id), value.to_string(), HashMap::new());
}

pub fn set_switch(host: &Host, entity_id: &str, on: bool) {
    let state = if on { STATE_ON } else { STATE_OFF };
    host.set(id(entity_id), state, HashMap::new());
}

pub fn set_climate(host: &Host, entity_id: &str, mode: &str, action: &str) {
    host.set(
        id(entity_id),
        mode,
        HashMap::from([(ATTR_HVAC_ACTION.to_string(), json!(action))]),
    );
}

pub fn switch_is_on(host: &Host, entity_id: &str) -> bool {
    host.get(&id(entity_id)).map(|s| s.is_on()).unwrap_or(false)
}

/// Wait until `pred` holds, driven by state-change events. Panics on
/// timeout so failing tests name the condition they waited for.
pub async fn wait_for(host: &Host, what: &str, pred: impl Fn(&Host) -> bool) {
    let mut events = host.subscribe();
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if pred(host) {
                return;
            }
            let _ = events.recv().await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for: {what}");
}
