//! Built-in `switch` domain services.
//!
//! Backed directly by the host state table so actuators behave
//! realistically: commanding a missing or unavailable switch fails,
//! everything else flips the state value and fires a change event.

use std::sync::Weak;

use tracing::debug;

use damper_core::consts::{STATE_OFF, STATE_ON};
use damper_core::EntityId;

use crate::{Host, ServiceCall, ServiceError, SharedHost};

/// Register turn_on, turn_off and toggle for the `switch` domain.
pub fn register(host: &SharedHost) {
    // The handlers hold a Weak so the registry does not keep the host
    // alive through its own service table.
    for service in ["turn_on", "turn_off", "toggle"] {
        let weak = std::sync::Arc::downgrade(host);
        host.register_service("switch", service, move |call: ServiceCall| {
            let weak = weak.clone();
            async move { handle(weak, call).await }
        });
    }
}

async fn handle(host: Weak<Host>, call: ServiceCall) -> Result<(), ServiceError> {
    let Some(host) = host.upgrade() else {
        return Ok(());
    };

    let targets: Vec<EntityId> = call
        .entity_ids()
        .into_iter()
        .filter(|id| id.domain() == "switch")
        .collect();
    if targets.is_empty() {
        return Err(ServiceError::InvalidData(
            "no switch entity_id in service data".to_string(),
        ));
    }

    for entity_id in targets {
        let current = host
            .get(&entity_id)
            .ok_or_else(|| ServiceError::Failed(format!("switch {entity_id} does not exist")))?;
        if current.is_unavailable() {
            return Err(ServiceError::Failed(format!(
                "switch {entity_id} is unavailable"
            )));
        }

        let next = match call.service.as_str() {
            "turn_on" => STATE_ON,
            "turn_off" => STATE_OFF,
            _ => {
                if current.is_on() {
                    STATE_OFF
                } else {
                    STATE_ON
                }
            }
        };
        debug!(entity_id = %entity_id, state = next, context = %call.context.id, "switch command");
        host.set(entity_id, next, current.attributes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use damper_core::CallContext;
    use serde_json::json;
    use std::collections::HashMap;

    #[tokio::test]
    async fn toggle_flips_and_preserves_attributes() {
        let host = Host::new();
        register(&host);
        let id: EntityId = "switch.damper".parse().unwrap();
        host.set(
            id.clone(),
            STATE_OFF,
            HashMap::from([("friendly_name".to_string(), json!("Damper"))]),
        );

        host.call_service(
            "switch",
            "toggle",
            json!({"entity_id": "switch.damper"}),
            CallContext::new(),
        )
        .await
        .unwrap();

        let state = host.get(&id).unwrap();
        assert_eq!(state.state, STATE_ON);
        assert_eq!(state.attributes["friendly_name"], "Damper");
    }

    #[tokio::test]
    async fn non_switch_targets_are_rejected() {
        let host = Host::new();
        register(&host);
        let result = host
            .call_service(
                "switch",
                "turn_on",
                json!({"entity_id": "light.lamp"}),
                CallContext::new(),
            )
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidData(_))));
    }
}
