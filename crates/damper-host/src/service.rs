//! Service call and handler types.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use damper_core::{CallContext, EntityId};

/// Errors surfaced by service dispatch and handlers.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    Failed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),
}

/// Future returned by a service handler.
pub type ServiceFuture = BoxFuture<'static, Result<(), ServiceError>>;

/// A registered async service handler.
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// One invocation of a `domain.service` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,

    /// Data passed to the service (e.g. entity_id)
    pub data: serde_json::Value,

    /// Who issued the call
    pub context: CallContext,
}

impl ServiceCall {
    /// The target entity ids named in `data.entity_id`, accepting a
    /// single string or an array of strings. Malformed ids are dropped.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        match self.data.get("entity_id") {
            Some(serde_json::Value::String(s)) => s.parse::<EntityId>().ok().into_iter().collect(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| s.parse().ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(data: serde_json::Value) -> ServiceCall {
        ServiceCall {
            domain: "switch".to_string(),
            service: "turn_on".to_string(),
            data,
            context: CallContext::new(),
        }
    }

    #[test]
    fn single_entity_id() {
        let ids = call(json!({"entity_id": "switch.damper_a"})).entity_ids();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].as_str(), "switch.damper_a");
    }

    #[test]
    fn entity_id_list() {
        let ids =
            call(json!({"entity_id": ["switch.damper_a", "switch.damper_b"]})).entity_ids();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn malformed_ids_are_dropped() {
        assert!(call(json!({})).entity_ids().is_empty());
        assert!(call(json!({"entity_id": "nodot"})).entity_ids().is_empty());
        assert_eq!(
            call(json!({"entity_id": ["bad", "switch.ok"]}))
                .entity_ids()
                .len(),
            1
        );
    }
}
