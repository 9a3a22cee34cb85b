//! State snapshots and change events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consts::{STATE_ON, STATE_UNAVAILABLE, STATE_UNKNOWN};
use crate::EntityId;

/// The observed state of one entity at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// The entity this snapshot belongs to
    pub entity_id: EntityId,

    /// The state value (e.g. "on", "21.5", "heat", "unavailable")
    pub state: String,

    /// Attributes attached to the state
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the state value last changed
    pub last_changed: DateTime<Utc>,

    /// When the snapshot was last written, changed or not
    pub last_updated: DateTime<Utc>,
}

impl StateSnapshot {
    /// Create a fresh snapshot, timestamped now.
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
        }
    }

    /// Produce the successor snapshot, keeping `last_changed` when the
    /// state value is unchanged.
    pub fn with_update(
        &self,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
    ) -> Self {
        let state = state.into();
        let now = Utc::now();
        Self {
            entity_id: self.entity_id.clone(),
            last_changed: if state != self.state {
                now
            } else {
                self.last_changed
            },
            state,
            attributes,
            last_updated: now,
        }
    }

    /// Whether the entity reports "unknown".
    pub fn is_unknown(&self) -> bool {
        self.state == STATE_UNKNOWN
    }

    /// Whether the entity is unreachable.
    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    /// Whether the state value is "on".
    pub fn is_on(&self) -> bool {
        self.state == STATE_ON
    }

    /// The state value parsed as a number. `None` for
    /// unknown/unavailable entities and for non-numeric values; the
    /// caller decides which of the two cases deserves a log line.
    pub fn numeric(&self) -> Option<f64> {
        if self.is_unknown() || self.is_unavailable() {
            return None;
        }
        self.state.trim().parse().ok()
    }

    /// Deserialize an attribute by key.
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// An attribute read as a number, accepting both JSON numbers and
    /// numeric strings.
    pub fn numeric_attribute(&self, key: &str) -> Option<f64> {
        match self.attributes.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl PartialEq for StateSnapshot {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps are not compared
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}

/// Payload delivered to subscribers when an entity's state is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChanged {
    pub entity_id: EntityId,
    pub old: Option<StateSnapshot>,
    pub new: StateSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(state: &str) -> StateSnapshot {
        StateSnapshot::new(
            "sensor.test".parse().unwrap(),
            state,
            HashMap::new(),
        )
    }

    #[test]
    fn numeric_parses_plain_values() {
        assert_eq!(snapshot("21.5").numeric(), Some(21.5));
        assert_eq!(snapshot(" 70 ").numeric(), Some(70.0));
    }

    #[test]
    fn numeric_rejects_unknown_and_garbage() {
        assert_eq!(snapshot("unknown").numeric(), None);
        assert_eq!(snapshot("unavailable").numeric(), None);
        assert_eq!(snapshot("not a number").numeric(), None);
    }

    #[test]
    fn update_preserves_last_changed_for_same_value() {
        let first = snapshot("on");
        let second = first.with_update("on", HashMap::new());
        assert_eq!(second.last_changed, first.last_changed);

        let third = second.with_update("off", HashMap::new());
        assert!(third.last_changed >= second.last_changed);
        assert_eq!(third.state, "off");
    }

    #[test]
    fn numeric_attribute_accepts_strings_and_numbers() {
        let mut attrs = HashMap::new();
        attrs.insert("temperature".to_string(), json!(22.0));
        attrs.insert("humidity".to_string(), json!("41.5"));
        let snap = StateSnapshot::new("climate.main".parse().unwrap(), "heat", attrs);
        assert_eq!(snap.numeric_attribute("temperature"), Some(22.0));
        assert_eq!(snap.numeric_attribute("humidity"), Some(41.5));
        assert_eq!(snap.numeric_attribute("missing"), None);
    }
}
