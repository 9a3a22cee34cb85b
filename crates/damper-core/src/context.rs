//! Call contexts for attributing service invocations.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifies who issued a service call and lets log lines from the
/// handler be correlated back to the decision that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// Unique id for this call (ULID)
    pub id: String,

    /// Id of the call or event that caused this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl CallContext {
    /// A fresh root context.
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: None,
        }
    }

    /// A context caused by this one.
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: Some(self.id.clone()),
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_links_to_parent() {
        let root = CallContext::new();
        let child = root.child();
        assert_eq!(child.parent_id.as_deref(), Some(root.id.as_str()));
        assert_ne!(child.id, root.id);
    }
}
