//! Actuator group arbitration.
//!
//! A group is a priority-ordered list of switches (earlier = higher
//! priority) sharing a ceiling on how many may be off at once. Turning
//! a member off when the group sits at the ceiling first turns a
//! lower-priority off member back on to absorb the slot; when no such
//! member exists the turn-off is refused and the actuator stays on.
//! Extra capacity left running beats violating the ceiling.
//!
//! The registry is an explicitly shared handle, not process-global
//! state. Member status is always queried fresh from the host, and the
//! query-then-command sequence is serialized per group by an async
//! mutex so two instances handing off at once cannot overshoot the
//! ceiling.

use std::sync::{Arc, Mutex as StdMutex};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use damper_core::consts::{STATE_OFF, STATE_ON};
use damper_core::{CallContext, EntityId};
use damper_host::{Host, ServiceError};

/// How a turn-off request against a group was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffOutcome {
    /// Below the ceiling; turned off directly.
    Off,
    /// At the ceiling; `donor` was turned on first, then the
    /// requested actuator off.
    HandedOff { donor: EntityId },
    /// At the ceiling with no lower-priority off member; the actuator
    /// was left on.
    Refused,
}

struct GroupInner {
    /// Priority order: earlier members keep their slot longer.
    members: Vec<EntityId>,
    /// Max members simultaneously off.
    max_off: usize,
}

/// One named actuator group.
pub struct Group {
    name: String,
    inner: StdMutex<GroupInner>,
    /// Serializes the status-query-and-command sequence.
    op_lock: Mutex<()>,
}

impl Group {
    /// Member list snapshot in priority order.
    pub fn members(&self) -> Vec<EntityId> {
        self.inner.lock().expect("group lock poisoned").members.clone()
    }

    /// Current ceiling.
    pub fn max_off(&self) -> usize {
        self.inner.lock().expect("group lock poisoned").max_off
    }

    /// Turn `actuator` off without letting the group's off-count
    /// exceed the ceiling as a result of our own commands.
    pub async fn request_off(
        &self,
        host: &Host,
        actuator: &EntityId,
        context: &CallContext,
    ) -> Result<OffOutcome, ServiceError> {
        let _guard = self.op_lock.lock().await;
        let (members, max_off) = {
            let inner = self.inner.lock().expect("group lock poisoned");
            (inner.members.clone(), inner.max_off)
        };

        // Fresh status per member; unavailable members count as
        // neither on nor off and are skipped as donors.
        let status: Vec<Option<bool>> = members
            .iter()
            .map(|id| {
                host.get(id)
                    .filter(|s| !s.is_unavailable() && !s.is_unknown())
                    .map(|s| s.is_on())
            })
            .collect();
        let off_count = status.iter().filter(|s| **s == Some(false)).count();

        if off_count < max_off {
            turn(host, actuator, STATE_OFF, context).await?;
            return Ok(OffOutcome::Off);
        }

        let position = members.iter().position(|id| id == actuator);
        let Some(position) = position else {
            warn!(group = %self.name, actuator = %actuator, "actuator not enrolled in group, turning off directly");
            turn(host, actuator, STATE_OFF, context).await?;
            return Ok(OffOutcome::Off);
        };

        // First off member below the requester in priority order.
        let donor = members
            .iter()
            .zip(&status)
            .skip(position + 1)
            .find(|(_, s)| **s == Some(false))
            .map(|(id, _)| id.clone());

        match donor {
            Some(donor) => {
                debug!(
                    group = %self.name,
                    actuator = %actuator,
                    donor = %donor,
                    "group at ceiling, handing slot to lower-priority member"
                );
                turn(host, &donor, STATE_ON, context).await?;
                turn(host, actuator, STATE_OFF, context).await?;
                Ok(OffOutcome::HandedOff { donor })
            }
            None => {
                info!(
                    group = %self.name,
                    actuator = %actuator,
                    max_off,
                    "group at ceiling with no handoff candidate, leaving actuator on"
                );
                Ok(OffOutcome::Refused)
            }
        }
    }
}

async fn turn(
    host: &Host,
    actuator: &EntityId,
    state: &str,
    context: &CallContext,
) -> Result<(), ServiceError> {
    let service = if state == STATE_OFF { "turn_off" } else { "turn_on" };
    host.call_service(
        "switch",
        service,
        serde_json::json!({ "entity_id": actuator.as_str() }),
        context.child(),
    )
    .await
}

/// Shared registry of actuator groups, keyed by name.
pub struct GroupRegistry {
    groups: DashMap<String, Arc<Group>>,
}

impl GroupRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            groups: DashMap::new(),
        })
    }

    /// Create the group if needed, append members it has not seen
    /// before (preserving enrollment order as priority), and set the
    /// ceiling.
    pub fn enroll(&self, name: &str, members: &[EntityId], max_off: usize) {
        let group = self
            .groups
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Group {
                    name: name.to_string(),
                    inner: StdMutex::new(GroupInner {
                        members: Vec::new(),
                        max_off,
                    }),
                    op_lock: Mutex::new(()),
                })
            })
            .clone();

        let mut inner = group.inner.lock().expect("group lock poisoned");
        for member in members {
            if !inner.members.contains(member) {
                inner.members.push(member.clone());
            }
        }
        inner.max_off = max_off;
        debug!(group = name, members = inner.members.len(), max_off, "group enrolled");
    }

    /// Look up a group by name.
    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.get(name).map(|g| g.clone())
    }
}
