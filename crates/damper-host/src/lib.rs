//! The slice of a home-automation host runtime the damper thermostat
//! consumes: an entity state table with a state-changed broadcast bus,
//! a service registry with async handlers, a restore store read once at
//! boot, and a started signal.
//!
//! In production the plugin would sit behind a real automation host;
//! this crate is that host's capability surface as one in-process
//! struct, and doubles as the test harness for the control loop.

mod service;
pub mod switch;

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace, warn};

use damper_core::{CallContext, EntityId, StateChanged, StateSnapshot};

pub use service::{ServiceCall, ServiceError, ServiceFuture, ServiceHandler};

/// Capacity of the state-changed broadcast channel. Subscribers that
/// fall further behind than this see a lag error and must resync.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// State persisted for an entity across host restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoredState {
    pub state: String,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

/// The host runtime surface.
///
/// All methods take `&self`; the struct is shared as [`SharedHost`]
/// across every thermostat instance in the process.
pub struct Host {
    /// Live entity states
    states: DashMap<EntityId, StateSnapshot>,

    /// Broadcast side of the state-changed bus
    events: broadcast::Sender<StateChanged>,

    /// Services indexed by "domain.service"
    services: DashMap<String, ServiceHandler>,

    /// States persisted for restore-on-boot
    restored: DashMap<EntityId, RestoredState>,

    /// Set to true once the host has finished starting up
    started_tx: watch::Sender<bool>,
    started_rx: watch::Receiver<bool>,
}

/// Thread-safe handle to the host.
pub type SharedHost = Arc<Host>;

impl Host {
    /// Create an empty host. Built-in domain services are opt-in; see
    /// [`switch::register`].
    pub fn new() -> SharedHost {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (started_tx, started_rx) = watch::channel(false);
        Arc::new(Self {
            states: DashMap::new(),
            events,
            services: DashMap::new(),
            restored: DashMap::new(),
            started_tx,
            started_rx,
        })
    }

    /// Current state of an entity, or `None` when it does not exist.
    pub fn get(&self, entity_id: &EntityId) -> Option<StateSnapshot> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// The bare state value of an entity.
    pub fn state_of(&self, entity_id: &EntityId) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    /// Write an entity's state and notify subscribers.
    ///
    /// `last_changed` is preserved when the state value is unchanged.
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
    ) -> StateSnapshot {
        let old = self.get(&entity_id);
        let new = match &old {
            Some(existing) => existing.with_update(state, attributes),
            None => StateSnapshot::new(entity_id.clone(), state, attributes),
        };
        trace!(entity_id = %entity_id, state = %new.state, "state written");

        self.states.insert(entity_id.clone(), new.clone());

        // No receivers is not an error
        let _ = self.events.send(StateChanged {
            entity_id,
            old,
            new: new.clone(),
        });
        new
    }

    /// Subscribe to every state change. Callers filter by entity id.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
        self.events.subscribe()
    }

    /// Register an async service handler under `domain.service`,
    /// replacing any previous registration.
    pub fn register_service<F, Fut>(&self, domain: &str, service: &str, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        let key = format!("{domain}.{service}");
        debug!(service = %key, "service registered");
        let handler: ServiceHandler = Arc::new(move |call| Box::pin(handler(call)));
        self.services.insert(key, handler);
    }

    /// Invoke a service. The returned error is for the caller to log;
    /// nothing here is fatal to the host.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: serde_json::Value,
        context: CallContext,
    ) -> Result<(), ServiceError> {
        let key = format!("{domain}.{service}");
        let handler = match self.services.get(&key) {
            Some(entry) => entry.clone(),
            None => {
                warn!(service = %key, "service not found");
                return Err(ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                });
            }
        };

        debug!(service = %key, context = %context.id, "calling service");
        handler(ServiceCall {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
            context,
        })
        .await
    }

    /// Whether `domain.service` is registered.
    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&format!("{domain}.{service}"))
    }

    /// Persist an entity's state for restore after the next boot.
    pub fn persist(&self, entity_id: EntityId, state: RestoredState) {
        self.restored.insert(entity_id, state);
    }

    /// The state persisted for an entity, if any. Read once at entity
    /// startup.
    pub fn restored(&self, entity_id: &EntityId) -> Option<RestoredState> {
        self.restored.get(entity_id).map(|s| s.clone())
    }

    /// Signal that host startup has finished. Entities holding their
    /// first control pass may now run it.
    pub fn mark_started(&self) {
        let _ = self.started_tx.send(true);
    }

    /// Whether the host has finished starting.
    pub fn is_started(&self) -> bool {
        *self.started_rx.borrow()
    }

    /// Wait until the host has finished starting.
    pub async fn wait_started(&self) {
        let mut rx = self.started_rx.clone();
        // The sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(|started| *started).await;
    }
}
