//! The thermostat instance: runtime state, event wiring, and the
//! control task.
//!
//! Each instance runs as one spawned task owning all mutable state.
//! Tracked-entity change events and user commands feed a single
//! channel consumed by the task, so control passes are serialized by
//! construction; instances run independently and concurrently. The
//! task stops on [`ThermostatHandle::shutdown`] or when the handle is
//! dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use damper_core::consts::{
    ATTR_CURRENT_HUMIDITY, ATTR_CURRENT_TEMPERATURE, ATTR_FRIENDLY_NAME, ATTR_HVAC_ACTION,
    ATTR_ICON, ATTR_TARGET_TEMP_HIGH, ATTR_TARGET_TEMP_LOW, ATTR_TEMPERATURE,
};
use damper_core::{CallContext, EntityId, HvacAction, HvacMode, Setpoint, StateChanged};
use damper_host::{RestoredState, SharedHost};

use crate::config::ThermostatConfig;
use crate::engine::{decide, Decision, EngineInput};
use crate::group::{Group, GroupRegistry, OffOutcome};
use crate::sensor;
use crate::upstream::{self, UpstreamSnapshot};

/// The control task has stopped; no further commands are possible.
#[derive(Debug, Clone, Error)]
#[error("thermostat control task stopped")]
pub struct ThermostatStopped;

/// User-issued commands consumed by the control task.
#[derive(Debug)]
enum Command {
    SetMode(HvacMode),
    SetTarget(Setpoint),
    Shutdown,
}

/// Handle to a running thermostat instance.
pub struct ThermostatHandle {
    entity_id: EntityId,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl ThermostatHandle {
    /// The climate entity this instance publishes as.
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Switch the operating mode.
    pub async fn set_mode(&self, mode: HvacMode) -> Result<(), ThermostatStopped> {
        self.commands
            .send(Command::SetMode(mode))
            .await
            .map_err(|_| ThermostatStopped)
    }

    /// Change the target temperature (single or band, depending on mode).
    pub async fn set_target(&self, setpoint: Setpoint) -> Result<(), ThermostatStopped> {
        self.commands
            .send(Command::SetTarget(setpoint))
            .await
            .map_err(|_| ThermostatStopped)
    }

    /// Stop the control task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let _ = self.task.await;
    }
}

/// A virtual thermostat. Constructed through [`Thermostat::spawn`] (or
/// [`crate::setup_thermostat`], which also validates and enrolls the
/// actuator group).
pub struct Thermostat;

impl Thermostat {
    /// Spawn the control task for `config` and return its handle.
    pub fn spawn(
        host: SharedHost,
        groups: Arc<GroupRegistry>,
        config: ThermostatConfig,
    ) -> ThermostatHandle {
        let entity_id = EntityId::new("climate", &slug(&config.name))
            .unwrap_or_else(|_| "climate.damper_thermostat".parse().expect("static id"));
        let (tx, rx) = mpsc::channel(8);

        let group = config
            .group
            .as_ref()
            .and_then(|membership| groups.get(&membership.name));

        let runtime = Runtime {
            host,
            config,
            entity_id: entity_id.clone(),
            group,
            mode: HvacMode::Off,
            setpoint: None,
            current_temp: None,
            current_humidity: None,
            upstream: None,
            action: HvacAction::Off,
            active: false,
            own_command: false,
            ctx: CallContext::new(),
        };
        let task = tokio::spawn(runtime.run(rx));

        ThermostatHandle {
            entity_id,
            commands: tx,
            task,
        }
    }
}

/// Mutable per-instance state, owned by the control task.
struct Runtime {
    host: SharedHost,
    config: ThermostatConfig,
    entity_id: EntityId,
    group: Option<Arc<Group>>,

    mode: HvacMode,
    setpoint: Option<Setpoint>,
    current_temp: Option<f64>,
    current_humidity: Option<f64>,
    upstream: Option<UpstreamSnapshot>,
    action: HvacAction,

    /// True once both a current and a target temperature have been
    /// observed; the engine holds off until then.
    active: bool,

    /// Set right before issuing an actuator command, cleared when the
    /// resulting change event arrives, so plugin-issued changes are
    /// not mistaken for manual ones.
    own_command: bool,

    /// Root context; every service call is issued as a child of it.
    ctx: CallContext,
}

impl Runtime {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        // Subscribe before the startup read so no change is missed in
        // between.
        let mut events = self.host.subscribe();
        let tracked: HashSet<EntityId> = self.config.tracked_entities().into_iter().collect();

        self.restore();
        self.seed();
        self.ensure_setpoint();

        if !self.host.is_started() {
            debug!(entity_id = %self.entity_id, "deferring first control pass until host start");
            self.host.wait_started().await;
            // Readings may have arrived while waiting.
            self.seed();
        }

        self.control_pass().await;
        self.publish();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(Command::SetMode(mode)) => self.handle_set_mode(mode).await,
                    Some(Command::SetTarget(setpoint)) => self.handle_set_target(setpoint).await,
                },
                event = events.recv() => match event {
                    Ok(event) => {
                        if tracked.contains(&event.entity_id) {
                            self.handle_event(event).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(entity_id = %self.entity_id, missed, "event stream lagged, resyncing from host state");
                        self.seed();
                        self.control_pass().await;
                        self.publish();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!(entity_id = %self.entity_id, "control task stopped");
    }

    /// Restore persisted target/mode when the config does not pin them.
    fn restore(&mut self) {
        let restored = self.host.restored(&self.entity_id);

        self.mode = match self.config.initial_mode {
            Some(mode) => mode,
            None => restored
                .as_ref()
                .map(|r| HvacMode::from_state(&r.state))
                .unwrap_or(HvacMode::Off),
        };

        self.setpoint = self.config.target.or_else(|| {
            let restored = restored.as_ref()?;
            restored_setpoint(restored)
        });
        if self.setpoint.is_some() && self.config.target.is_none() {
            info!(entity_id = %self.entity_id, "restored target temperature from previous run");
        }
    }

    /// Fall back to the configured bounds when no target is known at
    /// all, so the instance can become active.
    fn ensure_setpoint(&mut self) {
        if self.setpoint.is_some() {
            return;
        }
        let fallback = match self.mode {
            HvacMode::Cool => Setpoint::Single(self.config.max_temp),
            HvacMode::Auto | HvacMode::HeatCool => Setpoint::Range {
                low: self.config.min_temp,
                high: self.config.max_temp,
            },
            HvacMode::Off | HvacMode::Heat => Setpoint::Single(self.config.min_temp),
        };
        warn!(entity_id = %self.entity_id, ?fallback, "no saved target temperature, falling back to configured bound");
        self.setpoint = Some(fallback);
    }

    /// Synchronous startup read: seed every cached reading from the
    /// host before the first event arrives.
    fn seed(&mut self) {
        if let Some(mean) = sensor::aggregate(&self.host, &self.config.temperature_sensors) {
            self.current_temp = Some(mean);
        }
        if let Some(mean) = sensor::aggregate(&self.host, &self.config.humidity_sensors) {
            self.current_humidity = Some(mean);
        }
        if let Some(main) = &self.config.main_thermostat {
            self.upstream = upstream::read(&self.host, main);
        }
        self.refresh_action();
    }

    async fn handle_event(&mut self, event: StateChanged) {
        let id = &event.entity_id;

        if self.config.temperature_sensors.contains(id) {
            if let Some(mean) = sensor::aggregate(&self.host, &self.config.temperature_sensors) {
                self.current_temp = Some(mean);
            }
            self.control_pass().await;
        } else if self.config.humidity_sensors.contains(id) {
            if let Some(mean) = sensor::aggregate(&self.host, &self.config.humidity_sensors) {
                self.current_humidity = Some(mean);
            }
        } else if self.config.main_thermostat.as_ref() == Some(id) {
            self.upstream = upstream::read(&self.host, id);
            self.control_pass().await;
        } else if self.config.actuators.contains(id) {
            if self.own_command {
                self.own_command = false;
            } else {
                debug!(entity_id = %self.entity_id, actuator = %id, state = %event.new.state,
                    "external actuator change observed");
            }
            self.refresh_action();
            self.control_pass().await;
        }
        self.publish();
    }

    async fn handle_set_mode(&mut self, mode: HvacMode) {
        if mode == self.mode {
            return;
        }
        info!(entity_id = %self.entity_id, from = %self.mode, to = %mode, "mode changed");
        self.mode = mode;

        if mode == HvacMode::Off {
            // Off is honored immediately, active or not.
            if self.any_actuator_on() {
                self.turn_off_all().await;
            }
        } else {
            self.control_pass().await;
        }
        self.refresh_action();
        self.persist();
        self.publish();
    }

    async fn handle_set_target(&mut self, setpoint: Setpoint) {
        if let Setpoint::Range { low, high } = setpoint {
            if low >= high {
                warn!(entity_id = %self.entity_id, low, high, "rejecting inverted target band");
                return;
            }
        }
        self.setpoint = Some(setpoint.clamped(self.config.min_temp, self.config.max_temp));
        self.control_pass().await;
        self.persist();
        self.publish();
    }

    /// One serialized control pass: re-evaluate the engine and realize
    /// its decision through the group arbiter or a direct command.
    async fn control_pass(&mut self) {
        if !self.active {
            if let (Some(current), Some(target)) = (self.current_temp, self.setpoint) {
                self.active = true;
                info!(
                    entity_id = %self.entity_id,
                    current, ?target,
                    "current and target temperature obtained, thermostat active"
                );
            }
        }
        if !self.active {
            return;
        }

        if self.mode == HvacMode::Off {
            if self.any_actuator_on() {
                self.turn_off_all().await;
            }
            self.refresh_action();
            return;
        }

        // A configured upstream with no readable data means no basis
        // to act on: hold the actuator rather than toggle it blindly.
        if self.config.main_thermostat.is_some() && self.upstream.is_none() {
            debug!(entity_id = %self.entity_id, "main thermostat unreadable, holding");
            return;
        }

        let (Some(current), Some(setpoint)) = (self.current_temp, self.setpoint) else {
            return;
        };
        let decision = decide(&EngineInput {
            mode: self.mode,
            setpoint,
            current,
            cold_tolerance: self.config.cold_tolerance,
            hot_tolerance: self.config.hot_tolerance,
            upstream: self.upstream.as_ref(),
        });
        debug!(entity_id = %self.entity_id, ?decision, current, "control pass");

        match decision {
            Decision::TurnOn => self.turn_on_all().await,
            Decision::TurnOff => {
                if self.any_actuator_on() {
                    self.turn_off_all().await;
                }
            }
            Decision::Hold => {}
        }
        self.refresh_action();
    }

    async fn turn_on_all(&mut self) {
        for actuator in self.config.actuators.clone() {
            let already_on = self
                .host
                .get(&actuator)
                .map(|s| s.is_on())
                .unwrap_or(false);
            if already_on {
                continue;
            }
            self.own_command = true;
            let result = self
                .host
                .call_service(
                    "switch",
                    "turn_on",
                    json!({ "entity_id": actuator.as_str() }),
                    self.ctx.child(),
                )
                .await;
            if let Err(e) = result {
                warn!(entity_id = %self.entity_id, actuator = %actuator, error = %e, "turn-on command failed");
                self.own_command = false;
            }
        }
    }

    async fn turn_off_all(&mut self) {
        let group = self.group.clone();
        for actuator in self.config.actuators.clone() {
            let on = self
                .host
                .get(&actuator)
                .map(|s| s.is_on())
                .unwrap_or(false);
            if !on {
                continue;
            }
            self.own_command = true;
            let result = match &group {
                Some(group) => match group.request_off(&self.host, &actuator, &self.ctx).await {
                    Ok(OffOutcome::Refused) => {
                        // No command was issued.
                        self.own_command = false;
                        Ok(())
                    }
                    other => other.map(|_| ()),
                },
                None => {
                    self.host
                        .call_service(
                            "switch",
                            "turn_off",
                            json!({ "entity_id": actuator.as_str() }),
                            self.ctx.child(),
                        )
                        .await
                }
            };
            if let Err(e) = result {
                warn!(entity_id = %self.entity_id, actuator = %actuator, error = %e, "turn-off command failed");
                self.own_command = false;
            }
        }
    }

    fn any_actuator_on(&self) -> bool {
        self.config
            .actuators
            .iter()
            .any(|id| self.host.get(id).map(|s| s.is_on()).unwrap_or(false))
    }

    /// Displayed action: the upstream's when one is configured,
    /// otherwise derived from mode and actuator state.
    fn refresh_action(&mut self) {
        self.action = if self.mode == HvacMode::Off {
            HvacAction::Off
        } else if let Some(up) = &self.upstream {
            up.action
        } else if self.any_actuator_on() {
            match self.mode {
                HvacMode::Cool => HvacAction::Cooling,
                _ => HvacAction::Heating,
            }
        } else {
            HvacAction::Idle
        };
    }

    /// Write the exposed climate entity back to the host state table.
    fn publish(&self) {
        let mut attributes = HashMap::from([
            (ATTR_FRIENDLY_NAME.to_string(), json!(self.config.name)),
            (ATTR_HVAC_ACTION.to_string(), json!(self.action.as_str())),
            (ATTR_ICON.to_string(), json!(icon_for(self.mode))),
            ("min_temp".to_string(), json!(self.config.min_temp)),
            ("max_temp".to_string(), json!(self.config.max_temp)),
            (
                "cold_tolerance".to_string(),
                json!(self.config.cold_tolerance),
            ),
            (
                "hot_tolerance".to_string(),
                json!(self.config.hot_tolerance),
            ),
            (
                "target_temp_step".to_string(),
                json!(self.config.precision),
            ),
        ]);

        match self.setpoint {
            Some(Setpoint::Single(t)) => {
                attributes.insert(ATTR_TEMPERATURE.to_string(), json!(t));
            }
            Some(Setpoint::Range { low, high }) => {
                attributes.insert(ATTR_TARGET_TEMP_LOW.to_string(), json!(low));
                attributes.insert(ATTR_TARGET_TEMP_HIGH.to_string(), json!(high));
            }
            None => {}
        }
        if let Some(current) = self.current_temp {
            attributes.insert(ATTR_CURRENT_TEMPERATURE.to_string(), json!(current));
        }
        if let Some(humidity) = self.current_humidity {
            attributes.insert(ATTR_CURRENT_HUMIDITY.to_string(), json!(humidity));
        }
        if let Some(main) = &self.config.main_thermostat {
            attributes.insert("main_thermostat".to_string(), json!(main.as_str()));
        }

        self.host
            .set(self.entity_id.clone(), self.mode.as_str(), attributes);
    }

    /// Persist target/mode for restore after the next boot.
    fn persist(&self) {
        let mut attributes = HashMap::new();
        match self.setpoint {
            Some(Setpoint::Single(t)) => {
                attributes.insert(ATTR_TEMPERATURE.to_string(), json!(t));
            }
            Some(Setpoint::Range { low, high }) => {
                attributes.insert(ATTR_TARGET_TEMP_LOW.to_string(), json!(low));
                attributes.insert(ATTR_TARGET_TEMP_HIGH.to_string(), json!(high));
            }
            None => {}
        }
        self.host.persist(
            self.entity_id.clone(),
            RestoredState {
                state: self.mode.as_str().to_string(),
                attributes,
            },
        );
    }
}

/// Setpoint out of a restored state's attributes.
fn restored_setpoint(restored: &RestoredState) -> Option<Setpoint> {
    let number = |key: &str| -> Option<f64> { restored.attributes.get(key)?.as_f64() };
    if let Some(t) = number(ATTR_TEMPERATURE) {
        return Some(Setpoint::Single(t));
    }
    match (number(ATTR_TARGET_TEMP_LOW), number(ATTR_TARGET_TEMP_HIGH)) {
        (Some(low), Some(high)) => Some(Setpoint::Range { low, high }),
        _ => None,
    }
}

fn icon_for(mode: HvacMode) -> &'static str {
    match mode {
        HvacMode::Off => "mdi:thermostat-box",
        HvacMode::Cool => "mdi:snowflake-thermometer",
        _ => "mdi:thermostat",
    }
}

/// Derive a valid entity object id from a display name.
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    let out = out.trim_matches('_').to_string();
    if out.is_empty() {
        "damper_thermostat".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_derives_entity_object_ids() {
        assert_eq!(slug("Bedroom Damper"), "bedroom_damper");
        assert_eq!(slug("  Zone 2 / South  "), "zone_2_south");
        assert_eq!(slug("###"), "damper_thermostat");
    }

    #[test]
    fn restored_setpoint_prefers_single_target() {
        let single = RestoredState {
            state: "heat".to_string(),
            attributes: HashMap::from([(ATTR_TEMPERATURE.to_string(), json!(21.0))]),
        };
        assert_eq!(restored_setpoint(&single), Some(Setpoint::Single(21.0)));

        let band = RestoredState {
            state: "heat_cool".to_string(),
            attributes: HashMap::from([
                (ATTR_TARGET_TEMP_LOW.to_string(), json!(19.0)),
                (ATTR_TARGET_TEMP_HIGH.to_string(), json!(24.0)),
            ]),
        };
        assert_eq!(
            restored_setpoint(&band),
            Some(Setpoint::Range { low: 19.0, high: 24.0 })
        );

        let empty = RestoredState {
            state: "off".to_string(),
            attributes: HashMap::new(),
        };
        assert_eq!(restored_setpoint(&empty), None);
    }
}
