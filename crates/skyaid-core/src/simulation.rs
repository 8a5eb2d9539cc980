//! Delivery simulation controller.
//!
//! A single-drone, tick-driven state machine:
//!
//! ```text
//! idle -> en_route -> (rerouting <-> en_route | blocked)* -> arrived_at_stop -> ... -> complete
//!            \-> paused -> en_route            any active status -> stopped
//! ```
//!
//! Each call to [`DeliveryController::advance_one_tick`] runs, in order:
//! 1. advance dynamic hazards by their motion vector;
//! 2. recompute hazards in proximity of the drone and of the segment ahead;
//! 3. reroute (or hold as `blocked`) when a hazard intersects that segment;
//! 4. move the drone toward its next waypoint and record arrivals.
//!
//! Operator commands ([`DeliveryCommand`]) apply between ticks. Their events
//! are reported with the next tick. A search failure that is not
//! [recoverable](CoreError::is_recoverable) stops the delivery.
//!
//! The controller performs no I/O and never blocks. Callers that share it
//! between tasks must serialize ticks and snapshot reads themselves.

use crate::avoidance::{find_path, search_bounds, AvoidanceConfig};
use crate::error::{CoreError, Result};
use crate::models::{
    ArrivalRecord, DeliveryStatus, Hazard, Route, StopProgress, StopState, Waypoint, WaypointKind,
};
use crate::rules::SafetyRules;
use crate::spatial::{path_length, Point};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Drone ground speed (km/h)
    pub speed_kmh: f64,
    /// Simulated seconds covered by one tick
    pub tick_seconds: f64,
    pub avoidance: AvoidanceConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            speed_kmh: 60.0,
            tick_seconds: 30.0,
            avoidance: AvoidanceConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Distance flown in one tick (km).
    pub fn step_km(&self) -> f64 {
        (self.speed_kmh * self.tick_seconds / 3600.0).max(0.0)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.speed_kmh.is_finite() || self.speed_kmh <= 0.0 {
            return Err(CoreError::invalid(format!(
                "speed_kmh must be positive, got {}",
                self.speed_kmh
            )));
        }
        if !self.tick_seconds.is_finite() || self.tick_seconds <= 0.0 {
            return Err(CoreError::invalid(format!(
                "tick_seconds must be positive, got {}",
                self.tick_seconds
            )));
        }
        Ok(())
    }
}

/// Operator control, applied between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryCommand {
    /// Hold position until resumed
    Pause,
    /// Continue a paused delivery, backing out of any zone that drifted over the drone
    Resume,
    /// End the delivery where it stands
    Stop,
    /// Re-plan the leg ahead now
    Reroute,
}

impl fmt::Display for DeliveryCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryCommand::Pause => "pause",
            DeliveryCommand::Resume => "resume",
            DeliveryCommand::Stop => "stop",
            DeliveryCommand::Reroute => "reroute",
        };
        f.write_str(name)
    }
}

impl FromStr for DeliveryCommand {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(DeliveryCommand::Pause),
            "resume" => Ok(DeliveryCommand::Resume),
            "stop" => Ok(DeliveryCommand::Stop),
            "reroute" => Ok(DeliveryCommand::Reroute),
            other => Err(CoreError::invalid(format!("unknown command '{other}'"))),
        }
    }
}

/// Something that happened during a tick, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimulationEvent {
    StatusChanged {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
    HazardDetected {
        hazard: String,
    },
    DetourSpliced {
        target: String,
        avoiding: Vec<String>,
        waypoints: Vec<Point>,
    },
    Blocked {
        target: String,
        reason: String,
    },
    Arrived {
        name: String,
        stop_index: usize,
    },
    Completed {
        distance_traveled_km: f64,
    },
    Paused {
        position: Point,
    },
    /// The drone backed out of a danger zone that covered it while paused.
    Retreated {
        from: Point,
        to: Point,
    },
    Resumed {
        position: Point,
    },
    Stopped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub status: DeliveryStatus,
    pub events: Vec<SimulationEvent>,
}

/// Live state of the drone. Only the controller mutates it.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DroneState {
    pub position: Point,
    /// Position at the start of the last movement, the fallback when resuming
    pub previous_position: Point,
    /// Current flight plan, including spliced detour points
    pub waypoints: Vec<Waypoint>,
    pub next_waypoint: usize,
    /// Number of original route legs completed
    pub legs_completed: usize,
    pub distance_traveled_km: f64,
    /// Progress fraction, clamped to [0, 1] and never decreasing
    pub progress: f64,
    pub history: Vec<ArrivalRecord>,
    pub active_hazards: Vec<String>,
    pub status: DeliveryStatus,
}

/// Published view of the delivery, safe to serialize for any transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliverySnapshot {
    pub tick: u64,
    pub status: DeliveryStatus,
    pub position: Point,
    pub progress: f64,
    pub distance_traveled_km: f64,
    pub planned_distance_km: f64,
    pub stops: Vec<StopProgress>,
    pub stops_completed: usize,
    pub total_stops: usize,
    pub next_stop: Option<String>,
    pub waypoints: Vec<Waypoint>,
    pub active_hazards: Vec<String>,
    pub hazards: Vec<Hazard>,
    pub history: Vec<ArrivalRecord>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_s: f64,
    pub eta_s: Option<f64>,
}

/// The detour currently being flown and the hazard positions it was planned against.
#[derive(Debug, Clone)]
struct Detour {
    leg: usize,
    avoided: Vec<(String, Point)>,
}

impl Detour {
    fn covers(&self, hazard: &Hazard) -> bool {
        self.avoided
            .iter()
            .any(|(name, center)| *name == hazard.name && *center == hazard.center)
    }
}

pub struct DeliveryController {
    config: SimulationConfig,
    rules: SafetyRules,
    route: Option<Route>,
    hazards: Vec<Hazard>,
    drone: DroneState,
    detour: Option<Detour>,
    tick: u64,
    started_at: Option<DateTime<Utc>>,
    /// Events from operator commands, reported with the next tick
    pending_events: Vec<SimulationEvent>,
    force_replan: bool,
}

impl Default for DeliveryController {
    fn default() -> Self {
        Self::new(SimulationConfig::default(), SafetyRules::default())
    }
}

impl DeliveryController {
    pub fn new(config: SimulationConfig, rules: SafetyRules) -> Self {
        Self {
            config,
            rules,
            route: None,
            hazards: Vec::new(),
            drone: DroneState::default(),
            detour: None,
            tick: 0,
            started_at: None,
            pending_events: Vec::new(),
            force_replan: false,
        }
    }

    /// Reset the drone to the route origin and begin a new delivery run.
    pub fn start_delivery(&mut self, route: Route, hazards: Vec<Hazard>) -> Result<()> {
        self.config.validate()?;
        if !route.is_round_trip() {
            return Err(CoreError::invalid(
                "route must start and end at the same origin",
            ));
        }
        if route.stops().is_empty() {
            return Err(CoreError::invalid("route has no delivery stops"));
        }
        if route.destinations.iter().any(|d| !d.position.is_finite()) {
            return Err(CoreError::invalid("route has non-finite coordinates"));
        }
        for hazard in &hazards {
            hazard.validate()?;
        }

        let last = route.destinations.len() - 1;
        let waypoints: Vec<Waypoint> = route
            .destinations
            .iter()
            .enumerate()
            .map(|(i, destination)| Waypoint {
                position: destination.position,
                kind: if i == 0 || i == last {
                    WaypointKind::Origin
                } else {
                    WaypointKind::Stop {
                        stop_index: i,
                        name: destination.name.clone(),
                    }
                },
            })
            .collect();

        let origin = waypoints[0].position;
        tracing::info!(
            route = %route.describe(),
            distance_km = route.total_distance_km,
            hazards = hazards.len(),
            "Starting delivery"
        );

        self.drone = DroneState {
            position: origin,
            previous_position: origin,
            waypoints,
            next_waypoint: 1,
            status: DeliveryStatus::EnRoute,
            ..DroneState::default()
        };
        self.route = Some(route);
        self.hazards = hazards;
        self.detour = None;
        self.tick = 0;
        self.started_at = Some(Utc::now());
        self.pending_events.clear();
        self.force_replan = false;
        self.drone.active_hazards = self.hazards_in_proximity().0;
        Ok(())
    }

    /// Replace the hazard set between ticks.
    pub fn update_hazards(&mut self, hazards: Vec<Hazard>) -> Result<()> {
        for hazard in &hazards {
            hazard.validate()?;
        }
        self.hazards = hazards;
        Ok(())
    }

    pub fn status(&self) -> DeliveryStatus {
        self.drone.status
    }

    pub fn is_finished(&self) -> bool {
        self.drone.status == DeliveryStatus::Complete
    }

    /// Complete or stopped: no further tick changes anything.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.drone.status,
            DeliveryStatus::Complete | DeliveryStatus::Stopped
        )
    }

    pub fn drone(&self) -> &DroneState {
        &self.drone
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn hazards(&self) -> &[Hazard] {
        &self.hazards
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn apply(&mut self, command: DeliveryCommand) -> Result<()> {
        match command {
            DeliveryCommand::Pause => self.pause(),
            DeliveryCommand::Resume => self.resume(),
            DeliveryCommand::Stop => self.stop(),
            DeliveryCommand::Reroute => self.reroute(),
        }
    }

    /// Hold the drone where it is. Ticks are no-ops until [`resume`](Self::resume).
    pub fn pause(&mut self) -> Result<()> {
        if !self.is_flying() {
            return Err(self.rejected(DeliveryCommand::Pause));
        }
        let position = self.drone.position;
        tracing::info!(tick = self.tick, %position, "Delivery paused");
        self.with_pending(|this, events| {
            this.set_status(DeliveryStatus::Paused, events);
            events.push(SimulationEvent::Paused { position });
        });
        Ok(())
    }

    /// Continue a paused delivery.
    ///
    /// When a danger zone covers the drone, it first falls back to the
    /// position it held before its last move, if that one is clear. The leg
    /// ahead is re-planned on the next tick.
    pub fn resume(&mut self) -> Result<()> {
        if self.drone.status != DeliveryStatus::Paused {
            return Err(self.rejected(DeliveryCommand::Resume));
        }
        let position = self.drone.position;
        let fallback = self.drone.previous_position;
        let retreat = self.inside_danger_zone(&position) && !self.inside_danger_zone(&fallback);

        self.with_pending(|this, events| {
            if retreat {
                tracing::warn!(from = %position, to = %fallback, "Danger zone over the drone, retreating");
                this.drone.distance_traveled_km += position.distance_to(&fallback);
                this.drone.position = fallback;
                events.push(SimulationEvent::Retreated {
                    from: position,
                    to: fallback,
                });
            }
            this.set_status(DeliveryStatus::EnRoute, events);
            events.push(SimulationEvent::Resumed {
                position: this.drone.position,
            });
        });
        self.force_replan = true;
        tracing::info!(tick = self.tick, position = %self.drone.position, "Delivery resumed");
        Ok(())
    }

    /// End the delivery. The drone stays where it is.
    pub fn stop(&mut self) -> Result<()> {
        if self.drone.status == DeliveryStatus::Idle || self.is_terminal() {
            return Err(self.rejected(DeliveryCommand::Stop));
        }
        tracing::info!(tick = self.tick, position = %self.drone.position, "Delivery stopped by operator");
        self.with_pending(|this, events| this.halt("stopped by operator".to_string(), events));
        Ok(())
    }

    /// Re-plan the leg ahead against the current hazards right away.
    ///
    /// A search failure is returned after the status has settled: `blocked`
    /// for a recoverable one, `stopped` otherwise.
    pub fn reroute(&mut self) -> Result<()> {
        if !matches!(
            self.drone.status,
            DeliveryStatus::EnRoute | DeliveryStatus::Blocked | DeliveryStatus::ArrivedAtStop
        ) {
            return Err(self.rejected(DeliveryCommand::Reroute));
        }
        let avoiding = self.drone.active_hazards.clone();
        self.with_pending(|this, events| this.replan(avoiding, events))
    }

    /// Advance the simulation by one fixed time step.
    ///
    /// Idle, paused, complete and stopped controllers are left untouched,
    /// apart from reporting events queued by operator commands.
    pub fn advance_one_tick(&mut self) -> TickReport {
        let mut events = std::mem::take(&mut self.pending_events);
        if self.drone.status == DeliveryStatus::Idle
            || self.drone.status == DeliveryStatus::Paused
            || self.is_terminal()
        {
            return self.report(events);
        }

        self.tick += 1;
        if self.drone.status == DeliveryStatus::ArrivedAtStop {
            self.set_status(DeliveryStatus::EnRoute, &mut events);
        }

        for hazard in &mut self.hazards {
            hazard.advance();
        }

        let (active, intersecting) = self.hazards_in_proximity();
        for name in &active {
            if !self.drone.active_hazards.contains(name) {
                tracing::warn!(hazard = %name, position = %self.drone.position, "Hazard detected");
                events.push(SimulationEvent::HazardDetected {
                    hazard: name.clone(),
                });
            }
        }
        self.drone.active_hazards = active;

        let needs_reroute: Vec<String> = intersecting
            .iter()
            .filter(|hazard| {
                !self
                    .detour
                    .as_ref()
                    .is_some_and(|d| d.leg == self.drone.legs_completed && d.covers(hazard))
            })
            .map(|hazard| hazard.name.clone())
            .collect();

        let forced = std::mem::take(&mut self.force_replan);
        if !needs_reroute.is_empty() || forced {
            let avoiding = if needs_reroute.is_empty() {
                self.drone.active_hazards.clone()
            } else {
                needs_reroute
            };
            if self.replan(avoiding, &mut events).is_err() {
                return self.report(events);
            }
        } else if self.drone.status == DeliveryStatus::Blocked {
            tracing::info!(tick = self.tick, "Path ahead is clear again, resuming");
            self.set_status(DeliveryStatus::EnRoute, &mut events);
        }

        self.fly(&mut events);
        self.update_progress();
        self.report(events)
    }

    /// Current view of the delivery. Pure read: repeated calls without an
    /// intervening tick return equal snapshots.
    pub fn snapshot(&self) -> DeliverySnapshot {
        let visited = self.drone.history.len();
        let complete = self.is_terminal();

        let stops: Vec<StopProgress> = self
            .route
            .as_ref()
            .map(|route| {
                route
                    .stops()
                    .iter()
                    .enumerate()
                    .map(|(i, destination)| {
                        let stop_index = i + 1;
                        let state = if stop_index <= visited {
                            StopState::Visited
                        } else if stop_index == visited + 1 && !complete {
                            StopState::Next
                        } else {
                            StopState::Pending
                        };
                        StopProgress {
                            stop_index,
                            name: destination.name.clone(),
                            position: destination.position,
                            state,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let next_stop = stops
            .iter()
            .find(|stop| stop.state == StopState::Next)
            .map(|stop| stop.name.clone());

        DeliverySnapshot {
            tick: self.tick,
            status: self.drone.status,
            position: self.drone.position,
            progress: self.drone.progress,
            distance_traveled_km: self.drone.distance_traveled_km,
            planned_distance_km: self.planned_distance(),
            total_stops: stops.len(),
            stops_completed: visited,
            next_stop,
            stops,
            waypoints: self.drone.waypoints.clone(),
            active_hazards: self.drone.active_hazards.clone(),
            hazards: self.hazards.clone(),
            history: self.drone.history.clone(),
            started_at: self.started_at,
            elapsed_s: self.elapsed_s(),
            eta_s: self.eta_s(),
        }
    }

    fn is_flying(&self) -> bool {
        matches!(
            self.drone.status,
            DeliveryStatus::EnRoute
                | DeliveryStatus::Rerouting
                | DeliveryStatus::Blocked
                | DeliveryStatus::ArrivedAtStop
        )
    }

    fn rejected(&self, command: DeliveryCommand) -> CoreError {
        CoreError::invalid(format!(
            "cannot {command} a delivery that is {}",
            self.drone.status
        ))
    }

    /// Run `f` with the queued operator events as its event sink.
    fn with_pending<T>(
        &mut self,
        f: impl FnOnce(&mut Self, &mut Vec<SimulationEvent>) -> T,
    ) -> T {
        let mut events = std::mem::take(&mut self.pending_events);
        let out = f(self, &mut events);
        self.pending_events = events;
        out
    }

    fn inside_danger_zone(&self, point: &Point) -> bool {
        self.hazards
            .iter()
            .any(|hazard| self.rules.danger_zone(hazard).contains(point))
    }

    fn halt(&mut self, reason: String, events: &mut Vec<SimulationEvent>) {
        self.force_replan = false;
        self.set_status(DeliveryStatus::Stopped, events);
        events.push(SimulationEvent::Stopped { reason });
    }

    fn report(&self, events: Vec<SimulationEvent>) -> TickReport {
        TickReport {
            tick: self.tick,
            status: self.drone.status,
            events,
        }
    }

    fn set_status(&mut self, to: DeliveryStatus, events: &mut Vec<SimulationEvent>) {
        let from = self.drone.status;
        if from == to {
            return;
        }
        tracing::debug!(tick = self.tick, %from, %to, "Delivery status changed");
        self.drone.status = to;
        events.push(SimulationEvent::StatusChanged { from, to });
    }

    /// Names of hazards near the drone, plus the hazards whose danger zone
    /// touches the drone or the segment to its next waypoint.
    fn hazards_in_proximity(&self) -> (Vec<String>, Vec<Hazard>) {
        let position = self.drone.position;
        let next = self
            .drone
            .waypoints
            .get(self.drone.next_waypoint)
            .map(|w| w.position)
            .unwrap_or(position);

        let mut active = Vec::new();
        let mut intersecting = Vec::new();
        for hazard in &self.hazards {
            let zone = self.rules.danger_zone(hazard);
            let crosses = zone.intersects_segment(&position, &next);
            if crosses || zone.distance_to_point(&position) <= self.rules.detection_range_km {
                active.push(hazard.name.clone());
            }
            if crosses {
                intersecting.push(hazard.clone());
            }
        }
        (active, intersecting)
    }

    /// Index of the next waypoint that belongs to the original route.
    fn next_route_waypoint(&self) -> Option<usize> {
        (self.drone.next_waypoint..self.drone.waypoints.len())
            .find(|&i| !self.drone.waypoints[i].is_detour())
    }

    /// Re-plan the leg ahead and settle the status.
    ///
    /// `NoPathFound` leaves the drone `blocked` to retry on later ticks. Any
    /// other failure means the inputs can no longer be planned against, so the
    /// delivery stops.
    fn replan(&mut self, avoiding: Vec<String>, events: &mut Vec<SimulationEvent>) -> Result<()> {
        self.set_status(DeliveryStatus::Rerouting, events);
        match self.plan_detour(avoiding, events) {
            Ok(()) => {
                self.set_status(DeliveryStatus::EnRoute, events);
                Ok(())
            }
            Err((target, err)) if err.is_recoverable() => {
                tracing::warn!(
                    tick = self.tick,
                    target = %target,
                    error = %err,
                    "Reroute failed, holding position"
                );
                events.push(SimulationEvent::Blocked {
                    target,
                    reason: err.to_string(),
                });
                self.set_status(DeliveryStatus::Blocked, events);
                Err(err)
            }
            Err((target, err)) => {
                tracing::error!(
                    tick = self.tick,
                    target = %target,
                    error = %err,
                    "Reroute failed and cannot be retried, stopping delivery"
                );
                self.halt(err.to_string(), events);
                Err(err)
            }
        }
    }

    /// Plan a detour to the next route waypoint and splice it in. A failure
    /// carries the label of the waypoint that could not be reached.
    fn plan_detour(
        &mut self,
        avoiding: Vec<String>,
        events: &mut Vec<SimulationEvent>,
    ) -> std::result::Result<(), (String, CoreError)> {
        let Some(target_idx) = self.next_route_waypoint() else {
            return Ok(());
        };
        let target = self.drone.waypoints[target_idx].clone();
        let target_name = waypoint_label(&target);
        let start = self.drone.position;

        let bounds = search_bounds(
            &[start, target.position],
            &self.hazards,
            &self.rules,
            self.config.avoidance.bounds_padding_km,
        );
        let path = find_path(
            start,
            target.position,
            &self.hazards,
            &bounds,
            &self.rules,
            &self.config.avoidance,
        )
        .map_err(|err| (target_name.clone(), err))?;

        let detour_points: Vec<Point> = if path.len() > 2 {
            path[1..path.len() - 1].to_vec()
        } else {
            Vec::new()
        };
        let splice_at = self.drone.next_waypoint;
        self.drone.waypoints.splice(
            splice_at..target_idx,
            detour_points.iter().map(|&position| Waypoint {
                position,
                kind: WaypointKind::Detour,
            }),
        );
        self.detour = Some(Detour {
            leg: self.drone.legs_completed,
            avoided: self
                .hazards
                .iter()
                .map(|h| (h.name.clone(), h.center))
                .collect(),
        });

        tracing::info!(
            tick = self.tick,
            target = %target_name,
            hazards = ?avoiding,
            detour_points = detour_points.len(),
            detour_km = path_length(&path),
            "Detour spliced"
        );
        events.push(SimulationEvent::DetourSpliced {
            target: target_name,
            avoiding,
            waypoints: detour_points,
        });
        Ok(())
    }

    /// Move toward the next waypoint. Reaching a waypoint ends the movement for this tick.
    fn fly(&mut self, events: &mut Vec<SimulationEvent>) {
        let Some(target) = self.drone.waypoints.get(self.drone.next_waypoint).cloned() else {
            return;
        };

        self.drone.previous_position = self.drone.position;
        let (position, moved) = self
            .drone
            .position
            .step_toward(&target.position, self.config.step_km());
        self.drone.position = position;
        self.drone.distance_traveled_km += moved;

        if position != target.position {
            return;
        }

        self.drone.next_waypoint += 1;
        match target.kind {
            WaypointKind::Detour => {}
            WaypointKind::Stop { stop_index, name } => {
                self.drone.legs_completed += 1;
                self.detour = None;

                let elapsed_s = self.elapsed_s();
                let arrived_at = self
                    .started_at
                    .map(|t| t + Duration::milliseconds((elapsed_s * 1000.0) as i64))
                    .unwrap_or_else(Utc::now);
                tracing::info!(tick = self.tick, stop = %name, stop_index, "Arrived at stop");
                self.drone.history.push(ArrivalRecord {
                    name: name.clone(),
                    stop_index,
                    arrived_at,
                    tick: self.tick,
                    elapsed_s,
                });
                events.push(SimulationEvent::Arrived { name, stop_index });
                self.set_status(DeliveryStatus::ArrivedAtStop, events);
            }
            WaypointKind::Origin => {
                self.drone.legs_completed += 1;
                self.detour = None;
                tracing::info!(
                    tick = self.tick,
                    distance_km = self.drone.distance_traveled_km,
                    "Delivery complete"
                );
                events.push(SimulationEvent::Completed {
                    distance_traveled_km: self.drone.distance_traveled_km,
                });
                self.set_status(DeliveryStatus::Complete, events);
            }
        }
    }

    /// Progress uses the original route length as a fixed denominator.
    fn update_progress(&mut self) {
        if self.is_finished() {
            self.drone.progress = 1.0;
            return;
        }
        let planned = self.planned_distance();
        let raw = if planned > 0.0 {
            self.drone.distance_traveled_km / planned
        } else {
            0.0
        };
        self.drone.progress = self.drone.progress.max(raw.clamp(0.0, 1.0));
    }

    fn planned_distance(&self) -> f64 {
        self.route
            .as_ref()
            .map(|r| r.total_distance_km)
            .unwrap_or(0.0)
    }

    fn elapsed_s(&self) -> f64 {
        self.tick as f64 * self.config.tick_seconds
    }

    fn eta_s(&self) -> Option<f64> {
        if self.drone.status == DeliveryStatus::Idle
            || self.is_terminal()
            || self.config.speed_kmh <= 0.0
        {
            return None;
        }
        let remaining_plan: Vec<Point> = std::iter::once(self.drone.position)
            .chain(
                self.drone.waypoints[self.drone.next_waypoint.min(self.drone.waypoints.len())..]
                    .iter()
                    .map(|w| w.position),
            )
            .collect();
        Some(path_length(&remaining_plan) / self.config.speed_kmh * 3600.0)
    }
}

fn waypoint_label(waypoint: &Waypoint) -> String {
    match &waypoint.kind {
        WaypointKind::Stop { name, .. } => name.clone(),
        WaypointKind::Origin => "origin".to_string(),
        WaypointKind::Detour => "detour".to_string(),
    }
}
