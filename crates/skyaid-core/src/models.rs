//! Core data models for delivery planning and simulation.

use crate::error::{CoreError, Result};
use crate::spatial::{Point, Rect};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A delivery target (hospital, clinic, depot...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub name: String,
    #[serde(flatten)]
    pub position: Point,
}

impl Destination {
    pub fn new(name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            name: name.into(),
            position: Point::new(x, y),
        }
    }

    pub fn distance_to(&self, other: &Destination) -> f64 {
        self.position.distance_to(&other.position)
    }
}

// ========== HAZARD MODELS ==========

/// Category of weather hazard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardKind {
    Rain,
    Storm,
    Fog,
    Wind,
    Turbulence,
}

impl HazardKind {
    pub const ALL: [HazardKind; 5] = [
        HazardKind::Rain,
        HazardKind::Storm,
        HazardKind::Fog,
        HazardKind::Wind,
        HazardKind::Turbulence,
    ];
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HazardKind::Rain => "rain",
            HazardKind::Storm => "storm",
            HazardKind::Fog => "fog",
            HazardKind::Wind => "wind",
            HazardKind::Turbulence => "turbulence",
        };
        f.write_str(name)
    }
}

/// Severity of a hazard. Higher intensity means a wider avoidance margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Medium,
    High,
}

impl Intensity {
    pub const ALL: [Intensity; 3] = [Intensity::Low, Intensity::Medium, Intensity::High];
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intensity::Low => "Low",
            Intensity::Medium => "Medium",
            Intensity::High => "High",
        };
        f.write_str(name)
    }
}

/// Displacement applied to a dynamic hazard every simulation tick (km/tick).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Motion {
    pub dx: f64,
    pub dy: f64,
}

/// A rectangular weather hazard, optionally drifting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hazard {
    pub name: String,
    #[serde(flatten)]
    pub center: Point,
    pub width: f64,
    pub height: f64,
    pub kind: HazardKind,
    pub intensity: Intensity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion: Option<Motion>,
}

impl Hazard {
    pub fn new(
        name: impl Into<String>,
        center: Point,
        width: f64,
        height: f64,
        kind: HazardKind,
        intensity: Intensity,
    ) -> Self {
        Self {
            name: name.into(),
            center,
            width,
            height,
            kind,
            intensity,
            motion: None,
        }
    }

    /// Set the per-tick drift of this hazard.
    pub fn with_motion(mut self, dx: f64, dy: f64) -> Self {
        self.motion = Some(Motion { dx, dy });
        self
    }

    /// Random hazard placed 30-70% of the way along `start -> end`, 1-2 km per side.
    pub fn on_segment<R: Rng + ?Sized>(start: Point, end: Point, rng: &mut R) -> Self {
        let ratio = rng.random_range(0.3..0.7);
        let width = rng.random_range(1.0..2.0);
        let height = rng.random_range(1.0..2.0);
        let kind = HazardKind::ALL[rng.random_range(0..HazardKind::ALL.len())];
        let intensity = Intensity::ALL[rng.random_range(0..Intensity::ALL.len())];
        let mut hazard = Self::new("", start.lerp(&end, ratio), width, height, kind, intensity);
        hazard.name = hazard.label();
        hazard
    }

    /// Raw rectangle, without any safety margin.
    pub fn footprint(&self) -> Rect {
        Rect::centered(self.center, self.width, self.height)
    }

    pub fn is_dynamic(&self) -> bool {
        self.motion
            .map(|m| m.dx.abs() > 0.0 || m.dy.abs() > 0.0)
            .unwrap_or(false)
    }

    /// Apply one tick of motion.
    pub fn advance(&mut self) {
        if let Some(motion) = self.motion {
            self.center.x += motion.dx;
            self.center.y += motion.dy;
        }
    }

    /// Human readable label, e.g. "High storm".
    pub fn label(&self) -> String {
        format!("{} {}", self.intensity, self.kind)
    }

    pub fn description(&self) -> String {
        format!(
            "A {} intensity {} zone that may affect drone flight",
            self.intensity.to_string().to_lowercase(),
            self.kind
        )
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.center.is_finite() || !self.width.is_finite() || !self.height.is_finite() {
            return Err(CoreError::invalid(format!(
                "hazard '{}' has non-finite geometry",
                self.name
            )));
        }
        if self
            .motion
            .is_some_and(|m| !m.dx.is_finite() || !m.dy.is_finite())
        {
            return Err(CoreError::invalid(format!(
                "hazard '{}' has non-finite motion",
                self.name
            )));
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Err(CoreError::invalid(format!(
                "hazard '{}' has negative extent",
                self.name
            )));
        }
        Ok(())
    }
}

// ========== ROUTE MODELS ==========

/// Round trip through a set of destinations, starting and ending at the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub destinations: Vec<Destination>,
    pub total_distance_km: f64,
}

impl Route {
    /// Build `origin -> stops... -> origin` and measure it.
    pub fn round_trip(origin: &Destination, stops: impl IntoIterator<Item = Destination>) -> Self {
        let mut destinations = vec![origin.clone()];
        destinations.extend(stops);
        destinations.push(origin.clone());
        let total_distance_km = destinations
            .windows(2)
            .map(|pair| pair[0].distance_to(&pair[1]))
            .sum();
        Self {
            destinations,
            total_distance_km,
        }
    }

    pub fn origin(&self) -> Option<&Destination> {
        self.destinations.first()
    }

    /// Destinations between the two origin visits, in visiting order.
    pub fn stops(&self) -> &[Destination] {
        if self.destinations.len() < 2 {
            return &[];
        }
        &self.destinations[1..self.destinations.len() - 1]
    }

    pub fn is_round_trip(&self) -> bool {
        match (self.destinations.first(), self.destinations.last()) {
            (Some(first), Some(last)) => self.destinations.len() >= 2 && first == last,
            _ => false,
        }
    }

    /// "Origin -> A -> B -> Origin"
    pub fn describe(&self) -> String {
        self.destinations
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

// ========== SIMULATION MODELS ==========

/// Role of a point in the drone's current flight plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaypointKind {
    Origin,
    Stop { stop_index: usize, name: String },
    /// Inserted by the avoidance search; never recorded as an arrival.
    Detour,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    #[serde(flatten)]
    pub position: Point,
    #[serde(flatten)]
    pub kind: WaypointKind,
}

impl Waypoint {
    pub fn is_detour(&self) -> bool {
        matches!(self.kind, WaypointKind::Detour)
    }
}

/// Entry of the append-only arrival history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalRecord {
    pub name: String,
    /// 1-based index of the stop in the planned route
    pub stop_index: usize,
    pub arrived_at: DateTime<Utc>,
    pub tick: u64,
    pub elapsed_s: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// No delivery started
    #[default]
    Idle,
    /// Flying toward the next waypoint
    EnRoute,
    /// Computing a detour around a hazard
    Rerouting,
    /// Holding position: no hazard-free path exists right now
    Blocked,
    /// Reached a delivery stop on this tick
    ArrivedAtStop,
    /// Back at the origin after visiting every stop
    Complete,
    /// Held by the operator
    Paused,
    /// Ended early by the operator or by an unplannable input
    Stopped,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryStatus::Idle => "idle",
            DeliveryStatus::EnRoute => "en_route",
            DeliveryStatus::Rerouting => "rerouting",
            DeliveryStatus::Blocked => "blocked",
            DeliveryStatus::ArrivedAtStop => "arrived_at_stop",
            DeliveryStatus::Complete => "complete",
            DeliveryStatus::Paused => "paused",
            DeliveryStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopState {
    Visited,
    Next,
    Pending,
}

/// A planned stop annotated with its delivery state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopProgress {
    pub stop_index: usize,
    pub name: String,
    #[serde(flatten)]
    pub position: Point,
    pub state: StopState,
}
