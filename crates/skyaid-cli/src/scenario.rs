//! Scenario files and the built-in hospital demo.

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use skyaid_core::{
    Destination, Hazard, OptimizerConfig, Route, SafetyRules, SimulationConfig,
};
use std::path::Path;

/// Attempts at placing a random hazard before giving up.
const RANDOM_HAZARD_ATTEMPTS: usize = 20;

/// Stops used by the demo when no scenario file is given.
const DEMO_STOPS: usize = 6;

/// Everything needed to plan and fly one delivery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub origin: Destination,
    pub destinations: Vec<Destination>,
    #[serde(default)]
    pub hazards: Vec<Hazard>,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub rules: SafetyRules,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid scenario {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse scenario JSON")
    }

    /// Hospital network around a depot at (0, 0), coordinates in km.
    pub fn demo() -> Self {
        Self {
            origin: Destination::new("origin", 0.0, 0.0),
            destinations: demo_hospitals().into_iter().take(DEMO_STOPS).collect(),
            hazards: Vec::new(),
            optimizer: OptimizerConfig::default(),
            simulation: SimulationConfig::default(),
            rules: SafetyRules::default(),
        }
    }
}

pub fn demo_hospitals() -> Vec<Destination> {
    vec![
        Destination::new("Chris_Hani_Baragwanath_JHB", 25.0, 100.0),
        Destination::new("Addington_Durban", 30.0, 100.0),
        Destination::new("Universitas_Bloemfontein", 100.0, 0.0),
        Destination::new("Steve_Biko_Pretoria", 50.0, 75.0),
        Destination::new("Tygerberg_CapeTown", 10.0, 90.0),
        Destination::new("Charlotte_Maxeke_JHB", 80.0, 20.0),
        Destination::new("King_Edward_VIII_Durban", 40.0, 60.0),
        Destination::new("Pelonomi_Bloemfontein", 90.0, 30.0),
        Destination::new("MediClinic_Sandton", 70.0, 40.0),
        Destination::new("Netcare_Umhlanga", 45.0, 85.0),
        Destination::new("Milpark_Hospital_JHB", 55.0, 95.0),
        Destination::new("Stellenbosch_Hospital", 20.0, 50.0),
        Destination::new("Paarl_Hospital", 35.0, 65.0),
        Destination::new("Livingstone_Hospital_PE", 75.0, 25.0),
        Destination::new("Nelson_Mandela_Hospital_Mthatha", 60.0, 35.0),
        Destination::new("Polokwane_Provincial_Hospital", 85.0, 15.0),
        Destination::new("George_Hospital", 15.0, 55.0),
        Destination::new("Kimberley_Hospital", 95.0, 10.0),
    ]
}

/// Drop a random hazard on one leg of `route`, never covering a route destination.
pub fn random_hazard<R: Rng + ?Sized>(
    route: &Route,
    rules: &SafetyRules,
    rng: &mut R,
) -> Option<Hazard> {
    let legs = route.destinations.len().checked_sub(1)?;
    if legs == 0 {
        return None;
    }

    for _ in 0..RANDOM_HAZARD_ATTEMPTS {
        let leg = rng.random_range(0..legs);
        let start = route.destinations[leg].position;
        let end = route.destinations[leg + 1].position;
        let hazard = Hazard::on_segment(start, end, rng);
        let zone = rules.danger_zone(&hazard);
        if route.destinations.iter().all(|d| !zone.contains(&d.position)) {
            return Some(hazard);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use skyaid_core::{HazardKind, Point};

    #[test]
    fn minimal_scenario_gets_defaults() {
        let scenario = Scenario::from_json(
            r#"{
                "origin": {"name": "depot", "x": 0.0, "y": 0.0},
                "destinations": [{"name": "clinic", "x": 3.0, "y": 4.0}]
            }"#,
        )
        .unwrap();

        assert_eq!(scenario.destinations.len(), 1);
        assert!(scenario.hazards.is_empty());
        assert_eq!(scenario.optimizer, OptimizerConfig::default());
        assert_eq!(scenario.simulation.speed_kmh, 60.0);
    }

    #[test]
    fn partial_sections_override_defaults() {
        let scenario = Scenario::from_json(
            r#"{
                "origin": {"name": "depot", "x": 0.0, "y": 0.0},
                "destinations": [{"name": "clinic", "x": 3.0, "y": 4.0}],
                "hazards": [{"name": "cell", "x": 1.0, "y": 1.0, "width": 1.0, "height": 1.0,
                             "kind": "storm", "intensity": "high", "motion": {"dx": 0.1, "dy": 0.0}}],
                "optimizer": {"generations": 50, "seed": 9},
                "simulation": {"tick_seconds": 5.0}
            }"#,
        )
        .unwrap();

        assert_eq!(scenario.optimizer.generations, 50);
        assert_eq!(scenario.optimizer.seed, Some(9));
        assert_eq!(scenario.optimizer.population_size, 100);
        assert_eq!(scenario.simulation.tick_seconds, 5.0);
        assert_eq!(scenario.hazards[0].kind, HazardKind::Storm);
        assert!(scenario.hazards[0].is_dynamic());
    }

    #[test]
    fn missing_origin_is_rejected() {
        assert!(Scenario::from_json(r#"{"destinations": []}"#).is_err());
    }

    #[test]
    fn demo_names_are_unique() {
        let scenario = Scenario::demo();
        let mut names: Vec<&str> = scenario.destinations.iter().map(|d| d.name.as_str()).collect();
        names.push(&scenario.origin.name);
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(scenario.origin.position, Point::new(0.0, 0.0));
    }

    #[test]
    fn random_hazard_stays_off_destinations() {
        let scenario = Scenario::demo();
        let route = Route::round_trip(&scenario.origin, scenario.destinations.clone());
        let rules = SafetyRules::default();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..50 {
            let hazard = random_hazard(&route, &rules, &mut rng).unwrap();
            let zone = rules.danger_zone(&hazard);
            assert!(route.destinations.iter().all(|d| !zone.contains(&d.position)));
        }
    }
}
