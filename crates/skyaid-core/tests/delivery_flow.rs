//! End-to-end: optimize a hospital round trip, scatter hazards on it, fly it.

use rand::rngs::StdRng;
use rand::SeedableRng;
use skyaid_core::{
    optimize, DeliveryController, DeliveryStatus, Destination, Hazard, OptimizerConfig,
    SafetyRules, SimulationConfig, SimulationEvent, StopState,
};
use std::collections::HashSet;

fn hospitals() -> (Destination, Vec<Destination>) {
    let origin = Destination::new("Depot", 0.0, 0.0);
    let stops = vec![
        Destination::new("St. Mary", 12.0, 3.0),
        Destination::new("General", 8.0, -9.0),
        Destination::new("Children's", -6.0, 11.0),
        Destination::new("Veterans", -10.0, -4.0),
        Destination::new("County", 3.0, 14.0),
    ];
    (origin, stops)
}

fn seeded() -> OptimizerConfig {
    OptimizerConfig {
        seed: Some(2024),
        ..OptimizerConfig::default()
    }
}

#[test]
fn optimized_route_is_a_valid_round_trip() {
    let (origin, stops) = hospitals();
    let route = optimize(&origin, &stops, &seeded()).unwrap();

    assert!(route.is_round_trip());
    assert_eq!(route.destinations.len(), stops.len() + 2);
    let visited: HashSet<&str> = route.stops().iter().map(|d| d.name.as_str()).collect();
    let expected: HashSet<&str> = stops.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(visited, expected);

    let measured: f64 = route
        .destinations
        .windows(2)
        .map(|pair| pair[0].distance_to(&pair[1]))
        .sum();
    assert!((measured - route.total_distance_km).abs() < 1e-9);
}

#[test]
fn delivery_through_generated_hazards_visits_every_stop() {
    let (origin, stops) = hospitals();
    let route = optimize(&origin, &stops, &seeded()).unwrap();

    let rules = SafetyRules::default();
    let mut rng = StdRng::seed_from_u64(11);
    // A destination inside a danger zone can never be reached, so skip those.
    let hazards: Vec<Hazard> = route
        .destinations
        .windows(2)
        .enumerate()
        .map(|(i, leg)| {
            let mut hazard = Hazard::on_segment(leg[0].position, leg[1].position, &mut rng);
            hazard.name = format!("{} #{}", hazard.label(), i + 1);
            hazard
        })
        .filter(|hazard| {
            let zone = rules.danger_zone(hazard);
            route
                .destinations
                .iter()
                .all(|d| !zone.contains(&d.position))
        })
        .collect();
    assert!(!hazards.is_empty());

    let zones: Vec<_> = hazards.iter().map(|h| rules.danger_zone(h)).collect();

    let mut controller = DeliveryController::new(SimulationConfig::default(), rules);
    controller.start_delivery(route.clone(), hazards).unwrap();

    let mut arrivals = Vec::new();
    let mut saw_reroute = false;
    for _ in 0..5_000 {
        let report = controller.advance_one_tick();
        let position = controller.drone().position;
        assert!(zones.iter().all(|zone| !zone.contains(&position)));
        for event in &report.events {
            match event {
                SimulationEvent::Arrived { name, .. } => arrivals.push(name.clone()),
                SimulationEvent::DetourSpliced { .. } => saw_reroute = true,
                _ => {}
            }
        }
        if controller.is_finished() {
            break;
        }
    }

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, DeliveryStatus::Complete);
    assert_eq!(snapshot.progress, 1.0);
    assert_eq!(snapshot.stops_completed, stops.len());
    assert!(snapshot.stops.iter().all(|s| s.state == StopState::Visited));
    assert!(saw_reroute);

    let planned: Vec<String> = route.stops().iter().map(|d| d.name.clone()).collect();
    assert_eq!(arrivals, planned);
    let recorded: Vec<String> = snapshot.history.iter().map(|a| a.name.clone()).collect();
    assert_eq!(recorded, planned);
    assert!(snapshot
        .history
        .windows(2)
        .all(|pair| pair[0].arrived_at <= pair[1].arrived_at));
}

#[test]
fn snapshot_serializes_for_transport() {
    let (origin, stops) = hospitals();
    let route = optimize(&origin, &stops[..2], &seeded()).unwrap();
    let mut controller = DeliveryController::default();
    controller.start_delivery(route, Vec::new()).unwrap();
    controller.advance_one_tick();

    let json = serde_json::to_value(controller.snapshot()).unwrap();
    assert_eq!(json["status"], "en_route");
    assert_eq!(json["total_stops"], 2);
    assert_eq!(json["stops"][0]["state"], "next");
    assert!(json["position"]["x"].is_number());
    assert_eq!(json["waypoints"][0]["kind"], "origin");
}
