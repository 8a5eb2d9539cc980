//! Genetic algorithm for the round-trip visiting order.
//!
//! Individuals are permutations of indices into a fixed destination table, so
//! crossover and mutation only shuffle `usize`s. Fitness is the full round-trip
//! length `origin -> perm[0] -> ... -> perm[n-1] -> origin` (lower is better).
//!
//! The best individual ever seen is tracked separately from the population,
//! so the reported distance can never regress between generations.

use crate::error::{CoreError, Result};
use crate::models::{Destination, Route};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Fraction of the population replaced when the search stagnates.
const DIVERSITY_FRACTION: f64 = 0.3;
const IMPROVEMENT_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOperators {
    /// Swap two positions.
    #[default]
    Swap,
    /// Uniformly pick swap, segment reversal or move-one.
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub population_size: usize,
    pub generations: usize,
    /// Probability that an offspring is mutated
    pub mutation_rate: f64,
    /// Number of top individuals copied unchanged into the next generation
    pub elitism_count: usize,
    pub tournament_size: usize,
    /// Probability of order crossover; otherwise the child clones its first parent
    pub crossover_rate: f64,
    /// Linearly decay the mutation rate to zero over the run
    pub mutation_decay: bool,
    pub mutation_operators: MutationOperators,
    /// Generations without improvement before diversity is injected (0 = never)
    pub stagnation_limit: usize,
    /// Fixed seed for reproducible runs; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            generations: 200,
            mutation_rate: 0.05,
            elitism_count: 10,
            tournament_size: 5,
            crossover_rate: 0.9,
            mutation_decay: false,
            mutation_operators: MutationOperators::Swap,
            stagnation_limit: 15,
            seed: None,
        }
    }
}

impl OptimizerConfig {
    fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(CoreError::invalid("population_size must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(CoreError::invalid(format!(
                "mutation_rate must be within [0, 1], got {}",
                self.mutation_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err(CoreError::invalid(format!(
                "crossover_rate must be within [0, 1], got {}",
                self.crossover_rate
            )));
        }
        Ok(())
    }
}

/// Optimized route plus the best-so-far distance after every generation.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub route: Route,
    pub best_per_generation: Vec<f64>,
    pub generations_run: usize,
}

/// Find a short round trip from `origin` through every destination.
pub fn optimize(
    origin: &Destination,
    destinations: &[Destination],
    config: &OptimizerConfig,
) -> Result<Route> {
    optimize_with_report(origin, destinations, config).map(|report| report.route)
}

pub fn optimize_with_report(
    origin: &Destination,
    destinations: &[Destination],
    config: &OptimizerConfig,
) -> Result<OptimizationReport> {
    validate_destinations(origin, destinations)?;
    config.validate()?;

    if destinations.len() == 1 {
        let route = Route::round_trip(origin, destinations.iter().cloned());
        tracing::info!(
            distance_km = route.total_distance_km,
            "Single destination, using direct round trip"
        );
        return Ok(OptimizationReport {
            route,
            best_per_generation: Vec::new(),
            generations_run: 0,
        });
    }

    let rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let table = DistanceTable::new(origin, destinations);
    let mut evolution = Evolution::new(&table, config, rng);
    let best_per_generation = evolution.run();

    let best = evolution.best;
    let route = Route::round_trip(origin, best.order.iter().map(|&i| destinations[i].clone()));
    tracing::info!(
        distance_km = route.total_distance_km,
        generations = config.generations,
        route = %route.describe(),
        "Route optimization finished"
    );

    Ok(OptimizationReport {
        route,
        best_per_generation,
        generations_run: config.generations,
    })
}

fn validate_destinations(origin: &Destination, destinations: &[Destination]) -> Result<()> {
    if destinations.is_empty() {
        return Err(CoreError::invalid(
            "at least 2 destinations (origin plus one stop) are required, got 1",
        ));
    }

    let mut names = HashSet::with_capacity(destinations.len() + 1);
    for destination in std::iter::once(origin).chain(destinations) {
        if !destination.position.is_finite() {
            return Err(CoreError::invalid(format!(
                "destination '{}' has non-finite coordinates",
                destination.name
            )));
        }
        if !names.insert(destination.name.as_str()) {
            return Err(CoreError::invalid(format!(
                "duplicate destination name '{}'",
                destination.name
            )));
        }
    }
    Ok(())
}

/// Pairwise distances for the stops plus each stop's distance to the origin.
struct DistanceTable {
    origin_legs: Vec<f64>,
    legs: Vec<Vec<f64>>,
}

impl DistanceTable {
    fn new(origin: &Destination, stops: &[Destination]) -> Self {
        Self {
            origin_legs: stops.iter().map(|s| origin.distance_to(s)).collect(),
            legs: stops
                .iter()
                .map(|a| stops.iter().map(|b| a.distance_to(b)).collect())
                .collect(),
        }
    }

    fn len(&self) -> usize {
        self.origin_legs.len()
    }

    fn tour_length(&self, order: &[usize]) -> f64 {
        let (Some(&first), Some(&last)) = (order.first(), order.last()) else {
            return 0.0;
        };
        let inner: f64 = order.windows(2).map(|w| self.legs[w[0]][w[1]]).sum();
        self.origin_legs[first] + inner + self.origin_legs[last]
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    order: Vec<usize>,
    fitness: f64,
}

impl Candidate {
    fn new(order: Vec<usize>, table: &DistanceTable) -> Self {
        let fitness = table.tour_length(&order);
        Self { order, fitness }
    }
}

struct Evolution<'a> {
    table: &'a DistanceTable,
    config: &'a OptimizerConfig,
    rng: StdRng,
    population: Vec<Candidate>,
    best: Candidate,
}

impl<'a> Evolution<'a> {
    fn new(table: &'a DistanceTable, config: &'a OptimizerConfig, mut rng: StdRng) -> Self {
        let n = table.len();
        let mut population = Vec::with_capacity(config.population_size);
        population.push(Candidate::new(greedy_order(table), table));
        population.push(Candidate::new((0..n).rev().collect(), table));
        while population.len() < config.population_size {
            let mut order: Vec<usize> = (0..n).collect();
            order.shuffle(&mut rng);
            population.push(Candidate::new(order, table));
        }
        population.truncate(config.population_size);
        sort_population(&mut population);
        let best = population[0].clone();

        Self {
            table,
            config,
            rng,
            population,
            best,
        }
    }

    /// Evolve for the configured number of generations and return the
    /// best-so-far distance after each one.
    fn run(&mut self) -> Vec<f64> {
        let generations = self.config.generations;
        let mut history = Vec::with_capacity(generations);
        let mut stagnant = 0usize;

        for generation in 0..generations {
            let mutation_rate = self.mutation_rate(generation);
            self.step(mutation_rate);

            let generation_best = self.population[0].fitness;
            if generation_best < self.best.fitness - IMPROVEMENT_EPS {
                self.best = self.population[0].clone();
                stagnant = 0;
            } else {
                stagnant += 1;
            }

            if self.config.stagnation_limit > 0 && stagnant >= self.config.stagnation_limit {
                tracing::debug!(generation, "Population stagnated, injecting diversity");
                self.inject_diversity();
                stagnant = 0;
            }

            history.push(self.best.fitness);
            tracing::debug!(
                generation = generation + 1,
                generation_best_km = generation_best,
                best_km = self.best.fitness,
                "Generation evaluated"
            );
        }

        history
    }

    fn mutation_rate(&self, generation: usize) -> f64 {
        if !self.config.mutation_decay || self.config.generations == 0 {
            return self.config.mutation_rate;
        }
        let remaining = 1.0 - generation as f64 / self.config.generations as f64;
        (self.config.mutation_rate * remaining).clamp(0.0, 1.0)
    }

    fn step(&mut self, mutation_rate: f64) {
        let size = self.config.population_size;
        let elites = self.config.elitism_count.min(size);
        let mut next: Vec<Candidate> = self.population[..elites].to_vec();

        while next.len() < size {
            let parent1 = self.select_parent();
            let parent2 = self.select_parent();

            let mut child = if self.rng.random_bool(self.config.crossover_rate) {
                order_crossover(
                    &self.population[parent1].order,
                    &self.population[parent2].order,
                    &mut self.rng,
                )
            } else {
                self.population[parent1].order.clone()
            };

            if self.rng.random_bool(mutation_rate) {
                mutate(&mut child, self.config.mutation_operators, &mut self.rng);
            }

            next.push(Candidate::new(child, self.table));
        }

        sort_population(&mut next);
        self.population = next;
    }

    /// Tournament selection. The population is kept sorted, so the lowest
    /// sampled index is the fittest contestant.
    fn select_parent(&mut self) -> usize {
        let n = self.population.len();
        let rounds = self.config.tournament_size.max(1);
        (0..rounds)
            .map(|_| self.rng.random_range(0..n))
            .min()
            .unwrap_or(0)
    }

    /// Replace the worst individuals with fresh shuffles, half of them 2-opt improved.
    fn inject_diversity(&mut self) {
        let size = self.population.len();
        let count = ((size as f64) * DIVERSITY_FRACTION) as usize;
        let start = (size - count).max(self.config.elitism_count.min(size));
        let n = self.table.len();

        for i in start..size {
            let mut order: Vec<usize> = (0..n).collect();
            order.shuffle(&mut self.rng);
            self.population[i] = Candidate::new(order, self.table);
        }

        let improved_end = (start + count / 2).min(size);
        for i in start..improved_end {
            let pick = self.rng.random_range(0..size);
            let improved = two_opt(&self.population[pick].order, self.table);
            self.population[i] = Candidate::new(improved, self.table);
        }

        sort_population(&mut self.population);
    }
}

fn sort_population(population: &mut [Candidate]) {
    population.sort_by(|a, b| a.fitness.total_cmp(&b.fitness));
}

/// Nearest-neighbour tour starting from the origin.
fn greedy_order(table: &DistanceTable) -> Vec<usize> {
    let n = table.len();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);

    let mut current: Option<usize> = None;
    for _ in 0..n {
        let next = (0..n)
            .filter(|&i| !visited[i])
            .min_by(|&a, &b| {
                let da = current.map_or(table.origin_legs[a], |c| table.legs[c][a]);
                let db = current.map_or(table.origin_legs[b], |c| table.legs[c][b]);
                da.total_cmp(&db)
            });
        let Some(next) = next else { break };
        visited[next] = true;
        order.push(next);
        current = Some(next);
    }
    order
}

/// Order crossover (OX): keep a slice of `parent1`, fill the rest in
/// `parent2` order. The child is always a valid permutation.
fn order_crossover<R: Rng + ?Sized>(parent1: &[usize], parent2: &[usize], rng: &mut R) -> Vec<usize> {
    let n = parent1.len();
    let a = rng.random_range(0..=n);
    let b = rng.random_range(0..=n);
    let (start, end) = (a.min(b), a.max(b));

    let mut child: Vec<Option<usize>> = vec![None; n];
    let mut taken = vec![false; n];
    for i in start..end {
        child[i] = Some(parent1[i]);
        taken[parent1[i]] = true;
    }

    let mut fill = parent2.iter().copied().filter(|&gene| !taken[gene]);
    for slot in child.iter_mut().filter(|slot| slot.is_none()) {
        *slot = fill.next();
    }

    child.into_iter().flatten().collect()
}

fn mutate<R: Rng + ?Sized>(order: &mut Vec<usize>, operators: MutationOperators, rng: &mut R) {
    let n = order.len();
    if n < 2 {
        return;
    }

    let i = rng.random_range(0..n);
    let mut j = rng.random_range(0..n - 1);
    if j >= i {
        j += 1;
    }

    let choice = match operators {
        MutationOperators::Swap => 0,
        MutationOperators::Mixed => rng.random_range(0..3),
    };

    match choice {
        0 => order.swap(i, j),
        1 => order[i.min(j)..=i.max(j)].reverse(),
        _ => {
            let gene = order.remove(i);
            order.insert(j.min(order.len()), gene);
        }
    }
}

/// Repeated 2-opt segment reversal until no reversal shortens the tour.
fn two_opt(order: &[usize], table: &DistanceTable) -> Vec<usize> {
    let mut best = order.to_vec();
    let mut best_len = table.tour_length(&best);
    let n = best.len();

    let mut improved = true;
    while improved {
        improved = false;
        for i in 0..n.saturating_sub(1) {
            for j in (i + 1)..n {
                best[i..=j].reverse();
                let len = table.tour_length(&best);
                if len < best_len - IMPROVEMENT_EPS {
                    best_len = len;
                    improved = true;
                } else {
                    best[i..=j].reverse();
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Destination {
        Destination::new("Origin", 0.0, 0.0)
    }

    fn hospitals() -> Vec<Destination> {
        vec![
            Destination::new("St. Mary", 10.0, 10.0),
            Destination::new("General", 0.0, 10.0),
            Destination::new("Children's", 10.0, 0.0),
            Destination::new("Riverside", 5.0, 12.0),
            Destination::new("Northgate", 2.0, 6.0),
            Destination::new("Lakeview", 8.0, 4.0),
        ]
    }

    fn seeded(seed: u64) -> OptimizerConfig {
        OptimizerConfig {
            population_size: 40,
            generations: 60,
            seed: Some(seed),
            ..OptimizerConfig::default()
        }
    }

    fn assert_valid_round_trip(route: &Route, origin: &Destination, stops: &[Destination]) {
        assert!(route.is_round_trip());
        assert_eq!(route.origin(), Some(origin));
        assert_eq!(route.stops().len(), stops.len());
        for stop in stops {
            let visits = route.stops().iter().filter(|d| d.name == stop.name).count();
            assert_eq!(visits, 1, "{} visited {} times", stop.name, visits);
        }
    }

    #[test]
    fn every_destination_visited_exactly_once() {
        let all = hospitals();
        for count in 1..=all.len() {
            let stops = &all[..count];
            let route = optimize(&origin(), stops, &seeded(count as u64)).unwrap();
            assert_valid_round_trip(&route, &origin(), stops);
        }
    }

    #[test]
    fn rejects_fewer_than_two_destinations() {
        let err = optimize(&origin(), &[], &OptimizerConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { .. }));
    }

    #[test]
    fn rejects_duplicates_and_bad_coordinates() {
        let dup = vec![Destination::new("A", 1.0, 1.0), Destination::new("A", 2.0, 2.0)];
        assert!(matches!(
            optimize(&origin(), &dup, &seeded(1)),
            Err(CoreError::InvalidInput { .. })
        ));

        let named_like_origin = vec![Destination::new("Origin", 1.0, 1.0)];
        assert!(optimize(&origin(), &named_like_origin, &seeded(1)).is_err());

        let nan = vec![Destination::new("A", f64::NAN, 1.0)];
        assert!(optimize(&origin(), &nan, &seeded(1)).is_err());
    }

    #[test]
    fn rejects_bad_config() {
        let stops = hospitals();
        let config = OptimizerConfig {
            mutation_rate: 1.5,
            ..seeded(1)
        };
        assert!(optimize(&origin(), &stops, &config).is_err());

        let config = OptimizerConfig {
            population_size: 0,
            ..seeded(1)
        };
        assert!(optimize(&origin(), &stops, &config).is_err());
    }

    #[test]
    fn single_stop_is_direct_round_trip() {
        let stops = vec![Destination::new("A", 3.0, 4.0)];
        let route = optimize(&origin(), &stops, &seeded(3)).unwrap();
        assert_eq!(route.describe(), "Origin -> A -> Origin");
        assert!((route.total_distance_km - 10.0).abs() < 1e-12);
    }

    #[test]
    fn best_distance_never_regresses() {
        let config = OptimizerConfig {
            elitism_count: 0,
            mutation_rate: 0.5,
            mutation_operators: MutationOperators::Mixed,
            ..seeded(11)
        };
        let report = optimize_with_report(&origin(), &hospitals(), &config).unwrap();

        assert_eq!(report.best_per_generation.len(), config.generations);
        for pair in report.best_per_generation.windows(2) {
            assert!(pair[1] <= pair[0], "best regressed: {} -> {}", pair[0], pair[1]);
        }
        let last = *report.best_per_generation.last().unwrap();
        assert!((report.route.total_distance_km - last).abs() < 1e-9);
    }

    #[test]
    fn decaying_mutation_keeps_routes_valid() {
        let config = OptimizerConfig {
            mutation_rate: 0.8,
            mutation_decay: true,
            mutation_operators: MutationOperators::Mixed,
            ..seeded(17)
        };
        let report = optimize_with_report(&origin(), &hospitals(), &config).unwrap();

        assert_valid_round_trip(&report.route, &origin(), &hospitals());
        assert_eq!(report.best_per_generation.len(), config.generations);
        for pair in report.best_per_generation.windows(2) {
            assert!(pair[1] <= pair[0], "best regressed: {} -> {}", pair[0], pair[1]);
        }

        let table = DistanceTable::new(&origin(), &hospitals());
        let evolution = Evolution::new(&table, &config, StdRng::seed_from_u64(1));
        assert_eq!(evolution.mutation_rate(0), 0.8);
        assert!((evolution.mutation_rate(30) - 0.4).abs() < 1e-12);
        assert!(evolution.mutation_rate(59) < evolution.mutation_rate(58));
    }

    #[test]
    fn same_seed_same_route() {
        let a = optimize(&origin(), &hospitals(), &seeded(42)).unwrap();
        let b = optimize(&origin(), &hospitals(), &seeded(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn finds_square_perimeter() {
        let stops = vec![
            Destination::new("NE", 10.0, 10.0),
            Destination::new("N", 0.0, 10.0),
            Destination::new("E", 10.0, 0.0),
        ];
        let route = optimize(&origin(), &stops, &seeded(5)).unwrap();
        assert!((route.total_distance_km - 40.0).abs() < 1e-9);
        assert_eq!(route.stops()[1].name, "NE");
    }

    #[test]
    fn order_crossover_keeps_permutation() {
        let mut rng = StdRng::seed_from_u64(9);
        let p1: Vec<usize> = (0..12).collect();
        let p2: Vec<usize> = (0..12).rev().collect();
        for _ in 0..50 {
            let mut child = order_crossover(&p1, &p2, &mut rng);
            child.sort_unstable();
            assert_eq!(child, p1);
        }
    }

    #[test]
    fn mixed_mutation_keeps_permutation() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut order: Vec<usize> = (0..9).collect();
        for _ in 0..200 {
            mutate(&mut order, MutationOperators::Mixed, &mut rng);
            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..9).collect::<Vec<_>>());
        }
    }

    #[test]
    fn two_opt_removes_crossing() {
        let stops = vec![
            Destination::new("A", 0.0, 10.0),
            Destination::new("B", 10.0, 0.0),
            Destination::new("C", 10.0, 10.0),
        ];
        let table = DistanceTable::new(&origin(), &stops);
        // Origin -> A -> B -> C -> Origin crosses itself.
        let improved = two_opt(&[0, 1, 2], &table);
        assert!((table.tour_length(&improved) - 40.0).abs() < 1e-9);
    }
}
