//! Hazard-avoidance search.
//!
//! A* over an 8-connected grid laid on the search bounds, built per call from
//! the current hazard set. Start and goal are explicit nodes linked into the
//! grid, so the returned path begins and ends exactly at the requested points.
//! Nodes inside a danger zone are infeasible and so are edges whose segment
//! touches one. The raw grid path is then shortened by line-of-sight smoothing.

use crate::error::{CoreError, Result};
use crate::models::Hazard;
use crate::rules::SafetyRules;
use crate::spatial::{Point, Rect};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Extra clearance added to every zone while planning, so a planned segment
/// is never re-detected as touching the zone it was routed around.
const PLANNING_CLEARANCE_KM: f64 = 1e-6;
const MIN_RESOLUTION_KM: f64 = 0.01;
const RESOLUTION_GROWTH: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidanceConfig {
    /// Spacing between grid nodes (km)
    pub grid_resolution_km: f64,
    /// Padding added around start, goal and hazards when deriving bounds (km)
    pub bounds_padding_km: f64,
    /// How many cells around start/goal are linked directly to them
    pub link_radius_cells: usize,
    /// Upper bound on grid size; the resolution is coarsened to fit
    pub max_grid_nodes: usize,
    pub smooth_path: bool,
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            grid_resolution_km: 0.25,
            bounds_padding_km: 3.0,
            link_radius_cells: 2,
            max_grid_nodes: 250_000,
            smooth_path: true,
        }
    }
}

/// Bounding box around `points` and every hazard's danger zone, plus padding.
pub fn search_bounds(
    points: &[Point],
    hazards: &[Hazard],
    rules: &SafetyRules,
    padding_km: f64,
) -> Rect {
    let mut iter = points.iter();
    let first = iter.next().copied().unwrap_or_default();
    let mut bounds = Rect::from_corners(first, first);
    for point in iter {
        bounds = bounds.include_point(point);
    }
    for hazard in hazards {
        bounds = bounds.union(&rules.danger_zone(hazard));
    }
    bounds.expand(padding_km)
}

/// Find a hazard-free waypoint path from `start` to `goal`.
///
/// Returns `[start, ..., goal]`; every waypoint lies outside every danger zone
/// and every segment between consecutive waypoints avoids them. Fails with
/// [`CoreError::NoPathFound`] when no such path exists inside `bounds`.
pub fn find_path(
    start: Point,
    goal: Point,
    hazards: &[Hazard],
    bounds: &Rect,
    rules: &SafetyRules,
    config: &AvoidanceConfig,
) -> Result<Vec<Point>> {
    if !start.is_finite() || !goal.is_finite() {
        return Err(CoreError::invalid("search endpoints must be finite"));
    }
    if !bounds.min.is_finite() || !bounds.max.is_finite() {
        return Err(CoreError::invalid("search bounds must be finite"));
    }
    if bounds.min.x > bounds.max.x || bounds.min.y > bounds.max.y {
        return Err(CoreError::invalid("search bounds are inverted"));
    }
    for hazard in hazards {
        hazard.validate()?;
    }

    let zones = Zones::new(hazards, rules);
    if zones.blocks_point(&start) || zones.blocks_point(&goal) {
        tracing::debug!(%start, %goal, "Search endpoint inside a danger zone");
        return Err(CoreError::NoPathFound {
            start,
            goal,
            nodes_visited: 0,
        });
    }

    let grid = Grid::new(bounds, config, &zones);
    let search = Search {
        start,
        goal,
        grid: &grid,
        zones: &zones,
        link_radius: config.link_radius_cells.max(1) as i64,
    };

    let (raw_path, nodes_visited) = search.run();
    let raw_path = match raw_path {
        Some(path) => path,
        None => {
            tracing::debug!(%start, %goal, nodes_visited, "Avoidance frontier exhausted");
            return Err(CoreError::NoPathFound {
                start,
                goal,
                nodes_visited,
            });
        }
    };

    let path = if config.smooth_path {
        smooth_path(&raw_path, &zones)
    } else {
        raw_path
    };

    tracing::debug!(
        %start,
        %goal,
        nodes_visited,
        waypoints = path.len(),
        "Avoidance path found"
    );
    Ok(path)
}

struct Zones {
    rects: Vec<Rect>,
}

impl Zones {
    fn new(hazards: &[Hazard], rules: &SafetyRules) -> Self {
        Self {
            rects: hazards
                .iter()
                .map(|h| rules.danger_zone(h).expand(PLANNING_CLEARANCE_KM))
                .collect(),
        }
    }

    fn blocks_point(&self, point: &Point) -> bool {
        self.rects.iter().any(|zone| zone.contains(point))
    }

    fn blocks_segment(&self, a: &Point, b: &Point) -> bool {
        self.rects.iter().any(|zone| zone.intersects_segment(a, b))
    }
}

struct Grid {
    origin: Point,
    resolution: f64,
    cols: i64,
    rows: i64,
    blocked: Vec<bool>,
}

impl Grid {
    fn new(bounds: &Rect, config: &AvoidanceConfig, zones: &Zones) -> Self {
        let resolution = resolve_resolution(bounds, config);
        let cols = (bounds.width() / resolution).floor() as i64 + 1;
        let rows = (bounds.height() / resolution).floor() as i64 + 1;

        let mut grid = Self {
            origin: bounds.min,
            resolution,
            cols,
            rows,
            blocked: Vec::new(),
        };
        let mut blocked = Vec::with_capacity((cols * rows) as usize);
        for row in 0..rows {
            for col in 0..cols {
                blocked.push(zones.blocks_point(&grid.point(col, row)));
            }
        }
        grid.blocked = blocked;
        grid
    }

    fn point(&self, col: i64, row: i64) -> Point {
        Point::new(
            self.origin.x + col as f64 * self.resolution,
            self.origin.y + row as f64 * self.resolution,
        )
    }

    fn contains(&self, col: i64, row: i64) -> bool {
        col >= 0 && row >= 0 && col < self.cols && row < self.rows
    }

    fn is_free(&self, col: i64, row: i64) -> bool {
        self.contains(col, row) && !self.blocked[(row * self.cols + col) as usize]
    }

    /// Lower-left grid cell of the square containing `point`.
    fn cell_of(&self, point: &Point) -> (i64, i64) {
        (
            ((point.x - self.origin.x) / self.resolution).floor() as i64,
            ((point.y - self.origin.y) / self.resolution).floor() as i64,
        )
    }
}

/// Coarsen the configured resolution until the grid fits `max_grid_nodes`.
fn resolve_resolution(bounds: &Rect, config: &AvoidanceConfig) -> f64 {
    let max_nodes = config.max_grid_nodes.max(4) as f64;
    let mut resolution = config.grid_resolution_km.max(MIN_RESOLUTION_KM);
    loop {
        let cols = (bounds.width() / resolution).floor() + 1.0;
        let rows = (bounds.height() / resolution).floor() + 1.0;
        if cols * rows <= max_nodes {
            return resolution;
        }
        resolution *= RESOLUTION_GROWTH;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NodeKey {
    Start,
    Goal,
    Cell(i64, i64),
}

#[derive(Debug, Clone, Copy)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Frontier entry. Ordered by f, then h, then insertion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    f_score: FloatOrd,
    h_score: FloatOrd,
    seq: u64,
    g_score: FloatOrd,
    key: NodeKey,
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_score
            .cmp(&other.f_score)
            .then_with(|| self.h_score.cmp(&other.h_score))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

struct Search<'a> {
    start: Point,
    goal: Point,
    grid: &'a Grid,
    zones: &'a Zones,
    link_radius: i64,
}

impl Search<'_> {
    fn position(&self, key: NodeKey) -> Point {
        match key {
            NodeKey::Start => self.start,
            NodeKey::Goal => self.goal,
            NodeKey::Cell(col, row) => self.grid.point(col, row),
        }
    }

    /// Grid cells in the link window around `point`.
    fn link_cells(&self, point: &Point) -> Vec<(i64, i64)> {
        let (base_col, base_row) = self.grid.cell_of(point);
        let r = self.link_radius;
        let mut cells = Vec::new();
        for row in (base_row + 1 - r)..=(base_row + r) {
            for col in (base_col + 1 - r)..=(base_col + r) {
                if self.grid.is_free(col, row) {
                    cells.push((col, row));
                }
            }
        }
        cells
    }

    fn is_goal_link(&self, col: i64, row: i64) -> bool {
        let (goal_col, goal_row) = self.grid.cell_of(&self.goal);
        let r = self.link_radius;
        col > goal_col - r && col <= goal_col + r && row > goal_row - r && row <= goal_row + r
    }

    fn neighbors(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        match key {
            NodeKey::Goal => {}
            NodeKey::Start => {
                out.push(NodeKey::Goal);
                out.extend(
                    self.link_cells(&self.start)
                        .into_iter()
                        .map(|(col, row)| NodeKey::Cell(col, row)),
                );
            }
            NodeKey::Cell(col, row) => {
                for d_row in -1..=1 {
                    for d_col in -1..=1 {
                        if d_row == 0 && d_col == 0 {
                            continue;
                        }
                        if self.grid.is_free(col + d_col, row + d_row) {
                            out.push(NodeKey::Cell(col + d_col, row + d_row));
                        }
                    }
                }
                if self.is_goal_link(col, row) {
                    out.push(NodeKey::Goal);
                }
            }
        }
        out
    }

    /// Raw grid path (`None` once the frontier is exhausted) and the number
    /// of expanded nodes.
    fn run(&self) -> (Option<Vec<Point>>, usize) {
        let mut open_set: BinaryHeap<Reverse<OpenNode>> = BinaryHeap::new();
        let mut closed_set: HashSet<NodeKey> = HashSet::new();
        let mut g_score: HashMap<NodeKey, f64> = HashMap::new();
        let mut came_from: HashMap<NodeKey, NodeKey> = HashMap::new();
        let mut seq = 0u64;
        let mut nodes_visited = 0usize;

        let start_h = self.start.distance_to(&self.goal);
        g_score.insert(NodeKey::Start, 0.0);
        open_set.push(Reverse(OpenNode {
            f_score: FloatOrd(start_h),
            h_score: FloatOrd(start_h),
            seq,
            g_score: FloatOrd(0.0),
            key: NodeKey::Start,
        }));

        while let Some(Reverse(current)) = open_set.pop() {
            if closed_set.contains(&current.key) {
                continue;
            }
            let best_g = g_score.get(&current.key).copied().unwrap_or(f64::INFINITY);
            if current.g_score.0 > best_g + 1e-12 {
                continue;
            }

            nodes_visited += 1;
            if current.key == NodeKey::Goal {
                return (Some(self.reconstruct(&came_from)), nodes_visited);
            }
            closed_set.insert(current.key);

            let current_point = self.position(current.key);
            for next in self.neighbors(current.key) {
                if closed_set.contains(&next) {
                    continue;
                }
                let next_point = self.position(next);
                if self.zones.blocks_segment(&current_point, &next_point) {
                    continue;
                }

                let tentative_g = best_g + current_point.distance_to(&next_point);
                if tentative_g < g_score.get(&next).copied().unwrap_or(f64::INFINITY) {
                    came_from.insert(next, current.key);
                    g_score.insert(next, tentative_g);

                    let h = next_point.distance_to(&self.goal);
                    seq += 1;
                    open_set.push(Reverse(OpenNode {
                        f_score: FloatOrd(tentative_g + h),
                        h_score: FloatOrd(h),
                        seq,
                        g_score: FloatOrd(tentative_g),
                        key: next,
                    }));
                }
            }
        }

        (None, nodes_visited)
    }

    fn reconstruct(&self, came_from: &HashMap<NodeKey, NodeKey>) -> Vec<Point> {
        let mut keys = vec![NodeKey::Goal];
        let mut current = NodeKey::Goal;
        while let Some(prev) = came_from.get(&current) {
            keys.push(*prev);
            current = *prev;
        }
        keys.reverse();
        keys.into_iter().map(|key| self.position(key)).collect()
    }
}

/// Greedy line-of-sight shortcutting: from each kept point jump to the
/// furthest later point with a clear straight segment.
fn smooth_path(path: &[Point], zones: &Zones) -> Vec<Point> {
    if path.len() <= 2 {
        return path.to_vec();
    }

    let mut smoothed = vec![path[0]];
    let mut current_idx = 0usize;

    while current_idx < path.len() - 1 {
        let mut furthest_valid = current_idx + 1;
        for target_idx in (current_idx + 2)..path.len() {
            if !zones.blocks_segment(&path[current_idx], &path[target_idx]) {
                furthest_valid = target_idx;
            }
        }
        smoothed.push(path[furthest_valid]);
        current_idx = furthest_valid;
    }

    smoothed
}
