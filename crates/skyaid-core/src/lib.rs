pub mod avoidance;
pub mod error;
pub mod models;
pub mod optimizer;
pub mod rules;
pub mod simulation;
pub mod spatial;

pub use avoidance::{find_path, search_bounds, AvoidanceConfig};
pub use error::{CoreError, Result};
pub use models::{
    ArrivalRecord, DeliveryStatus, Destination, Hazard, HazardKind, Intensity, Motion, Route,
    StopProgress, StopState, Waypoint, WaypointKind,
};
pub use optimizer::{
    optimize, optimize_with_report, MutationOperators, OptimizationReport, OptimizerConfig,
};
pub use rules::SafetyRules;
pub use simulation::{
    DeliveryCommand, DeliveryController, DeliverySnapshot, DroneState, SimulationConfig,
    SimulationEvent, TickReport,
};
pub use spatial::{path_length, Point, Rect};
