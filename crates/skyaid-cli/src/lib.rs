//! SkyAid CLI - configuration, scenarios and the tick loop behind the `skyaid` binary.

pub mod config;
pub mod loops;
pub mod scenario;
pub mod state;

pub use config::Config;
pub use loops::delivery_loop::{run_delivery_loop, LoopOutcome};
pub use scenario::Scenario;
pub use state::AppState;
