//! Error taxonomy shared by the optimizer, the avoidance search and the simulation.

use crate::spatial::Point;
use thiserror::Error;

/// Structured failure returned by core operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Rejected before any computation (too few destinations, bad coordinates, ...).
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The avoidance search exhausted its frontier without reaching the goal.
    #[error("no hazard-free path from {start} to {goal} ({nodes_visited} nodes visited)")]
    NoPathFound {
        start: Point,
        goal: Point,
        nodes_visited: usize,
    },
}

impl CoreError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Recoverable errors are retried by the simulation instead of aborting it.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoPathFound { .. })
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
