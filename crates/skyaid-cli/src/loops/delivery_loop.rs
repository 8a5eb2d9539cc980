//! Delivery tick loop.
//!
//! Drives the controller at a fixed wall-clock interval until the delivery
//! reaches a terminal status, the tick budget runs out, or shutdown is
//! signalled. Paused ticks count against the budget.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use crate::state::AppState;
use skyaid_core::DeliveryStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    Completed { ticks: u64 },
    /// Stopped by an operator command or an unplannable input
    Stopped { ticks: u64 },
    TickLimit { ticks: u64 },
    Shutdown { ticks: u64 },
    /// The controller could not be reached, e.g. its lock was poisoned
    Faulted { ticks: u64 },
}

fn terminal_outcome(status: DeliveryStatus, ticks: u64) -> Option<LoopOutcome> {
    match status {
        DeliveryStatus::Complete => Some(LoopOutcome::Completed { ticks }),
        DeliveryStatus::Stopped => Some(LoopOutcome::Stopped { ticks }),
        _ => None,
    }
}

pub async fn run_delivery_loop(
    state: Arc<AppState>,
    tick_interval: Duration,
    max_ticks: u64,
    mut shutdown: broadcast::Receiver<()>,
) -> LoopOutcome {
    let mut ticker = interval(tick_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(ticks, "Delivery loop shutting down");
                return LoopOutcome::Shutdown { ticks };
            }
            _ = ticker.tick() => {
                if let Some(outcome) = terminal_outcome(state.status(), ticks) {
                    return outcome;
                }
                if ticks >= max_ticks {
                    tracing::warn!(ticks, "Tick limit reached before delivery completed");
                    return LoopOutcome::TickLimit { ticks };
                }

                let Some(report) = state.tick() else {
                    tracing::error!(ticks, "Delivery controller unavailable, abandoning loop");
                    return LoopOutcome::Faulted { ticks };
                };
                ticks += 1;

                if let Some(outcome) = terminal_outcome(report.status, ticks) {
                    tracing::info!(ticks, status = %report.status, "Delivery loop finished");
                    return outcome;
                }
            }
        }
    }
}
