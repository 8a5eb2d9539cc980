//! In-memory state: one delivery controller plus the snapshot feed.

use skyaid_core::{
    CoreError, DeliveryCommand, DeliveryController, DeliverySnapshot, DeliveryStatus, Hazard,
    TickReport,
};
use std::sync::Mutex;
use tokio::sync::broadcast;

const SNAPSHOT_CHANNEL_CAPACITY: usize = 1024;

/// Application state. Ticks and snapshot reads are serialized by the mutex.
pub struct AppState {
    controller: Mutex<DeliveryController>,
    snapshots: broadcast::Sender<DeliverySnapshot>,
}

impl AppState {
    pub fn new(controller: DeliveryController) -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            controller: Mutex::new(controller),
            snapshots,
        }
    }

    /// Subscribe to the per-tick snapshot feed.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliverySnapshot> {
        self.snapshots.subscribe()
    }

    /// Advance the controller one tick and publish the resulting snapshot.
    pub fn tick(&self) -> Option<TickReport> {
        let (report, snapshot) = match self.controller.lock() {
            Ok(mut controller) => {
                let report = controller.advance_one_tick();
                (report, controller.snapshot())
            }
            Err(_) => {
                tracing::error!("Delivery controller lock poisoned");
                return None;
            }
        };

        for event in &report.events {
            tracing::debug!(tick = report.tick, ?event, "Simulation event");
        }
        // No subscribers is fine.
        let _ = self.snapshots.send(snapshot);
        Some(report)
    }

    pub fn snapshot(&self) -> Option<DeliverySnapshot> {
        self.controller.lock().ok().map(|c| c.snapshot())
    }

    pub fn status(&self) -> DeliveryStatus {
        self.controller
            .lock()
            .map(|c| c.status())
            .unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.status() == DeliveryStatus::Complete
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status(),
            DeliveryStatus::Complete | DeliveryStatus::Stopped
        )
    }

    /// Apply an operator command between ticks.
    pub fn command(&self, command: DeliveryCommand) -> Result<(), CoreError> {
        match self.controller.lock() {
            Ok(mut controller) => controller.apply(command),
            Err(_) => Err(CoreError::invalid("delivery controller lock poisoned")),
        }
    }

    /// Poison the controller lock by panicking while holding it.
    #[cfg(test)]
    pub(crate) fn poison_lock(&self) {
        std::thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = self.controller.lock();
                    panic!("controller lock poisoned on purpose");
                })
                .join();
        });
    }

    /// Replace the hazard set; takes effect on the next tick.
    pub fn update_hazards(&self, hazards: Vec<Hazard>) -> Result<(), CoreError> {
        match self.controller.lock() {
            Ok(mut controller) => controller.update_hazards(hazards),
            Err(_) => Err(CoreError::invalid("delivery controller lock poisoned")),
        }
    }
}
