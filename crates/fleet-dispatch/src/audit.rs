//! # Battery Audit
//!
//! Periodic snapshot of every drone's battery level. Runs beside request
//! handling and only reads the store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use fleet_domain::BatteryAuditEvent;

use crate::error::DispatchResult;
use crate::service::{DroneFilter, FleetService};

/// Battery audit job
#[derive(Debug, Clone)]
pub struct BatteryAuditor {
    service: Arc<FleetService>,
    events: broadcast::Sender<BatteryAuditEvent>,
}

impl BatteryAuditor {
    pub const fn new(
        service: Arc<FleetService>,
        events: broadcast::Sender<BatteryAuditEvent>,
    ) -> Self {
        Self { service, events }
    }

    /// Read every drone once and build the audit event.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn snapshot(&self) -> DispatchResult<BatteryAuditEvent> {
        let drones = self.service.list_drones(&DroneFilter::All)?;
        let event = BatteryAuditEvent::new(&drones);

        for level in event.low_battery() {
            warn!(
                serial_number = %level.serial_number,
                battery_capacity = level.battery_capacity,
                "Drone battery below loading threshold"
            );
        }
        info!(
            uuid = %event.uuid,
            drones = event.drones_battery_levels.len(),
            "Battery audit"
        );
        Ok(event)
    }

    /// Audit every `interval` until `shutdown` turns true or its sender is
    /// dropped. The first audit happens one interval after start.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        // completes immediately
        ticker.tick().await;
        info!(interval_secs = interval.as_secs_f64(), "Battery audit started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Battery audit stopped");
    }

    async fn tick(&self) {
        let auditor = self.clone();
        match tokio::task::spawn_blocking(move || auditor.snapshot()).await {
            Ok(Ok(event)) => {
                if self.events.send(event).is_err() {
                    debug!("No audit subscribers");
                }
            }
            Ok(Err(err)) => warn!(error = %err, "Battery audit failed"),
            Err(err) => error!(error = %err, "Battery audit task failed"),
        }
    }
}
