//! # Dispatch Context
//!
//! Explicit dependency container handed to the CLI and the audit job.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use fleet_domain::BatteryAuditEvent;
use fleet_persistence::{FleetRepository, RedbFleetRepository};

use crate::audit::BatteryAuditor;
use crate::config::Config;
use crate::error::DispatchResult;
use crate::service::FleetService;

/// Broadcast channel capacity
const CHANNEL_CAPACITY: usize = 64;

/// Application context
#[derive(Clone)]
pub struct FleetContext {
    pub config: Config,

    /// Dispatch rule engine
    pub service: Arc<FleetService>,

    /// Battery audit broadcaster
    pub audit_tx: broadcast::Sender<BatteryAuditEvent>,
}

impl FleetContext {
    /// Open the configured store and wire the service over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store file cannot be opened.
    pub fn open(config: Config) -> DispatchResult<Self> {
        info!(path = %config.store_path.display(), "Opening fleet store");
        let repo = RedbFleetRepository::open(&config.store_path)?;
        Ok(Self::new(config, Arc::new(repo)))
    }

    pub fn new(config: Config, repo: Arc<dyn FleetRepository>) -> Self {
        let service = Arc::new(FleetService::new(repo, config.fixture_seed));
        let (audit_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            config,
            service,
            audit_tx,
        }
    }

    /// Populate the store when configured to and not done yet.
    /// Returns whether fixtures were written.
    ///
    /// # Errors
    ///
    /// Propagates population failures.
    pub fn bootstrap(&self) -> DispatchResult<bool> {
        if !self.config.populate_on_start || self.service.is_populated() {
            return Ok(false);
        }
        self.service.populate_db()?;
        info!(seed = self.config.fixture_seed, "Fixtures written");
        Ok(true)
    }

    #[must_use]
    pub fn auditor(&self) -> BatteryAuditor {
        BatteryAuditor::new(self.service.clone(), self.audit_tx.clone())
    }

    #[must_use]
    pub fn subscribe_audits(&self) -> broadcast::Receiver<BatteryAuditEvent> {
        self.audit_tx.subscribe()
    }

    /// Context over an in-memory repository for testing
    #[cfg(test)]
    pub fn mock(config: Config) -> Self {
        Self::new(
            config,
            Arc::new(fleet_persistence::InMemoryFleetRepository::new()),
        )
    }
}
