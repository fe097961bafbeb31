//! # Fleet Dispatch
//!
//! Dispatch rule engine for the drone fleet registry.
//!
//! ## Features
//!
//! - **Registration**: weight limits always derived from the drone model
//! - **Loading**: ordered preconditions, manifest replaced atomically
//! - **Seeding**: one-time fixture population guarded by a persisted marker
//! - **Battery audit**: periodic fleet snapshot broadcast to subscribers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 fleet-dispatch CLI (clap)                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      FleetContext                            │
//! │        (Config, FleetService, audit broadcast channel)       │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                   │
//!                    ▼                   ▼
//! ┌─────────────────────────┐   ┌──────────────────────────────┐
//! │     FleetService        │   │      BatteryAuditor          │
//! │   (business rules)      │   │   (tokio interval job)       │
//! └─────────────────────────┘   └──────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │             FleetRepository (redb / in-memory)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod service;

pub use audit::BatteryAuditor;
pub use config::{Config, ConfigError};
pub use context::FleetContext;
pub use error::{DispatchError, DispatchResult, Problem};
pub use service::{DroneFilter, FleetService, LoadOutcome};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
