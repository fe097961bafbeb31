//! # Fleet Persistence Library
//!
//! Persistence layer for the drone dispatch fleet registry.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Dispatch Service                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   FleetRepository trait                      │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                   │
//!                    ▼                   ▼
//! ┌─────────────────────────┐   ┌──────────────────────────────┐
//! │  InMemoryFleetRepository│   │     RedbFleetRepository      │
//! │        (tests)          │   │  Store: records + indices    │
//! └─────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fleet_persistence::{Fixtures, FleetRepository, RedbFleetRepository};
//!
//! let repo = RedbFleetRepository::open("./data/fleet.redb")?;
//! if !repo.is_populated() {
//!     repo.populate_db(&Fixtures::generate(42))?;
//! }
//!
//! // Fullest battery first
//! let drones = repo.get_drones("")?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod repository;
pub mod seed;
pub mod store;

// Re-export commonly used types
pub use error::{PersistenceError, Result};
pub use repository::{
    FleetRepository, InMemoryFleetRepository, RedbFleetRepository, fleet_schema, keys,
};
pub use seed::Fixtures;
pub use store::{IndexKind, IndexSpec, KeyPattern, ReadTx, Store, WriteTx};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
