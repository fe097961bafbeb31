//! # Repository Module
//!
//! The fleet repository interface, its key scheme and both implementations.

pub mod keys;
pub mod memory;
pub mod redb_impl;
pub mod traits;

pub use memory::InMemoryFleetRepository;
pub use redb_impl::{RedbFleetRepository, fleet_schema};
pub use traits::FleetRepository;
