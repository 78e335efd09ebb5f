#![forbid(unsafe_code)]
//! Polymorphic metric storage.
//!
//! Two backends share one [`StorageEngine`] contract: [`MemoryStorage`] with
//! a [`SnapshotCoordinator`] for durability, and [`PostgresStorage`] for a
//! relational deployment. Callers pick one at startup based on whether a
//! database DSN is configured; nothing downstream needs to know which.

pub mod engine;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod snapshot;

pub use engine::{MetricValue, StorageEngine};
pub use error::StorageError;
pub use memory::{MemoryStorage, SnapshotDocument};
pub use postgres::PostgresStorage;
pub use snapshot::SnapshotCoordinator;
