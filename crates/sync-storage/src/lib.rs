//! Diesel/SQLite persistence for the replication core.
//!
//! Device and server binaries share this crate against their own SQLite
//! files: `EntityStore`, `Outbox`, and `DeviceState` are used device-side;
//! `EntityStore`, `ConflictStore`, `DeviceRegistry`, and `SyncLogWriter` are
//! used server-side; `TombstoneJanitor` runs on both.

pub mod conflicts;
pub mod db;
pub mod device_state;
pub mod devices;
pub mod entity_store;
pub mod errors;
pub mod models;
pub mod outbox;
pub mod schema;
pub mod sync_log;
pub mod tombstones;

pub use conflicts::ConflictStore;
pub use db::{build_pool, run_migrations, PooledSqlite, SqlitePool, WriteHandle};
pub use device_state::DeviceState;
pub use devices::DeviceRegistry;
pub use entity_store::EntityStore;
pub use errors::{Result, StorageError};
pub use outbox::{FailureKind, Outbox};
pub use sync_log::{SyncLogAppend, SyncLogWriter};
pub use tombstones::TombstoneJanitor;
