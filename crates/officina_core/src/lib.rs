//! Persistence and consistency core for the workshop manager.
//! Every business invariant on stored records is enforced here.

pub mod backup;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use backup::{BackupError, BackupManager, RestoreReport, SnapshotInfo, SnapshotOutcome};
pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::{Entity, LeafEntity, ValidationError};
pub use service::cascade::{CascadeReport, CascadeService, OwningEntity};
pub use service::ledger::{EntryClass, LedgerDescription, LedgerService, WorkOrderBalance};
pub use service::workshop::{WorkOrderStats, Workshop};
pub use service::{CoreError, CoreResult};
pub use store::{
    Collection, EntityRef, ListOutcome, MemoryRecordStore, RecordId, RecordStore,
    SqliteRecordStore, StoreError, StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
