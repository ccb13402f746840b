//! Device-side sync runtime: HTTP client, pull/push coordinator, and
//! storage-quota cleanup.

pub mod api_client;
pub mod coordinator;
pub mod error;
pub mod quota;
pub mod scheduler;
pub mod types;

pub use api_client::SyncApiClient;
pub use coordinator::{AuthProvider, CycleOutcome, LoggingEventSink, SyncCoordinator, SyncEventSink, SyncTrigger};
pub use error::{ApiRetryClass, Result, SyncClientError};
pub use quota::{QuotaMonitor, StorageEstimator};
pub use scheduler::{Scheduler, SchedulerHandle};
