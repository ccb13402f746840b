use std::sync::Arc;
use sync_server::{OrgClockCache, RateLimiter, StubTokenValidator, TokenValidator};
use sync_storage::{ConflictStore, DeviceRegistry, EntityStore, SyncLogWriter, TombstoneJanitor};

pub struct AppState {
    pub entity_store: EntityStore,
    pub conflict_store: ConflictStore,
    pub device_registry: DeviceRegistry,
    pub sync_log: SyncLogWriter,
    pub tombstone_janitor: Arc<TombstoneJanitor>,
    pub org_clock_cache: OrgClockCache,
    pub rate_limiter: RateLimiter,
    pub token_validator: Arc<dyn TokenValidator>,
}

impl AppState {
    pub fn new(
        entity_store: EntityStore,
        conflict_store: ConflictStore,
        device_registry: DeviceRegistry,
        sync_log: SyncLogWriter,
        tombstone_janitor: Arc<TombstoneJanitor>,
    ) -> Self {
        Self {
            entity_store,
            conflict_store,
            device_registry,
            sync_log,
            tombstone_janitor,
            org_clock_cache: OrgClockCache::new(),
            rate_limiter: RateLimiter::new(),
            token_validator: Arc::new(StubTokenValidator),
        }
    }
}
