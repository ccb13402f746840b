//! Cache of each organization's combined vector clock, used to answer "has
//! this org seen change X" without scanning every device row on every pull.
//! Derived data: always safe to drop and recompute from
//! `sync_storage::DeviceRegistry`.

use std::collections::HashMap;
use std::sync::RwLock;
use sync_core::{OrgId, VectorClock};
use sync_storage::{DeviceRegistry, StorageError};

#[derive(Default)]
pub struct OrgClockCache {
    clocks: RwLock<HashMap<OrgId, VectorClock>>,
}

impl OrgClockCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, org_id: &OrgId) -> Option<VectorClock> {
        self.clocks.read().expect("org clock cache poisoned").get(org_id).cloned()
    }

    pub fn invalidate(&self, org_id: &OrgId) {
        self.clocks.write().expect("org clock cache poisoned").remove(org_id);
    }

    /// Recomputes and caches the floor for `org_id` from the device registry.
    pub fn refresh(
        &self,
        registry: &DeviceRegistry,
        org_id: &OrgId,
    ) -> Result<VectorClock, StorageError> {
        let floor = registry.org_clock_floor(org_id)?;
        self.clocks
            .write()
            .expect("org clock cache poisoned")
            .insert(org_id.clone(), floor.clone());
        Ok(floor)
    }

    pub fn get_or_refresh(
        &self,
        registry: &DeviceRegistry,
        org_id: &OrgId,
    ) -> Result<VectorClock, StorageError> {
        if let Some(clock) = self.get(org_id) {
            return Ok(clock);
        }
        self.refresh(registry, org_id)
    }
}
