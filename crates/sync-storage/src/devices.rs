//! Server-side device registry.

use crate::db::{get_connection, SqlitePool, WriteHandle};
use crate::errors::Result;
use crate::models::{clock_to_json, to_rfc3339, DeviceRow};
use crate::schema::devices;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::sync::Arc;
use sync_core::{DeviceId, DeviceRecord, OrgId, VectorClock};

pub struct DeviceRegistry {
    pool: Arc<SqlitePool>,
    writer: WriteHandle,
}

impl DeviceRegistry {
    pub fn new(pool: Arc<SqlitePool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub fn get(&self, id: &DeviceId) -> Result<Option<DeviceRecord>> {
        let mut conn = get_connection(&self.pool)?;
        devices::table
            .find(id.as_str().to_string())
            .first::<DeviceRow>(&mut conn)
            .optional()?
            .map(DeviceRow::into_domain)
            .transpose()
    }

    /// True iff `device_id` is registered, active, and owned by `user_id` —
    /// the `X-Device-ID` / auth-user cross-check every push/pull enforces.
    pub fn is_owned_and_active(&self, id: &DeviceId, user_id: &sync_core::UserId) -> Result<bool> {
        Ok(self
            .get(id)?
            .is_some_and(|d| d.is_active && &d.owning_user == user_id))
    }

    pub async fn upsert(&self, record: DeviceRecord) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = DeviceRow::from_domain(&record)?;
                diesel::insert_into(devices::table)
                    .values(&row)
                    .on_conflict(devices::id)
                    .do_update()
                    .set(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    pub async fn record_sync(
        &self,
        id: DeviceId,
        seen_clock: VectorClock,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::update(devices::table.find(id.as_str().to_string()))
                    .set((
                        devices::last_seen_vector_clock.eq(clock_to_json(&seen_clock)?),
                        devices::last_sync_at.eq(Some(to_rfc3339(at))),
                    ))
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    /// Pointwise-max vector clock across every device currently owned by
    /// `org_id`, used to seed `sync-server::org_clock_cache`.
    pub fn org_clock_floor(&self, org_id: &OrgId) -> Result<VectorClock> {
        let mut conn = get_connection(&self.pool)?;
        let clocks: Vec<String> = devices::table
            .filter(devices::org_id.eq(org_id.as_str()))
            .select(devices::last_seen_vector_clock)
            .load(&mut conn)?;
        let mut merged = VectorClock::new();
        for clock_json in clocks {
            let clock = crate::models::clock_from_json(&clock_json)?;
            merged = sync_core::clock::merge(&merged, &clock);
        }
        Ok(merged)
    }
}
