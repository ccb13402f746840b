//! Device-local singleton state: last sync watermark and local vector clock.

use crate::db::{get_connection, SqlitePool, WriteHandle};
use crate::errors::Result;
use crate::models::{clock_from_json, clock_to_json, from_rfc3339, to_rfc3339, DeviceStateRow};
use crate::schema::device_state;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::sync::Arc;
use sync_core::{DeviceId, VectorClock};

const SINGLETON_ID: i32 = 1;

pub struct DeviceState {
    pool: Arc<SqlitePool>,
    writer: WriteHandle,
}

impl DeviceState {
    pub fn new(pool: Arc<SqlitePool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub async fn initialize(&self, device_id: DeviceId) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = DeviceStateRow {
                    id: SINGLETON_ID,
                    device_id: device_id.as_str().to_string(),
                    last_sync_time: None,
                    vector_clock: "{}".to_string(),
                };
                diesel::insert_into(device_state::table)
                    .values(&row)
                    .on_conflict(device_state::id)
                    .do_nothing()
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    pub fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        let mut conn = get_connection(&self.pool)?;
        let row = device_state::table
            .find(SINGLETON_ID)
            .first::<DeviceStateRow>(&mut conn)
            .optional()?;
        row.and_then(|r| r.last_sync_time)
            .as_deref()
            .map(from_rfc3339)
            .transpose()
    }

    pub fn local_clock(&self) -> Result<VectorClock> {
        let mut conn = get_connection(&self.pool)?;
        let row = device_state::table
            .find(SINGLETON_ID)
            .first::<DeviceStateRow>(&mut conn)
            .optional()?;
        match row {
            Some(r) => clock_from_json(&r.vector_clock),
            None => Ok(VectorClock::new()),
        }
    }

    pub async fn update_after_pull(
        &self,
        merged_clock: VectorClock,
        server_timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::update(device_state::table.find(SINGLETON_ID))
                    .set((
                        device_state::vector_clock.eq(clock_to_json(&merged_clock)?),
                        device_state::last_sync_time.eq(Some(to_rfc3339(server_timestamp))),
                    ))
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    pub async fn merge_clock(&self, other: VectorClock) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = device_state::table
                    .find(SINGLETON_ID)
                    .first::<DeviceStateRow>(conn)?;
                let current = clock_from_json(&row.vector_clock)?;
                let merged = sync_core::clock::merge(&current, &other);
                diesel::update(device_state::table.find(SINGLETON_ID))
                    .set(device_state::vector_clock.eq(clock_to_json(&merged)?))
                    .execute(conn)?;
                Ok(())
            })
            .await
    }
}
