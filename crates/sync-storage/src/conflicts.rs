//! Server-side conflict record storage.

use crate::db::{get_connection, SqlitePool, WriteHandle};
use crate::errors::Result;
use crate::models::ConflictRow;
use crate::schema::conflicts;
use diesel::prelude::*;
use std::sync::Arc;
use sync_core::{ConflictRecord, EntityId, OrgId};

pub struct ConflictStore {
    pool: Arc<SqlitePool>,
    writer: WriteHandle,
}

impl ConflictStore {
    pub fn new(pool: Arc<SqlitePool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub async fn record(&self, conflict: ConflictRecord) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = ConflictRow::from_domain(&conflict)?;
                diesel::insert_into(conflicts::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    pub fn get(&self, id: EntityId) -> Result<Option<ConflictRecord>> {
        let mut conn = get_connection(&self.pool)?;
        conflicts::table
            .find(id.to_string())
            .first::<ConflictRow>(&mut conn)
            .optional()?
            .map(ConflictRow::into_domain)
            .transpose()
    }

    pub fn list_unresolved(&self, org_id: &OrgId) -> Result<Vec<ConflictRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = conflicts::table
            .filter(conflicts::org_id.eq(org_id.as_str()))
            .filter(conflicts::resolution_strategy.is_null())
            .load::<ConflictRow>(&mut conn)?;
        rows.into_iter().map(ConflictRow::into_domain).collect()
    }

    /// Deletes the conflict record once the resolution endpoint has applied
    /// the chosen resolution to the underlying entity. The entity update
    /// itself goes through `EntityStore`, not here.
    pub async fn remove(&self, id: EntityId) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(conflicts::table.find(id.to_string())).execute(conn)?;
                Ok(())
            })
            .await
    }
}
