//! Tombstone cleanup: idempotent periodic GC of expired rows.

use crate::db::{SqlitePool, WriteHandle};
use crate::errors::Result;
use crate::schema::tombstones;
use chrono::Utc;
use diesel::prelude::*;
use std::sync::Arc;

pub struct TombstoneJanitor {
    #[allow(dead_code)]
    pool: Arc<SqlitePool>,
    writer: WriteHandle,
}

impl TombstoneJanitor {
    pub fn new(pool: Arc<SqlitePool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Deletes tombstones with `expires_at < now`. Safe to call on any
    /// cadence; returns the number of rows removed.
    pub async fn sweep(&self) -> Result<usize> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                let deleted = diesel::delete(tombstones::table.filter(tombstones::expires_at.lt(now)))
                    .execute(conn)?;
                Ok(deleted)
            })
            .await
    }
}
