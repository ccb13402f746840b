//! Per-sync-cycle audit log, appended by the server on every push/pull.

use crate::db::{SqlitePool, WriteHandle};
use crate::errors::Result;
use crate::models::NewSyncLogRow;
use crate::schema::sync_log;
use chrono::Utc;
use diesel::prelude::*;
use std::sync::Arc;
use sync_core::{DeviceId, SyncLogStatus, SyncLogType, UserId};

pub struct SyncLogWriter {
    #[allow(dead_code)]
    pool: Arc<SqlitePool>,
    writer: WriteHandle,
}

pub struct SyncLogAppend {
    pub device_id: DeviceId,
    pub user_id: UserId,
    pub log_type: SyncLogType,
    pub pushed_count: i32,
    pub pulled_count: i32,
    pub conflicts_detected: i32,
    pub conflicts_resolved: i32,
    pub duration_ms: i64,
    pub status: SyncLogStatus,
    pub error: Option<String>,
}

impl SyncLogWriter {
    pub fn new(pool: Arc<SqlitePool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub async fn append(&self, entry: SyncLogAppend) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = NewSyncLogRow {
                    device_id: entry.device_id.as_str().to_string(),
                    user_id: entry.user_id.as_str().to_string(),
                    log_type: match entry.log_type {
                        SyncLogType::Push => "push".to_string(),
                        SyncLogType::Pull => "pull".to_string(),
                    },
                    pushed_count: entry.pushed_count,
                    pulled_count: entry.pulled_count,
                    conflicts_detected: entry.conflicts_detected,
                    conflicts_resolved: entry.conflicts_resolved,
                    duration_ms: entry.duration_ms,
                    status: match entry.status {
                        SyncLogStatus::Success => "success".to_string(),
                        SyncLogStatus::PartialFailure => "partial_failure".to_string(),
                        SyncLogStatus::Failure => "failure".to_string(),
                    },
                    error: entry.error,
                    created_at: Utc::now().to_rfc3339(),
                };
                diesel::insert_into(sync_log::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }
}
