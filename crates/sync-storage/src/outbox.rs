//! Outbox: durable priority-FIFO queue of pending local
//! mutations, with cascade pre-filtering and retry/permission-denial
//! tracking.

use crate::db::{get_connection, SqlitePool, WriteHandle};
use crate::errors::Result;
use crate::models::{entity_kind_db_value, operation_db_value, NewOutboxRow, OutboxRow};
use crate::schema::sync_outbox;
use chrono::Utc;
use diesel::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use sync_core::constants::{
    OUTBOX_MAX_RETRIES_ORDINARY, OUTBOX_MAX_RETRIES_PERMISSION_DENIED,
};
use sync_core::{EntityId, EntityKind, OutboxEntry, OutboxStatus, SyncOperation};

pub struct Outbox {
    pool: Arc<SqlitePool>,
    writer: WriteHandle,
}

/// Classifies the failure that caused `fail()` so the retry budget can be
/// chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Ordinary,
    PermissionDenied,
}

impl Outbox {
    pub fn new(pool: Arc<SqlitePool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub async fn enqueue(
        &self,
        entity_type: EntityKind,
        entity_id: EntityId,
        operation: SyncOperation,
        payload: serde_json::Value,
        priority: u8,
    ) -> Result<()> {
        let row = NewOutboxRow {
            entity_type: entity_kind_db_value(entity_type),
            entity_id: entity_id.to_string(),
            operation: operation_db_value(operation),
            payload: serde_json::to_string(&payload)?,
            priority: priority as i16,
            created_at: Utc::now().to_rfc3339(),
            attempt_count: 0,
            last_attempt_at: None,
            last_error: None,
            next_retry_at: None,
            status: "pending".to_string(),
        };
        self.writer
            .exec(move |conn| {
                diesel::insert_into(sync_outbox::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    /// Entries ordered priority asc, created_at asc, whose `next_retry_at`
    /// has elapsed (or is unset), excluding permanently-failed/denied rows,
    /// with the comment cascade pre-filter applied.
    pub fn drain(&self, limit: i64) -> Result<Vec<OutboxEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let now = Utc::now().to_rfc3339();
        let rows = sync_outbox::table
            .filter(sync_outbox::status.eq("pending"))
            .filter(
                sync_outbox::next_retry_at
                    .is_null()
                    .or(sync_outbox::next_retry_at.le(now)),
            )
            .order((sync_outbox::priority.asc(), sync_outbox::created_at.asc()))
            .limit(limit)
            .load::<OutboxRow>(&mut conn)?;

        let entries = rows
            .into_iter()
            .map(OutboxRow::into_domain)
            .collect::<Result<Vec<_>>>()?;

        apply_cascade_prefilter(entries, &|task_id| self.task_is_soft_deleted(task_id))
    }

    fn task_is_soft_deleted(&self, task_id: EntityId) -> bool {
        use crate::schema::tasks;
        let Ok(mut conn) = get_connection(&self.pool) else {
            return false;
        };
        tasks::table
            .find(task_id.to_string())
            .select(tasks::deleted_at)
            .first::<Option<String>>(&mut conn)
            .ok()
            .flatten()
            .is_some()
    }

    pub async fn ack(&self, id: i64) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(sync_outbox::table.find(id)).execute(conn)?;
                Ok(())
            })
            .await
    }

    pub async fn fail(&self, id: i64, error: String, kind: FailureKind, retry_delay: chrono::Duration) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let current = sync_outbox::table
                    .find(id)
                    .first::<OutboxRow>(conn)
                    .optional()?;
                let Some(current) = current else {
                    return Ok(());
                };
                let attempt_count = current.attempt_count + 1;
                let max_retries = match kind {
                    FailureKind::Ordinary => OUTBOX_MAX_RETRIES_ORDINARY,
                    FailureKind::PermissionDenied => OUTBOX_MAX_RETRIES_PERMISSION_DENIED,
                };
                let now = Utc::now();
                let status = if attempt_count >= max_retries {
                    match kind {
                        FailureKind::PermissionDenied => "permanently_denied",
                        FailureKind::Ordinary => "permanently_failed",
                    }
                } else {
                    "pending"
                };
                diesel::update(sync_outbox::table.find(id))
                    .set((
                        sync_outbox::attempt_count.eq(attempt_count),
                        sync_outbox::last_attempt_at.eq(Some(now.to_rfc3339())),
                        sync_outbox::last_error.eq(Some(error)),
                        sync_outbox::next_retry_at.eq(Some((now + retry_delay).to_rfc3339())),
                        sync_outbox::status.eq(status),
                    ))
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    pub fn contains_entity(&self, entity_id: EntityId) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let count: i64 = sync_outbox::table
            .filter(sync_outbox::entity_id.eq(entity_id.to_string()))
            .filter(sync_outbox::status.eq("pending"))
            .count()
            .get_result(&mut conn)?;
        Ok(count > 0)
    }

    /// Deletes every outbox entry targeting `entity_id`, regardless of
    /// status. Used when a remote tombstone cascades onto an entity whose
    /// local mutation is now moot.
    pub async fn remove_for_entity(&self, entity_id: EntityId) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(
                    sync_outbox::table.filter(sync_outbox::entity_id.eq(entity_id.to_string())),
                )
                .execute(conn)?;
                Ok(())
            })
            .await
    }
}

/// Drop comment entries whose parent task either (a) is soft-deleted
/// locally, or (b) appears as a `delete` operation within the same drained
/// batch, without retrying them.
///
/// `payload_task_id` extracts the parent task id from a comment's payload;
/// this is plumbed in separately from the `is_soft_deleted` callback so the
/// function stays testable without a database.
fn apply_cascade_prefilter(
    entries: Vec<OutboxEntry>,
    is_soft_deleted: &dyn Fn(EntityId) -> bool,
) -> Result<Vec<OutboxEntry>> {
    let deleted_task_ids: HashSet<EntityId> = entries
        .iter()
        .filter(|e| e.entity_type == EntityKind::Task && e.operation == SyncOperation::Delete)
        .map(|e| e.entity_id)
        .collect();

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.entity_type == EntityKind::Comment {
            if let Some(task_id) = comment_payload_task_id(&entry.payload) {
                if deleted_task_ids.contains(&task_id) || is_soft_deleted(task_id) {
                    continue;
                }
            }
        }
        out.push(entry);
    }
    Ok(out)
}

fn comment_payload_task_id(payload: &serde_json::Value) -> Option<EntityId> {
    payload
        .get("taskId")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .map(EntityId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(entity_type: EntityKind, operation: SyncOperation, payload: serde_json::Value) -> OutboxEntry {
        OutboxEntry {
            id: 0,
            entity_type,
            entity_id: EntityId::new(),
            operation,
            payload,
            priority: 1,
            created_at: Utc::now(),
            attempt_count: 0,
            last_attempt_at: None,
            last_error: None,
            next_retry_at: None,
            status: OutboxStatus::Pending,
        }
    }

    #[test]
    fn comment_dropped_when_parent_task_deleted_in_same_batch() {
        let task_id = EntityId::new();
        let task_delete = OutboxEntry {
            entity_id: task_id,
            ..entry(EntityKind::Task, SyncOperation::Delete, serde_json::json!({}))
        };
        let comment_update = entry(
            EntityKind::Comment,
            SyncOperation::Update,
            serde_json::json!({ "taskId": task_id.to_string() }),
        );
        let drained = apply_cascade_prefilter(vec![task_delete, comment_update], &|_| false).unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].entity_type, EntityKind::Task);
    }

    #[test]
    fn comment_dropped_when_parent_task_locally_soft_deleted() {
        let task_id = EntityId::new();
        let comment_update = entry(
            EntityKind::Comment,
            SyncOperation::Update,
            serde_json::json!({ "taskId": task_id.to_string() }),
        );
        let drained = apply_cascade_prefilter(vec![comment_update], &|id| id == task_id).unwrap();
        assert!(drained.is_empty());
    }

    #[test]
    fn unrelated_comment_survives_prefilter() {
        let comment_update = entry(
            EntityKind::Comment,
            SyncOperation::Update,
            serde_json::json!({ "taskId": EntityId::new().to_string() }),
        );
        let drained = apply_cascade_prefilter(vec![comment_update], &|_| false).unwrap();
        assert_eq!(drained.len(), 1);
    }
}
