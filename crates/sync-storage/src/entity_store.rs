//! Entity store: get/put/soft_delete/query/delta_since over
//! tasks and comments, backed by the single-writer actor for all writes.

use crate::db::{get_connection, SqlitePool, WriteHandle};
use crate::errors::{Result, StorageError};
use crate::models::{
    clock_to_json, entity_kind_db_value, operation_db_value, to_rfc3339, CommentRow, NewOutboxRow, TaskRow,
    TombstoneRow,
};
use crate::schema::{comments, sync_outbox, tasks, tombstones};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;
use sync_core::clock::increment;
use sync_core::{outbox_priority_for, Comment, DeviceId, EntityId, EntityKind, OrgId, SyncOperation, Task, Tombstone};

pub struct EntityStore {
    pool: Arc<SqlitePool>,
    writer: WriteHandle,
}

impl EntityStore {
    pub fn new(pool: Arc<SqlitePool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub fn get_task(&self, id: EntityId, include_deleted: bool) -> Result<Option<Task>> {
        let mut conn = get_connection(&self.pool)?;
        let row = tasks::table
            .find(id.to_string())
            .first::<TaskRow>(&mut conn)
            .optional()?;
        match row {
            Some(row) if !include_deleted && row.deleted_at.is_some() => Ok(None),
            Some(row) => Ok(Some(row.into_domain()?)),
            None => Ok(None),
        }
    }

    pub fn get_comment(&self, id: EntityId, include_deleted: bool) -> Result<Option<Comment>> {
        let mut conn = get_connection(&self.pool)?;
        let row = comments::table
            .find(id.to_string())
            .first::<CommentRow>(&mut conn)
            .optional()?;
        match row {
            Some(row) if !include_deleted && row.deleted_at.is_some() => Ok(None),
            Some(row) => Ok(Some(row.into_domain()?)),
            None => Ok(None),
        }
    }

    /// Full replace. Bumps `updated_at` to now under the write transaction.
    pub async fn put_task(&self, mut task: Task) -> Result<()> {
        task.meta.updated_at = Utc::now();
        self.writer
            .exec(move |conn| {
                let row = TaskRow::from_domain(&task)?;
                diesel::insert_into(tasks::table)
                    .values(&row)
                    .on_conflict(tasks::id)
                    .do_update()
                    .set(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    pub async fn put_comment(&self, mut comment: Comment) -> Result<()> {
        comment.meta.updated_at = Utc::now();
        self.writer
            .exec(move |conn| {
                let row = CommentRow::from_domain(&comment)?;
                diesel::insert_into(comments::table)
                    .values(&row)
                    .on_conflict(comments::id)
                    .do_update()
                    .set(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    /// Stamps a brand-new local task with an initial tick from
    /// `author_device`, inserts it, and enqueues its creation for push, all
    /// in one write-actor transaction.
    pub async fn create_task(&self, mut task: Task, author_device: &DeviceId) -> Result<()> {
        let now = Utc::now();
        task.meta.vector_clock = increment(&task.meta.vector_clock, author_device);
        task.meta.version = 1;
        task.meta.last_modified_device = author_device.clone();
        task.meta.created_at = now;
        task.meta.updated_at = now;
        task.meta.deleted_at = None;
        let priority = outbox_priority_for(EntityKind::Task, SyncOperation::Create, false, false);
        let payload = serde_json::to_value(&task)?;
        let entity_id = task.id;
        self.writer
            .exec(move |conn| {
                conn.transaction(|conn| {
                    let row = TaskRow::from_domain(&task)?;
                    diesel::insert_into(tasks::table).values(&row).execute(conn)?;
                    enqueue_outbox(conn, EntityKind::Task, entity_id, SyncOperation::Create, payload, priority, now)
                })
            })
            .await
    }

    /// Advances `task`'s clock by one tick from `author_device`, writes it,
    /// and enqueues the update for push in the same write-actor
    /// transaction. `status_or_assignment_changed`/`tag_or_position_only`
    /// classify the edit for `outbox_priority_for`.
    pub async fn update_task(
        &self,
        mut task: Task,
        author_device: &DeviceId,
        status_or_assignment_changed: bool,
        tag_or_position_only: bool,
    ) -> Result<()> {
        let now = Utc::now();
        task.meta.vector_clock = increment(&task.meta.vector_clock, author_device);
        task.meta.last_modified_device = author_device.clone();
        task.meta.updated_at = now;
        let priority = outbox_priority_for(
            EntityKind::Task,
            SyncOperation::Update,
            status_or_assignment_changed,
            tag_or_position_only,
        );
        let payload = serde_json::to_value(&task)?;
        let entity_id = task.id;
        self.writer
            .exec(move |conn| {
                conn.transaction(|conn| {
                    let row = TaskRow::from_domain(&task)?;
                    diesel::insert_into(tasks::table)
                        .values(&row)
                        .on_conflict(tasks::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)?;
                    enqueue_outbox(conn, EntityKind::Task, entity_id, SyncOperation::Update, payload, priority, now)
                })
            })
            .await
    }

    /// Locally-initiated delete: advances the task's clock, soft-deletes it,
    /// writes its tombstone, and enqueues the delete for push, all in one
    /// write-actor transaction.
    pub async fn delete_task_locally(
        &self,
        id: EntityId,
        org_id: OrgId,
        deleted_by: sync_core::UserId,
        author_device: DeviceId,
        prior_clock: sync_core::VectorClock,
        ttl: chrono::Duration,
    ) -> Result<()> {
        let clock = increment(&prior_clock, &author_device);
        let priority = outbox_priority_for(EntityKind::Task, SyncOperation::Delete, false, false);
        self.writer
            .exec(move |conn| {
                conn.transaction(|conn| {
                    let now = Utc::now();
                    diesel::update(tasks::table.find(id.to_string()))
                        .set(tasks::deleted_at.eq(Some(to_rfc3339(now))))
                        .execute(conn)?;

                    let tombstone = Tombstone {
                        id: EntityId::new(),
                        entity_type: EntityKind::Task,
                        entity_id: id,
                        org_id,
                        deleted_by,
                        deleted_from_device: author_device,
                        vector_clock: clock,
                        created_at: now,
                        expires_at: now + ttl,
                    };
                    let row = TombstoneRow::from_domain(&tombstone)?;
                    diesel::insert_into(tombstones::table).values(&row).execute(conn)?;
                    enqueue_outbox(conn, EntityKind::Task, id, SyncOperation::Delete, serde_json::json!({}), priority, now)
                })
            })
            .await
    }

    /// Sets `deleted_at` on the task and inserts its tombstone in the same
    /// write-actor transaction (invariant I2: soft-delete is atomic with
    /// tombstone creation).
    pub async fn soft_delete_task(
        &self,
        id: EntityId,
        org_id: OrgId,
        deleted_by: sync_core::UserId,
        deleted_from_device: DeviceId,
        clock_at_deletion: sync_core::VectorClock,
        ttl: chrono::Duration,
    ) -> Result<()> {
        self.writer
            .exec(move |conn| {
                conn.transaction(|conn| {
                    let now = Utc::now();
                    diesel::update(tasks::table.find(id.to_string()))
                        .set(tasks::deleted_at.eq(Some(to_rfc3339(now))))
                        .execute(conn)?;

                    let tombstone = Tombstone {
                        id: EntityId::new(),
                        entity_type: sync_core::EntityKind::Task,
                        entity_id: id,
                        org_id,
                        deleted_by,
                        deleted_from_device,
                        vector_clock: clock_at_deletion,
                        created_at: now,
                        expires_at: now + ttl,
                    };
                    let row = TombstoneRow::from_domain(&tombstone)?;
                    diesel::insert_into(tombstones::table)
                        .values(&row)
                        .execute(conn)?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn soft_delete_comment(
        &self,
        id: EntityId,
        org_id: OrgId,
        deleted_by: sync_core::UserId,
        deleted_from_device: DeviceId,
        clock_at_deletion: sync_core::VectorClock,
        ttl: chrono::Duration,
    ) -> Result<()> {
        self.writer
            .exec(move |conn| {
                conn.transaction(|conn| {
                    let now = Utc::now();
                    diesel::update(comments::table.find(id.to_string()))
                        .set(comments::deleted_at.eq(Some(to_rfc3339(now))))
                        .execute(conn)?;

                    let tombstone = Tombstone {
                        id: EntityId::new(),
                        entity_type: sync_core::EntityKind::Comment,
                        entity_id: id,
                        org_id,
                        deleted_by,
                        deleted_from_device,
                        vector_clock: clock_at_deletion,
                        created_at: now,
                        expires_at: now + ttl,
                    };
                    let row = TombstoneRow::from_domain(&tombstone)?;
                    diesel::insert_into(tombstones::table)
                        .values(&row)
                        .execute(conn)?;
                    Ok(())
                })
            })
            .await
    }

    /// Comment analogue of `create_task`.
    pub async fn create_comment(&self, mut comment: Comment, author_device: &DeviceId) -> Result<()> {
        let now = Utc::now();
        comment.meta.vector_clock = increment(&comment.meta.vector_clock, author_device);
        comment.meta.version = 1;
        comment.meta.last_modified_device = author_device.clone();
        comment.meta.created_at = now;
        comment.meta.updated_at = now;
        comment.meta.deleted_at = None;
        let priority = outbox_priority_for(EntityKind::Comment, SyncOperation::Create, false, false);
        let payload = serde_json::to_value(&comment)?;
        let entity_id = comment.id;
        self.writer
            .exec(move |conn| {
                conn.transaction(|conn| {
                    let row = CommentRow::from_domain(&comment)?;
                    diesel::insert_into(comments::table).values(&row).execute(conn)?;
                    enqueue_outbox(conn, EntityKind::Comment, entity_id, SyncOperation::Create, payload, priority, now)
                })
            })
            .await
    }

    /// Comment analogue of `update_task`.
    pub async fn update_comment(&self, mut comment: Comment, author_device: &DeviceId) -> Result<()> {
        let now = Utc::now();
        comment.meta.vector_clock = increment(&comment.meta.vector_clock, author_device);
        comment.meta.last_modified_device = author_device.clone();
        comment.meta.updated_at = now;
        comment.meta.is_edited = true;
        let priority = outbox_priority_for(EntityKind::Comment, SyncOperation::Update, false, false);
        let payload = serde_json::to_value(&comment)?;
        let entity_id = comment.id;
        self.writer
            .exec(move |conn| {
                conn.transaction(|conn| {
                    let row = CommentRow::from_domain(&comment)?;
                    diesel::insert_into(comments::table)
                        .values(&row)
                        .on_conflict(comments::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)?;
                    enqueue_outbox(conn, EntityKind::Comment, entity_id, SyncOperation::Update, payload, priority, now)
                })
            })
            .await
    }

    /// Comment analogue of `delete_task_locally`.
    pub async fn delete_comment_locally(
        &self,
        id: EntityId,
        org_id: OrgId,
        deleted_by: sync_core::UserId,
        author_device: DeviceId,
        prior_clock: sync_core::VectorClock,
        ttl: chrono::Duration,
    ) -> Result<()> {
        let clock = increment(&prior_clock, &author_device);
        let priority = outbox_priority_for(EntityKind::Comment, SyncOperation::Delete, false, false);
        self.writer
            .exec(move |conn| {
                conn.transaction(|conn| {
                    let now = Utc::now();
                    diesel::update(comments::table.find(id.to_string()))
                        .set(comments::deleted_at.eq(Some(to_rfc3339(now))))
                        .execute(conn)?;

                    let tombstone = Tombstone {
                        id: EntityId::new(),
                        entity_type: EntityKind::Comment,
                        entity_id: id,
                        org_id,
                        deleted_by,
                        deleted_from_device: author_device,
                        vector_clock: clock,
                        created_at: now,
                        expires_at: now + ttl,
                    };
                    let row = TombstoneRow::from_domain(&tombstone)?;
                    diesel::insert_into(tombstones::table).values(&row).execute(conn)?;
                    enqueue_outbox(
                        conn,
                        EntityKind::Comment,
                        id,
                        SyncOperation::Delete,
                        serde_json::json!({}),
                        priority,
                        now,
                    )
                })
            })
            .await
    }

    /// Delta query for tasks, excluding the requesting device's own writes.
    pub fn tasks_delta_since(
        &self,
        org_id: &OrgId,
        watermark: DateTime<Utc>,
        excluding_device: &DeviceId,
        limit: i64,
    ) -> Result<Vec<Task>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = tasks::table
            .filter(tasks::org_id.eq(org_id.as_str()))
            .filter(tasks::updated_at.gt(to_rfc3339(watermark)))
            .filter(tasks::last_modified_device.ne(excluding_device.as_str()))
            .order(tasks::updated_at.asc())
            .limit(limit)
            .load::<TaskRow>(&mut conn)?;
        rows.into_iter().map(TaskRow::into_domain).collect()
    }

    pub fn comments_delta_since(
        &self,
        org_id: &OrgId,
        watermark: DateTime<Utc>,
        excluding_device: &DeviceId,
        limit: i64,
    ) -> Result<Vec<Comment>> {
        let mut conn = get_connection(&self.pool)?;
        // Comments don't carry org_id directly; scope via their parent task.
        let rows = comments::table
            .inner_join(tasks::table.on(tasks::id.eq(comments::task_id)))
            .filter(tasks::org_id.eq(org_id.as_str()))
            .filter(comments::updated_at.gt(to_rfc3339(watermark)))
            .filter(comments::last_modified_device.ne(excluding_device.as_str()))
            .order(comments::updated_at.asc())
            .limit(limit)
            .select(CommentRow::as_select())
            .load::<CommentRow>(&mut conn)?;
        rows.into_iter().map(CommentRow::into_domain).collect()
    }

    pub fn tombstones_since(
        &self,
        org_id: &OrgId,
        watermark: DateTime<Utc>,
        excluding_device: &DeviceId,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Tombstone>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = tombstones::table
            .filter(tombstones::org_id.eq(org_id.as_str()))
            .filter(tombstones::created_at.gt(to_rfc3339(watermark)))
            .filter(tombstones::deleted_from_device.ne(excluding_device.as_str()))
            .filter(tombstones::expires_at.gt(to_rfc3339(now)))
            .order(tombstones::created_at.asc())
            .limit(limit)
            .load::<TombstoneRow>(&mut conn)?;
        rows.into_iter().map(TombstoneRow::into_domain).collect()
    }

    /// Already-synced tasks (no pending local edits are tracked here; the
    /// caller cross-checks the outbox) last touched before `cutoff`,
    /// candidates for quota-triggered local-copy eviction.
    pub fn tasks_eligible_for_eviction(&self, cutoff: DateTime<Utc>) -> Result<Vec<EntityId>> {
        let mut conn = get_connection(&self.pool)?;
        let ids: Vec<String> = tasks::table
            .filter(tasks::updated_at.lt(to_rfc3339(cutoff)))
            .select(tasks::id)
            .load(&mut conn)?;
        parse_ids(ids)
    }

    pub fn comments_eligible_for_eviction(&self, cutoff: DateTime<Utc>) -> Result<Vec<EntityId>> {
        let mut conn = get_connection(&self.pool)?;
        let ids: Vec<String> = comments::table
            .filter(comments::updated_at.lt(to_rfc3339(cutoff)))
            .select(comments::id)
            .load(&mut conn)?;
        parse_ids(ids)
    }

    /// Drops a task's local copy outright (not a soft-delete, no tombstone):
    /// a later pull re-fetches it on demand. Used only by quota cleanup.
    pub async fn evict_task(&self, id: EntityId) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(tasks::table.find(id.to_string())).execute(conn)?;
                Ok(())
            })
            .await
    }

    pub async fn evict_comment(&self, id: EntityId) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(comments::table.find(id.to_string())).execute(conn)?;
                Ok(())
            })
            .await
    }

    pub fn find_child_comment_ids(&self, task_id: EntityId) -> Result<Vec<EntityId>> {
        let mut conn = get_connection(&self.pool)?;
        let ids: Vec<String> = comments::table
            .filter(comments::task_id.eq(task_id.to_string()))
            .filter(comments::deleted_at.is_null())
            .select(comments::id)
            .load(&mut conn)?;
        ids.into_iter()
            .map(|id| id.parse().map(EntityId))
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| StorageError::Migration("invalid comment id in store".into()))
    }
}

pub fn clock_column(clock: &sync_core::VectorClock) -> Result<String> {
    clock_to_json(clock)
}

/// Inserts a pending outbox row for a locally-originated mutation. Shared by
/// the `create_*`/`update_*`/`delete_*_locally` entry points so each stays a
/// single write-actor transaction alongside the entity write itself.
fn enqueue_outbox(
    conn: &mut SqliteConnection,
    entity_type: EntityKind,
    entity_id: EntityId,
    operation: SyncOperation,
    payload: serde_json::Value,
    priority: u8,
    created_at: DateTime<Utc>,
) -> Result<()> {
    let row = NewOutboxRow {
        entity_type: entity_kind_db_value(entity_type),
        entity_id: entity_id.to_string(),
        operation: operation_db_value(operation),
        payload: serde_json::to_string(&payload)?,
        priority: priority as i16,
        created_at: created_at.to_rfc3339(),
        attempt_count: 0,
        last_attempt_at: None,
        last_error: None,
        next_retry_at: None,
        status: "pending".to_string(),
    };
    diesel::insert_into(sync_outbox::table).values(&row).execute(conn)?;
    Ok(())
}

fn parse_ids(ids: Vec<String>) -> Result<Vec<EntityId>> {
    ids.into_iter()
        .map(|id| id.parse().map(EntityId))
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| StorageError::Migration("invalid entity id in store".into()))
}
