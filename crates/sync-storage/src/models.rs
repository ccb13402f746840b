//! Diesel row structs for the sync tables, and conversions to/from the
//! plain domain types in `sync_core::model`. Every structured value
//! (vector clocks, tag sets, custom fields) is stored as a JSON text
//! column, round-tripping enums and maps through `serde_json` rather than
//! adding a SQLite JSON1 extension dependency.

use crate::errors::{Result, StorageError};
use crate::schema::{comments, conflicts, device_state, devices, sync_log, sync_outbox, tasks, tombstones};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use sync_core::{
    Comment, ConflictRecord, DeviceId, DeviceRecord, EntityId, EntityKind, OrgId, OutboxEntry,
    ReplicationMeta, ResolutionStrategy, SyncLogEntry, SyncOperation, Task, TaskPriority,
    TaskStatus, Tombstone, UserId, VectorClock,
};

pub(crate) fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn from_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Migration(format!("invalid timestamp '{value}': {e}")))
}

pub(crate) fn clock_to_json(clock: &VectorClock) -> Result<String> {
    Ok(serde_json::to_string(clock)?)
}

pub(crate) fn clock_from_json(value: &str) -> Result<VectorClock> {
    Ok(serde_json::from_str(value)?)
}

fn entity_kind_to_db(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Task => "task",
        EntityKind::Comment => "comment",
    }
}

fn entity_kind_from_db(value: &str) -> Result<EntityKind> {
    match value {
        "task" => Ok(EntityKind::Task),
        "comment" => Ok(EntityKind::Comment),
        other => Err(StorageError::Migration(format!("unknown entity_type '{other}'"))),
    }
}

fn status_to_db(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "todo",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Done => "done",
        TaskStatus::Blocked => "blocked",
        TaskStatus::Cancelled => "cancelled",
    }
}

fn status_from_db(value: &str) -> Result<TaskStatus> {
    Ok(match value {
        "todo" => TaskStatus::Todo,
        "in_progress" => TaskStatus::InProgress,
        "done" => TaskStatus::Done,
        "blocked" => TaskStatus::Blocked,
        "cancelled" => TaskStatus::Cancelled,
        other => return Err(StorageError::Migration(format!("unknown status '{other}'"))),
    })
}

fn priority_to_db(priority: TaskPriority) -> &'static str {
    match priority {
        TaskPriority::Low => "low",
        TaskPriority::Medium => "medium",
        TaskPriority::High => "high",
        TaskPriority::Urgent => "urgent",
    }
}

fn priority_from_db(value: &str) -> Result<TaskPriority> {
    Ok(match value {
        "low" => TaskPriority::Low,
        "medium" => TaskPriority::Medium,
        "high" => TaskPriority::High,
        "urgent" => TaskPriority::Urgent,
        other => return Err(StorageError::Migration(format!("unknown priority '{other}'"))),
    })
}

fn operation_to_db(op: SyncOperation) -> &'static str {
    match op {
        SyncOperation::Create => "create",
        SyncOperation::Update => "update",
        SyncOperation::Delete => "delete",
    }
}

fn operation_from_db(value: &str) -> Result<SyncOperation> {
    Ok(match value {
        "create" => SyncOperation::Create,
        "update" => SyncOperation::Update,
        "delete" => SyncOperation::Delete,
        other => return Err(StorageError::Migration(format!("unknown operation '{other}'"))),
    })
}

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaskRow {
    pub id: String,
    pub org_id: String,
    pub project_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub due_date: Option<String>,
    pub completed_at: Option<String>,
    pub position: String,
    pub assigned_to: Option<String>,
    pub tags: String,
    pub custom_fields: String,
    pub version: i64,
    pub vector_clock: String,
    pub checksum: String,
    pub last_modified_by: String,
    pub last_modified_device: String,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl TaskRow {
    pub fn from_domain(task: &Task) -> Result<Self> {
        Ok(Self {
            id: task.id.to_string(),
            org_id: task.org_id.as_str().to_string(),
            project_id: task.project_id.map(|id| id.to_string()),
            title: task.title.clone(),
            description: task.description.clone(),
            status: status_to_db(task.status).to_string(),
            priority: priority_to_db(task.priority).to_string(),
            due_date: task.due_date.map(to_rfc3339),
            completed_at: task.completed_at.map(to_rfc3339),
            position: task.position.clone(),
            assigned_to: task.assigned_to.as_ref().map(|u| u.as_str().to_string()),
            tags: serde_json::to_string(&task.tags)?,
            custom_fields: serde_json::to_string(&task.custom_fields)?,
            version: task.meta.version,
            vector_clock: clock_to_json(&task.meta.vector_clock)?,
            checksum: task.meta.checksum.clone(),
            last_modified_by: task.meta.last_modified_by.as_str().to_string(),
            last_modified_device: task.meta.last_modified_device.as_str().to_string(),
            created_at: to_rfc3339(task.meta.created_at),
            updated_at: to_rfc3339(task.meta.updated_at),
            deleted_at: task.meta.deleted_at.map(to_rfc3339),
        })
    }

    pub fn into_domain(self) -> Result<Task> {
        let tags: BTreeSet<String> = serde_json::from_str(&self.tags)?;
        let custom_fields: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&self.custom_fields)?;
        Ok(Task {
            id: EntityId(self.id.parse().map_err(|_| {
                StorageError::Migration(format!("invalid task id '{}'", self.id))
            })?),
            org_id: OrgId::new(self.org_id),
            project_id: self
                .project_id
                .map(|id| id.parse().map(EntityId))
                .transpose()
                .map_err(|_| StorageError::Migration("invalid project_id".into()))?,
            title: self.title,
            description: self.description,
            status: status_from_db(&self.status)?,
            priority: priority_from_db(&self.priority)?,
            due_date: self.due_date.as_deref().map(from_rfc3339).transpose()?,
            completed_at: self.completed_at.as_deref().map(from_rfc3339).transpose()?,
            position: self.position,
            assigned_to: self.assigned_to.map(UserId::new),
            tags,
            custom_fields,
            meta: ReplicationMeta {
                version: self.version,
                vector_clock: clock_from_json(&self.vector_clock)?,
                checksum: self.checksum,
                last_modified_by: UserId::new(self.last_modified_by),
                last_modified_device: DeviceId::new(self.last_modified_device),
                created_at: from_rfc3339(&self.created_at)?,
                updated_at: from_rfc3339(&self.updated_at)?,
                deleted_at: self.deleted_at.as_deref().map(from_rfc3339).transpose()?,
            },
        })
    }
}

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(table_name = comments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CommentRow {
    pub id: String,
    pub task_id: String,
    pub author: String,
    pub content: String,
    pub parent_comment_id: Option<String>,
    pub is_edited: bool,
    pub version: i64,
    pub vector_clock: String,
    pub checksum: String,
    pub last_modified_by: String,
    pub last_modified_device: String,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl CommentRow {
    pub fn from_domain(comment: &Comment) -> Result<Self> {
        Ok(Self {
            id: comment.id.to_string(),
            task_id: comment.task_id.to_string(),
            author: comment.author.as_str().to_string(),
            content: comment.content.clone(),
            parent_comment_id: comment.parent_comment_id.map(|id| id.to_string()),
            is_edited: comment.is_edited,
            version: comment.meta.version,
            vector_clock: clock_to_json(&comment.meta.vector_clock)?,
            checksum: comment.meta.checksum.clone(),
            last_modified_by: comment.meta.last_modified_by.as_str().to_string(),
            last_modified_device: comment.meta.last_modified_device.as_str().to_string(),
            created_at: to_rfc3339(comment.meta.created_at),
            updated_at: to_rfc3339(comment.meta.updated_at),
            deleted_at: comment.meta.deleted_at.map(to_rfc3339),
        })
    }

    pub fn into_domain(self) -> Result<Comment> {
        Ok(Comment {
            id: self.id.parse().map(EntityId).map_err(|_| {
                StorageError::Migration(format!("invalid comment id '{}'", self.id))
            })?,
            task_id: self
                .task_id
                .parse()
                .map(EntityId)
                .map_err(|_| StorageError::Migration("invalid task_id".into()))?,
            author: UserId::new(self.author),
            content: self.content,
            parent_comment_id: self
                .parent_comment_id
                .map(|id| id.parse().map(EntityId))
                .transpose()
                .map_err(|_| StorageError::Migration("invalid parent_comment_id".into()))?,
            is_edited: self.is_edited,
            meta: ReplicationMeta {
                version: self.version,
                vector_clock: clock_from_json(&self.vector_clock)?,
                checksum: self.checksum,
                last_modified_by: UserId::new(self.last_modified_by),
                last_modified_device: DeviceId::new(self.last_modified_device),
                created_at: from_rfc3339(&self.created_at)?,
                updated_at: from_rfc3339(&self.updated_at)?,
                deleted_at: self.deleted_at.as_deref().map(from_rfc3339).transpose()?,
            },
        })
    }
}

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(table_name = tombstones)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TombstoneRow {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub org_id: String,
    pub deleted_by: String,
    pub deleted_from_device: String,
    pub vector_clock: String,
    pub created_at: String,
    pub expires_at: String,
}

impl TombstoneRow {
    pub fn from_domain(tombstone: &Tombstone) -> Result<Self> {
        Ok(Self {
            id: tombstone.id.to_string(),
            entity_type: entity_kind_to_db(tombstone.entity_type).to_string(),
            entity_id: tombstone.entity_id.to_string(),
            org_id: tombstone.org_id.as_str().to_string(),
            deleted_by: tombstone.deleted_by.as_str().to_string(),
            deleted_from_device: tombstone.deleted_from_device.as_str().to_string(),
            vector_clock: clock_to_json(&tombstone.vector_clock)?,
            created_at: to_rfc3339(tombstone.created_at),
            expires_at: to_rfc3339(tombstone.expires_at),
        })
    }

    pub fn into_domain(self) -> Result<Tombstone> {
        Ok(Tombstone {
            id: self.id.parse().map(EntityId).map_err(|_| {
                StorageError::Migration(format!("invalid tombstone id '{}'", self.id))
            })?,
            entity_type: entity_kind_from_db(&self.entity_type)?,
            entity_id: self
                .entity_id
                .parse()
                .map(EntityId)
                .map_err(|_| StorageError::Migration("invalid entity_id".into()))?,
            org_id: OrgId::new(self.org_id),
            deleted_by: UserId::new(self.deleted_by),
            deleted_from_device: DeviceId::new(self.deleted_from_device),
            vector_clock: clock_from_json(&self.vector_clock)?,
            created_at: from_rfc3339(&self.created_at)?,
            expires_at: from_rfc3339(&self.expires_at)?,
        })
    }
}

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(table_name = sync_outbox)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OutboxRow {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: String,
    pub payload: String,
    pub priority: i16,
    pub created_at: String,
    pub attempt_count: i32,
    pub last_attempt_at: Option<String>,
    pub last_error: Option<String>,
    pub next_retry_at: Option<String>,
    pub status: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = sync_outbox)]
pub struct NewOutboxRow {
    pub entity_type: String,
    pub entity_id: String,
    pub operation: String,
    pub payload: String,
    pub priority: i16,
    pub created_at: String,
    pub attempt_count: i32,
    pub last_attempt_at: Option<String>,
    pub last_error: Option<String>,
    pub next_retry_at: Option<String>,
    pub status: String,
}

impl OutboxRow {
    pub fn into_domain(self) -> Result<OutboxEntry> {
        Ok(OutboxEntry {
            id: self.id,
            entity_type: entity_kind_from_db(&self.entity_type)?,
            entity_id: self
                .entity_id
                .parse()
                .map(EntityId)
                .map_err(|_| StorageError::Migration("invalid entity_id".into()))?,
            operation: operation_from_db(&self.operation)?,
            payload: serde_json::from_str(&self.payload)?,
            priority: self.priority as u8,
            created_at: from_rfc3339(&self.created_at)?,
            attempt_count: self.attempt_count,
            last_attempt_at: self.last_attempt_at.as_deref().map(from_rfc3339).transpose()?,
            last_error: self.last_error,
            next_retry_at: self.next_retry_at.as_deref().map(from_rfc3339).transpose()?,
            status: match self.status.as_str() {
                "pending" => sync_core::OutboxStatus::Pending,
                "permanently_denied" => sync_core::OutboxStatus::PermanentlyDenied,
                "permanently_failed" => sync_core::OutboxStatus::PermanentlyFailed,
                other => {
                    return Err(StorageError::Migration(format!("unknown outbox status '{other}'")))
                }
            },
        })
    }
}

pub fn entity_kind_db_value(kind: EntityKind) -> String {
    entity_kind_to_db(kind).to_string()
}

pub fn operation_db_value(op: SyncOperation) -> String {
    operation_to_db(op).to_string()
}

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(table_name = device_state)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DeviceStateRow {
    pub id: i32,
    pub device_id: String,
    pub last_sync_time: Option<String>,
    pub vector_clock: String,
}

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(table_name = conflicts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConflictRow {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub org_id: String,
    pub local_version: String,
    pub server_version: String,
    pub local_clock: String,
    pub server_clock: String,
    pub conflict_reason: String,
    pub resolution_strategy: Option<String>,
    pub resolved_version: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<String>,
    pub created_at: String,
}

fn resolution_strategy_to_db(strategy: ResolutionStrategy) -> &'static str {
    match strategy {
        ResolutionStrategy::AutoResolved => "auto_resolved",
        ResolutionStrategy::LocalWins => "local_wins",
        ResolutionStrategy::ServerWins => "server_wins",
        ResolutionStrategy::CustomMerge => "custom_merge",
    }
}

fn resolution_strategy_from_db(value: &str) -> Result<ResolutionStrategy> {
    Ok(match value {
        "auto_resolved" => ResolutionStrategy::AutoResolved,
        "local_wins" => ResolutionStrategy::LocalWins,
        "server_wins" => ResolutionStrategy::ServerWins,
        "custom_merge" => ResolutionStrategy::CustomMerge,
        other => {
            return Err(StorageError::Migration(format!(
                "unknown resolution_strategy '{other}'"
            )))
        }
    })
}

impl ConflictRow {
    pub fn from_domain(record: &ConflictRecord) -> Result<Self> {
        Ok(Self {
            id: record.id.to_string(),
            entity_type: entity_kind_to_db(record.entity_type).to_string(),
            entity_id: record.entity_id.to_string(),
            org_id: record.org_id.as_str().to_string(),
            local_version: serde_json::to_string(&record.local_version)?,
            server_version: serde_json::to_string(&record.server_version)?,
            local_clock: clock_to_json(&record.local_clock)?,
            server_clock: clock_to_json(&record.server_clock)?,
            conflict_reason: record.conflict_reason.clone(),
            resolution_strategy: record.resolution_strategy.map(resolution_strategy_to_db).map(str::to_string),
            resolved_version: record
                .resolved_version
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            resolved_by: record.resolved_by.as_ref().map(|u| u.as_str().to_string()),
            resolved_at: record.resolved_at.map(to_rfc3339),
            created_at: to_rfc3339(record.created_at),
        })
    }

    pub fn into_domain(self) -> Result<ConflictRecord> {
        Ok(ConflictRecord {
            id: self.id.parse().map(EntityId).map_err(|_| {
                StorageError::Migration(format!("invalid conflict id '{}'", self.id))
            })?,
            entity_type: entity_kind_from_db(&self.entity_type)?,
            entity_id: self
                .entity_id
                .parse()
                .map(EntityId)
                .map_err(|_| StorageError::Migration("invalid entity_id".into()))?,
            org_id: OrgId::new(self.org_id),
            local_version: serde_json::from_str(&self.local_version)?,
            server_version: serde_json::from_str(&self.server_version)?,
            local_clock: clock_from_json(&self.local_clock)?,
            server_clock: clock_from_json(&self.server_clock)?,
            conflict_reason: self.conflict_reason,
            resolution_strategy: self
                .resolution_strategy
                .as_deref()
                .map(resolution_strategy_from_db)
                .transpose()?,
            resolved_version: self.resolved_version.as_deref().map(serde_json::from_str).transpose()?,
            resolved_by: self.resolved_by.map(UserId::new),
            resolved_at: self.resolved_at.as_deref().map(from_rfc3339).transpose()?,
            created_at: from_rfc3339(&self.created_at)?,
        })
    }
}

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(table_name = devices)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DeviceRow {
    pub id: String,
    pub org_id: String,
    pub owning_user: String,
    pub fingerprint: String,
    pub friendly_name: String,
    pub last_seen_vector_clock: String,
    pub last_sync_at: Option<String>,
    pub is_active: bool,
}

impl DeviceRow {
    pub fn from_domain(record: &DeviceRecord) -> Result<Self> {
        Ok(Self {
            id: record.id.as_str().to_string(),
            org_id: record.org_id.as_str().to_string(),
            owning_user: record.owning_user.as_str().to_string(),
            fingerprint: record.fingerprint.clone(),
            friendly_name: record.friendly_name.clone(),
            last_seen_vector_clock: clock_to_json(&record.last_seen_vector_clock)?,
            last_sync_at: record.last_sync_at.map(to_rfc3339),
            is_active: record.is_active,
        })
    }

    pub fn into_domain(self) -> Result<DeviceRecord> {
        Ok(DeviceRecord {
            id: DeviceId::new(self.id),
            org_id: OrgId::new(self.org_id),
            owning_user: UserId::new(self.owning_user),
            fingerprint: self.fingerprint,
            friendly_name: self.friendly_name,
            last_seen_vector_clock: clock_from_json(&self.last_seen_vector_clock)?,
            last_sync_at: self.last_sync_at.as_deref().map(from_rfc3339).transpose()?,
            is_active: self.is_active,
        })
    }
}

#[derive(Queryable, Identifiable, Insertable, Debug, Clone)]
#[diesel(table_name = sync_log)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncLogRow {
    pub id: i64,
    pub device_id: String,
    pub user_id: String,
    pub log_type: String,
    pub pushed_count: i32,
    pub pulled_count: i32,
    pub conflicts_detected: i32,
    pub conflicts_resolved: i32,
    pub duration_ms: i64,
    pub status: String,
    pub error: Option<String>,
    pub created_at: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = sync_log)]
pub struct NewSyncLogRow {
    pub device_id: String,
    pub user_id: String,
    pub log_type: String,
    pub pushed_count: i32,
    pub pulled_count: i32,
    pub conflicts_detected: i32,
    pub conflicts_resolved: i32,
    pub duration_ms: i64,
    pub status: String,
    pub error: Option<String>,
    pub created_at: String,
}

impl SyncLogRow {
    pub fn into_domain(self) -> Result<SyncLogEntry> {
        Ok(SyncLogEntry {
            id: self.id,
            device_id: DeviceId::new(self.device_id),
            user_id: UserId::new(self.user_id),
            log_type: match self.log_type.as_str() {
                "push" => sync_core::SyncLogType::Push,
                "pull" => sync_core::SyncLogType::Pull,
                other => {
                    return Err(StorageError::Migration(format!("unknown log_type '{other}'")))
                }
            },
            pushed_count: self.pushed_count,
            pulled_count: self.pulled_count,
            conflicts_detected: self.conflicts_detected,
            conflicts_resolved: self.conflicts_resolved,
            duration_ms: self.duration_ms,
            status: match self.status.as_str() {
                "success" => sync_core::SyncLogStatus::Success,
                "partial_failure" => sync_core::SyncLogStatus::PartialFailure,
                "failure" => sync_core::SyncLogStatus::Failure,
                other => return Err(StorageError::Migration(format!("unknown log status '{other}'"))),
            },
            error: self.error,
            created_at: from_rfc3339(&self.created_at)?,
        })
    }
}
