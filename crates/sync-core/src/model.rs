//! Domain model shared by device and server stores.
//!
//! `Task` and `Comment` are modeled as sibling variants that share a
//! `ReplicationMeta` component rather than an inheritance hierarchy: the
//! variants are closed and differ only in payload fields.

use crate::clock::VectorClock;
use crate::constants::{DESCRIPTION_MAX_LEN, TAGS_MAX_COUNT, TAG_MAX_LEN, TITLE_MAX_LEN};
use crate::errors::{Error, Result};
use crate::ids::{DeviceId, EntityId, OrgId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    /// Progression rank used by the status auto-resolution policy
    ///: higher rank wins. `done` is most "finished".
    pub fn progression_rank(self) -> u8 {
        match self {
            TaskStatus::Done => 4,
            TaskStatus::Cancelled => 3,
            TaskStatus::Blocked => 2,
            TaskStatus::InProgress => 1,
            TaskStatus::Todo => 0,
        }
    }

    pub fn is_blocked_or_cancelled(self) -> bool {
        matches!(self, TaskStatus::Blocked | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn rank(self) -> u8 {
        match self {
            TaskPriority::Low => 0,
            TaskPriority::Medium => 1,
            TaskPriority::High => 2,
            TaskPriority::Urgent => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    /// Permission was revoked (HTTP 403); the entry is not retried.
    PermanentlyDenied,
    /// Ordinary retry budget exhausted; surfaced to the UI.
    PermanentlyFailed,
}

/// Replication metadata shared by `Task` and `Comment`.
///
/// The `version` counter is decorative: it is never consulted for
/// correctness decisions, only exposed as a monotonic debug aid. `checksum`
/// is likewise advisory only and MUST NOT be used for integrity decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationMeta {
    pub version: i64,
    pub vector_clock: VectorClock,
    pub checksum: String,
    pub last_modified_by: UserId,
    pub last_modified_device: DeviceId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ReplicationMeta {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    pub org_id: OrgId,
    pub project_id: Option<EntityId>,

    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque drag-and-drop ordering value; the core never interprets it,
    /// only stores and transmits it.
    pub position: String,
    pub assigned_to: Option<UserId>,
    pub tags: BTreeSet<String>,
    pub custom_fields: BTreeMap<String, serde_json::Value>,

    #[serde(flatten)]
    pub meta: ReplicationMeta,
}

impl Task {
    pub fn validate(&self) -> Result<()> {
        if self.title.is_empty() || self.title.chars().count() > TITLE_MAX_LEN {
            return Err(Error::validation(format!(
                "title must be 1..={} chars",
                TITLE_MAX_LEN
            )));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > DESCRIPTION_MAX_LEN {
                return Err(Error::validation(format!(
                    "description must be <= {} chars",
                    DESCRIPTION_MAX_LEN
                )));
            }
        }
        if self.tags.len() > TAGS_MAX_COUNT {
            return Err(Error::validation(format!(
                "tags cardinality must be <= {}",
                TAGS_MAX_COUNT
            )));
        }
        if let Some(tag) = self.tags.iter().find(|t| t.chars().count() > TAG_MAX_LEN) {
            return Err(Error::validation(format!(
                "tag '{}' exceeds {} chars",
                tag, TAG_MAX_LEN
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: EntityId,
    pub task_id: EntityId,
    pub author: UserId,
    pub content: String,
    pub parent_comment_id: Option<EntityId>,
    pub is_edited: bool,

    #[serde(flatten)]
    pub meta: ReplicationMeta,
}

impl Comment {
    pub fn validate(&self) -> Result<()> {
        if self.content.is_empty() {
            return Err(Error::validation("comment content must not be empty"));
        }
        Ok(())
    }
}

/// A soft-delete announcement propagated to peers so they can drop their
/// local copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    pub id: EntityId,
    pub entity_type: EntityKind,
    pub entity_id: EntityId,
    pub org_id: OrgId,
    pub deleted_by: UserId,
    pub deleted_from_device: DeviceId,
    pub vector_clock: VectorClock,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Tombstone {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Device-local durable record of a pending mutation awaiting push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub id: i64,
    pub entity_type: EntityKind,
    pub entity_id: EntityId,
    pub operation: SyncOperation,
    pub payload: serde_json::Value,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub attempt_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub status: OutboxStatus,
}

/// Priority assignment rule for new outbox entries.
pub fn outbox_priority_for(
    entity_type: EntityKind,
    operation: SyncOperation,
    status_or_assignment_changed: bool,
    tag_or_position_only: bool,
) -> u8 {
    match (entity_type, operation) {
        (_, SyncOperation::Create) => 1,
        (_, SyncOperation::Delete) => 2,
        (_, SyncOperation::Update) if status_or_assignment_changed => 1,
        (_, SyncOperation::Update) if tag_or_position_only => 3,
        (_, SyncOperation::Update) => 2,
    }
}

/// Server-side record of a concurrent collision requiring (or having
/// received) manual resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub id: EntityId,
    pub entity_type: EntityKind,
    pub entity_id: EntityId,
    pub org_id: OrgId,
    pub local_version: serde_json::Value,
    pub server_version: serde_json::Value,
    pub local_clock: VectorClock,
    pub server_clock: VectorClock,
    pub conflict_reason: String,
    pub resolution_strategy: Option<ResolutionStrategy>,
    pub resolved_version: Option<serde_json::Value>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    AutoResolved,
    LocalWins,
    ServerWins,
    CustomMerge,
}

/// Server-side device registration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub org_id: OrgId,
    pub owning_user: UserId,
    pub fingerprint: String,
    pub friendly_name: String,
    pub last_seen_vector_clock: VectorClock,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Per-sync-cycle audit record kept server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncLogType {
    Push,
    Pull,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncLogStatus {
    Success,
    PartialFailure,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub id: i64,
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
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(device: &str) -> ReplicationMeta {
        ReplicationMeta {
            version: 1,
            vector_clock: VectorClock::single(DeviceId::new(device), 1),
            checksum: String::new(),
            last_modified_by: UserId::new("u1"),
            last_modified_device: DeviceId::new(device),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn sample_task() -> Task {
        Task {
            id: EntityId::new(),
            org_id: OrgId::new("org1"),
            project_id: None,
            title: "Ship it".into(),
            description: None,
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            due_date: None,
            completed_at: None,
            position: "a0".into(),
            assigned_to: None,
            tags: BTreeSet::new(),
            custom_fields: BTreeMap::new(),
            meta: meta("dev-a"),
        }
    }

    #[test]
    fn task_title_length_is_validated() {
        let mut task = sample_task();
        task.title = "x".repeat(TITLE_MAX_LEN + 1);
        assert!(task.validate().is_err());
    }

    #[test]
    fn task_tag_cardinality_is_validated() {
        let mut task = sample_task();
        task.tags = (0..TAGS_MAX_COUNT + 1).map(|i| format!("t{i}")).collect();
        assert!(task.validate().is_err());
    }

    #[test]
    fn status_progression_rank_orders_done_highest() {
        assert!(TaskStatus::Done.progression_rank() > TaskStatus::Cancelled.progression_rank());
        assert!(TaskStatus::Cancelled.progression_rank() > TaskStatus::Blocked.progression_rank());
        assert!(TaskStatus::Blocked.progression_rank() > TaskStatus::InProgress.progression_rank());
        assert!(TaskStatus::InProgress.progression_rank() > TaskStatus::Todo.progression_rank());
    }

    #[test]
    fn task_serializes_with_camel_case_keys() {
        let task = sample_task();
        let value = serde_json::to_value(&task).unwrap();
        assert!(value.get("dueDate").is_some());
        assert!(value.get("customFields").is_some());
        assert!(value.get("vectorClock").is_some());
    }
}
