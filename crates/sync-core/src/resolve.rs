//! Server-side field-level conflict resolver.
//!
//! Invoked when the push endpoint detects a CONCURRENT collision between a
//! pushed entity `P` and the currently stored entity `S`. Each function here
//! is pure: given `P` and `S`, it returns the merged value plus the set of
//! fields that required manual resolution (non-empty ⇒ a conflict record
//! must be written by the caller).

use crate::clock::{increment, merge};
use crate::ids::DeviceId;
use crate::model::{Comment, Task};
use std::collections::BTreeMap;

/// Names of fields that could not be auto-merged and were left at the
/// server's prior value, pending manual resolution.
pub type ManualFields = Vec<&'static str>;

pub struct TaskResolution {
    pub merged: Task,
    pub manual_fields: ManualFields,
    /// Human-readable summary, e.g. listing which custom_fields keys
    /// differed, suitable for `ConflictRecord::conflict_reason`.
    pub conflict_reason: String,
}

/// Resolve a CONCURRENT collision between pushed task `pushed` and stored
/// task `server`, field by field.
pub fn resolve_task(pushed: &Task, server: &Task, server_device: &DeviceId) -> TaskResolution {
    let mut merged = server.clone();
    let mut manual_fields = ManualFields::new();
    let mut reasons = Vec::new();

    // title, description: manual, keep server value.
    if pushed.title != server.title {
        manual_fields.push("title");
        reasons.push("title differs".to_string());
    }
    if pushed.description != server.description {
        manual_fields.push("description");
        reasons.push("description differs".to_string());
    }
    // assigned_to: manual, keep server value.
    if pushed.assigned_to != server.assigned_to {
        manual_fields.push("assigned_to");
        reasons.push("assigned_to differs".to_string());
    }

    // status: progression-wins, server wins on tie; manual if both moved to
    // blocked or cancelled.
    if pushed.status != server.status {
        let both_blocked_or_cancelled =
            pushed.status.is_blocked_or_cancelled() && server.status.is_blocked_or_cancelled();
        if both_blocked_or_cancelled {
            manual_fields.push("status");
            reasons.push("both sides moved to blocked/cancelled".to_string());
        } else if pushed.status.progression_rank() > server.status.progression_rank() {
            merged.status = pushed.status;
        }
        // else: server's rank is >= pushed's; keep server (already in `merged`).
    }

    // priority: higher rank wins, tie server wins.
    if pushed.priority.rank() > server.priority.rank() {
        merged.priority = pushed.priority;
    }

    // tags: set union.
    merged.tags = pushed.tags.union(&server.tags).cloned().collect();

    // due_date: earlier non-absent wins; both absent stays absent.
    merged.due_date = match (pushed.due_date, server.due_date) {
        (Some(p), Some(s)) => Some(p.min(s)),
        (Some(p), None) => Some(p),
        (None, Some(s)) => Some(s),
        (None, None) => None,
    };

    // position: server wins (already in `merged`).

    // custom_fields: shallow key-wise merge.
    let mut merged_custom = BTreeMap::new();
    let mut custom_keys: Vec<_> = pushed
        .custom_fields
        .keys()
        .chain(server.custom_fields.keys())
        .cloned()
        .collect();
    custom_keys.sort();
    custom_keys.dedup();
    for key in custom_keys {
        match (pushed.custom_fields.get(&key), server.custom_fields.get(&key)) {
            (Some(p), Some(s)) if p == s => {
                merged_custom.insert(key, p.clone());
            }
            (Some(p), Some(s)) => {
                merged_custom.insert(key, s.clone());
                reasons.push(format!("custom_fields.{key} differs"));
            }
            (Some(p), None) => {
                merged_custom.insert(key, p.clone());
            }
            (None, Some(s)) => {
                merged_custom.insert(key, s.clone());
            }
            (None, None) => unreachable!("key collected from one of the two maps"),
        }
    }
    merged.custom_fields = merged_custom;

    // completed_at: derived from status if going to done: max of both sides.
    if merged.status == crate::model::TaskStatus::Done {
        merged.completed_at = match (pushed.completed_at, server.completed_at) {
            (Some(p), Some(s)) => Some(p.max(s)),
            (Some(p), None) => Some(p),
            (None, Some(s)) => Some(s),
            (None, None) => None,
        };
    } else {
        merged.completed_at = server.completed_at;
    }

    let has_manual = !manual_fields.is_empty();

    merged.meta.vector_clock = increment(&merge(&pushed.meta.vector_clock, &server.meta.vector_clock), server_device);
    merged.meta.version = pushed.meta.version.max(server.meta.version) + 1;
    if !has_manual {
        merged.meta.last_modified_by = pushed.meta.last_modified_by.clone();
        merged.meta.last_modified_device = pushed.meta.last_modified_device.clone();
    }
    // else: left at server's prior values, already present via `merged = server.clone()`.

    TaskResolution {
        merged,
        manual_fields,
        conflict_reason: reasons.join("; "),
    }
}

/// Outcome of a concurrent collision on a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentResolution {
    /// Concurrent content edits on both sides: manual conflict, server value kept.
    ManualConflict,
    /// Concurrent edit vs. delete: delete wins.
    DeleteWins,
    /// Concurrent create with identical content: idempotent, no-op.
    IdempotentCreate,
    /// Concurrent create with differing content: second creator (by
    /// timestamp) wins.
    SecondCreatorWins,
}

pub fn resolve_comment_edit_conflict(pushed: &Comment, server: &Comment) -> CommentResolution {
    if pushed.content == server.content {
        CommentResolution::IdempotentCreate
    } else {
        CommentResolution::ManualConflict
    }
}

/// Resolve a CONCURRENT collision where the change under consideration is
/// an edit and the other side may have deleted the comment: delete wins
/// over edit unconditionally, concurrent or not. Falls back to
/// `resolve_comment_edit_conflict` when neither side is a delete.
pub fn resolve_comment_delete_conflict(pushed: &Comment, server: &Comment) -> CommentResolution {
    if pushed.meta.deleted_at.is_some() || server.meta.deleted_at.is_some() {
        CommentResolution::DeleteWins
    } else {
        resolve_comment_edit_conflict(pushed, server)
    }
}

pub fn resolve_comment_create_collision(
    pushed: &Comment,
    server: &Comment,
) -> CommentResolution {
    if pushed.content == server.content {
        CommentResolution::IdempotentCreate
    } else if pushed.meta.created_at > server.meta.created_at {
        CommentResolution::SecondCreatorWins
    } else {
        CommentResolution::ManualConflict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VectorClock;
    use crate::ids::{EntityId, OrgId, UserId};
    use crate::model::{ReplicationMeta, TaskPriority, TaskStatus};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn base_task(device: &str, title: &str) -> Task {
        Task {
            id: EntityId::new(),
            org_id: OrgId::new("org1"),
            project_id: None,
            title: title.to_string(),
            description: None,
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            due_date: None,
            completed_at: None,
            position: "a0".into(),
            assigned_to: None,
            tags: BTreeSet::new(),
            custom_fields: BTreeMap::new(),
            meta: ReplicationMeta {
                version: 1,
                vector_clock: VectorClock::single(DeviceId::new(device), 1),
                checksum: String::new(),
                last_modified_by: UserId::new("u1"),
                last_modified_device: DeviceId::new(device),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                deleted_at: None,
            },
        }
    }

    #[test]
    fn title_conflict_is_manual_and_keeps_server_value() {
        let pushed = base_task("device-a", "from device");
        let server = base_task("device-b", "from server");
        let resolution = resolve_task(&pushed, &server, &DeviceId::new("server"));
        assert!(resolution.manual_fields.contains(&"title"));
        assert_eq!(resolution.merged.title, "from server");
    }

    #[test]
    fn priority_auto_resolves_to_higher_rank() {
        let mut pushed = base_task("device-a", "t");
        pushed.priority = TaskPriority::Urgent;
        let server = base_task("device-b", "t");
        let resolution = resolve_task(&pushed, &server, &DeviceId::new("server"));
        assert!(!resolution.manual_fields.contains(&"priority"));
        assert_eq!(resolution.merged.priority, TaskPriority::Urgent);
    }

    #[test]
    fn tags_union() {
        let mut pushed = base_task("device-a", "t");
        pushed.tags = BTreeSet::from(["a".to_string()]);
        let mut server = base_task("device-b", "t");
        server.tags = BTreeSet::from(["b".to_string()]);
        let resolution = resolve_task(&pushed, &server, &DeviceId::new("server"));
        assert_eq!(resolution.merged.tags, BTreeSet::from(["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn both_blocked_or_cancelled_status_is_manual() {
        let mut pushed = base_task("device-a", "t");
        pushed.status = TaskStatus::Blocked;
        let mut server = base_task("device-b", "t");
        server.status = TaskStatus::Cancelled;
        let resolution = resolve_task(&pushed, &server, &DeviceId::new("server"));
        assert!(resolution.manual_fields.contains(&"status"));
    }

    #[test]
    fn status_progression_auto_resolves_without_blocked_or_cancelled() {
        let mut pushed = base_task("device-a", "t");
        pushed.status = TaskStatus::Done;
        let mut server = base_task("device-b", "t");
        server.status = TaskStatus::InProgress;
        let resolution = resolve_task(&pushed, &server, &DeviceId::new("server"));
        assert!(!resolution.manual_fields.contains(&"status"));
        assert_eq!(resolution.merged.status, TaskStatus::Done);
        assert!(resolution.merged.completed_at.is_some());
    }

    #[test]
    fn merged_clock_dominates_both_inputs() {
        let pushed = base_task("device-a", "t");
        let server = base_task("device-b", "t");
        let resolution = resolve_task(&pushed, &server, &DeviceId::new("server"));
        assert!(crate::clock::dominates(
            &resolution.merged.meta.vector_clock,
            &pushed.meta.vector_clock
        ));
        assert!(crate::clock::dominates(
            &resolution.merged.meta.vector_clock,
            &server.meta.vector_clock
        ));
    }

    #[test]
    fn identical_comment_edit_is_idempotent() {
        let task_id = EntityId::new();
        let meta = ReplicationMeta {
            version: 1,
            vector_clock: VectorClock::new(),
            checksum: String::new(),
            last_modified_by: UserId::new("u1"),
            last_modified_device: DeviceId::new("device-a"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        let comment = Comment {
            id: EntityId::new(),
            task_id,
            author: UserId::new("u1"),
            content: "same".into(),
            parent_comment_id: None,
            is_edited: false,
            meta,
        };
        let mut server = comment.clone();
        server.meta.last_modified_device = DeviceId::new("device-b");
        assert_eq!(
            resolve_comment_edit_conflict(&comment, &server),
            CommentResolution::IdempotentCreate
        );
    }

    #[test]
    fn delete_wins_over_concurrent_edit() {
        let task_id = EntityId::new();
        let meta = ReplicationMeta {
            version: 1,
            vector_clock: VectorClock::new(),
            checksum: String::new(),
            last_modified_by: UserId::new("u1"),
            last_modified_device: DeviceId::new("device-a"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        let edited = Comment {
            id: EntityId::new(),
            task_id,
            author: UserId::new("u1"),
            content: "edited content".into(),
            parent_comment_id: None,
            is_edited: true,
            meta: meta.clone(),
        };
        let mut deleted = edited.clone();
        deleted.meta.deleted_at = Some(Utc::now());
        assert_eq!(
            resolve_comment_delete_conflict(&edited, &deleted),
            CommentResolution::DeleteWins
        );
        assert_eq!(
            resolve_comment_delete_conflict(&deleted, &edited),
            CommentResolution::DeleteWins
        );
    }
}
