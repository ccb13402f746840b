//! `POST /api/sync/push/` handler logic.

use crate::auth::AuthContext;
use crate::dto::{ChangeOperation, EntityChange, OrphanedEntity, PushConflict, PushRequest, PushResponse};
use crate::error::{Result, ServerError};
use crate::org_clock_cache::OrgClockCache;
use chrono::Utc;
use sync_core::clock::{compare, ClockOrdering};
use sync_core::resolve::{
    resolve_comment_create_collision, resolve_comment_delete_conflict, resolve_task, CommentResolution,
};
use sync_core::{Comment, ConflictRecord, DeviceId, EntityKind, OrgId, Task, UserId};
use sync_storage::{ConflictStore, DeviceRegistry, EntityStore, SyncLogAppend, SyncLogWriter};

/// Identity the server stamps onto clocks it increments itself.
pub fn server_device_id() -> DeviceId {
    DeviceId::new("server")
}

enum EntityOutcome {
    Processed,
    Conflict(PushConflict),
    Orphaned,
    Dropped,
}

/// Processes one push batch, checkpointing per-entity rather than wrapping
/// the whole batch in one SQL transaction (the single-writer actor already
/// makes each `EntityStore` call atomic); this applies each change
/// independently so a later entity's failure never discards an earlier
/// entity's durable
/// write.
#[allow(clippy::too_many_arguments)]
pub async fn push_batch(
    entity_store: &EntityStore,
    conflict_store: &ConflictStore,
    device_registry: &DeviceRegistry,
    sync_log: &SyncLogWriter,
    org_clock_cache: &OrgClockCache,
    ctx: &AuthContext,
    caller_device_id: &DeviceId,
    request: PushRequest,
) -> Result<PushResponse> {
    let started = Utc::now();
    let server_device = server_device_id();

    if !device_registry.is_owned_and_active(caller_device_id, &ctx.user_id)? {
        return Err(ServerError::Forbidden(
            "device is not registered to the authenticated user".into(),
        ));
    }

    let mut processed = 0i64;
    let mut conflicts = Vec::new();
    let mut orphaned = Vec::new();

    for change in &request.changes.tasks {
        match process_task_change(
            entity_store,
            conflict_store,
            &ctx.org_id,
            &ctx.user_id,
            caller_device_id,
            &server_device,
            change,
        )
        .await?
        {
            EntityOutcome::Processed => processed += 1,
            EntityOutcome::Conflict(c) => {
                conflicts.push(c);
                processed += 1;
            }
            EntityOutcome::Orphaned => orphaned.push(OrphanedEntity {
                entity_type: EntityKind::Task,
                entity_id: change.id,
            }),
            EntityOutcome::Dropped => {}
        }
    }

    for change in &request.changes.comments {
        match process_comment_change(
            entity_store,
            conflict_store,
            &ctx.org_id,
            &ctx.user_id,
            caller_device_id,
            change,
        )
        .await?
        {
            EntityOutcome::Processed => processed += 1,
            EntityOutcome::Conflict(c) => {
                conflicts.push(c);
                processed += 1;
            }
            EntityOutcome::Orphaned => orphaned.push(OrphanedEntity {
                entity_type: EntityKind::Comment,
                entity_id: change.id,
            }),
            EntityOutcome::Dropped => {}
        }
    }

    device_registry
        .record_sync(caller_device_id.clone(), request.vector_clock.clone(), Utc::now())
        .await?;
    org_clock_cache.invalidate(&ctx.org_id);
    let server_vector_clock = org_clock_cache.get_or_refresh(device_registry, &ctx.org_id)?;

    sync_log
        .append(SyncLogAppend {
            device_id: caller_device_id.clone(),
            user_id: ctx.user_id.clone(),
            log_type: sync_core::SyncLogType::Push,
            pushed_count: processed as i32,
            pulled_count: 0,
            conflicts_detected: conflicts.len() as i32,
            conflicts_resolved: 0,
            duration_ms: (Utc::now() - started).num_milliseconds(),
            status: sync_core::SyncLogStatus::Success,
            error: None,
        })
        .await?;

    Ok(PushResponse {
        success: true,
        processed,
        conflicts,
        orphaned,
        server_vector_clock,
        timestamp: Utc::now(),
    })
}

#[allow(clippy::too_many_arguments)]
async fn process_task_change(
    entity_store: &EntityStore,
    conflict_store: &ConflictStore,
    org_id: &OrgId,
    pushing_user: &UserId,
    pushing_device: &DeviceId,
    server_device: &DeviceId,
    change: &EntityChange,
) -> Result<EntityOutcome> {
    if change.operation == ChangeOperation::Delete {
        let Some(existing) = entity_store.get_task(change.id, true)? else {
            return Ok(EntityOutcome::Dropped);
        };
        if existing.meta.is_deleted() {
            return Ok(EntityOutcome::Dropped);
        }
        entity_store
            .soft_delete_task(
                change.id,
                org_id.clone(),
                pushing_user.clone(),
                pushing_device.clone(),
                existing.meta.vector_clock.clone(),
                sync_core::constants::tombstone_ttl(),
            )
            .await?;
        for child_id in entity_store.find_child_comment_ids(change.id)? {
            if let Some(child) = entity_store.get_comment(child_id, false)? {
                entity_store
                    .soft_delete_comment(
                        child_id,
                        org_id.clone(),
                        pushing_user.clone(),
                        pushing_device.clone(),
                        child.meta.vector_clock.clone(),
                        sync_core::constants::tombstone_ttl(),
                    )
                    .await?;
            }
        }
        return Ok(EntityOutcome::Processed);
    }

    let pushed: Task = serde_json::from_value(change.data.clone())
        .map_err(|e| ServerError::InvalidRequest(format!("invalid task payload: {e}")))?;
    pushed.validate()?;

    let Some(server_state) = entity_store.get_task(change.id, true)? else {
        let mut accepted = pushed;
        accepted.meta.vector_clock = sync_core::clock::increment(&accepted.meta.vector_clock, server_device);
        accepted.meta.version = accepted.meta.version.max(1);
        entity_store.put_task(accepted).await?;
        return Ok(EntityOutcome::Processed);
    };

    if server_state.meta.is_deleted() {
        return Ok(EntityOutcome::Orphaned);
    }

    match compare(&pushed.meta.vector_clock, &server_state.meta.vector_clock) {
        ClockOrdering::After | ClockOrdering::Equal => {
            let mut accepted = pushed;
            accepted.meta.vector_clock = sync_core::clock::increment(&accepted.meta.vector_clock, server_device);
            accepted.meta.version = server_state.meta.version.max(accepted.meta.version) + 1;
            entity_store.put_task(accepted).await?;
            Ok(EntityOutcome::Processed)
        }
        ClockOrdering::Before => Ok(EntityOutcome::Dropped),
        ClockOrdering::Concurrent => {
            let resolution = resolve_task(&pushed, &server_state, server_device);
            entity_store.put_task(resolution.merged.clone()).await?;
            if resolution.manual_fields.is_empty() {
                return Ok(EntityOutcome::Processed);
            }
            let server_version = serde_json::to_value(&server_state)?;
            let record = ConflictRecord {
                id: sync_core::EntityId::new(),
                entity_type: EntityKind::Task,
                entity_id: change.id,
                org_id: org_id.clone(),
                local_version: change.data.clone(),
                server_version: server_version.clone(),
                local_clock: pushed.meta.vector_clock.clone(),
                server_clock: server_state.meta.vector_clock.clone(),
                conflict_reason: resolution.conflict_reason.clone(),
                resolution_strategy: None,
                resolved_version: None,
                resolved_by: None,
                resolved_at: None,
                created_at: Utc::now(),
            };
            conflict_store.record(record).await?;
            Ok(EntityOutcome::Conflict(PushConflict {
                entity_type: EntityKind::Task,
                entity_id: change.id,
                conflict_reason: resolution.conflict_reason,
                server_version,
                server_vector_clock: resolution.merged.meta.vector_clock,
            }))
        }
    }
}

async fn process_comment_change(
    entity_store: &EntityStore,
    conflict_store: &ConflictStore,
    org_id: &OrgId,
    pushing_user: &UserId,
    pushing_device: &DeviceId,
    change: &EntityChange,
) -> Result<EntityOutcome> {
    if change.operation == ChangeOperation::Delete {
        let Some(existing) = entity_store.get_comment(change.id, true)? else {
            return Ok(EntityOutcome::Dropped);
        };
        if existing.meta.is_deleted() {
            return Ok(EntityOutcome::Dropped);
        }
        entity_store
            .soft_delete_comment(
                change.id,
                org_id.clone(),
                pushing_user.clone(),
                pushing_device.clone(),
                existing.meta.vector_clock.clone(),
                sync_core::constants::tombstone_ttl(),
            )
            .await?;
        return Ok(EntityOutcome::Processed);
    }

    let pushed: Comment = serde_json::from_value(change.data.clone())
        .map_err(|e| ServerError::InvalidRequest(format!("invalid comment payload: {e}")))?;
    pushed.validate()?;

    if let Some(parent) = entity_store.get_task(pushed.task_id, true)? {
        if parent.meta.is_deleted() {
            return Ok(EntityOutcome::Orphaned);
        }
    }

    let Some(server_state) = entity_store.get_comment(change.id, true)? else {
        entity_store.put_comment(pushed).await?;
        return Ok(EntityOutcome::Processed);
    };

    let ordering = compare(&pushed.meta.vector_clock, &server_state.meta.vector_clock);

    // A dominated or tied push against an already-deleted comment must not
    // resurrect it; only a concurrent push gets a chance to be classified
    // as a delete-vs-edit collision below.
    if server_state.meta.is_deleted() && ordering != ClockOrdering::Concurrent {
        return Ok(EntityOutcome::Orphaned);
    }

    match ordering {
        ClockOrdering::After | ClockOrdering::Equal => {
            entity_store.put_comment(pushed).await?;
            Ok(EntityOutcome::Processed)
        }
        ClockOrdering::Before => Ok(EntityOutcome::Dropped),
        ClockOrdering::Concurrent => match if change.operation == ChangeOperation::Create {
            resolve_comment_create_collision(&pushed, &server_state)
        } else {
            resolve_comment_delete_conflict(&pushed, &server_state)
        } {
            CommentResolution::IdempotentCreate => Ok(EntityOutcome::Processed),
            CommentResolution::SecondCreatorWins => {
                entity_store.put_comment(pushed).await?;
                Ok(EntityOutcome::Processed)
            }
            CommentResolution::DeleteWins => Ok(EntityOutcome::Dropped),
            CommentResolution::ManualConflict => {
                let server_version = serde_json::to_value(&server_state)?;
                let reason = "concurrent content edit".to_string();
                let record = ConflictRecord {
                    id: sync_core::EntityId::new(),
                    entity_type: EntityKind::Comment,
                    entity_id: change.id,
                    org_id: org_id.clone(),
                    local_version: change.data.clone(),
                    server_version: server_version.clone(),
                    local_clock: pushed.meta.vector_clock.clone(),
                    server_clock: server_state.meta.vector_clock.clone(),
                    conflict_reason: reason.clone(),
                    resolution_strategy: None,
                    resolved_version: None,
                    resolved_by: None,
                    resolved_at: None,
                    created_at: Utc::now(),
                };
                conflict_store.record(record).await?;
                Ok(EntityOutcome::Conflict(PushConflict {
                    entity_type: EntityKind::Comment,
                    entity_id: change.id,
                    conflict_reason: reason,
                    server_version,
                    server_vector_clock: server_state.meta.vector_clock,
                }))
            }
        },
    }
}
