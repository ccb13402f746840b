//! `POST /api/sync/conflicts/<id>/resolve/` handler logic.

use crate::dto::{ResolutionChoice, ResolveConflictRequest};
use crate::error::{Result, ServerError};
use crate::push::server_device_id;
use chrono::Utc;
use sync_core::clock::{increment, merge};
use sync_core::{EntityId, EntityKind, UserId};
use sync_storage::{ConflictStore, EntityStore};
use tracing::info;

/// Applies a user's manual resolution choice to the conflicted entity and
/// removes the conflict record. `local`/`server` replay the already-merged
/// values recorded on the conflict (the client's pushed version and the
/// server's prior version respectively); `custom` applies a caller-supplied
/// replacement.
pub async fn resolve_conflict(
    entity_store: &EntityStore,
    conflict_store: &ConflictStore,
    conflict_id: EntityId,
    resolver: &UserId,
    request: ResolveConflictRequest,
) -> Result<()> {
    let record = conflict_store
        .get(conflict_id)?
        .ok_or_else(|| ServerError::NotFound(format!("conflict {conflict_id} not found")))?;

    let chosen_value = match request.resolution {
        ResolutionChoice::Local => record.local_version.clone(),
        ResolutionChoice::Server => record.server_version.clone(),
        ResolutionChoice::Custom => request
            .custom_resolution
            .ok_or_else(|| ServerError::InvalidRequest("custom resolution missing a value".into()))?,
    };

    let server_device = server_device_id();

    match record.entity_type {
        EntityKind::Task => {
            let mut task: sync_core::Task = serde_json::from_value(chosen_value)?;
            task.meta.vector_clock = increment(&merge(&record.local_clock, &record.server_clock), &server_device);
            task.meta.version += 1;
            task.meta.updated_at = Utc::now();
            entity_store.put_task(task).await?;
        }
        EntityKind::Comment => {
            let mut comment: sync_core::Comment = serde_json::from_value(chosen_value)?;
            comment.meta.vector_clock = increment(&merge(&record.local_clock, &record.server_clock), &server_device);
            comment.meta.version += 1;
            comment.meta.updated_at = Utc::now();
            entity_store.put_comment(comment).await?;
        }
    }

    info!(%conflict_id, %resolver, resolution = ?request.resolution, "conflict resolved");
    conflict_store.remove(conflict_id).await?;
    Ok(())
}
