//! Server-side mirror of the pull/push/conflict-resolution wire shapes.
//! Kept as an independent definition from
//! `sync-client::types` rather than a shared crate so either side's wire
//! contract can evolve without forcing a lockstep release — the shapes must
//! still match, and that's asserted by integration tests in `apps/server`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sync_core::{Comment, EntityId, EntityKind, Task, Tombstone, VectorClock};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub tasks: Vec<Task>,
    pub comments: Vec<Comment>,
    pub tombstones: Vec<Tombstone>,
    pub server_vector_clock: VectorClock,
    pub has_more: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

impl From<ChangeOperation> for sync_core::SyncOperation {
    fn from(value: ChangeOperation) -> Self {
        match value {
            ChangeOperation::Create => sync_core::SyncOperation::Create,
            ChangeOperation::Update => sync_core::SyncOperation::Update,
            ChangeOperation::Delete => sync_core::SyncOperation::Delete,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityChange {
    pub id: EntityId,
    pub operation: ChangeOperation,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeBatch {
    #[serde(default)]
    pub tasks: Vec<EntityChange>,
    #[serde(default)]
    pub comments: Vec<EntityChange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub device_id: String,
    pub vector_clock: VectorClock,
    pub timestamp: i64,
    pub changes: ChangeBatch,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConflict {
    pub entity_type: EntityKind,
    pub entity_id: EntityId,
    pub conflict_reason: String,
    pub server_version: serde_json::Value,
    pub server_vector_clock: VectorClock,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanedEntity {
    pub entity_type: EntityKind,
    pub entity_id: EntityId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub success: bool,
    pub processed: i64,
    pub conflicts: Vec<PushConflict>,
    pub orphaned: Vec<OrphanedEntity>,
    pub server_vector_clock: VectorClock,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionChoice {
    Local,
    Server,
    Custom,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    pub resolution: ResolutionChoice,
    pub custom_resolution: Option<serde_json::Value>,
}
