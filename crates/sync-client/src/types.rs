//! Wire DTOs for the pull/push/conflict-resolution endpoints.
//!
//! Mirrored server-side by `sync-server::dto`; both sides serialize with
//! `camelCase` and never use `skip_serializing_if`, so absent fields show up
//! as JSON `null` rather than vanishing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sync_core::{Comment, EntityId, Task, Tombstone, VectorClock};

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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityChange {
    pub id: EntityId,
    pub operation: ChangeOperation,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeBatch {
    #[serde(default)]
    pub tasks: Vec<EntityChange>,
    #[serde(default)]
    pub comments: Vec<EntityChange>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.comments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len() + self.comments.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub device_id: String,
    pub vector_clock: VectorClock,
    pub timestamp: i64,
    pub changes: ChangeBatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConflict {
    pub entity_type: sync_core::EntityKind,
    pub entity_id: EntityId,
    pub conflict_reason: String,
    pub server_version: serde_json::Value,
    pub server_vector_clock: VectorClock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanedEntity {
    pub entity_type: sync_core::EntityKind,
    pub entity_id: EntityId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub success: bool,
    pub processed: i64,
    pub conflicts: Vec<PushConflict>,
    pub orphaned: Vec<OrphanedEntity>,
    pub server_vector_clock: VectorClock,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionChoice {
    Local,
    Server,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    pub resolution: ResolutionChoice,
    pub custom_resolution: Option<serde_json::Value>,
}
