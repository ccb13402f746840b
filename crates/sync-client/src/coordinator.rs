//! Device-side sync coordinator.
//!
//! A single cooperative cycle: pull always precedes push, suspension only
//! happens at the two network round-trips, and a cycle invoked while one is
//! already running just sets a "pending" flag rather than running
//! concurrently (teacher analogue: `DeviceSyncRuntimeState::cycle_mutex`).

use crate::api_client::SyncApiClient;
use crate::error::{ApiRetryClass, Result, SyncClientError};
use crate::types::{ChangeBatch, ChangeOperation, EntityChange, PushRequest};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sync_core::applicator::{apply_remote, cascade_tombstone, ApplyDecision};
use sync_core::constants::{MAX_PULL_PAGES, PULL_DEFAULT_LIMIT, PUSH_MAX_BATCH};
use sync_core::{DeviceId, EntityKind, OrgId, SyncOperation};
use sync_storage::{DeviceState, EntityStore, FailureKind, Outbox};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Reason a sync cycle was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Periodic,
    Reconnect,
    UserAction,
    DebouncedMutation,
    Startup,
}

/// Supplies the bearer token and transparently refreshes it on a 401 and
/// retries once. JWT issuance itself is out of scope; this trait only
/// consumes validity.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn current_token(&self) -> String;
    async fn refresh(&self) -> Result<String>;
}

/// Notified of conditions that must be surfaced to the user: a conflict
/// landed, an outbox entry got permission-denied, or one failed for good.
/// The headless device-agent binary implements this with a logging no-op;
/// a future UI layer would implement it for real.
pub trait SyncEventSink: Send + Sync {
    fn conflict_detected(&self, entity_id: sync_core::EntityId) {
        let _ = entity_id;
    }
    fn permission_denied(&self, entity_id: sync_core::EntityId) {
        let _ = entity_id;
    }
    fn outbox_entry_permanently_failed(&self, entity_id: sync_core::EntityId, error: &str) {
        let _ = (entity_id, error);
    }
}

pub struct LoggingEventSink;

impl SyncEventSink for LoggingEventSink {
    fn conflict_detected(&self, entity_id: sync_core::EntityId) {
        warn!(%entity_id, "conflict detected, surfaced to UI");
    }
    fn permission_denied(&self, entity_id: sync_core::EntityId) {
        warn!(%entity_id, "outbox entry permanently denied");
    }
    fn outbox_entry_permanently_failed(&self, entity_id: sync_core::EntityId, error: &str) {
        warn!(%entity_id, error, "outbox entry permanently failed");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    /// Another cycle was already running; this request was merged into it
    /// via the pending flag.
    Deferred,
}

pub struct SyncCoordinator {
    api: SyncApiClient,
    entity_store: Arc<EntityStore>,
    outbox: Arc<Outbox>,
    device_state: Arc<DeviceState>,
    auth: Arc<dyn AuthProvider>,
    sink: Arc<dyn SyncEventSink>,
    device_id: DeviceId,
    org_id: OrgId,
    cycle_lock: Mutex<()>,
    pending: AtomicBool,
}

impl SyncCoordinator {
    pub fn new(
        api: SyncApiClient,
        entity_store: Arc<EntityStore>,
        outbox: Arc<Outbox>,
        device_state: Arc<DeviceState>,
        auth: Arc<dyn AuthProvider>,
        sink: Arc<dyn SyncEventSink>,
        device_id: DeviceId,
        org_id: OrgId,
    ) -> Self {
        Self {
            api,
            entity_store,
            outbox,
            device_state,
            auth,
            sink,
            device_id,
            org_id,
            cycle_lock: Mutex::new(()),
            pending: AtomicBool::new(false),
        }
    }

    pub async fn run_cycle(self: &Arc<Self>, trigger: SyncTrigger) -> Result<CycleOutcome> {
        let _guard = match self.cycle_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(?trigger, "cycle already running, marking pending");
                self.pending.store(true, Ordering::SeqCst);
                return Ok(CycleOutcome::Deferred);
            }
        };

        info!(?trigger, "sync cycle starting");
        self.pull_phase().await?;
        self.push_phase().await?;
        info!("sync cycle complete");

        if self.pending.swap(false, Ordering::SeqCst) {
            drop(_guard);
            return self.run_cycle(SyncTrigger::Periodic).await;
        }
        Ok(CycleOutcome::Completed)
    }

    async fn pull_phase(&self) -> Result<()> {
        let mut pages: u32 = 0;
        loop {
            let since_ms = self
                .device_state
                .last_sync_time()?
                .map(|t| t.timestamp_millis())
                .unwrap_or(0);

            let response = self
                .api
                .pull(
                    &self.auth.current_token(),
                    self.device_id.as_str(),
                    since_ms,
                    PULL_DEFAULT_LIMIT,
                )
                .await?;

            for task in response.tasks {
                self.apply_remote_task(task).await?;
            }
            for comment in response.comments {
                self.apply_remote_comment(comment).await?;
            }
            for tombstone in response.tombstones {
                self.apply_tombstone(tombstone).await?;
            }

            let local_clock = self.device_state.local_clock()?;
            let merged = sync_core::clock::merge(&local_clock, &response.server_vector_clock);
            self.device_state
                .update_after_pull(merged, response.timestamp)
                .await?;

            pages += 1;
            if !response.has_more || pages >= MAX_PULL_PAGES {
                break;
            }
        }
        Ok(())
    }

    async fn apply_remote_task(&self, task: sync_core::Task) -> Result<()> {
        let local = self.entity_store.get_task(task.id, true)?;
        let has_pending = self.outbox.contains_entity(task.id)?;
        let decision = apply_remote(
            local.as_ref().map(|t| &t.meta.vector_clock),
            &task.meta.vector_clock,
            has_pending,
        );
        match decision {
            ApplyDecision::AcceptRemote | ApplyDecision::AcceptRemoteDiscardOutbox => {
                self.entity_store.put_task(task).await?;
            }
            ApplyDecision::KeepLocal | ApplyDecision::DiscardRemoteStale => {}
            ApplyDecision::Conflict => {
                self.sink.conflict_detected(task.id);
            }
        }
        Ok(())
    }

    async fn apply_remote_comment(&self, comment: sync_core::Comment) -> Result<()> {
        let local = self.entity_store.get_comment(comment.id, true)?;
        let has_pending = self.outbox.contains_entity(comment.id)?;
        let decision = apply_remote(
            local.as_ref().map(|c| &c.meta.vector_clock),
            &comment.meta.vector_clock,
            has_pending,
        );
        match decision {
            ApplyDecision::AcceptRemote | ApplyDecision::AcceptRemoteDiscardOutbox => {
                self.entity_store.put_comment(comment).await?;
            }
            ApplyDecision::KeepLocal | ApplyDecision::DiscardRemoteStale => {}
            ApplyDecision::Conflict => {
                self.sink.conflict_detected(comment.id);
            }
        }
        Ok(())
    }

    async fn apply_tombstone(&self, tombstone: sync_core::Tombstone) -> Result<()> {
        let children = if tombstone.entity_type == EntityKind::Task {
            self.entity_store.find_child_comment_ids(tombstone.entity_id)?
        } else {
            Vec::new()
        };
        let outbox_targets: Vec<sync_core::EntityId> =
            std::iter::once(tombstone.entity_id).chain(children.iter().copied()).collect();
        let cascade = cascade_tombstone(tombstone.entity_id, &children, &outbox_targets);

        for id in &cascade.soft_delete_entity_ids {
            let is_task = *id == tombstone.entity_id && tombstone.entity_type == EntityKind::Task;
            let already_deleted = if is_task {
                self.entity_store
                    .get_task(*id, true)?
                    .map(|t| t.meta.is_deleted())
                    .unwrap_or(true)
            } else {
                self.entity_store
                    .get_comment(*id, true)?
                    .map(|c| c.meta.is_deleted())
                    .unwrap_or(true)
            };
            if already_deleted {
                continue;
            }
            if is_task {
                self.entity_store
                    .soft_delete_task(
                        *id,
                        tombstone.org_id.clone(),
                        tombstone.deleted_by.clone(),
                        tombstone.deleted_from_device.clone(),
                        tombstone.vector_clock.clone(),
                        sync_core::constants::tombstone_ttl(),
                    )
                    .await?;
            } else {
                self.entity_store
                    .soft_delete_comment(
                        *id,
                        tombstone.org_id.clone(),
                        tombstone.deleted_by.clone(),
                        tombstone.deleted_from_device.clone(),
                        tombstone.vector_clock.clone(),
                        sync_core::constants::tombstone_ttl(),
                    )
                    .await?;
            }
        }

        for id in &cascade.drop_outbox_entity_ids {
            self.outbox.remove_for_entity(*id).await?;
        }
        Ok(())
    }

    async fn push_phase(&self) -> Result<()> {
        let entries = self.outbox.drain(PUSH_MAX_BATCH as i64)?;
        if entries.is_empty() {
            return Ok(());
        }

        let request = self.build_push_request(&entries)?;

        match self
            .api
            .push(&self.auth.current_token(), self.device_id.as_str(), &request)
            .await
        {
            Ok(response) => self.apply_push_response(&entries, response).await,
            Err(err) => self.handle_push_failure(&entries, &request, err).await,
        }
    }

    fn build_push_request(&self, entries: &[sync_core::OutboxEntry]) -> Result<PushRequest> {
        let mut batch = ChangeBatch::default();
        for entry in entries {
            let change = EntityChange {
                id: entry.entity_id,
                operation: match entry.operation {
                    SyncOperation::Create => ChangeOperation::Create,
                    SyncOperation::Update => ChangeOperation::Update,
                    SyncOperation::Delete => ChangeOperation::Delete,
                },
                data: entry.payload.clone(),
            };
            match entry.entity_type {
                EntityKind::Task => batch.tasks.push(change),
                EntityKind::Comment => batch.comments.push(change),
            }
        }

        Ok(PushRequest {
            device_id: self.device_id.as_str().to_string(),
            vector_clock: self.device_state.local_clock()?,
            timestamp: chrono::Utc::now().timestamp_millis(),
            changes: batch,
        })
    }

    async fn apply_push_response(
        &self,
        entries: &[sync_core::OutboxEntry],
        response: crate::types::PushResponse,
    ) -> Result<()> {
        self.device_state.merge_clock(response.server_vector_clock).await?;

        let conflicted: std::collections::HashSet<_> =
            response.conflicts.iter().map(|c| c.entity_id).collect();
        let orphaned: std::collections::HashSet<_> =
            response.orphaned.iter().map(|o| o.entity_id).collect();

        for entry in entries {
            if conflicted.contains(&entry.entity_id) {
                self.outbox.ack(entry.id).await?;
                self.sink.conflict_detected(entry.entity_id);
            } else if orphaned.contains(&entry.entity_id) {
                self.outbox.ack(entry.id).await?;
            } else {
                self.outbox.ack(entry.id).await?;
            }
        }
        Ok(())
    }

    async fn handle_push_failure(
        &self,
        entries: &[sync_core::OutboxEntry],
        request: &PushRequest,
        err: SyncClientError,
    ) -> Result<()> {
        match err.retry_class() {
            ApiRetryClass::ReauthRequired => {
                let refreshed_token = self.auth.refresh().await?;
                match self
                    .api
                    .push(&refreshed_token, self.device_id.as_str(), request)
                    .await
                {
                    Ok(response) => self.apply_push_response(entries, response).await,
                    Err(retry_err) => {
                        warn!(
                            error = %retry_err,
                            "push retry after token refresh failed, leaving outbox for next cycle"
                        );
                        Ok(())
                    }
                }
            }
            ApiRetryClass::PermissionDenied => {
                for entry in entries {
                    self.outbox
                        .fail(
                            entry.id,
                            err.to_string(),
                            FailureKind::PermissionDenied,
                            chrono::Duration::seconds(
                                sync_core::constants::PERIODIC_SYNC_INTERVAL_SECS as i64,
                            ),
                        )
                        .await?;
                    self.sink.permission_denied(entry.entity_id);
                }
                Ok(())
            }
            ApiRetryClass::Retryable | ApiRetryClass::Permanent => {
                for entry in entries {
                    self.outbox
                        .fail(
                            entry.id,
                            err.to_string(),
                            FailureKind::Ordinary,
                            chrono::Duration::seconds(
                                sync_core::constants::PERIODIC_SYNC_INTERVAL_SECS as i64,
                            ),
                        )
                        .await?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticAuth;

    #[async_trait]
    impl AuthProvider for StaticAuth {
        fn current_token(&self) -> String {
            "token".to_string()
        }
        async fn refresh(&self) -> Result<String> {
            Ok("token".to_string())
        }
    }

    #[test]
    fn trigger_variants_are_distinct() {
        assert_ne!(SyncTrigger::Periodic, SyncTrigger::UserAction);
    }
}
