use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use sync_core::{EntityId, OrgId, ReplicationMeta, Task, TaskPriority, TaskStatus, UserId, VectorClock};
use sync_storage::db::{build_pool, run_migrations, WriteHandle};
use sync_storage::entity_store::EntityStore;
use sync_storage::outbox::Outbox;

fn setup() -> (tempfile::TempPath, Arc<sync_storage::SqlitePool>, WriteHandle) {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.into_temp_path();
    let url = path.to_str().unwrap().to_string();

    let pool = build_pool(&url).unwrap();
    let mut conn = pool.get().unwrap();
    run_migrations(&mut conn).unwrap();
    drop(conn);

    let writer = WriteHandle::spawn(&url).unwrap();
    (path, pool, writer)
}

fn sample_task(device: &str) -> Task {
    Task {
        id: EntityId::new(),
        org_id: OrgId::new("org1"),
        project_id: None,
        title: "write tests".into(),
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
            vector_clock: VectorClock::single(sync_core::DeviceId::new(device), 1),
            checksum: String::new(),
            last_modified_by: UserId::new("u1"),
            last_modified_device: sync_core::DeviceId::new(device),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        },
    }
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let (_path, pool, writer) = setup();
    let store = EntityStore::new(pool, writer);
    let task = sample_task("device-a");

    store.put_task(task.clone()).await.unwrap();
    let fetched = store.get_task(task.id, false).unwrap();

    assert_eq!(fetched.unwrap().title, "write tests");
}

#[tokio::test]
async fn soft_deleted_task_hidden_unless_requested() {
    let (_path, pool, writer) = setup();
    let store = EntityStore::new(pool, writer.clone());
    let task = sample_task("device-a");
    store.put_task(task.clone()).await.unwrap();

    store
        .soft_delete_task(
            task.id,
            task.org_id.clone(),
            UserId::new("u1"),
            sync_core::DeviceId::new("device-a"),
            task.meta.vector_clock.clone(),
            chrono::Duration::days(90),
        )
        .await
        .unwrap();

    assert!(store.get_task(task.id, false).unwrap().is_none());
    assert!(store.get_task(task.id, true).unwrap().is_some());
}

#[tokio::test]
async fn delta_since_excludes_requesting_device() {
    let (_path, pool, writer) = setup();
    let store = EntityStore::new(pool, writer);
    let task = sample_task("device-a");
    store.put_task(task.clone()).await.unwrap();

    let earlier = task.meta.created_at - chrono::Duration::seconds(5);
    let from_other = store
        .tasks_delta_since(&task.org_id, earlier, &sync_core::DeviceId::new("device-b"), 100)
        .unwrap();
    assert_eq!(from_other.len(), 1);

    let from_self = store
        .tasks_delta_since(&task.org_id, earlier, &sync_core::DeviceId::new("device-a"), 100)
        .unwrap();
    assert!(from_self.is_empty());
}

#[tokio::test]
async fn outbox_enqueue_drain_ack_round_trip() {
    let (_path, pool, writer) = setup();
    let outbox = Outbox::new(pool, writer);
    let entity_id = EntityId::new();
    outbox
        .enqueue(
            sync_core::EntityKind::Task,
            entity_id,
            sync_core::SyncOperation::Create,
            serde_json::json!({}),
            1,
        )
        .await
        .unwrap();

    let drained = outbox.drain(10).unwrap();
    assert_eq!(drained.len(), 1);
    outbox.ack(drained[0].id).await.unwrap();
    assert!(outbox.drain(10).unwrap().is_empty());
}
