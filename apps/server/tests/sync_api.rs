use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use sync_server_bin::api;
use sync_server_bin::state::AppState;
use sync_storage::{build_pool, run_migrations, ConflictStore, DeviceRegistry, EntityStore, SyncLogWriter, TombstoneJanitor, WriteHandle};
use tower::ServiceExt;

fn setup_state() -> (tempfile::TempPath, Arc<AppState>) {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.into_temp_path();
    let url = path.to_str().unwrap().to_string();

    let pool = build_pool(&url).unwrap();
    let mut conn = pool.get().unwrap();
    run_migrations(&mut conn).unwrap();
    drop(conn);

    let writer = WriteHandle::spawn(&url).unwrap();
    let state = Arc::new(AppState::new(
        EntityStore::new(pool.clone(), writer.clone()),
        ConflictStore::new(pool.clone(), writer.clone()),
        DeviceRegistry::new(pool.clone(), writer.clone()),
        SyncLogWriter::new(pool.clone(), writer.clone()),
        Arc::new(TombstoneJanitor::new(pool, writer)),
    ));
    (path, state)
}

#[tokio::test]
async fn pull_without_bearer_token_is_unauthorized() {
    let (_path, state) = setup_state();
    let app = api::sync::router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/sync/pull/?since=0&limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pull_with_unregistered_device_still_returns_empty_delta() {
    let (_path, state) = setup_state();
    let app = api::sync::router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/sync/pull/?since=0&limit=10")
                .header("authorization", "Bearer user-1:org-1")
                .header("x-device-id", "device-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn push_rejects_device_not_owned_by_caller() {
    let (_path, state) = setup_state();
    let app = api::sync::router(state);

    let body = serde_json::json!({
        "deviceId": "device-1",
        "vectorClock": {},
        "timestamp": 0,
        "changes": { "tasks": [], "comments": [] },
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sync/push/")
                .header("authorization", "Bearer user-1:org-1")
                .header("x-device-id", "device-1")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
