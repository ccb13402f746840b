use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sync_server_bin::api;
use sync_server_bin::state::AppState;
use sync_storage::{build_pool, run_migrations, ConflictStore, DeviceRegistry, EntityStore, SyncLogWriter, TombstoneJanitor, WriteHandle};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const TOMBSTONE_SWEEP_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let database_url = std::env::var("SYNC_DATABASE_URL").unwrap_or_else(|_| "sync-server.sqlite3".into());
    let bind_addr: SocketAddr = std::env::var("SYNC_BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.into())
        .parse()?;

    let pool = build_pool(&database_url)?;
    {
        let mut conn = pool.get()?;
        run_migrations(&mut conn)?;
    }
    let writer = WriteHandle::spawn(&database_url)?;

    let entity_store = EntityStore::new(pool.clone(), writer.clone());
    let conflict_store = ConflictStore::new(pool.clone(), writer.clone());
    let device_registry = DeviceRegistry::new(pool.clone(), writer.clone());
    let sync_log = SyncLogWriter::new(pool.clone(), writer.clone());
    let tombstone_janitor = Arc::new(TombstoneJanitor::new(pool.clone(), writer.clone()));

    let state = Arc::new(AppState::new(
        entity_store,
        conflict_store,
        device_registry,
        sync_log,
        tombstone_janitor.clone(),
    ));

    tokio::spawn(sync_server::tombstone_job::run_forever(
        tombstone_janitor,
        Duration::from_secs(TOMBSTONE_SWEEP_INTERVAL_SECS),
    ));

    let app = api::sync::router(state).layer(TraceLayer::new_for_http());
    tracing::info!(%bind_addr, "starting sync server");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
