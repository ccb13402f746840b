mod config;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use sync_client::{
    AuthProvider, LoggingEventSink, QuotaMonitor, Result as ClientResult, Scheduler, StorageEstimator,
    SyncApiClient, SyncCoordinator, SyncTrigger,
};
use sync_core::{DeviceId, OrgId};
use sync_storage::{build_pool, run_migrations, DeviceState, EntityStore, Outbox, WriteHandle};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Hands out a fixed bearer token. Real deployments exchange this for a
/// `TokenValidator`-compatible refresh flow; token issuance is out of scope
/// here.
struct StaticAuth {
    token: String,
}

#[async_trait]
impl AuthProvider for StaticAuth {
    fn current_token(&self) -> String {
        self.token.clone()
    }

    async fn refresh(&self) -> ClientResult<String> {
        Ok(self.token.clone())
    }
}

/// Estimates usage as the local database file's size against a configured
/// quota ceiling. Platform-native estimators (disk quota APIs, browser
/// storage APIs) would implement the same trait for a real UI build.
struct FileSizeEstimator {
    database_path: String,
    quota_bytes: u64,
}

impl StorageEstimator for FileSizeEstimator {
    fn usage_fraction(&self) -> f64 {
        let size = std::fs::metadata(&self.database_path).map(|m| m.len()).unwrap_or(0);
        size as f64 / self.quota_bytes as f64
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    let pool = build_pool(&config.database_url)?;
    {
        let mut conn = pool.get()?;
        run_migrations(&mut conn)?;
    }
    let writer = WriteHandle::spawn(&config.database_url)?;

    let device_id = DeviceId::new(config.device_id.clone());
    let org_id = OrgId::new(config.org_id.clone());

    let entity_store = Arc::new(EntityStore::new(pool.clone(), writer.clone()));
    let outbox = Arc::new(Outbox::new(pool.clone(), writer.clone()));
    let device_state = Arc::new(DeviceState::new(pool.clone(), writer.clone()));
    device_state.initialize(device_id.clone()).await?;

    let api = SyncApiClient::new(&config.server_url);
    let auth = Arc::new(StaticAuth {
        token: config.auth_token.clone(),
    });

    let coordinator = Arc::new(SyncCoordinator::new(
        api,
        entity_store.clone(),
        outbox.clone(),
        device_state,
        auth,
        Arc::new(LoggingEventSink),
        device_id,
        org_id,
    ));

    let quota_monitor = Arc::new(QuotaMonitor::new(
        FileSizeEstimator {
            database_path: config.database_url.clone(),
            quota_bytes: config.quota_bytes,
        },
        entity_store,
        outbox,
    ));

    tracing::info!(server_url = %config.server_url, "starting sync device agent");

    tokio::spawn(quota_monitor.run_forever(Duration::from_secs(config.quota_interval_secs)));

    if let Err(err) = coordinator.run_cycle(SyncTrigger::Startup).await {
        tracing::warn!(%err, "startup sync cycle failed");
    }

    let (scheduler, _handle) = Scheduler::new(coordinator, Duration::from_secs(config.sync_interval_secs));
    scheduler.run_forever().await;
    Ok(())
}
