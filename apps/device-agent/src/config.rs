use clap::Parser;

/// Device-side sync process. Runs the periodic pull/push
/// coordinator and the storage quota monitor until killed.
#[derive(Debug, Parser)]
#[command(name = "sync-device-agent")]
pub struct Config {
    /// Base URL of the sync server, e.g. https://sync.example.com
    #[arg(long, env = "SYNC_SERVER_URL")]
    pub server_url: String,

    /// Path to this device's local SQLite database file.
    #[arg(long, env = "SYNC_DATABASE_URL", default_value = "sync-device.sqlite3")]
    pub database_url: String,

    /// This device's server-assigned device id.
    #[arg(long, env = "SYNC_DEVICE_ID")]
    pub device_id: String,

    /// Organization this device syncs on behalf of.
    #[arg(long, env = "SYNC_ORG_ID")]
    pub org_id: String,

    /// Bearer token used to authenticate against the sync server.
    #[arg(long, env = "SYNC_AUTH_TOKEN")]
    pub auth_token: String,

    /// Seconds between periodic sync cycles.
    #[arg(long, default_value_t = sync_core::constants::PERIODIC_SYNC_INTERVAL_SECS)]
    pub sync_interval_secs: u64,

    /// Seconds between storage quota polls.
    #[arg(long, default_value_t = 300)]
    pub quota_interval_secs: u64,

    /// Storage quota assigned to this device, in bytes. Usage is estimated
    /// from the local database file's size against this ceiling.
    #[arg(long, default_value_t = 500 * 1024 * 1024)]
    pub quota_bytes: u64,
}
