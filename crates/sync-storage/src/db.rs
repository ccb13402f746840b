//! Connection pool and single-writer actor.
//!
//! SQLite allows only one writer at a time; under concurrent local
//! mutation and sync-cycle writes a naive pool produces `SQLITE_BUSY`.
//! Reads are served directly from the `r2d2` pool (SQLite readers don't
//! contend with each other in WAL mode); every write is funneled through
//! one dedicated task that owns its own connection and executes closures
//! sent to it in order, so writes are serialized without needing
//! database-level retry loops.

use crate::errors::{Result, StorageError};
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledSqlite = PooledConnection<ConnectionManager<SqliteConnection>>;

pub fn build_pool(database_url: &str) -> Result<Arc<SqlitePool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .build(manager)
        .map_err(StorageError::Pool)?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &SqlitePool) -> Result<PooledSqlite> {
    pool.get().map_err(StorageError::Pool)
}

type WriteJob = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Handle to the single writer task. Cheap to clone; every clone shares
/// the same underlying connection and job queue.
#[derive(Clone)]
pub struct WriteHandle {
    sender: mpsc::Sender<WriteJob>,
}

impl WriteHandle {
    /// Spawn the writer actor on a dedicated blocking thread, owning a
    /// fresh connection to `database_url`.
    pub fn spawn(database_url: &str) -> Result<Self> {
        let (sender, mut receiver) = mpsc::channel::<WriteJob>(256);
        let mut conn = SqliteConnection::establish(database_url)
            .map_err(diesel::result::ConnectionError::from)
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        std::thread::Builder::new()
            .name("sync-storage-writer".into())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    job(&mut conn);
                }
            })
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        Ok(Self { sender })
    }

    /// Run `f` against the writer's connection and await its result.
    /// `f` runs on the writer thread, never on the calling task.
    pub async fn exec<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: WriteJob = Box::new(move |conn| {
            let result = f(conn);
            let _ = reply_tx.send(result);
        });
        self.sender
            .send(job)
            .await
            .map_err(|_| StorageError::WriterGone)?;
        reply_rx.await.map_err(|_| StorageError::WriterGone)?
    }
}

pub fn run_migrations(conn: &mut SqliteConnection) -> Result<()> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
    conn.run_pending_migrations(MIGRATIONS)
        .map(|_| ())
        .map_err(|e| StorageError::Migration(e.to_string()))
}
