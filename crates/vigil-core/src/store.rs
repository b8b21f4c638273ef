//! Persistent job state storage using SQLite
//!
//! Holds the per-job aggregate rows and the append-only run history so both
//! survive process restarts. Every write is awaited before the caller
//! proceeds; there is no write-behind buffering.

mod migrations;
mod queries;


use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// SQLite-backed state store
pub struct StateStore {
    pool: Pool<Sqlite>,
}

impl StateStore {
    /// Open (or create) a store at the given database path.
    pub async fn from_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::InvalidConfig(format!("failed to create directory: {e}"))
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        // synchronous=FULL: a run recorded before a crash must be visible
        // after the next start.
        let options = SqliteConnectOptions::from_str(&url)?
            .synchronous(SqliteSynchronous::Full);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Close the underlying pool, waiting for checked-out connections to be
    /// returned. Call after in-flight executions have quiesced.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Open a store with the pre-acquire liveness ping disabled.
    ///
    /// Test-only: under `tokio`'s paused clock, the async ping sqlx performs
    /// when handing out an idle connection yields to the scheduler, which then
    /// auto-advances straight to the acquire timeout and returns
    /// `PoolTimedOut`. Disabling the ping keeps a warm acquire synchronous, so
    /// tests running under `start_paused` can touch the store. Local SQLite
    /// connections do not go stale, so this changes nothing observable.
    #[cfg(test)]
    pub(crate) async fn from_path_for_tests(path: &Path) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&url)?
            .synchronous(SqliteSynchronous::Full);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .test_before_acquire(false)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Eagerly open `n` pooled connections, then return them to the idle set.
    ///
    /// Test-only: under `tokio`'s paused clock, sqlx's acquire timeout
    /// auto-advances and fires before a blocking connect can complete, so
    /// tests that run under `start_paused` pre-warm the pool in real time and
    /// only pause afterward.
    #[cfg(test)]
    pub(crate) async fn warm_pool(&self, n: usize) {
        let mut held = Vec::with_capacity(n);
        for _ in 0..n {
            held.push(self.pool.acquire().await.expect("warm pool"));
        }
    }
}
