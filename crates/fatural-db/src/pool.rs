//! Postgres pool sized to the worker's in-flight cap.
//!
//! A job holds at most one connection at a time (the claim, the search, or
//! one terminal commit transaction), so `max_in_flight + POOL_HEADROOM`
//! connections keep every in-flight commit from queueing on the pool.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use fatural_core::{defaults, Error, Result};

/// Connections beyond the in-flight cap, for startup checks and shutdown.
pub const POOL_HEADROOM: u32 = 1;

/// Optional override; may raise the pool above the in-flight floor, never lower it.
pub const ENV_DB_MAX_CONNECTIONS: &str = "DB_MAX_CONNECTIONS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    /// How long a job waits for a free connection.
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    /// One connection per in-flight job plus headroom.
    pub fn for_in_flight(max_in_flight: usize) -> Self {
        let jobs = u32::try_from(max_in_flight.max(1)).unwrap_or(u32::MAX - POOL_HEADROOM);
        Self {
            max_connections: jobs.saturating_add(POOL_HEADROOM),
            acquire_timeout: Duration::from_secs(defaults::COMMIT_TIMEOUT_SECS),
        }
    }

    /// [`PoolConfig::for_in_flight`], raised by `DB_MAX_CONNECTIONS` if larger.
    pub fn from_env(max_in_flight: usize) -> Self {
        let floor = Self::for_in_flight(max_in_flight);
        let requested = std::env::var(ENV_DB_MAX_CONNECTIONS)
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok());
        floor.with_max_connections(requested.unwrap_or(0))
    }

    /// Raise the connection count; values below the current floor are ignored.
    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = self.max_connections.max(n);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::for_in_flight(defaults::WORKER_MAX_IN_FLIGHT)
    }
}

/// Open a pool with `config`.
pub async fn connect(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database pool ready"
    );
    Ok(pool)
}
