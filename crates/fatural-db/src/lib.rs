//! # fatural-db
//!
//! Persistence and object storage for the fatural bill pipeline.
//!
//! This crate provides:
//! - A connection pool sized to the in-flight job cap
//! - `PgBillRepository`: tenant-scoped bill lookups, conditional lifecycle
//!   writes, and pgvector nearest-neighbour search
//! - `MemoryBillRepository`: the same contract over an in-process map
//! - Blob stores (filesystem, Google Cloud Storage, in-memory)
//!
//! ## Example
//!
//! ```rust,ignore
//! use fatural_db::{BillRepository, Database};
//!
//! let db = Database::connect("postgres://localhost/fatural").await?;
//! let bill = db.bills.get(company_id, bill_id).await?;
//! ```

pub mod bills;
pub mod blob_store;
pub mod memory;
pub mod pool;

pub use bills::PgBillRepository;
pub use blob_store::{BlobStore, FilesystemBlobStore, GcsBlobStore, MemoryBlobStore};
pub use memory::MemoryBillRepository;
pub use pool::{PoolConfig, POOL_HEADROOM};

// Re-export core types for consumers
pub use fatural_core::*;

use tracing::info;

/// Database handle with the bill repository.
pub struct Database {
    pool: sqlx::Pool<sqlx::Postgres>,
    pub bills: PgBillRepository,
}

impl Database {
    /// Create a new database from an existing pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            bills: PgBillRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with a pool sized for the default in-flight cap.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = pool::connect(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Declared length of `bills.fingerprint`; `None` for an unconstrained `vector`.
    pub async fn fingerprint_dimension(&self) -> Result<Option<usize>> {
        let typmod: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT atttypmod FROM pg_attribute
            WHERE attrelid = 'bills'::regclass
              AND attname = 'fingerprint'
              AND NOT attisdropped
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        match typmod {
            None => Err(Error::Config(
                "bills.fingerprint column does not exist".to_string(),
            )),
            Some(m) if m < 0 => Ok(None),
            Some(m) => Ok(Some(m as usize)),
        }
    }

    /// Fail fast when the configured embedding length cannot be stored.
    pub async fn verify_fingerprint_dimension(&self, expected: usize) -> Result<()> {
        let column = self.fingerprint_dimension().await?;
        check_fingerprint_dimension(column, expected)?;
        info!(
            subsystem = "db",
            component = "schema",
            embed_dimension = expected,
            "Fingerprint column matches embedding dimension"
        );
        Ok(())
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        info!(
            subsystem = "db",
            component = "pool",
            op = "close",
            pool_size = self.pool.size(),
            pool_idle = self.pool.num_idle(),
            "Closing database pool"
        );
        self.pool.close().await;
    }
}

/// Compare a column's declared dimension with the configured one.
pub fn check_fingerprint_dimension(column: Option<usize>, expected: usize) -> Result<()> {
    match column {
        Some(declared) if declared != expected => Err(Error::Config(format!(
            "EMBED_DIMENSION is {} but bills.fingerprint is vector({}); \
             every completion would fail to store its fingerprint",
            expected, declared
        ))),
        _ => Ok(()),
    }
}
