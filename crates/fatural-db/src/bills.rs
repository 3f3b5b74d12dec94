//! Bill repository implementation.
//!
//! Lifecycle writes are conditional on the current status so that a
//! redelivered or concurrent job can never regress a bill. Terminal commits
//! run inside a transaction and report `Error::StateConflict` when the row is
//! not `processing` any more.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pgvector::Vector;
use serde_json::Value as JsonValue;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use fatural_core::{
    BillRecord, BillRepository, BillStatus, CompletionUpdate, DuplicateUpdate, Error,
    NearestCandidate, Result,
};

const BILL_COLUMNS: &str = "id, company_id, storage_path, mime_type, vendor_name, \
     vendor_tax_number, bill_number, bill_date, total_amount, currency, line_items, \
     raw_extraction, fingerprint, status, error_message, duplicate_of_id, \
     similarity_score, processed_at, created_at";

/// PostgreSQL implementation of BillRepository.
#[derive(Clone)]
pub struct PgBillRepository {
    pool: Pool<Postgres>,
}

impl PgBillRepository {
    /// Create a new PgBillRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn row_to_bill(row: &PgRow) -> Result<BillRecord> {
        let status: String = row.get("status");
        let status = status
            .parse::<BillStatus>()
            .map_err(Error::Internal)?;

        Ok(BillRecord {
            id: row.get("id"),
            company_id: row.get("company_id"),
            storage_path: row.get("storage_path"),
            mime_type: row.get("mime_type"),
            vendor_name: row.get("vendor_name"),
            vendor_tax_number: row.get("vendor_tax_number"),
            bill_number: row.get("bill_number"),
            bill_date: row.get::<Option<NaiveDate>, _>("bill_date"),
            total_amount: row.get("total_amount"),
            currency: row.get("currency"),
            line_items: row.get::<Option<JsonValue>, _>("line_items"),
            raw_extraction: row.get::<Option<JsonValue>, _>("raw_extraction"),
            fingerprint: row.get::<Option<Vector>, _>("fingerprint"),
            status,
            error_message: row.get("error_message"),
            duplicate_of_id: row.get("duplicate_of_id"),
            similarity_score: row.get("similarity_score"),
            processed_at: row.get::<Option<DateTime<Utc>>, _>("processed_at"),
            created_at: row.get("created_at"),
        })
    }

    fn conflict(bill_id: Uuid, target: BillStatus) -> Error {
        Error::StateConflict(format!(
            "bill {} is not processing; refusing transition to {}",
            bill_id, target
        ))
    }

    /// Insert a bill row as-is. Used by upload paths and fixtures.
    pub async fn insert(&self, bill: &BillRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bills (id, company_id, storage_path, mime_type, vendor_name,
                vendor_tax_number, bill_number, bill_date, total_amount, currency,
                line_items, raw_extraction, fingerprint, status, error_message,
                duplicate_of_id, similarity_score, processed_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(bill.id)
        .bind(bill.company_id)
        .bind(&bill.storage_path)
        .bind(&bill.mime_type)
        .bind(&bill.vendor_name)
        .bind(&bill.vendor_tax_number)
        .bind(&bill.bill_number)
        .bind(bill.bill_date)
        .bind(bill.total_amount)
        .bind(&bill.currency)
        .bind(&bill.line_items)
        .bind(&bill.raw_extraction)
        .bind(&bill.fingerprint)
        .bind(bill.status.as_str())
        .bind(&bill.error_message)
        .bind(bill.duplicate_of_id)
        .bind(bill.similarity_score)
        .bind(bill.processed_at)
        .bind(bill.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Ensure a tenant row exists.
    pub async fn ensure_company(&self, company_id: Uuid, name: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO companies (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(company_id)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl BillRepository for PgBillRepository {
    async fn get(&self, company_id: Uuid, bill_id: Uuid) -> Result<Option<BillRecord>> {
        let query = format!(
            "SELECT {} FROM bills WHERE id = $1 AND company_id = $2",
            BILL_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(bill_id)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::row_to_bill).transpose()
    }

    #[instrument(skip(self), fields(subsystem = "db", component = "bills", op = "begin_processing"))]
    async fn begin_processing(&self, company_id: Uuid, bill_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bills SET status = 'processing'
            WHERE id = $1 AND company_id = $2 AND status = 'pending'
            "#,
        )
        .bind(bill_id)
        .bind(company_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let claimed = result.rows_affected() == 1;
        debug!(claimed, "begin_processing");
        Ok(claimed)
    }

    async fn nearest_completed(
        &self,
        company_id: Uuid,
        vector: &Vector,
    ) -> Result<Option<NearestCandidate>> {
        let row = sqlx::query(
            r#"
            SELECT id, (fingerprint <=> $2)::float8 AS distance
            FROM bills
            WHERE company_id = $1
              AND status = 'completed'
              AND fingerprint IS NOT NULL
            ORDER BY fingerprint <=> $2, created_at, id
            LIMIT 1
            "#,
        )
        .bind(company_id)
        .bind(vector)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Search(format!("nearest-neighbour query failed: {}", e)))?;

        Ok(row.map(|r| NearestCandidate {
            bill_id: r.get("id"),
            distance: r.get::<Option<f64>, _>("distance").unwrap_or(f64::NAN),
        }))
    }

    #[instrument(skip(self, update), fields(subsystem = "db", component = "bills", op = "commit_completed"))]
    async fn commit_completed(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
        update: &CompletionUpdate,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let result = sqlx::query(
            r#"
            UPDATE bills SET
                status = 'completed',
                vendor_name = $3,
                vendor_tax_number = $4,
                bill_number = $5,
                bill_date = $6,
                total_amount = $7,
                currency = $8,
                line_items = $9,
                raw_extraction = $10,
                fingerprint = $11,
                error_message = NULL,
                processed_at = $12
            WHERE id = $1 AND company_id = $2 AND status = 'processing'
            "#,
        )
        .bind(bill_id)
        .bind(company_id)
        .bind(&update.vendor_name)
        .bind(&update.vendor_tax_number)
        .bind(&update.bill_number)
        .bind(update.bill_date)
        .bind(update.total_amount)
        .bind(&update.currency)
        .bind(&update.line_items)
        .bind(&update.raw_extraction)
        .bind(&update.fingerprint)
        .bind(update.processed_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Self::conflict(bill_id, BillStatus::Completed));
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    #[instrument(skip(self, update), fields(subsystem = "db", component = "bills", op = "commit_duplicate"))]
    async fn commit_duplicate(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
        update: &DuplicateUpdate,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // The original must be a completed bill of the same tenant.
        let original: Option<(String,)> = sqlx::query_as(
            "SELECT status FROM bills WHERE id = $1 AND company_id = $2 FOR SHARE",
        )
        .bind(update.duplicate_of_id)
        .bind(company_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        match original {
            Some((status,)) if status == BillStatus::Completed.as_str() => {}
            _ => {
                return Err(Error::StateConflict(format!(
                    "duplicate target {} is not a completed bill of company {}",
                    update.duplicate_of_id, company_id
                )))
            }
        }

        let result = sqlx::query(
            r#"
            UPDATE bills SET
                status = 'duplicate',
                duplicate_of_id = $3,
                similarity_score = $4,
                fingerprint = NULL,
                processed_at = $5
            WHERE id = $1 AND company_id = $2 AND status = 'processing'
            "#,
        )
        .bind(bill_id)
        .bind(company_id)
        .bind(update.duplicate_of_id)
        .bind(update.similarity_score)
        .bind(update.processed_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Self::conflict(bill_id, BillStatus::Duplicate));
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    #[instrument(skip(self, error), fields(subsystem = "db", component = "bills", op = "commit_failed"))]
    async fn commit_failed(&self, company_id: Uuid, bill_id: Uuid, error: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let result = sqlx::query(
            r#"
            UPDATE bills SET status = 'failed', error_message = $3
            WHERE id = $1 AND company_id = $2 AND status = 'processing'
            "#,
        )
        .bind(bill_id)
        .bind(company_id)
        .bind(error)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Self::conflict(bill_id, BillStatus::Failed));
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
