//! Core traits for the pipeline's collaborators.
//!
//! Concrete implementations live in `fatural-db` and `fatural-inference`;
//! in-memory versions back the pipeline tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// BILL REPOSITORY
// =============================================================================

/// Persistence boundary for bills.
///
/// Every method is tenant-scoped: a bill id is only ever resolved together
/// with its `company_id`, and no method reads or matches across tenants.
#[async_trait]
pub trait BillRepository: Send + Sync {
    /// Point lookup by (tenant, bill id).
    async fn get(&self, company_id: Uuid, bill_id: Uuid) -> Result<Option<BillRecord>>;

    /// Atomically move `pending → processing`.
    ///
    /// Returns `false` when the bill is missing for the tenant or is no longer
    /// `pending` (a concurrent delivery already claimed it).
    async fn begin_processing(&self, company_id: Uuid, bill_id: Uuid) -> Result<bool>;

    /// Nearest `completed` bill with a fingerprint in the same tenant.
    ///
    /// Ties on distance resolve to the earliest created bill.
    async fn nearest_completed(
        &self,
        company_id: Uuid,
        vector: &Vector,
    ) -> Result<Option<NearestCandidate>>;

    /// Commit `processing → completed` with all extracted fields.
    ///
    /// Fails with `Error::StateConflict` when the bill is not `processing`.
    async fn commit_completed(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
        update: &CompletionUpdate,
    ) -> Result<()>;

    /// Commit `processing → duplicate`. Never stores a fingerprint.
    async fn commit_duplicate(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
        update: &DuplicateUpdate,
    ) -> Result<()>;

    /// Commit `processing → failed` with an error detail.
    async fn commit_failed(&self, company_id: Uuid, bill_id: Uuid, error: &str) -> Result<()>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend that turns document bytes into a structured bill.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Extract a bill from raw document bytes.
    ///
    /// Implementations return errors freely; the fallback policy lives in the
    /// client that wraps them.
    async fn extract(&self, data: &[u8], mime_type: &str) -> Result<ExtractedBill>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for generating embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}
