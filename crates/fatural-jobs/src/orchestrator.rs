//! Pipeline orchestrator: one job from load to terminal commit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use fatural_core::{
    is_zero_vector, BillRepository, BillStatus, CompletionUpdate, DuplicateUpdate, Error,
    ProcessingJob, Result, Vector,
};
use fatural_db::BlobStore;
use fatural_inference::{EmbeddingClient, ExtractionBackend, EmbeddingBackend, ExtractionClient};

use crate::config::PipelineConfig;
use crate::detector::DuplicateDetector;
use crate::lifecycle::BillStateMachine;

/// Why a job was dropped without touching the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No bill with this id exists for the job's tenant.
    NotFound,
    /// The bill is not `pending` (already processed, or in flight elsewhere).
    NotEligible(BillStatus),
    /// Lost the `pending → processing` race to a concurrent delivery.
    AlreadyClaimed,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "bill not found for tenant"),
            Self::NotEligible(status) => write!(f, "bill is {}, not pending", status),
            Self::AlreadyClaimed => write!(f, "bill claimed by another delivery"),
        }
    }
}

/// Result of a successfully handled job.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Completed {
        /// A fingerprint was stored for future duplicate checks.
        fingerprinted: bool,
        /// Extraction failed and the sentinel record was stored.
        fallback: bool,
    },
    Duplicate {
        duplicate_of: Uuid,
        similarity: f64,
    },
    Dropped(DropReason),
}

/// Drives a [`ProcessingJob`] through fetch, extract, embed, detect, commit.
pub struct PipelineOrchestrator {
    lifecycle: BillStateMachine,
    blobs: Arc<dyn BlobStore>,
    extraction: ExtractionClient,
    embedding: EmbeddingClient,
    detector: DuplicateDetector,
    blob_timeout: Duration,
}

impl PipelineOrchestrator {
    pub fn new(
        config: &PipelineConfig,
        repo: Arc<dyn BillRepository>,
        blobs: Arc<dyn BlobStore>,
        extraction: Arc<dyn ExtractionBackend>,
        embedding: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            lifecycle: BillStateMachine::new(repo.clone(), config.commit_timeout),
            blobs,
            extraction: ExtractionClient::new(extraction).with_timeout(config.extract_timeout),
            embedding: EmbeddingClient::new(embedding, config.embed_dimension)
                .with_timeout(config.embed_timeout),
            detector: DuplicateDetector::new(
                repo,
                config.duplicate_threshold,
                config.search_timeout,
            ),
            blob_timeout: config.blob_timeout,
        }
    }

    /// Process one job.
    ///
    /// Missing or ineligible bills are dropped without any write. Once the
    /// bill is claimed, any error moves it to `failed` with the error text
    /// and is then returned to the caller for redelivery handling.
    #[instrument(skip(self, job), fields(subsystem = "pipeline", component = "orchestrator", op = "process", bill_id = %job.bill_id, company_id = %job.company_id))]
    pub async fn process(&self, job: &ProcessingJob) -> Result<ProcessOutcome> {
        let start = Instant::now();

        let Some(record) = self.lifecycle.load(job.company_id, job.bill_id).await? else {
            warn!(reason = %DropReason::NotFound, "Dropping job");
            return Ok(ProcessOutcome::Dropped(DropReason::NotFound));
        };
        if record.status != BillStatus::Pending {
            let reason = DropReason::NotEligible(record.status);
            warn!(%reason, "Dropping job");
            return Ok(ProcessOutcome::Dropped(reason));
        }
        if !self.lifecycle.begin(&record).await? {
            warn!(reason = %DropReason::AlreadyClaimed, "Dropping job");
            return Ok(ProcessOutcome::Dropped(DropReason::AlreadyClaimed));
        }

        match self.run(job).await {
            Ok(outcome) => {
                info!(
                    outcome = ?outcome,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job processed"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(error = %e, "Pipeline failed; marking bill failed");
                if let Err(commit_err) = self
                    .lifecycle
                    .fail(job.company_id, job.bill_id, &e.to_string())
                    .await
                {
                    // Left in `processing`: redeliveries drop it until an operator intervenes.
                    error!(
                        error = %commit_err,
                        pipeline_error = %e,
                        stuck = true,
                        "Failed to record failure on bill"
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(&self, job: &ProcessingJob) -> Result<ProcessOutcome> {
        let data = tokio::time::timeout(self.blob_timeout, self.blobs.get(&job.storage_path))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "blob download exceeded {}s",
                    self.blob_timeout.as_secs_f64()
                ))
            })??;
        debug!(size_bytes = data.len(), storage_path = %job.storage_path, "Blob fetched");

        let extracted = self.extraction.extract(&data, &job.mime_type).await;
        if extracted.is_fallback() {
            // No fingerprint: the sentinel text is identical for every failed document.
            self.commit_completed(job, &extracted, None).await?;
            return Ok(ProcessOutcome::Completed {
                fingerprinted: false,
                fallback: true,
            });
        }

        let vector = self.embedding.embed(&extracted.embedding_text()).await;
        if is_zero_vector(vector.as_slice()) {
            self.commit_completed(job, &extracted, None).await?;
            return Ok(ProcessOutcome::Completed {
                fingerprinted: false,
                fallback: false,
            });
        }

        if let Some(found) = self.detector.find_duplicate(job.company_id, &vector).await? {
            let update = DuplicateUpdate {
                duplicate_of_id: found.bill_id,
                similarity_score: found.similarity,
                processed_at: Utc::now(),
            };
            self.lifecycle
                .mark_duplicate(job.company_id, job.bill_id, &update)
                .await?;
            return Ok(ProcessOutcome::Duplicate {
                duplicate_of: found.bill_id,
                similarity: found.similarity,
            });
        }

        self.commit_completed(job, &extracted, Some(vector)).await?;
        Ok(ProcessOutcome::Completed {
            fingerprinted: true,
            fallback: false,
        })
    }

    async fn commit_completed(
        &self,
        job: &ProcessingJob,
        extracted: &fatural_core::ExtractedBill,
        fingerprint: Option<Vector>,
    ) -> Result<()> {
        let update = CompletionUpdate::from_extraction(extracted, fingerprint, Utc::now())?;
        self.lifecycle
            .complete(job.company_id, job.bill_id, &update)
            .await
    }
}
