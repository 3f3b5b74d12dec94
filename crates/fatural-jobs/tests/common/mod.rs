#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use fatural_core::{
    BillRecord, BillRepository, CompletionUpdate, DuplicateUpdate, Error, ExtractedBill,
    ExtractionBackend, NearestCandidate, ProcessingJob, Result, Vector,
};
use fatural_db::{MemoryBillRepository, MemoryBlobStore};
use fatural_inference::mock::{MockEmbeddingBackend, MockExtractionBackend};
use fatural_jobs::{DeliveryAdapter, PipelineConfig, PipelineOrchestrator};

pub struct Harness {
    pub repo: MemoryBillRepository,
    pub blobs: MemoryBlobStore,
    pub extraction: MockExtractionBackend,
    pub embedding: MockEmbeddingBackend,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub adapter: Arc<DeliveryAdapter>,
}

impl Harness {
    pub fn new(extraction: MockExtractionBackend, embedding: MockEmbeddingBackend) -> Self {
        Self::with_config(PipelineConfig::default(), extraction, embedding)
    }

    pub fn with_config(
        config: PipelineConfig,
        extraction: MockExtractionBackend,
        embedding: MockEmbeddingBackend,
    ) -> Self {
        Self::layered(
            config,
            extraction,
            embedding,
            |repo| Arc::new(repo),
            |extraction| Arc::new(extraction),
        )
    }

    /// Harness whose orchestrator reaches the repository and extraction
    /// backend through the given wrappers. The fields still expose the
    /// unwrapped in-memory stores.
    pub fn layered(
        config: PipelineConfig,
        extraction: MockExtractionBackend,
        embedding: MockEmbeddingBackend,
        wrap_repo: impl FnOnce(MemoryBillRepository) -> Arc<dyn BillRepository>,
        wrap_extraction: impl FnOnce(MockExtractionBackend) -> Arc<dyn ExtractionBackend>,
    ) -> Self {
        let repo = MemoryBillRepository::new();
        let blobs = MemoryBlobStore::new();
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            &config,
            wrap_repo(repo.clone()),
            Arc::new(blobs.clone()),
            wrap_extraction(extraction.clone()),
            Arc::new(embedding.clone()),
        ));
        let adapter = Arc::new(DeliveryAdapter::new(orchestrator.clone()));
        Self {
            repo,
            blobs,
            extraction,
            embedding,
            orchestrator,
            adapter,
        }
    }

    /// Store `data` as an upload for `company_id` and return the pending bill's job.
    pub fn upload(&self, company_id: Uuid, path: &str, data: &[u8]) -> ProcessingJob {
        self.blobs.put(path, data.to_vec()).unwrap();
        let mut bill = BillRecord::pending(company_id, path);
        bill.mime_type = Some("image/jpeg".to_string());
        self.repo.insert(bill.clone()).unwrap();
        job_for(&bill)
    }

    pub fn record(&self, bill_id: Uuid) -> BillRecord {
        self.repo.get_unscoped(bill_id).unwrap().unwrap()
    }
}

pub fn job_for(bill: &BillRecord) -> ProcessingJob {
    ProcessingJob {
        bill_id: bill.id,
        company_id: bill.company_id,
        storage_path: bill.storage_path.clone(),
        mime_type: bill
            .mime_type
            .clone()
            .unwrap_or_else(|| "image/jpeg".to_string()),
        uploaded_at: Utc::now(),
    }
}

pub fn receipt(vendor: &str, number: &str, total: f64) -> ExtractedBill {
    serde_json::from_value(serde_json::json!({
        "vendor_name": vendor,
        "vendor_tax_number": "810000001",
        "bill_number": number,
        "bill_date": "14/03/2026",
        "total_amount": total,
        "line_items": [
            { "description": "Bread", "quantity": 2.0, "unit_price": 0.5, "total_price": 1.0 }
        ],
        "confidence_score": 0.92
    }))
    .unwrap()
}

/// Tracks how many extractions run at once.
#[derive(Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl Gauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// Extraction backend that records concurrency on a shared [`Gauge`].
pub struct GaugedExtraction {
    inner: MockExtractionBackend,
    gauge: Arc<Gauge>,
}

impl GaugedExtraction {
    pub fn new(inner: MockExtractionBackend, gauge: Arc<Gauge>) -> Self {
        Self { inner, gauge }
    }
}

#[async_trait]
impl ExtractionBackend for GaugedExtraction {
    async fn extract(&self, data: &[u8], mime_type: &str) -> Result<ExtractedBill> {
        let now = self.gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);
        self.gauge.total.fetch_add(1, Ordering::SeqCst);
        let result = self.inner.extract(data, mime_type).await;
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Which repository calls fail.
#[derive(Default)]
pub struct Faults {
    pub search: AtomicBool,
    pub commit: AtomicBool,
    pub fail: AtomicBool,
}

/// In-memory repository with switchable failures.
pub struct FaultyRepo {
    inner: MemoryBillRepository,
    faults: Arc<Faults>,
}

impl FaultyRepo {
    pub fn new(inner: MemoryBillRepository, faults: Arc<Faults>) -> Self {
        Self { inner, faults }
    }

    fn check(flag: &AtomicBool, err: impl FnOnce() -> Error) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(err())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BillRepository for FaultyRepo {
    async fn get(&self, company_id: Uuid, bill_id: Uuid) -> Result<Option<BillRecord>> {
        self.inner.get(company_id, bill_id).await
    }

    async fn begin_processing(&self, company_id: Uuid, bill_id: Uuid) -> Result<bool> {
        self.inner.begin_processing(company_id, bill_id).await
    }

    async fn nearest_completed(
        &self,
        company_id: Uuid,
        vector: &Vector,
    ) -> Result<Option<NearestCandidate>> {
        Self::check(&self.faults.search, || Error::Search("index unavailable".into()))?;
        self.inner.nearest_completed(company_id, vector).await
    }

    async fn commit_completed(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
        update: &CompletionUpdate,
    ) -> Result<()> {
        Self::check(&self.faults.commit, || Error::Internal("connection reset".into()))?;
        self.inner.commit_completed(company_id, bill_id, update).await
    }

    async fn commit_duplicate(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
        update: &DuplicateUpdate,
    ) -> Result<()> {
        Self::check(&self.faults.commit, || Error::Internal("connection reset".into()))?;
        self.inner.commit_duplicate(company_id, bill_id, update).await
    }

    async fn commit_failed(&self, company_id: Uuid, bill_id: Uuid, error: &str) -> Result<()> {
        Self::check(&self.faults.fail, || Error::Internal("connection reset".into()))?;
        self.inner.commit_failed(company_id, bill_id, error).await
    }
}
