//! Pipeline-facing clients with timeout and fallback policy.
//!
//! Neither client ever returns an error: a failed or timed-out extraction
//! degrades to [`ExtractedBill::fallback`], a failed embedding to the zero
//! vector. Both outcomes are logged at WARN.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use fatural_core::{
    defaults, is_zero_vector, EmbeddingBackend, Error, ExtractedBill, ExtractionBackend, Result,
    Vector,
};

/// Wraps an [`ExtractionBackend`] with a timeout, eager validation, and the
/// sentinel fallback.
#[derive(Clone)]
pub struct ExtractionClient {
    backend: Arc<dyn ExtractionBackend>,
    timeout: Duration,
}

impl ExtractionClient {
    pub fn new(backend: Arc<dyn ExtractionBackend>) -> Self {
        Self {
            backend,
            timeout: Duration::from_secs(defaults::EXTRACT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Extract a bill, or the fallback sentinel if anything goes wrong.
    #[instrument(skip(self, data), fields(subsystem = "inference", component = "extraction_client", op = "extract", size_bytes = data.len()))]
    pub async fn extract(&self, data: &[u8], mime_type: &str) -> ExtractedBill {
        match self.try_extract(data, mime_type).await {
            Ok(bill) => bill,
            Err(e) => {
                warn!(
                    model = %self.backend.model_name(),
                    error = %e,
                    "Extraction failed; using fallback record"
                );
                ExtractedBill::fallback()
            }
        }
    }

    async fn try_extract(&self, data: &[u8], mime_type: &str) -> Result<ExtractedBill> {
        let start = Instant::now();
        let bill = tokio::time::timeout(self.timeout, self.backend.extract(data, mime_type))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "extraction exceeded {}s",
                    self.timeout.as_secs_f64()
                ))
            })??;
        bill.validate()?;
        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            confidence = bill.confidence_score,
            "Extraction accepted"
        );
        Ok(bill)
    }
}

/// Wraps an [`EmbeddingBackend`] with a timeout, a dimension check, and the
/// zero-vector fallback.
#[derive(Clone)]
pub struct EmbeddingClient {
    backend: Arc<dyn EmbeddingBackend>,
    dimension: usize,
    timeout: Duration,
}

impl EmbeddingClient {
    /// Client expecting vectors of `dimension` components.
    pub fn new(backend: Arc<dyn EmbeddingBackend>, dimension: usize) -> Self {
        Self {
            backend,
            dimension,
            timeout: Duration::from_secs(defaults::EMBED_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// The degraded result.
    pub fn zero_vector(&self) -> Vector {
        Vector::from(vec![0.0; self.dimension])
    }

    /// Embed one text, or return the zero vector if anything goes wrong.
    #[instrument(skip(self, text), fields(subsystem = "inference", component = "embedding_client", op = "embed", text_len = text.len()))]
    pub async fn embed(&self, text: &str) -> Vector {
        match self.try_embed(text).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(
                    model = %self.backend.model_name(),
                    error = %e,
                    "Embedding failed; using zero vector"
                );
                self.zero_vector()
            }
        }
    }

    async fn try_embed(&self, text: &str) -> Result<Vector> {
        let input = [text.to_string()];
        let vectors = tokio::time::timeout(self.timeout, self.backend.embed_texts(&input))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "embedding exceeded {}s",
                    self.timeout.as_secs_f64()
                ))
            })??;

        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("No embedding returned".to_string()))?;
        let values = vector.as_slice();
        if values.len() != self.dimension {
            return Err(Error::Embedding(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::Embedding("non-finite component in embedding".to_string()));
        }
        if is_zero_vector(values) {
            debug!("Backend returned the zero vector");
        }
        Ok(vector)
    }
}
