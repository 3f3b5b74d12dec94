//! Mock backends for deterministic testing.
//!
//! ```rust,ignore
//! use fatural_inference::mock::{MockEmbeddingBackend, MockExtractionBackend};
//!
//! let extraction = MockExtractionBackend::new().with_document(b"receipt-1", bill);
//! let embedding = MockEmbeddingBackend::new(768);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use fatural_core::{EmbeddingBackend, Error, ExtractedBill, ExtractionBackend, Result, Vector};

#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

#[derive(Clone, Default)]
struct ExtractionConfig {
    documents: HashMap<Vec<u8>, ExtractedBill>,
    default: Option<ExtractedBill>,
    latency: Duration,
    fail: bool,
}

/// Extraction backend answering from a table keyed by document bytes.
///
/// Unknown documents get the default bill if one is set, else an error.
#[derive(Clone, Default)]
pub struct MockExtractionBackend {
    config: Arc<ExtractionConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockExtractionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `bill` for documents equal to `data`.
    pub fn with_document(mut self, data: impl Into<Vec<u8>>, bill: ExtractedBill) -> Self {
        Arc::make_mut(&mut self.config)
            .documents
            .insert(data.into(), bill);
        self
    }

    pub fn with_default(mut self, bill: ExtractedBill) -> Self {
        Arc::make_mut(&mut self.config).default = Some(bill);
        self
    }

    /// Set simulated latency for every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).latency = latency;
        self
    }

    /// Fail every call.
    pub fn failing(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().map(|log| log.len()).unwrap_or(0)
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExtractionBackend for MockExtractionBackend {
    async fn extract(&self, data: &[u8], mime_type: &str) -> Result<ExtractedBill> {
        if let Ok(mut log) = self.call_log.lock() {
            log.push(MockCall {
                operation: "extract".to_string(),
                input: format!("{} bytes {}", data.len(), mime_type),
            });
        }
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
        if self.config.fail {
            return Err(Error::Extraction("Simulated failure for testing".to_string()));
        }
        self.config
            .documents
            .get(data)
            .or(self.config.default.as_ref())
            .cloned()
            .ok_or_else(|| Error::Extraction("No mock response for document".to_string()))
    }

    fn model_name(&self) -> &str {
        "mock-extract"
    }
}

#[derive(Clone, Default)]
struct EmbeddingConfig {
    dimension: usize,
    overrides: HashMap<String, Vec<f32>>,
    latency: Duration,
    fail: bool,
}

/// Embedding backend producing deterministic unit vectors.
///
/// Identical texts always map to identical vectors; distinct texts map to
/// pseudo-random, nearly orthogonal vectors.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    config: Arc<EmbeddingConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            config: Arc::new(EmbeddingConfig {
                dimension,
                ..Default::default()
            }),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Return `vector` verbatim for `text`.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Arc::make_mut(&mut self.config)
            .overrides
            .insert(text.into(), vector);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).latency = latency;
        self
    }

    pub fn failing(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().map(|log| log.len()).unwrap_or(0)
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Deterministic unit vector for `text`.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        // FNV-1a seed, then an LCG per component.
        let mut state = text.bytes().fold(0xcbf29ce484222325u64, |h, b| {
            (h ^ b as u64).wrapping_mul(0x100000001b3)
        });
        let mut vec: Vec<f32> = (0..dimension)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 33) % 2000) as f32 / 1000.0 - 1.0
            })
            .collect();

        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
        vec
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if let Ok(mut log) = self.call_log.lock() {
            log.extend(texts.iter().map(|t| MockCall {
                operation: "embed".to_string(),
                input: t.clone(),
            }));
        }
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
        if self.config.fail {
            return Err(Error::Embedding("Simulated failure for testing".to_string()));
        }
        Ok(texts
            .iter()
            .map(|t| {
                let values = self
                    .config
                    .overrides
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| Self::generate(t, self.config.dimension));
                Vector::from(values)
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}
